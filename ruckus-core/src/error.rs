//! Error types for ruckus-core.

use std::path::PathBuf;
use std::time::Duration;

/// Parameter validation errors.
///
/// Returned by constructors before any side effect happens.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// A percentage, correlation or probability outside `[0, 100]`.
    #[error("invalid {field} value {value}: must be between 0.0 and 100.0")]
    PercentOutOfRange {
        /// Name of the offending parameter.
        field: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// Delay time must be positive.
    #[error("invalid delay time {0}ms: must be greater than 0")]
    NonPositiveDelay(i64),

    /// Jitter must lie in `[0, delay time]`.
    #[error("invalid delay jitter {jitter}ms: must be between 0 and delay time {time}ms")]
    JitterOutOfRange {
        /// Requested jitter in milliseconds.
        jitter: i64,
        /// Delay time in milliseconds.
        time: i64,
    },

    /// Unsupported delay distribution.
    #[error("invalid delay distribution: {0} (expected uniform, normal, pareto or paretonormal)")]
    UnknownDistribution(String),

    /// Rate string does not look like `<digits>[gmk]bit`.
    #[error("invalid rate: {0:?}")]
    InvalidRate(String),

    /// Cell size must not be negative.
    #[error("invalid cell size {0}: must be >= 0")]
    NegativeCellSize(i64),

    /// Network interface name rejected.
    #[error("invalid network interface name: {0:?}")]
    InvalidInterface(String),

    /// An effect needs a positive duration.
    #[error("unset or invalid duration")]
    MissingDuration,

    /// Effect duration must be strictly shorter than the repeat interval.
    #[error("duration {duration:?} must be shorter than interval {interval:?}")]
    DurationNotBelowInterval {
        /// Effect duration.
        duration: Duration,
        /// Repeat interval.
        interval: Duration,
    },

    /// Duration string could not be parsed.
    #[error("invalid duration: {0:?}")]
    InvalidDuration(String),

    /// Target address is not an IPv4 address or CIDR block.
    #[error("invalid target address: {0:?}")]
    InvalidCidr(String),

    /// Port is not in `1..=65535`.
    #[error("invalid port: {0:?}")]
    InvalidPort(String),

    /// Signal name not found in the Linux signal table.
    #[error("unknown signal: {0}")]
    UnknownSignal(String),

    /// Label filter without a key.
    #[error("invalid label filter: {0:?}")]
    InvalidLabel(String),

    /// `exec` needs a command to run.
    #[error("exec command must not be empty")]
    EmptyExecCommand,

    /// Stress needs at least one stress-ng argument.
    #[error("stressors must not be empty")]
    EmptyStressors,

    /// Stress image is required.
    #[error("stress image must not be empty")]
    EmptyImage,

    /// Container id is not 12-64 lowercase hex characters.
    #[error("invalid container id {0:?}: expected 12-64 lowercase hex characters")]
    InvalidContainerId(String),

    /// Cgroup path contains a `..` component.
    #[error("cgroup path must not contain '..': {0}")]
    PathTraversal(String),

    /// Both an explicit cgroup path and a container id were given.
    #[error("--cgroup-path and --target-id are mutually exclusive")]
    ConflictingTargets,

    /// Neither a cgroup path nor a container id was given.
    #[error("one of --target-id or --cgroup-path is required")]
    MissingTarget,

    /// Nothing to execute after migration.
    #[error("no command given (expected `-- COMMAND ARGS...`)")]
    EmptyCommand,
}

/// Errors reported by the container engine collaborator.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine API call failed.
    #[error("{operation} failed: {source}")]
    Api {
        /// Engine operation that failed.
        operation: &'static str,
        /// Underlying client error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Command executed inside a container exited non-zero.
    #[error("exec `{command}` in {container} failed: exit={exit_code}, stderr={stderr}")]
    ExecFailed {
        /// Container name or id.
        container: String,
        /// Command line that was run.
        command: String,
        /// Exit code from the command.
        exit_code: i64,
        /// Standard error output.
        stderr: String,
    },

    /// Required binary is missing and no fallback image is configured.
    #[error("{command} not found in {container} and no helper image configured")]
    CommandNotFound {
        /// Container name or id.
        container: String,
        /// Missing binary.
        command: String,
    },

    /// Pulling an image failed.
    #[error("failed to pull image {image}: {reason}")]
    ImagePull {
        /// Image reference.
        image: String,
        /// Reason reported by the engine.
        reason: String,
    },

    /// A helper container exited with a non-zero status.
    #[error("helper container {id} exited with status {exit_code}")]
    SidecarExit {
        /// Helper container id.
        id: String,
        /// Exit status.
        exit_code: i64,
    },
}

impl EngineError {
    /// Wrap a client error for the given operation.
    pub fn api(
        operation: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Api {
            operation,
            source: source.into(),
        }
    }
}

/// Errors returned by chaos actions.
#[derive(Debug, thiserror::Error)]
pub enum ChaosError {
    /// Parameters were rejected.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Listing target containers failed.
    #[error("error listing containers: {0}")]
    Listing(#[source] EngineError),

    /// The action failed on one container.
    #[error("{action} failed on container {container}: {source}")]
    Execution {
        /// Action description, e.g. "netem delay".
        action: &'static str,
        /// Container name.
        container: String,
        /// Underlying engine error.
        #[source]
        source: EngineError,
    },

    /// A per-container task panicked or was aborted.
    #[error("container task failed: {0}")]
    Task(String),
}

/// Cgroup injection errors.
#[derive(Debug, thiserror::Error)]
pub enum CgroupError {
    /// Inputs were rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Writing a pid into `cgroup.procs` failed.
    #[error("failed to write pid {pid} to {path}: {source}")]
    Write {
        /// The `cgroup.procs` file.
        path: PathBuf,
        /// Pid being migrated.
        pid: u32,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Replacing the process image failed.
    #[error("failed to exec {command}: {source}")]
    Exec {
        /// Program that could not be executed.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}
