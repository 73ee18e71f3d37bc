//! Container lifecycle chaos: kill, stop, pause, remove, restart, exec.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{fan_out, hold, ChaosCommand, Scope};
use crate::engine::RemoveOptions;
use crate::error::{ChaosError, EngineError, ValidationError};
use crate::params::check_duration_within_interval;

/// Signal sent by `kill` when none is given.
pub const DEFAULT_KILL_SIGNAL: &str = "SIGKILL";

/// Command `exec` runs when none is given.
pub const DEFAULT_EXEC_COMMAND: &str = "kill 1";

/// Seconds `stop` waits before killing, when not configured.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Linux signal names accepted by `kill`.
pub const LINUX_SIGNALS: [&str; 28] = [
    "SIGHUP", "SIGINT", "SIGQUIT", "SIGILL", "SIGTRAP", "SIGIOT", "SIGBUS", "SIGFPE", "SIGKILL",
    "SIGUSR1", "SIGSEGV", "SIGUSR2", "SIGPIPE", "SIGALRM", "SIGTERM", "SIGCHLD", "SIGCONT",
    "SIGSTOP", "SIGTSTP", "SIGTTIN", "SIGTTOU", "SIGURG", "SIGXCPU", "SIGXFSZ", "SIGVTALRM",
    "SIGPROF", "SIGWINCH", "SIGIO",
];

fn no_targets(action: &str) -> Result<(), ChaosError> {
    tracing::info!(action, "no matching containers, nothing to do");
    Ok(())
}

// ============================================================================
// kill
// ============================================================================

/// Send a signal to every target.
pub struct KillCommand {
    scope: Scope,
    signal: String,
}

impl KillCommand {
    /// Validate `signal` against the Linux signal table.
    pub fn new(scope: Scope, signal: &str) -> Result<Self, ValidationError> {
        if !LINUX_SIGNALS.contains(&signal) {
            return Err(ValidationError::UnknownSignal(signal.to_string()));
        }
        Ok(Self {
            scope,
            signal: signal.to_string(),
        })
    }
}

#[async_trait]
impl ChaosCommand for KillCommand {
    fn name(&self) -> &'static str {
        "kill"
    }

    async fn run(&self, token: &CancellationToken, random: bool) -> Result<(), ChaosError> {
        let targets = self.scope.targets(random).await?;
        if targets.is_empty() {
            return no_targets(self.name());
        }

        let engine = Arc::clone(&self.scope.engine);
        let signal = self.signal.clone();
        let dry_run = self.scope.dry_run;
        fan_out(self.name(), targets, token, move |c, _| {
            let engine = Arc::clone(&engine);
            let signal = signal.clone();
            async move {
                tracing::info!(container = %c.name, id = c.short_id(), signal = %signal, dry_run, "killing container");
                if dry_run {
                    return Ok(());
                }
                engine.kill_container(&c, &signal).await
            }
        })
        .await
    }
}

// ============================================================================
// stop
// ============================================================================

/// Stop every target, optionally starting it again after a while.
pub struct StopCommand {
    scope: Scope,
    timeout: Duration,
    restart_after: Option<Duration>,
}

impl StopCommand {
    /// `restart_after` must be shorter than the repeat interval.
    pub fn new(
        scope: Scope,
        timeout: Duration,
        restart_after: Option<Duration>,
    ) -> Result<Self, ValidationError> {
        if let Some(duration) = restart_after {
            check_duration_within_interval(duration, scope.interval)?;
        }
        let timeout = if timeout.is_zero() {
            DEFAULT_STOP_TIMEOUT
        } else {
            timeout
        };
        Ok(Self {
            scope,
            timeout,
            restart_after,
        })
    }
}

#[async_trait]
impl ChaosCommand for StopCommand {
    fn name(&self) -> &'static str {
        "stop"
    }

    async fn run(&self, token: &CancellationToken, random: bool) -> Result<(), ChaosError> {
        let targets = self.scope.targets(random).await?;
        if targets.is_empty() {
            return no_targets(self.name());
        }

        let engine = Arc::clone(&self.scope.engine);
        let timeout = self.timeout;
        let restart_after = self.restart_after;
        let dry_run = self.scope.dry_run;
        fan_out(self.name(), targets, token, move |c, token| {
            let engine = Arc::clone(&engine);
            async move {
                tracing::info!(container = %c.name, id = c.short_id(), timeout = ?timeout, dry_run, "stopping container");
                if !dry_run {
                    engine.stop_container(&c, timeout).await?;
                }

                let Some(duration) = restart_after else {
                    return Ok(());
                };
                if hold(duration, &token).await {
                    tracing::debug!(container = %c.name, "aborted, starting container early");
                }
                tracing::info!(container = %c.name, dry_run, "starting stopped container");
                if !dry_run {
                    engine.start_container(&c).await?;
                }
                Ok::<(), EngineError>(())
            }
        })
        .await
    }
}

// ============================================================================
// pause
// ============================================================================

/// Pause every target for a duration.
pub struct PauseCommand {
    scope: Scope,
    duration: Duration,
}

impl PauseCommand {
    /// `duration` must be positive and shorter than the repeat interval.
    pub fn new(scope: Scope, duration: Duration) -> Result<Self, ValidationError> {
        check_duration_within_interval(duration, scope.interval)?;
        Ok(Self { scope, duration })
    }
}

#[async_trait]
impl ChaosCommand for PauseCommand {
    fn name(&self) -> &'static str {
        "pause"
    }

    async fn run(&self, token: &CancellationToken, random: bool) -> Result<(), ChaosError> {
        let targets = self.scope.targets(random).await?;
        if targets.is_empty() {
            return no_targets(self.name());
        }

        let engine = Arc::clone(&self.scope.engine);
        let duration = self.duration;
        let dry_run = self.scope.dry_run;
        fan_out(self.name(), targets, token, move |c, token| {
            let engine = Arc::clone(&engine);
            async move {
                tracing::info!(container = %c.name, id = c.short_id(), duration = ?duration, dry_run, "pausing container");
                if !dry_run {
                    engine.pause_container(&c).await?;
                }

                hold(duration, &token).await;

                tracing::info!(container = %c.name, dry_run, "unpausing container");
                if dry_run {
                    return Ok(());
                }
                if let Err(e) = engine.unpause_container(&c).await {
                    tracing::warn!(container = %c.name, error = %e, "failed to unpause container");
                }
                Ok::<(), EngineError>(())
            }
        })
        .await
    }
}

// ============================================================================
// rm
// ============================================================================

/// Remove every target.
pub struct RemoveCommand {
    scope: Scope,
    options: RemoveOptions,
}

impl RemoveCommand {
    /// Create a remove action.
    pub fn new(scope: Scope, options: RemoveOptions) -> Self {
        Self { scope, options }
    }
}

#[async_trait]
impl ChaosCommand for RemoveCommand {
    fn name(&self) -> &'static str {
        "rm"
    }

    async fn run(&self, token: &CancellationToken, random: bool) -> Result<(), ChaosError> {
        let targets = self.scope.targets(random).await?;
        if targets.is_empty() {
            return no_targets(self.name());
        }

        let engine = Arc::clone(&self.scope.engine);
        let options = self.options;
        let dry_run = self.scope.dry_run;
        fan_out(self.name(), targets, token, move |c, _| {
            let engine = Arc::clone(&engine);
            async move {
                tracing::info!(
                    container = %c.name,
                    id = c.short_id(),
                    image = %c.image_name(),
                    force = options.force,
                    links = ?options.links.then(|| c.links()),
                    volumes = options.volumes,
                    dry_run,
                    "removing container"
                );
                if dry_run {
                    return Ok(());
                }
                engine.remove_container(&c, options).await
            }
        })
        .await
    }
}

// ============================================================================
// restart
// ============================================================================

/// Restart every target.
pub struct RestartCommand {
    scope: Scope,
    timeout: Duration,
}

impl RestartCommand {
    /// Create a restart action; `timeout` bounds the stop phase.
    pub fn new(scope: Scope, timeout: Duration) -> Self {
        Self { scope, timeout }
    }
}

#[async_trait]
impl ChaosCommand for RestartCommand {
    fn name(&self) -> &'static str {
        "restart"
    }

    async fn run(&self, token: &CancellationToken, random: bool) -> Result<(), ChaosError> {
        let targets = self.scope.targets(random).await?;
        if targets.is_empty() {
            return no_targets(self.name());
        }

        let engine = Arc::clone(&self.scope.engine);
        let timeout = self.timeout;
        let dry_run = self.scope.dry_run;
        fan_out(self.name(), targets, token, move |c, _| {
            let engine = Arc::clone(&engine);
            async move {
                tracing::info!(container = %c.name, id = c.short_id(), timeout = ?timeout, dry_run, "restarting container");
                if dry_run {
                    return Ok(());
                }
                engine.restart_container(&c, timeout).await
            }
        })
        .await
    }
}

// ============================================================================
// exec
// ============================================================================

/// Run a command inside every target as root.
///
/// The command's own exit status is logged, not treated as a failure:
/// `kill 1` usually takes the exec session down with the container.
pub struct ExecCommand {
    scope: Scope,
    argv: Arc<Vec<String>>,
}

impl ExecCommand {
    /// Split `command` on whitespace; it must name a program.
    pub fn new(scope: Scope, command: &str) -> Result<Self, ValidationError> {
        let argv: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        if argv.is_empty() {
            return Err(ValidationError::EmptyExecCommand);
        }
        Ok(Self {
            scope,
            argv: Arc::new(argv),
        })
    }
}

#[async_trait]
impl ChaosCommand for ExecCommand {
    fn name(&self) -> &'static str {
        "exec"
    }

    async fn run(&self, token: &CancellationToken, random: bool) -> Result<(), ChaosError> {
        let targets = self.scope.targets(random).await?;
        if targets.is_empty() {
            return no_targets(self.name());
        }

        let engine = Arc::clone(&self.scope.engine);
        let argv = Arc::clone(&self.argv);
        let dry_run = self.scope.dry_run;
        fan_out(self.name(), targets, token, move |c, _| {
            let engine = Arc::clone(&engine);
            let argv = Arc::clone(&argv);
            async move {
                let command = argv.join(" ");
                tracing::info!(container = %c.name, id = c.short_id(), command = %command, dry_run, "exec in container");
                if dry_run {
                    return Ok(());
                }
                let output = engine.exec(&c.id, &argv).await?;
                if output.success() {
                    tracing::debug!(container = %c.name, stdout = %output.stdout.trim_end(), "exec finished");
                } else {
                    tracing::warn!(
                        container = %c.name,
                        command = %command,
                        exit_code = output.exit_code,
                        stderr = %output.stderr.trim_end(),
                        "exec command exited non-zero"
                    );
                }
                Ok(())
            }
        })
        .await
    }
}
