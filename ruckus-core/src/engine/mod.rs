//! Container engine abstraction.
//!
//! Every call the chaos actions make against a container runtime goes
//! through [`ContainerEngine`]. The Docker implementation lives in
//! `ruckus-docker`; [`MockEngine`] records calls for tests.
//!
//! # Design
//!
//! The trait is deliberately coarse: one method per engine operation the
//! actions need, taking the [`Container`] snapshot produced by
//! [`ContainerEngine::list_containers`]. Helper containers (netem and stress
//! sidecars) are addressed by the id returned from
//! [`ContainerEngine::start_sidecar`].

mod mock;

pub use mock::{EngineCall, MockEngine};

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::cgroup::CgroupDriver;
use crate::container::Container;
use crate::error::EngineError;

/// Result of executing a command inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Exit code (0 = success).
    pub exit_code: i64,
}

impl ExecOutput {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Options for removing a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Kill the container first if it is running.
    pub force: bool,
    /// Remove the container's links.
    pub links: bool,
    /// Remove anonymous volumes.
    pub volumes: bool,
}

impl Default for RemoveOptions {
    fn default() -> Self {
        Self {
            force: true,
            links: false,
            volumes: true,
        }
    }
}

/// Helper container to create next to a target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SidecarSpec {
    /// Image to run.
    pub image: String,
    /// Entrypoint override (empty keeps the image default).
    pub entrypoint: Vec<String>,
    /// Command (empty keeps the image default).
    pub cmd: Vec<String>,
    /// Labels applied to the helper.
    pub labels: HashMap<String, String>,
    /// Added Linux capabilities.
    pub cap_add: Vec<String>,
    /// Network mode, e.g. `container:<id>`.
    pub network_mode: Option<String>,
    /// Run in the host cgroup namespace.
    pub cgroupns_host: bool,
    /// Bind mounts in `src:dst:mode` form.
    pub binds: Vec<String>,
    /// Cgroup parent for the helper.
    pub cgroup_parent: Option<String>,
    /// Let the engine remove the helper when it exits.
    pub auto_remove: bool,
}

/// Container runtime operations used by chaos actions.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// List containers (running only unless `all`), in engine order.
    async fn list_containers(&self, all: bool) -> Result<Vec<Container>, EngineError>;

    /// Send a signal to a container.
    async fn kill_container(&self, container: &Container, signal: &str)
        -> Result<(), EngineError>;

    /// Stop a container, killing it after `timeout`.
    ///
    /// Honours the container's custom stop-signal label.
    async fn stop_container(
        &self,
        container: &Container,
        timeout: Duration,
    ) -> Result<(), EngineError>;

    /// Start a stopped container.
    async fn start_container(&self, container: &Container) -> Result<(), EngineError>;

    /// Restart a container, killing it after `timeout` if it does not stop.
    async fn restart_container(
        &self,
        container: &Container,
        timeout: Duration,
    ) -> Result<(), EngineError>;

    /// Remove a container.
    async fn remove_container(
        &self,
        container: &Container,
        options: RemoveOptions,
    ) -> Result<(), EngineError>;

    /// Freeze all processes in a container.
    async fn pause_container(&self, container: &Container) -> Result<(), EngineError>;

    /// Thaw a paused container.
    async fn unpause_container(&self, container: &Container) -> Result<(), EngineError>;

    /// Run `argv` inside a container as privileged root and collect its output.
    async fn exec(&self, container_id: &str, argv: &[String]) -> Result<ExecOutput, EngineError>;

    /// Pull an image.
    async fn pull_image(&self, image: &str) -> Result<(), EngineError>;

    /// Create and start a helper container, returning its id.
    async fn start_sidecar(&self, spec: &SidecarSpec) -> Result<String, EngineError>;

    /// Wait for a helper container to exit and return its exit status.
    async fn wait_sidecar(&self, id: &str) -> Result<i64, EngineError>;

    /// Stop a helper container.
    async fn stop_sidecar(&self, id: &str, timeout: Duration) -> Result<(), EngineError>;

    /// Force-remove a helper container.
    async fn remove_sidecar(&self, id: &str) -> Result<(), EngineError>;

    /// Cgroup driver the engine runs containers under.
    async fn cgroup_driver(&self) -> Result<CgroupDriver, EngineError>;
}
