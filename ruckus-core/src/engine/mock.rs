//! Mock engine for testing.
//!
//! Serves a seeded container list and records every call for verification.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

use super::{ContainerEngine, ExecOutput, RemoveOptions, SidecarSpec};
use crate::cgroup::CgroupDriver;
use crate::container::Container;
use crate::error::EngineError;

/// A call recorded by [`MockEngine`].
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    /// `list_containers`
    List {
        /// Whether stopped containers were requested.
        all: bool,
    },
    /// `kill_container`
    Kill {
        /// Container name.
        container: String,
        /// Signal sent.
        signal: String,
    },
    /// `stop_container`
    Stop {
        /// Container name.
        container: String,
        /// Grace period.
        timeout: Duration,
    },
    /// `start_container`
    Start {
        /// Container name.
        container: String,
    },
    /// `restart_container`
    Restart {
        /// Container name.
        container: String,
        /// Grace period.
        timeout: Duration,
    },
    /// `remove_container`
    Remove {
        /// Container name.
        container: String,
        /// Options used.
        options: RemoveOptions,
    },
    /// `pause_container`
    Pause {
        /// Container name.
        container: String,
    },
    /// `unpause_container`
    Unpause {
        /// Container name.
        container: String,
    },
    /// `exec`
    Exec {
        /// Container id (target or sidecar).
        container_id: String,
        /// Command line.
        argv: Vec<String>,
    },
    /// `pull_image`
    Pull {
        /// Image reference.
        image: String,
    },
    /// `start_sidecar`
    StartSidecar(SidecarSpec),
    /// `wait_sidecar`
    WaitSidecar {
        /// Sidecar id.
        id: String,
    },
    /// `stop_sidecar`
    StopSidecar {
        /// Sidecar id.
        id: String,
    },
    /// `remove_sidecar`
    RemoveSidecar {
        /// Sidecar id.
        id: String,
    },
    /// `cgroup_driver`
    CgroupDriver,
}

impl EngineCall {
    /// Container name or id this call targets, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Kill { container, .. }
            | Self::Stop { container, .. }
            | Self::Start { container }
            | Self::Restart { container, .. }
            | Self::Remove { container, .. }
            | Self::Pause { container }
            | Self::Unpause { container } => Some(container),
            Self::Exec { container_id, .. } => Some(container_id),
            Self::WaitSidecar { id } | Self::StopSidecar { id } | Self::RemoveSidecar { id } => {
                Some(id)
            }
            _ => None,
        }
    }
}

/// In-memory [`ContainerEngine`] for tests.
///
/// Clones share state, so a test can keep one handle while an action owns
/// another.
#[derive(Debug)]
pub struct MockEngine {
    inner: Arc<Mutex<MockEngineInner>>,
    sidecar_stopped: watch::Sender<u64>,
}

#[derive(Debug)]
struct MockEngineInner {
    containers: Vec<Container>,
    calls: Vec<EngineCall>,
    without_tc: HashSet<String>,
    failing: HashMap<String, String>,
    fail_next_list: Option<String>,
    next_sidecar: u32,
    stopped_sidecars: HashSet<String>,
    sidecar_exit: Option<i64>,
    cgroup_driver: CgroupDriver,
}

impl Default for MockEngine {
    fn default() -> Self {
        let (sidecar_stopped, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(MockEngineInner {
                containers: Vec::new(),
                calls: Vec::new(),
                without_tc: HashSet::new(),
                failing: HashMap::new(),
                fail_next_list: None,
                next_sidecar: 0,
                stopped_sidecars: HashSet::new(),
                sidecar_exit: None,
                cgroup_driver: CgroupDriver::Cgroupfs,
            })),
            sidecar_stopped,
        }
    }
}

impl Clone for MockEngine {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            sidecar_stopped: self.sidecar_stopped.clone(),
        }
    }
}

impl MockEngine {
    /// Create an engine with no containers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine serving the given containers, in listing order.
    pub fn with_containers(containers: Vec<Container>) -> Self {
        let engine = Self::new();
        engine.inner.lock().unwrap().containers = containers;
        engine
    }

    /// All recorded calls, oldest first.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Recorded calls that target the given container name or id.
    pub fn calls_for(&self, target: &str) -> Vec<EngineCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.target() == Some(target))
            .collect()
    }

    /// Recorded calls other than listing.
    pub fn mutating_calls(&self) -> Vec<EngineCall> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, EngineCall::List { .. }))
            .collect()
    }

    /// Command lines executed in the given container, in order.
    pub fn exec_commands(&self, container_id: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::Exec { container_id: id, argv } if id == container_id => Some(argv),
                _ => None,
            })
            .collect()
    }

    /// Make `which tc` fail inside the container with this id.
    pub fn without_tc(&self, container_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.without_tc.insert(container_id.to_string());
    }

    /// Make every operation on this container (by id or trimmed name) fail.
    pub fn fail_container(&self, target: &str, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.failing.insert(target.to_string(), error.to_string());
    }

    /// Cause the next `list_containers()` to fail with the given error.
    pub fn fail_next_list(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_list = Some(error.to_string());
    }

    /// Make sidecars exit immediately with this status instead of running
    /// until stopped.
    pub fn set_sidecar_exit(&self, exit_code: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.sidecar_exit = Some(exit_code);
    }

    /// Set the cgroup driver reported by the engine.
    pub fn set_cgroup_driver(&self, driver: CgroupDriver) {
        let mut inner = self.inner.lock().unwrap();
        inner.cgroup_driver = driver;
    }

    /// Record a call against a container, failing if it is marked to fail.
    fn record(
        &self,
        operation: &'static str,
        container: &Container,
        call: EngineCall,
    ) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(call);
        let failure = inner
            .failing
            .get(&container.id)
            .or_else(|| inner.failing.get(container.trimmed_name()))
            .cloned();
        match failure {
            Some(error) => Err(EngineError::api(operation, error)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn list_containers(&self, all: bool) -> Result<Vec<Container>, EngineError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(EngineCall::List { all });

        if let Some(error) = inner.fail_next_list.take() {
            return Err(EngineError::api("list containers", error));
        }

        Ok(inner.containers.clone())
    }

    async fn kill_container(
        &self,
        container: &Container,
        signal: &str,
    ) -> Result<(), EngineError> {
        let call = EngineCall::Kill {
            container: container.trimmed_name().to_string(),
            signal: signal.to_string(),
        };
        self.record("kill container", container, call)
    }

    async fn stop_container(
        &self,
        container: &Container,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        let call = EngineCall::Stop {
            container: container.trimmed_name().to_string(),
            timeout,
        };
        self.record("stop container", container, call)
    }

    async fn start_container(&self, container: &Container) -> Result<(), EngineError> {
        let call = EngineCall::Start {
            container: container.trimmed_name().to_string(),
        };
        self.record("start container", container, call)
    }

    async fn restart_container(
        &self,
        container: &Container,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        let call = EngineCall::Restart {
            container: container.trimmed_name().to_string(),
            timeout,
        };
        self.record("restart container", container, call)
    }

    async fn remove_container(
        &self,
        container: &Container,
        options: RemoveOptions,
    ) -> Result<(), EngineError> {
        let call = EngineCall::Remove {
            container: container.trimmed_name().to_string(),
            options,
        };
        self.record("remove container", container, call)
    }

    async fn pause_container(&self, container: &Container) -> Result<(), EngineError> {
        let call = EngineCall::Pause {
            container: container.trimmed_name().to_string(),
        };
        self.record("pause container", container, call)
    }

    async fn unpause_container(&self, container: &Container) -> Result<(), EngineError> {
        let call = EngineCall::Unpause {
            container: container.trimmed_name().to_string(),
        };
        self.record("unpause container", container, call)
    }

    async fn exec(&self, container_id: &str, argv: &[String]) -> Result<ExecOutput, EngineError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(EngineCall::Exec {
            container_id: container_id.to_string(),
            argv: argv.to_vec(),
        });

        if let Some(error) = inner.failing.get(container_id) {
            return Err(EngineError::api("exec", error.clone()));
        }

        if argv.first().map(String::as_str) == Some("which") {
            if inner.without_tc.contains(container_id) {
                return Ok(ExecOutput {
                    exit_code: 1,
                    ..Default::default()
                });
            }
            return Ok(ExecOutput {
                stdout: "/sbin/tc\n".into(),
                ..Default::default()
            });
        }

        Ok(ExecOutput::default())
    }

    async fn pull_image(&self, image: &str) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(EngineCall::Pull {
            image: image.to_string(),
        });
        Ok(())
    }

    async fn start_sidecar(&self, spec: &SidecarSpec) -> Result<String, EngineError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(EngineCall::StartSidecar(spec.clone()));
        inner.next_sidecar += 1;
        Ok(format!("sidecar-{}", inner.next_sidecar))
    }

    async fn wait_sidecar(&self, id: &str) -> Result<i64, EngineError> {
        let mut stopped = self.sidecar_stopped.subscribe();
        {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(EngineCall::WaitSidecar { id: id.to_string() });
            if let Some(code) = inner.sidecar_exit {
                return Ok(code);
            }
        }

        loop {
            if self.inner.lock().unwrap().stopped_sidecars.contains(id) {
                return Ok(0);
            }
            if stopped.changed().await.is_err() {
                return Ok(0);
            }
        }
    }

    async fn stop_sidecar(&self, id: &str, _timeout: Duration) -> Result<(), EngineError> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(EngineCall::StopSidecar { id: id.to_string() });
            inner.stopped_sidecars.insert(id.to_string());
        }
        self.sidecar_stopped.send_modify(|n| *n += 1);
        Ok(())
    }

    async fn remove_sidecar(&self, id: &str) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .calls
            .push(EngineCall::RemoveSidecar { id: id.to_string() });
        Ok(())
    }

    async fn cgroup_driver(&self) -> Result<CgroupDriver, EngineError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(EngineCall::CgroupDriver);
        Ok(inner.cgroup_driver)
    }
}
