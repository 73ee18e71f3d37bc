//! [`ContainerEngine`] over the Docker Engine API.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions,
    ListContainersOptions, LogOutput, RemoveContainerOptions, RestartContainerOptions,
    StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, HostConfigCgroupnsModeEnum};
use bollard::Docker;
use futures_util::StreamExt;
use ruckus_core::cgroup::CgroupDriver;
use ruckus_core::{
    Container, ContainerEngine, EngineError, ExecOutput, RemoveOptions, SidecarSpec,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::convert;

/// Default daemon address.
pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

/// Default API request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Directory holding `ca.pem`, `cert.pem` and `key.pem` when
/// `DOCKER_CERT_PATH` is unset.
pub const DEFAULT_CERT_DIR: &str = "/etc/ssl/docker";

/// Poll period while waiting for a custom stop signal to take effect.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// PEM files for a TLS daemon connection.
///
/// The server certificate is always verified against `ca_cert`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsOptions {
    /// CA bundle that signed the daemon's certificate.
    pub ca_cert: PathBuf,
    /// Client certificate.
    pub cert: PathBuf,
    /// Client private key.
    pub key: PathBuf,
}

impl TlsOptions {
    /// `ca.pem`, `cert.pem` and `key.pem` inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            ca_cert: dir.join("ca.pem"),
            cert: dir.join("cert.pem"),
            key: dir.join("key.pem"),
        }
    }
}

/// Docker-backed engine.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect to `host` (`unix://PATH`, `tcp://ADDR` or `http://ADDR`).
    ///
    /// The connection is lazy; the first API call reports an unreachable
    /// daemon.
    pub fn connect(host: &str, timeout_secs: u64) -> Result<Self, EngineError> {
        let docker = if let Some(path) = host.strip_prefix("unix://") {
            Docker::connect_with_unix(path, timeout_secs, bollard::API_DEFAULT_VERSION)
        } else if host.starts_with("tcp://") || host.starts_with("http://") {
            Docker::connect_with_http(host, timeout_secs, bollard::API_DEFAULT_VERSION)
        } else if host.is_empty() {
            Docker::connect_with_local_defaults()
        } else {
            Docker::connect_with_unix(host, timeout_secs, bollard::API_DEFAULT_VERSION)
        }
        .map_err(|e| EngineError::api("connect to docker", e))?;

        tracing::debug!(host, timeout_secs, "docker client configured");
        Ok(Self { docker })
    }

    /// Connect to a TLS daemon at `host` (`tcp://ADDR` or `https://ADDR`).
    ///
    /// Certificate files are read here, so a missing or unreadable file fails
    /// before any API call.
    pub fn connect_tls(host: &str, timeout_secs: u64, tls: &TlsOptions) -> Result<Self, EngineError> {
        let docker = Docker::connect_with_ssl(
            host,
            &tls.key,
            &tls.cert,
            &tls.ca_cert,
            timeout_secs,
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(|e| EngineError::api("connect to docker over tls", e))?;

        tracing::debug!(host, timeout_secs, ca = %tls.ca_cert.display(), "docker tls client configured");
        Ok(Self { docker })
    }

    /// Wrap an existing client.
    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }

    async fn is_running(&self, id: &str) -> Result<bool, EngineError> {
        let info = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| EngineError::api("inspect container", e))?;
        Ok(info.state.and_then(|s| s.running).unwrap_or(false))
    }

    /// Stop with a custom signal, escalating to SIGKILL after `timeout`.
    async fn stop_with_signal(
        &self,
        container: &Container,
        signal: &str,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        tracing::debug!(container = %container.name, signal, "stopping with custom signal");
        self.kill_container(container, signal).await?;

        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if !self.is_running(&container.id).await? {
                return Ok(());
            }
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }

        tracing::debug!(container = %container.name, "still running after stop signal, killing");
        self.kill_container(container, "SIGKILL").await
    }
}

fn is_not_found(e: &DockerError) -> bool {
    matches!(
        e,
        DockerError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn secs(d: Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn list_containers(&self, all: bool) -> Result<Vec<Container>, EngineError> {
        let options = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };
        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| EngineError::api("list containers", e))?;

        let mut containers = Vec::with_capacity(summaries.len());
        for id in summaries.into_iter().filter_map(|s| s.id) {
            match self
                .docker
                .inspect_container(&id, None::<InspectContainerOptions>)
                .await
            {
                Ok(info) => containers.extend(convert::container_from_inspect(info)),
                // Removed between list and inspect.
                Err(e) if is_not_found(&e) => {
                    tracing::debug!(id = %id, "container vanished during listing");
                }
                Err(e) => return Err(EngineError::api("inspect container", e)),
            }
        }
        Ok(containers)
    }

    async fn kill_container(&self, container: &Container, signal: &str) -> Result<(), EngineError> {
        self.docker
            .kill_container(&container.id, Some(KillContainerOptions { signal }))
            .await
            .map_err(|e| EngineError::api("kill container", e))
    }

    async fn stop_container(
        &self,
        container: &Container,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        if let Some(signal) = container.stop_signal() {
            return self.stop_with_signal(container, signal, timeout).await;
        }
        self.docker
            .stop_container(&container.id, Some(StopContainerOptions { t: secs(timeout) }))
            .await
            .map_err(|e| EngineError::api("stop container", e))
    }

    async fn start_container(&self, container: &Container) -> Result<(), EngineError> {
        self.docker
            .start_container(&container.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| EngineError::api("start container", e))
    }

    async fn restart_container(
        &self,
        container: &Container,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        let t = isize::try_from(timeout.as_secs()).unwrap_or(isize::MAX);
        self.docker
            .restart_container(&container.id, Some(RestartContainerOptions { t }))
            .await
            .map_err(|e| EngineError::api("restart container", e))
    }

    async fn remove_container(
        &self,
        container: &Container,
        options: RemoveOptions,
    ) -> Result<(), EngineError> {
        let options = RemoveContainerOptions {
            force: options.force,
            link: options.links,
            v: options.volumes,
        };
        self.docker
            .remove_container(&container.id, Some(options))
            .await
            .map_err(|e| EngineError::api("remove container", e))
    }

    async fn pause_container(&self, container: &Container) -> Result<(), EngineError> {
        self.docker
            .pause_container(&container.id)
            .await
            .map_err(|e| EngineError::api("pause container", e))
    }

    async fn unpause_container(&self, container: &Container) -> Result<(), EngineError> {
        self.docker
            .unpause_container(&container.id)
            .await
            .map_err(|e| EngineError::api("unpause container", e))
    }

    async fn exec(&self, container_id: &str, argv: &[String]) -> Result<ExecOutput, EngineError> {
        let options = CreateExecOptions {
            cmd: Some(argv.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            privileged: Some(true),
            user: Some("root".to_string()),
            ..Default::default()
        };
        let exec = self
            .docker
            .create_exec(container_id, options)
            .await
            .map_err(|e| EngineError::api("create exec", e))?;

        let mut stdout = String::new();
        let mut stderr = String::new();
        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| EngineError::api("start exec", e))?;
        if let StartExecResults::Attached { mut output, .. } = started {
            while let Some(msg) = output.next().await {
                match msg.map_err(|e| EngineError::api("read exec output", e))? {
                    LogOutput::StdOut { message } => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdErr { message } => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    _ => {}
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| EngineError::api("inspect exec", e))?;

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code: inspect.exit_code.unwrap_or(-1),
        })
    }

    async fn pull_image(&self, image: &str) -> Result<(), EngineError> {
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            let info = progress.map_err(|e| EngineError::ImagePull {
                image: image.to_string(),
                reason: e.to_string(),
            })?;
            if let Some(status) = info.status {
                tracing::trace!(image, status = %status, "pull progress");
            }
        }
        tracing::debug!(image, "image pulled");
        Ok(())
    }

    async fn start_sidecar(&self, spec: &SidecarSpec) -> Result<String, EngineError> {
        let name = format!("ruckus-{}", uuid::Uuid::new_v4().as_simple());
        let host_config = HostConfig {
            cap_add: (!spec.cap_add.is_empty()).then(|| spec.cap_add.clone()),
            network_mode: spec.network_mode.clone(),
            cgroupns_mode: spec.cgroupns_host.then_some(HostConfigCgroupnsModeEnum::HOST),
            binds: (!spec.binds.is_empty()).then(|| spec.binds.clone()),
            cgroup_parent: spec.cgroup_parent.clone(),
            auto_remove: Some(spec.auto_remove),
            ..Default::default()
        };
        let config = Config {
            image: Some(spec.image.clone()),
            entrypoint: (!spec.entrypoint.is_empty()).then(|| spec.entrypoint.clone()),
            cmd: (!spec.cmd.is_empty()).then(|| spec.cmd.clone()),
            labels: Some(spec.labels.clone()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.as_str(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| EngineError::api("create helper container", e))?;

        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| EngineError::api("start helper container", e))?;

        tracing::debug!(sidecar = %created.id, name = %name, image = %spec.image, "helper container started");
        Ok(created.id)
    }

    async fn wait_sidecar(&self, id: &str) -> Result<i64, EngineError> {
        let mut stream = self
            .docker
            .wait_container(id, None::<WaitContainerOptions<String>>);
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            Some(Err(DockerError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(EngineError::api("wait helper container", e)),
            None => Ok(0),
        }
    }

    async fn stop_sidecar(&self, id: &str, timeout: Duration) -> Result<(), EngineError> {
        match self
            .docker
            .stop_container(id, Some(StopContainerOptions { t: secs(timeout) }))
            .await
        {
            Ok(()) => Ok(()),
            // Auto-removed helpers may already be gone.
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(EngineError::api("stop helper container", e)),
        }
    }

    async fn remove_sidecar(&self, id: &str) -> Result<(), EngineError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(EngineError::api("remove helper container", e)),
        }
    }

    async fn cgroup_driver(&self) -> Result<CgroupDriver, EngineError> {
        let info = self
            .docker
            .info()
            .await
            .map_err(|e| EngineError::api("docker info", e))?;
        Ok(convert::cgroup_driver(info.cgroup_driver))
    }
}
