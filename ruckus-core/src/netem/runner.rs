//! Timed apply/revert of netem on one container.
//!
//! `tc` runs inside the target when it has the binary; otherwise a helper
//! container joins the target's network namespace and runs it there.

use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::filter::TrafficFilter;
use super::tc;
use crate::container::{Container, SKIP_LABEL};
use crate::engine::{ContainerEngine, SidecarSpec};
use crate::error::EngineError;

/// Upper bound on the revert step.
pub const REVERT_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything needed to apply one netem effect to a container.
#[derive(Debug, Clone, PartialEq)]
pub struct NetemPlan {
    /// Network interface inside the container.
    pub iface: String,
    /// Netem arguments (see [`super::NetemEffect::tokens`]).
    pub tokens: Vec<String>,
    /// Traffic the effect is restricted to.
    pub filter: TrafficFilter,
    /// How long the effect stays applied.
    pub duration: Duration,
    /// Helper image used when the target has no `tc`.
    pub tc_image: Option<String>,
    /// Pull the helper image before creating the helper.
    pub pull: bool,
}

/// Runs `tc` command lists against a container.
pub struct TcRunner<'a> {
    engine: &'a dyn ContainerEngine,
    tc_image: Option<&'a str>,
    pull: bool,
}

impl<'a> TcRunner<'a> {
    /// Create a runner with an optional helper image.
    pub fn new(engine: &'a dyn ContainerEngine, tc_image: Option<&'a str>, pull: bool) -> Self {
        Self {
            engine,
            tc_image,
            pull,
        }
    }

    /// Run every command in order, stopping at the first failure.
    pub async fn run(
        &self,
        container: &Container,
        commands: &[Vec<String>],
    ) -> Result<(), EngineError> {
        if self.has_tc(container).await? {
            tracing::debug!(container = %container.name, image = %container.image_name(), "running tc inside target");
            return self.exec_all(&container.id, commands).await;
        }

        let Some(image) = self.tc_image.filter(|i| !i.is_empty()) else {
            return Err(EngineError::CommandNotFound {
                container: container.name.clone(),
                command: "tc".into(),
            });
        };

        self.run_in_sidecar(container, image, commands).await
    }

    async fn has_tc(&self, container: &Container) -> Result<bool, EngineError> {
        let probe = vec!["which".to_string(), "tc".to_string()];
        let output = self.engine.exec(&container.id, &probe).await?;
        Ok(output.success())
    }

    async fn exec_all(&self, id: &str, commands: &[Vec<String>]) -> Result<(), EngineError> {
        for args in commands {
            let mut argv = Vec::with_capacity(args.len() + 1);
            argv.push("tc".to_string());
            argv.extend(args.iter().cloned());

            let output = self.engine.exec(id, &argv).await?;
            if !output.success() {
                return Err(EngineError::ExecFailed {
                    container: id.to_string(),
                    command: argv.join(" "),
                    exit_code: output.exit_code,
                    stderr: output.stderr.trim().to_string(),
                });
            }
            tracing::debug!(container = id, command = %tc::command_line(args), "tc command done");
        }
        Ok(())
    }

    async fn run_in_sidecar(
        &self,
        container: &Container,
        image: &str,
        commands: &[Vec<String>],
    ) -> Result<(), EngineError> {
        if self.pull {
            tracing::debug!(image, "pulling tc image");
            self.engine.pull_image(image).await?;
        }

        let spec = SidecarSpec {
            image: image.to_string(),
            labels: HashMap::from([(SKIP_LABEL.to_string(), "true".to_string())]),
            cap_add: vec!["NET_ADMIN".into()],
            network_mode: Some(format!("container:{}", container.id)),
            ..Default::default()
        };
        let sidecar = self.engine.start_sidecar(&spec).await?;
        tracing::debug!(
            container = %container.name,
            sidecar = %sidecar,
            image,
            "running tc in helper container"
        );

        let result = self.exec_all(&sidecar, commands).await;
        let removed = self.engine.remove_sidecar(&sidecar).await;
        if let Err(e) = &removed {
            tracing::warn!(sidecar = %sidecar, error = %e, "failed to remove tc helper container");
        }
        result.and(removed)
    }
}

/// Apply the plan, hold it for its duration (or until cancelled), then revert.
///
/// Revert runs under its own timeout and ignores `token`, so a cancellation
/// that cuts the wait short still cleans up. Revert failures are logged only.
pub async fn run_netem(
    engine: &dyn ContainerEngine,
    container: &Container,
    plan: &NetemPlan,
    token: &CancellationToken,
    dry_run: bool,
) -> Result<(), EngineError> {
    let apply = tc::apply_commands(&plan.iface, &plan.tokens, &plan.filter);
    let revert = tc::revert_commands(&plan.iface, &plan.filter);
    let runner = TcRunner::new(engine, plan.tc_image.as_deref(), plan.pull);

    if dry_run {
        for cmd in &apply {
            tracing::info!(dry_run = true, container = %container.name, command = %tc::command_line(cmd), "would run");
        }
    } else {
        tracing::debug!(
            container = %container.name,
            iface = %plan.iface,
            netem = %plan.tokens.join(" "),
            duration = ?plan.duration,
            "applying netem"
        );
        runner.run(container, &apply).await?;
    }

    tokio::select! {
        _ = tokio::time::sleep(plan.duration) => {
            tracing::debug!(container = %container.name, "netem duration elapsed");
        }
        _ = token.cancelled() => {
            tracing::debug!(container = %container.name, "netem aborted, reverting");
        }
    }

    if dry_run {
        for cmd in &revert {
            tracing::info!(dry_run = true, container = %container.name, command = %tc::command_line(cmd), "would run");
        }
        return Ok(());
    }

    match tokio::time::timeout(REVERT_TIMEOUT, runner.run(container, &revert)).await {
        Ok(Ok(())) => tracing::debug!(container = %container.name, "netem reverted"),
        Ok(Err(e)) => tracing::warn!(
            container = %container.name,
            error = %e,
            "failed to revert netem (container may have been removed)"
        ),
        Err(_) => tracing::warn!(
            container = %container.name,
            timeout = ?REVERT_TIMEOUT,
            "timed out reverting netem"
        ),
    }

    Ok(())
}
