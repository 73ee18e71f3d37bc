//! `stress`: run stress-ng in a helper container accounted to the target's
//! cgroup.
//!
//! Two placements are supported. By default the helper is created with its
//! cgroup parent pointing at the target. With `inject_cgroup` the helper
//! starts `cg-inject`, which moves itself into the target's cgroup and then
//! execs stress-ng.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{fan_out, ChaosCommand, Scope};
use crate::cgroup::{inject_args, sidecar_cgroup_parent, CgroupDriver, CGROUP_ROOT};
use crate::container::{Container, SKIP_LABEL};
use crate::engine::{ContainerEngine, SidecarSpec};
use crate::error::{ChaosError, EngineError, ValidationError};
use crate::params::check_duration_within_interval;

/// Default stress-ng image.
pub const DEFAULT_STRESS_IMAGE: &str = "ghcr.io/alexei-led/stress-ng:latest";

/// Grace period for stopping the helper.
pub const STRESS_STOP_TIMEOUT: Duration = Duration::from_secs(5);

const STRESS_NG: &str = "/stress-ng";
const CG_INJECT: &str = "/cg-inject";

/// Parameters for [`StressCommand`].
#[derive(Debug, Clone, PartialEq)]
pub struct StressParams {
    /// Image providing `/stress-ng` (and `/cg-inject` in inject mode).
    pub image: String,
    /// Pull the image before creating the helper.
    pub pull_image: bool,
    /// stress-ng arguments, whitespace separated.
    pub stressors: String,
    /// How long the workload runs.
    pub duration: Duration,
    /// Place the workload with `cg-inject` instead of a cgroup parent.
    pub inject_cgroup: bool,
}

impl Default for StressParams {
    fn default() -> Self {
        Self {
            image: DEFAULT_STRESS_IMAGE.to_string(),
            pull_image: false,
            stressors: "--cpu 4 --timeout 60s".to_string(),
            duration: Duration::ZERO,
            inject_cgroup: false,
        }
    }
}

/// Validated stress action.
pub struct StressCommand {
    scope: Scope,
    helper: Arc<HelperTemplate>,
    pull_image: bool,
    duration: Duration,
}

/// What every stress helper runs, independent of its target.
#[derive(Debug)]
struct HelperTemplate {
    image: String,
    stressors: Vec<String>,
    inject_cgroup: bool,
}

impl StressCommand {
    /// Validate `params` against `scope`.
    pub fn new(scope: Scope, params: StressParams) -> Result<Self, ValidationError> {
        let stressors: Vec<String> = params
            .stressors
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if stressors.is_empty() {
            return Err(ValidationError::EmptyStressors);
        }
        if params.image.trim().is_empty() {
            return Err(ValidationError::EmptyImage);
        }
        check_duration_within_interval(params.duration, scope.interval)?;

        Ok(Self {
            scope,
            helper: Arc::new(HelperTemplate {
                image: params.image.trim().to_string(),
                stressors,
                inject_cgroup: params.inject_cgroup,
            }),
            pull_image: params.pull_image,
            duration: params.duration,
        })
    }

    /// Helper container spec for `target` under `driver`.
    pub fn sidecar_spec(&self, target: &Container, driver: CgroupDriver) -> SidecarSpec {
        self.helper.spec(target, driver)
    }
}

impl HelperTemplate {
    fn spec(&self, target: &Container, driver: CgroupDriver) -> SidecarSpec {
        let parent = target.cgroup_parent.as_deref();
        let labels = HashMap::from([(SKIP_LABEL.to_string(), "true".to_string())]);

        if self.inject_cgroup {
            let mut cmd = inject_args(&target.id, parent, driver);
            cmd.push("--".into());
            cmd.push(STRESS_NG.into());
            cmd.extend(self.stressors.iter().cloned());
            return SidecarSpec {
                image: self.image.clone(),
                entrypoint: vec![CG_INJECT.into()],
                cmd,
                labels,
                cgroupns_host: true,
                binds: vec![format!("{CGROUP_ROOT}:{CGROUP_ROOT}:rw")],
                auto_remove: true,
                ..Default::default()
            };
        }

        SidecarSpec {
            image: self.image.clone(),
            entrypoint: vec![STRESS_NG.into()],
            cmd: self.stressors.clone(),
            labels,
            cgroup_parent: Some(sidecar_cgroup_parent(&target.id, parent, driver)),
            auto_remove: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ChaosCommand for StressCommand {
    fn name(&self) -> &'static str {
        "stress"
    }

    async fn run(&self, token: &CancellationToken, random: bool) -> Result<(), ChaosError> {
        let targets = self.scope.targets(random).await?;
        if targets.is_empty() {
            tracing::info!(action = self.name(), "no matching containers, nothing to do");
            return Ok(());
        }

        let engine = Arc::clone(&self.scope.engine);
        let driver = if self.scope.dry_run {
            CgroupDriver::default()
        } else {
            match engine.cgroup_driver().await {
                Ok(driver) => driver,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read cgroup driver, assuming cgroupfs");
                    CgroupDriver::Cgroupfs
                }
            }
        };

        let helper = Arc::clone(&self.helper);
        let pull = self.pull_image;
        let duration = self.duration;
        let dry_run = self.scope.dry_run;

        fan_out(self.name(), targets, token, move |c, token| {
            let engine = Arc::clone(&engine);
            let spec = helper.spec(&c, driver);
            async move {
                stress_container(engine.as_ref(), &c, &spec, pull, duration, &token, dry_run).await
            }
        })
        .await
    }
}

async fn stress_container(
    engine: &dyn ContainerEngine,
    container: &Container,
    spec: &SidecarSpec,
    pull: bool,
    duration: Duration,
    token: &CancellationToken,
    dry_run: bool,
) -> Result<(), EngineError> {
    if dry_run {
        tracing::info!(
            dry_run = true,
            container = %container.name,
            image = %spec.image,
            entrypoint = %spec.entrypoint.join(" "),
            cmd = %spec.cmd.join(" "),
            duration = ?duration,
            "would start stress helper"
        );
        return Ok(());
    }

    if pull {
        tracing::debug!(image = %spec.image, "pulling stress image");
        engine.pull_image(&spec.image).await?;
    }

    let id = engine.start_sidecar(spec).await?;
    tracing::info!(
        container = %container.name,
        id = container.short_id(),
        sidecar = %id,
        stressors = %spec.cmd.join(" "),
        duration = ?duration,
        "stress helper started"
    );

    let outcome = tokio::select! {
        exit = engine.wait_sidecar(&id) => Some(exit),
        _ = tokio::time::sleep(duration) => {
            tracing::debug!(container = %container.name, "stress duration elapsed");
            None
        }
        _ = token.cancelled() => {
            tracing::debug!(container = %container.name, "stress aborted");
            None
        }
    };

    match outcome {
        Some(Ok(0)) => {
            tracing::info!(container = %container.name, sidecar = %id, "stress-ng finished");
            Ok(())
        }
        Some(Ok(exit_code)) => Err(EngineError::SidecarExit { id, exit_code }),
        Some(Err(e)) => Err(e),
        None => {
            stop_helper(engine, &id).await;
            Ok(())
        }
    }
}

async fn stop_helper(engine: &dyn ContainerEngine, id: &str) {
    let stop = engine.stop_sidecar(id, STRESS_STOP_TIMEOUT);
    match tokio::time::timeout(STRESS_STOP_TIMEOUT, stop).await {
        Ok(Ok(())) => tracing::debug!(sidecar = id, "stress helper stopped"),
        Ok(Err(e)) => tracing::warn!(sidecar = id, error = %e, "failed to stop stress helper"),
        Err(_) => tracing::warn!(sidecar = id, "timed out stopping stress helper"),
    }
}
