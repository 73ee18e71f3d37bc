//! `stress`.

use clap::Args;
use ruckus_core::action::{ChaosCommand, Scope, StressCommand, StressParams};
use ruckus_core::params::parse_duration;
use ruckus_core::ValidationError;
use std::time::Duration;

use super::{LimitArgs, TargetArgs};
use crate::config::Config;

/// Arguments for `stress`.
#[derive(Args, Debug)]
pub struct StressArgs {
    /// How long the stress workload runs
    #[arg(long, short = 'd', value_parser = parse_duration)]
    pub duration: Duration,

    /// stress-ng arguments
    #[arg(long, default_value = "--cpu 4 --timeout 60s", allow_hyphen_values = true)]
    pub stressors: String,

    /// stress-ng image (default from config)
    #[arg(long)]
    pub stress_image: Option<String>,

    /// Pull the stress image before use
    #[arg(long)]
    pub pull_image: bool,

    /// Move the workload into the target's cgroup with cg-inject
    #[arg(long)]
    pub inject_cgroup: bool,

    #[command(flatten)]
    pub limit: LimitArgs,

    #[command(flatten)]
    pub targets: TargetArgs,
}

impl StressArgs {
    /// Build the stress action.
    pub fn build(
        &self,
        scope: Scope,
        config: &Config,
    ) -> Result<Box<dyn ChaosCommand>, ValidationError> {
        let params = StressParams {
            image: self
                .stress_image
                .clone()
                .unwrap_or_else(|| config.stress.image.clone()),
            pull_image: self.pull_image,
            stressors: self.stressors.clone(),
            duration: self.duration,
            inject_cgroup: self.inject_cgroup,
        };
        Ok(Box::new(StressCommand::new(scope, params)?))
    }
}
