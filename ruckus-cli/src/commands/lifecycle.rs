//! `stop`, `kill`, `pause`, `rm`, `restart` and `exec`.

use clap::{ArgAction, Args};
use ruckus_core::action::lifecycle::{DEFAULT_EXEC_COMMAND, DEFAULT_KILL_SIGNAL};
use ruckus_core::action::{
    ChaosCommand, ExecCommand, KillCommand, PauseCommand, RemoveCommand, RestartCommand, Scope,
    StopCommand,
};
use ruckus_core::params::parse_duration;
use ruckus_core::{RemoveOptions, ValidationError};
use std::time::Duration;

use super::{LimitArgs, TargetArgs};
use crate::config::Config;

/// Arguments for `stop`.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Seconds to wait for stop before killing it (default from config)
    #[arg(long, short = 't')]
    pub time: Option<u64>,

    /// Start the container again after --duration
    #[arg(long, short = 'r')]
    pub restart: bool,

    /// How long to keep the container stopped when --restart is set
    #[arg(long, short = 'd', value_parser = parse_duration, default_value = "10s")]
    pub duration: Duration,

    #[command(flatten)]
    pub limit: LimitArgs,

    #[command(flatten)]
    pub targets: TargetArgs,
}

impl StopArgs {
    /// Build the stop action.
    pub fn build(
        &self,
        scope: Scope,
        config: &Config,
    ) -> Result<Box<dyn ChaosCommand>, ValidationError> {
        let secs = self.time.unwrap_or(config.lifecycle.stop_timeout_secs);
        let restart_after = self.restart.then_some(self.duration);
        Ok(Box::new(StopCommand::new(
            scope,
            Duration::from_secs(secs),
            restart_after,
        )?))
    }
}

/// Arguments for `kill`.
#[derive(Args, Debug)]
pub struct KillArgs {
    /// Termination signal to send (SIGTERM, SIGKILL, SIGHUP, ...)
    #[arg(long, short = 's', default_value = DEFAULT_KILL_SIGNAL)]
    pub signal: String,

    #[command(flatten)]
    pub limit: LimitArgs,

    #[command(flatten)]
    pub targets: TargetArgs,
}

impl KillArgs {
    /// Build the kill action.
    pub fn build(&self, scope: Scope) -> Result<Box<dyn ChaosCommand>, ValidationError> {
        Ok(Box::new(KillCommand::new(scope, &self.signal)?))
    }
}

/// Arguments for `pause`.
#[derive(Args, Debug)]
pub struct PauseArgs {
    /// How long to keep the containers paused
    #[arg(long, short = 'd', value_parser = parse_duration)]
    pub duration: Duration,

    #[command(flatten)]
    pub limit: LimitArgs,

    #[command(flatten)]
    pub targets: TargetArgs,
}

impl PauseArgs {
    /// Build the pause action.
    pub fn build(&self, scope: Scope) -> Result<Box<dyn ChaosCommand>, ValidationError> {
        Ok(Box::new(PauseCommand::new(scope, self.duration)?))
    }
}

/// Arguments for `rm`.
#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Force removal of a running container
    #[arg(long, short = 'f', default_value_t = true, action = ArgAction::Set)]
    pub force: bool,

    /// Remove container links
    #[arg(long, short = 'n')]
    pub links: bool,

    /// Remove anonymous volumes
    #[arg(long, short = 'v', default_value_t = true, action = ArgAction::Set)]
    pub volumes: bool,

    #[command(flatten)]
    pub limit: LimitArgs,

    #[command(flatten)]
    pub targets: TargetArgs,
}

impl RemoveArgs {
    /// Build the remove action.
    pub fn build(&self, scope: Scope) -> Box<dyn ChaosCommand> {
        let options = RemoveOptions {
            force: self.force,
            links: self.links,
            volumes: self.volumes,
        };
        Box::new(RemoveCommand::new(scope, options))
    }
}

/// Arguments for `restart`.
#[derive(Args, Debug)]
pub struct RestartArgs {
    /// Seconds to wait for stop before killing it (default from config)
    #[arg(long, short = 't')]
    pub timeout: Option<u64>,

    #[command(flatten)]
    pub limit: LimitArgs,

    #[command(flatten)]
    pub targets: TargetArgs,
}

impl RestartArgs {
    /// Build the restart action.
    pub fn build(&self, scope: Scope, config: &Config) -> Box<dyn ChaosCommand> {
        let secs = self.timeout.unwrap_or(config.lifecycle.stop_timeout_secs);
        Box::new(RestartCommand::new(scope, Duration::from_secs(secs)))
    }
}

/// Arguments for `exec`.
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Command to run inside the container as root
    #[arg(long, short = 's', default_value = DEFAULT_EXEC_COMMAND, allow_hyphen_values = true)]
    pub command: String,

    #[command(flatten)]
    pub limit: LimitArgs,

    #[command(flatten)]
    pub targets: TargetArgs,
}

impl ExecArgs {
    /// Build the exec action.
    pub fn build(&self, scope: Scope) -> Result<Box<dyn ChaosCommand>, ValidationError> {
        Ok(Box::new(ExecCommand::new(scope, &self.command)?))
    }
}
