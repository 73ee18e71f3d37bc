//! Chaos actions.
//!
//! Every action implements [`ChaosCommand`]: parameters are validated when
//! the action is constructed, and [`ChaosCommand::run`] may then be called
//! any number of times (once per interval tick).
//!
//! A run resolves its targets, then starts one task per container and waits
//! for all of them. One container failing never stops the others; the first
//! failure (in target order) is returned.

pub mod lifecycle;
pub mod netem;
pub mod stress;

use async_trait::async_trait;
use futures_util::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::container::Container;
use crate::engine::ContainerEngine;
use crate::error::{ChaosError, EngineError};
use crate::params::GlobalParams;
use crate::selector::{self, SelectionCriteria};

pub use lifecycle::{
    ExecCommand, KillCommand, PauseCommand, RemoveCommand, RestartCommand, StopCommand,
};
pub use netem::{NetemCommand, NetemParams};
pub use stress::{StressCommand, StressParams};

/// A validated chaos action.
#[async_trait]
pub trait ChaosCommand: Send + Sync {
    /// Action name for logs.
    fn name(&self) -> &'static str;

    /// Apply the action once to the current set of targets.
    ///
    /// `token` cancels in-flight effects early; they still revert.
    async fn run(&self, token: &CancellationToken, random: bool) -> Result<(), ChaosError>;
}

/// Engine handle and target criteria shared by every action.
#[derive(Clone)]
pub struct Scope {
    /// Container engine.
    pub engine: Arc<dyn ContainerEngine>,
    /// Which containers to target.
    pub criteria: SelectionCriteria,
    /// Log engine calls instead of making them.
    pub dry_run: bool,
    /// Repeat interval, used to bound effect durations.
    pub interval: Option<Duration>,
}

impl Scope {
    /// Scope for `params`, capped at `limit` containers (0 = unlimited).
    pub fn new(engine: Arc<dyn ContainerEngine>, params: &GlobalParams, limit: usize) -> Self {
        Self {
            engine,
            criteria: params.criteria(limit),
            dry_run: params.dry_run,
            interval: params.interval,
        }
    }

    /// Resolve the current targets.
    pub async fn targets(&self, random: bool) -> Result<Vec<Container>, ChaosError> {
        selector::select(self.engine.as_ref(), &self.criteria, random)
            .await
            .map_err(ChaosError::Listing)
    }
}

/// Run `work` concurrently for every target and wait for all of them.
///
/// Each task gets a child of `token`. Results are collected in target order
/// and the first failure is returned.
pub(crate) async fn fan_out<F, Fut>(
    action: &'static str,
    targets: Vec<Container>,
    token: &CancellationToken,
    work: F,
) -> Result<(), ChaosError>
where
    F: Fn(Container, CancellationToken) -> Fut,
    Fut: Future<Output = Result<(), EngineError>> + Send + 'static,
{
    let tasks: Vec<_> = targets
        .into_iter()
        .map(|container| {
            let name = container.name.clone();
            let handle = tokio::spawn(work(container, token.child_token()));
            async move { (name, handle.await) }
        })
        .collect();

    let mut first_error = None;
    for (name, result) in join_all(tasks).await {
        let error = match result {
            Ok(Ok(())) => continue,
            Ok(Err(source)) => ChaosError::Execution {
                action,
                container: name,
                source,
            },
            Err(join) => ChaosError::Task(join.to_string()),
        };
        tracing::error!(action, error = %error, "chaos action failed");
        first_error.get_or_insert(error);
    }

    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Wait for `duration` or cancellation, whichever comes first.
///
/// Returns true when cancelled.
pub(crate) async fn hold(duration: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = token.cancelled() => true,
    }
}
