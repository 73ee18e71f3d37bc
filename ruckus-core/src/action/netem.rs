//! Netem chaos actions: delay, loss, loss-gemodel, loss-state, duplicate,
//! corrupt and rate.
//!
//! All variants share [`NetemCommand`]; the factory functions below validate
//! the variant's own parameters and return the common handle.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{fan_out, ChaosCommand, Scope};
use crate::error::{ChaosError, ValidationError};
use crate::netem::{run_netem, validate_interface, Cidr, NetemEffect, NetemPlan, TrafficFilter};
use crate::params::check_duration_within_interval;

/// Default network interface.
pub const DEFAULT_INTERFACE: &str = "eth0";

/// Parameters shared by every netem variant.
#[derive(Debug, Clone, PartialEq)]
pub struct NetemParams {
    /// Network interface inside the target.
    pub iface: String,
    /// Restrict the effect to these destination networks.
    pub targets: Vec<Cidr>,
    /// Restrict the effect to these source ports.
    pub egress_ports: Vec<u16>,
    /// Restrict the effect to these destination ports.
    pub ingress_ports: Vec<u16>,
    /// How long the effect stays applied.
    pub duration: Duration,
    /// Helper image with `tc`, used when the target lacks it.
    pub tc_image: Option<String>,
    /// Pull the helper image first.
    pub pull_image: bool,
}

impl Default for NetemParams {
    fn default() -> Self {
        Self {
            iface: DEFAULT_INTERFACE.to_string(),
            targets: Vec::new(),
            egress_ports: Vec::new(),
            ingress_ports: Vec::new(),
            duration: Duration::ZERO,
            tc_image: None,
            pull_image: false,
        }
    }
}

/// A validated netem effect bound to its targets.
pub struct NetemCommand {
    scope: Scope,
    effect: NetemEffect,
    plan: Arc<NetemPlan>,
}

impl NetemCommand {
    /// Validate the shared parameters and bind `effect` to them.
    pub fn new(
        scope: Scope,
        params: NetemParams,
        effect: NetemEffect,
    ) -> Result<Self, ValidationError> {
        validate_interface(&params.iface)?;
        check_duration_within_interval(params.duration, scope.interval)?;

        let plan = NetemPlan {
            iface: params.iface,
            tokens: effect.tokens(),
            filter: TrafficFilter {
                targets: params.targets,
                sports: params.egress_ports,
                dports: params.ingress_ports,
            },
            duration: params.duration,
            tc_image: params.tc_image.filter(|i| !i.is_empty()),
            pull: params.pull_image,
        };

        Ok(Self {
            scope,
            effect,
            plan: Arc::new(plan),
        })
    }
}

#[async_trait]
impl ChaosCommand for NetemCommand {
    fn name(&self) -> &'static str {
        self.effect.name()
    }

    async fn run(&self, token: &CancellationToken, random: bool) -> Result<(), ChaosError> {
        let targets = self.scope.targets(random).await?;
        if targets.is_empty() {
            tracing::info!(action = self.name(), "no matching containers, nothing to do");
            return Ok(());
        }

        let engine = Arc::clone(&self.scope.engine);
        let plan = Arc::clone(&self.plan);
        let dry_run = self.scope.dry_run;
        fan_out(self.name(), targets, token, move |c, token| {
            let engine = Arc::clone(&engine);
            let plan = Arc::clone(&plan);
            async move { run_netem(engine.as_ref(), &c, &plan, &token, dry_run).await }
        })
        .await
    }
}

fn boxed(
    scope: Scope,
    params: NetemParams,
    effect: NetemEffect,
) -> Result<Box<dyn ChaosCommand>, ValidationError> {
    Ok(Box::new(NetemCommand::new(scope, params, effect)?))
}

/// `netem delay`.
pub fn delay(
    scope: Scope,
    params: NetemParams,
    time_ms: i64,
    jitter_ms: i64,
    correlation: f64,
    distribution: &str,
) -> Result<Box<dyn ChaosCommand>, ValidationError> {
    let effect = NetemEffect::delay(time_ms, jitter_ms, correlation, distribution)?;
    boxed(scope, params, effect)
}

/// `netem loss`.
pub fn loss(
    scope: Scope,
    params: NetemParams,
    percent: f64,
    correlation: f64,
) -> Result<Box<dyn ChaosCommand>, ValidationError> {
    boxed(scope, params, NetemEffect::loss(percent, correlation)?)
}

/// `netem loss-gemodel`.
pub fn loss_gemodel(
    scope: Scope,
    params: NetemParams,
    pg: f64,
    pb: f64,
    one_h: f64,
    one_k: f64,
) -> Result<Box<dyn ChaosCommand>, ValidationError> {
    boxed(scope, params, NetemEffect::loss_gemodel(pg, pb, one_h, one_k)?)
}

/// `netem loss-state`.
pub fn loss_state(
    scope: Scope,
    params: NetemParams,
    p13: f64,
    p31: f64,
    p32: f64,
    p23: f64,
    p14: f64,
) -> Result<Box<dyn ChaosCommand>, ValidationError> {
    boxed(
        scope,
        params,
        NetemEffect::loss_state(p13, p31, p32, p23, p14)?,
    )
}

/// `netem duplicate`.
pub fn duplicate(
    scope: Scope,
    params: NetemParams,
    percent: f64,
    correlation: f64,
) -> Result<Box<dyn ChaosCommand>, ValidationError> {
    boxed(scope, params, NetemEffect::duplicate(percent, correlation)?)
}

/// `netem corrupt`.
pub fn corrupt(
    scope: Scope,
    params: NetemParams,
    percent: f64,
    correlation: f64,
) -> Result<Box<dyn ChaosCommand>, ValidationError> {
    boxed(scope, params, NetemEffect::corrupt(percent, correlation)?)
}

/// `netem rate`.
pub fn rate(
    scope: Scope,
    params: NetemParams,
    rate: &str,
    packet_overhead: i64,
    cell_size: i64,
    cell_overhead: i64,
) -> Result<Box<dyn ChaosCommand>, ValidationError> {
    let effect = NetemEffect::rate(rate, packet_overhead, cell_size, cell_overhead)?;
    boxed(scope, params, effect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::engine::MockEngine;
    use crate::params::GlobalParams;

    fn engine() -> MockEngine {
        MockEngine::with_containers(vec![
            Container::new("aaa", "/web"),
            Container::new("bbb", "/db"),
            Container::new("ccc", "/cache"),
        ])
    }

    fn scope(engine: &MockEngine, params: &GlobalParams) -> Scope {
        Scope::new(Arc::new(engine.clone()), params, 0)
    }

    fn params() -> NetemParams {
        NetemParams {
            duration: Duration::from_millis(10),
            ..Default::default()
        }
    }

    fn tc_lines(engine: &MockEngine, id: &str) -> Vec<String> {
        engine
            .exec_commands(id)
            .into_iter()
            .filter(|argv| argv[0] == "tc")
            .map(|argv| argv.join(" "))
            .collect()
    }

    #[test]
    fn rejects_bad_interface() {
        let engine = engine();
        let p = NetemParams {
            iface: "eth0; reboot".into(),
            ..params()
        };
        assert!(matches!(
            loss(scope(&engine, &GlobalParams::default()), p, 10.0, 0.0),
            Err(ValidationError::InvalidInterface(_))
        ));
    }

    #[test]
    fn rejects_duration_not_below_interval() {
        let engine = engine();
        let global = GlobalParams {
            interval: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        let p = NetemParams {
            duration: Duration::from_secs(5),
            ..params()
        };
        assert!(matches!(
            corrupt(scope(&engine, &global), p, 1.0, 0.0),
            Err(ValidationError::DurationNotBelowInterval { .. })
        ));
    }

    #[test]
    fn rejects_missing_duration() {
        let engine = engine();
        let p = NetemParams::default();
        assert!(matches!(
            duplicate(scope(&engine, &GlobalParams::default()), p, 1.0, 0.0),
            Err(ValidationError::MissingDuration)
        ));
    }

    #[test]
    fn rejects_out_of_range_effect_parameters() {
        let engine = engine();
        let s = || scope(&engine, &GlobalParams::default());
        assert!(loss(s(), params(), 100.5, 0.0).is_err());
        assert!(delay(s(), params(), 100, 200, 0.0, "").is_err());
        assert!(loss_gemodel(s(), params(), 1.0, 1.0, -1.0, 1.0).is_err());
        assert!(loss_state(s(), params(), 1.0, 1.0, 1.0, 1.0, 101.0).is_err());
        assert!(rate(s(), params(), "", 0, 0, 0).is_err());
    }

    #[tokio::test]
    async fn applies_and_reverts_on_every_target() {
        let engine = engine();
        let cmd = delay(
            scope(&engine, &GlobalParams::default()),
            params(),
            100,
            10,
            25.0,
            "normal",
        )
        .unwrap();
        assert_eq!(cmd.name(), "netem delay");

        cmd.run(&CancellationToken::new(), false).await.unwrap();

        for id in ["aaa", "bbb", "ccc"] {
            assert_eq!(
                tc_lines(&engine, id),
                vec![
                    "tc qdisc add dev eth0 root netem delay 100ms 10ms 25.00 distribution normal",
                    "tc qdisc del dev eth0 root netem",
                ]
            );
        }
    }

    #[tokio::test]
    async fn filtered_targets_use_prio_chain() {
        let engine = engine();
        let global = GlobalParams {
            names: vec!["web".into()],
            ..Default::default()
        };
        let p = NetemParams {
            targets: vec!["172.17.0.3".parse().unwrap()],
            ..params()
        };
        let cmd = loss(scope(&engine, &global), p, 10.0, 5.0).unwrap();

        cmd.run(&CancellationToken::new(), false).await.unwrap();

        let lines = tc_lines(&engine, "aaa");
        assert_eq!(lines.len(), 5 + 4);
        assert_eq!(
            lines[3],
            "tc qdisc add dev eth0 parent 1:3 handle 30: netem loss 10.00 5.00"
        );
        assert_eq!(lines[8], "tc qdisc del dev eth0 root handle 1: prio");
        assert!(tc_lines(&engine, "bbb").is_empty());
    }

    #[tokio::test]
    async fn limit_caps_targets() {
        let engine = engine();
        let s = Scope::new(Arc::new(engine.clone()), &GlobalParams::default(), 2);
        let cmd = rate(s, params(), "1mbit", 0, 0, 0).unwrap();

        cmd.run(&CancellationToken::new(), false).await.unwrap();

        assert!(!tc_lines(&engine, "aaa").is_empty());
        assert!(!tc_lines(&engine, "bbb").is_empty());
        assert!(tc_lines(&engine, "ccc").is_empty());
    }

    #[tokio::test]
    async fn failing_container_does_not_block_others() {
        let engine = engine();
        engine.without_tc("bbb");
        let cmd = loss(scope(&engine, &GlobalParams::default()), params(), 5.0, 0.0).unwrap();

        let err = cmd.run(&CancellationToken::new(), false).await.unwrap_err();
        match err {
            ChaosError::Execution {
                action, container, ..
            } => {
                assert_eq!(action, "netem loss");
                assert_eq!(container, "/db");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(tc_lines(&engine, "aaa").len(), 2);
        assert_eq!(tc_lines(&engine, "ccc").len(), 2);
    }

    #[tokio::test]
    async fn dry_run_issues_no_engine_calls() {
        let engine = engine();
        let global = GlobalParams {
            dry_run: true,
            ..Default::default()
        };
        let cmd = loss_state(scope(&engine, &global), params(), 20.0, 80.0, 30.0, 40.0, 10.0)
            .unwrap();

        cmd.run(&CancellationToken::new(), false).await.unwrap();
        assert!(engine.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn random_targets_one_container() {
        let engine = engine();
        let cmd = duplicate(scope(&engine, &GlobalParams::default()), params(), 10.0, 5.0)
            .unwrap();

        cmd.run(&CancellationToken::new(), true).await.unwrap();

        let hit = ["aaa", "bbb", "ccc"]
            .iter()
            .filter(|id| !tc_lines(&engine, id).is_empty())
            .count();
        assert_eq!(hit, 1);
    }
}
