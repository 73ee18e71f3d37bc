//! `netem` and its effect subcommands.

use clap::{Args, Subcommand};
use ruckus_core::action::netem::{self, NetemParams};
use ruckus_core::action::{ChaosCommand, Scope};
use ruckus_core::netem::{parse_ports, Cidr};
use ruckus_core::params::parse_duration;
use ruckus_core::ValidationError;
use std::time::Duration;

use super::{LimitArgs, TargetArgs};
use crate::config::Config;

/// Arguments shared by every netem effect.
#[derive(Args, Debug)]
pub struct NetemArgs {
    /// How long the effect stays applied
    #[arg(long, short = 'd', value_parser = parse_duration)]
    pub duration: Duration,

    /// Network interface inside the container (default from config)
    #[arg(long, short = 'i')]
    pub interface: Option<String>,

    /// Only affect traffic to this IPv4 address or CIDR (repeatable)
    #[arg(long = "target", short = 't', value_name = "CIDR")]
    pub target_networks: Vec<String>,

    /// Only affect traffic from these source ports (comma separated)
    #[arg(long, short = 'e', default_value = "")]
    pub egress_port: String,

    /// Only affect traffic to these destination ports (comma separated)
    #[arg(long = "ingress-port", default_value = "")]
    pub ingress_port: String,

    /// Helper image with tc for containers that lack it (default from config)
    #[arg(long)]
    pub tc_image: Option<String>,

    /// Pull the tc image before use
    #[arg(long)]
    pub pull_image: bool,

    #[command(flatten)]
    pub limit: LimitArgs,

    #[command(subcommand)]
    pub effect: EffectCommand,
}

/// Netem effects.
#[derive(Subcommand, Debug)]
pub enum EffectCommand {
    /// Delay egress traffic
    Delay {
        /// Delay time in milliseconds
        #[arg(long, short = 't', default_value_t = 100)]
        time: i64,
        /// Jitter in milliseconds
        #[arg(long, short = 'j', default_value_t = 10)]
        jitter: i64,
        /// Delay correlation percentage
        #[arg(long, short = 'c', default_value_t = 20.0)]
        correlation: f64,
        /// Delay distribution (uniform, normal, pareto, paretonormal)
        #[arg(long, default_value = "")]
        distribution: String,
        #[command(flatten)]
        targets: TargetArgs,
    },

    /// Drop packets at random
    Loss {
        /// Packet loss percentage
        #[arg(long, short = 'p', default_value_t = 0.0)]
        percent: f64,
        /// Loss correlation percentage
        #[arg(long, short = 'c', default_value_t = 0.0)]
        correlation: f64,
        #[command(flatten)]
        targets: TargetArgs,
    },

    /// Drop packets using the Gilbert-Elliott model
    LossGemodel {
        /// Transition probability into the bad state
        #[arg(long, default_value_t = 0.0)]
        pg: f64,
        /// Transition probability into the good state
        #[arg(long, default_value_t = 100.0)]
        pb: f64,
        /// Loss probability in the bad state (1-h)
        #[arg(long = "one-h", default_value_t = 100.0)]
        one_h: f64,
        /// Loss probability in the good state (1-k)
        #[arg(long = "one-k", default_value_t = 0.0)]
        one_k: f64,
        #[command(flatten)]
        targets: TargetArgs,
    },

    /// Drop packets using a 4-state Markov model
    LossState {
        /// Probability to go from state 1 to state 3
        #[arg(long, default_value_t = 0.0)]
        p13: f64,
        /// Probability to go from state 3 to state 1
        #[arg(long, default_value_t = 100.0)]
        p31: f64,
        /// Probability to go from state 3 to state 2
        #[arg(long, default_value_t = 0.0)]
        p32: f64,
        /// Probability to go from state 2 to state 3
        #[arg(long, default_value_t = 100.0)]
        p23: f64,
        /// Probability to go from state 1 to state 4
        #[arg(long, default_value_t = 0.0)]
        p14: f64,
        #[command(flatten)]
        targets: TargetArgs,
    },

    /// Duplicate packets
    Duplicate {
        /// Packet duplication percentage
        #[arg(long, short = 'p', default_value_t = 0.0)]
        percent: f64,
        /// Duplication correlation percentage
        #[arg(long, short = 'c', default_value_t = 0.0)]
        correlation: f64,
        #[command(flatten)]
        targets: TargetArgs,
    },

    /// Corrupt packets
    Corrupt {
        /// Packet corruption percentage
        #[arg(long, short = 'p', default_value_t = 0.0)]
        percent: f64,
        /// Corruption correlation percentage
        #[arg(long, short = 'c', default_value_t = 0.0)]
        correlation: f64,
        #[command(flatten)]
        targets: TargetArgs,
    },

    /// Limit egress bandwidth
    Rate {
        /// Rate such as 100kbit, 10mbit or 1gbit
        #[arg(long, short = 'r', default_value = "100kbit")]
        rate: String,
        /// Per-packet overhead in bytes
        #[arg(long = "packetoverhead", short = 'p', default_value_t = 0, allow_negative_numbers = true)]
        packet_overhead: i64,
        /// Cell size for the link layer
        #[arg(long = "cellsize", short = 's', default_value_t = 0, allow_negative_numbers = true)]
        cell_size: i64,
        /// Per-cell overhead in bytes
        #[arg(long = "celloverhead", short = 'o', default_value_t = 0, allow_negative_numbers = true)]
        cell_overhead: i64,
        #[command(flatten)]
        targets: TargetArgs,
    },
}

impl EffectCommand {
    /// Positional targets of the chosen effect.
    pub fn targets(&self) -> &[String] {
        match self {
            Self::Delay { targets, .. }
            | Self::Loss { targets, .. }
            | Self::LossGemodel { targets, .. }
            | Self::LossState { targets, .. }
            | Self::Duplicate { targets, .. }
            | Self::Corrupt { targets, .. }
            | Self::Rate { targets, .. } => &targets.targets,
        }
    }
}

impl NetemArgs {
    /// Resolve shared parameters, applying config defaults.
    pub fn params(&self, config: &Config) -> Result<NetemParams, ValidationError> {
        let targets = self
            .target_networks
            .iter()
            .map(|t| t.parse::<Cidr>())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(NetemParams {
            iface: self
                .interface
                .clone()
                .unwrap_or_else(|| config.netem.interface.clone()),
            targets,
            egress_ports: parse_ports(&self.egress_port)?,
            ingress_ports: parse_ports(&self.ingress_port)?,
            duration: self.duration,
            tc_image: Some(
                self.tc_image
                    .clone()
                    .unwrap_or_else(|| config.netem.tc_image.clone()),
            ),
            pull_image: self.pull_image,
        })
    }

    /// Build the selected netem action.
    pub fn build(
        &self,
        scope: Scope,
        config: &Config,
    ) -> Result<Box<dyn ChaosCommand>, ValidationError> {
        let params = self.params(config)?;
        match &self.effect {
            EffectCommand::Delay {
                time,
                jitter,
                correlation,
                distribution,
                ..
            } => netem::delay(scope, params, *time, *jitter, *correlation, distribution),
            EffectCommand::Loss {
                percent,
                correlation,
                ..
            } => netem::loss(scope, params, *percent, *correlation),
            EffectCommand::LossGemodel {
                pg,
                pb,
                one_h,
                one_k,
                ..
            } => netem::loss_gemodel(scope, params, *pg, *pb, *one_h, *one_k),
            EffectCommand::LossState {
                p13,
                p31,
                p32,
                p23,
                p14,
                ..
            } => netem::loss_state(scope, params, *p13, *p31, *p32, *p23, *p14),
            EffectCommand::Duplicate {
                percent,
                correlation,
                ..
            } => netem::duplicate(scope, params, *percent, *correlation),
            EffectCommand::Corrupt {
                percent,
                correlation,
                ..
            } => netem::corrupt(scope, params, *percent, *correlation),
            EffectCommand::Rate {
                rate,
                packet_overhead,
                cell_size,
                cell_overhead,
                ..
            } => netem::rate(
                scope,
                params,
                rate,
                *packet_overhead,
                *cell_size,
                *cell_overhead,
            ),
        }
    }
}
