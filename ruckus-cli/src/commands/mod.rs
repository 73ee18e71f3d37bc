//! CLI command implementations.
//!
//! Each subcommand turns its arguments into a validated
//! [`ChaosCommand`](ruckus_core::ChaosCommand); `main` then hands it to the
//! orchestrator.

pub mod lifecycle;
pub mod netem;
pub mod stress;

use clap::Args;

/// Positional container names, or a single `re2:PATTERN`.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Container names, or one `re2:<regex>` pattern (empty = all containers)
    #[arg(value_name = "CONTAINERS")]
    pub targets: Vec<String>,
}

/// Cap on the number of targets.
#[derive(Args, Debug, Clone, Default)]
pub struct LimitArgs {
    /// Limit the number of target containers (0 = no limit)
    #[arg(long, default_value_t = 0)]
    pub limit: usize,
}
