//! # cg-inject
//!
//! Moves itself into a container's cgroup, then execs the given command.
//! The command's resource usage is accounted to the target container.
//!
//! ```bash
//! cg-inject --target-id <64-hex-id> -- /stress-ng --cpu 2 --timeout 30s
//! cg-inject --cgroup-path /kubepods/burstable/pod123/<id> -- /stress-ng --vm 1
//! ```
//!
//! Needs the host cgroup filesystem mounted read-write at `/sys/fs/cgroup`
//! and the host cgroup namespace.

use clap::{Parser, ValueEnum};
use ruckus_core::cgroup::{CgroupDriver, InjectTarget, CGROUP_ROOT};
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cg-inject")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Target container id (12-64 lowercase hex characters)
    #[arg(long, conflicts_with = "cgroup_path", required_unless_present = "cgroup_path")]
    target_id: Option<String>,

    /// Explicit cgroup path relative to the cgroup root
    #[arg(long)]
    cgroup_path: Option<String>,

    /// Cgroup driver used to derive the path from --target-id
    #[arg(long, value_enum, default_value_t = DriverArg::Auto)]
    cgroup_driver: DriverArg,

    /// Command to exec after migration
    #[arg(last = true, required = true, value_name = "COMMAND")]
    command: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum DriverArg {
    Auto,
    Cgroupfs,
    Systemd,
}

impl DriverArg {
    fn driver(self) -> Option<CgroupDriver> {
        match self {
            Self::Auto => None,
            Self::Cgroupfs => Some(CgroupDriver::Cgroupfs),
            Self::Systemd => Some(CgroupDriver::Systemd),
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let target = match InjectTarget::from_inputs(
        cli.target_id.as_deref(),
        cli.cgroup_path.as_deref(),
        cli.cgroup_driver.driver(),
    ) {
        Ok(target) => target,
        Err(e) => {
            eprintln!("cg-inject: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Returns only on failure.
    let err = ruckus_core::cgroup::inject_and_exec(Path::new(CGROUP_ROOT), &target, &cli.command);
    eprintln!("cg-inject: {err}");
    ExitCode::FAILURE
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_target_and_command() {
        let cli = Cli::parse_from([
            "cg-inject",
            "--target-id",
            "0123456789ab",
            "--cgroup-driver",
            "systemd",
            "--",
            "/stress-ng",
            "--cpu",
            "1",
        ]);
        assert_eq!(cli.target_id.as_deref(), Some("0123456789ab"));
        assert_eq!(cli.cgroup_driver.driver(), Some(CgroupDriver::Systemd));
        assert_eq!(cli.command, vec!["/stress-ng", "--cpu", "1"]);
    }

    #[test]
    fn driver_defaults_to_auto() {
        let cli = Cli::parse_from(["cg-inject", "--cgroup-path", "/docker/abc", "--", "true"]);
        assert_eq!(cli.cgroup_driver, DriverArg::Auto);
        assert_eq!(cli.cgroup_driver.driver(), None);
    }
}
