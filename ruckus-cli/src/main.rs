//! # ruckus
//!
//! Chaos testing for Docker containers.
//!
//! ## Commands
//!
//! - `stop`, `kill`, `pause`, `rm`, `restart`: container lifecycle chaos
//! - `exec`: run a command inside containers (default `kill 1`)
//! - `netem`: network emulation (`delay`, `loss`, `loss-gemodel`,
//!   `loss-state`, `duplicate`, `corrupt`, `rate`)
//! - `stress`: CPU/memory/IO stress accounted to the target's cgroup
//!
//! ## Example
//!
//! ```bash
//! # Kill one random container matching a pattern every 30 seconds
//! ruckus --random --interval 30s kill re2:^api
//!
//! # Add 3s of delay to traffic leaving `db` towards 10.0.0.0/24 for a minute
//! ruckus netem --duration 1m --target 10.0.0.0/24 delay --time 3000 db
//!
//! # Stress the `worker` container's CPU for 20 seconds
//! ruckus stress --duration 20s --stressors "--cpu 2 --timeout 20s" worker
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ruckus_core::action::Scope;
use ruckus_core::params::{names_or_pattern, parse_duration, parse_labels};
use ruckus_core::{run_chaos, ContainerEngine, GlobalParams};
use ruckus_docker::{DockerEngine, TlsOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mod commands;
mod config;
mod logging;

use commands::lifecycle::{ExecArgs, KillArgs, PauseArgs, RemoveArgs, RestartArgs, StopArgs};
use commands::netem::NetemArgs;
use commands::stress::StressArgs;
use config::Config;

/// Chaos testing for Docker containers.
#[derive(Parser, Debug)]
#[command(name = "ruckus")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every subcommand.
#[derive(Args, Debug)]
struct GlobalArgs {
    /// Pick one random container from the matching set
    #[arg(long, global = true)]
    random: bool,

    /// Only target containers with this label (key or key=value; repeatable, comma separated)
    #[arg(long, global = true)]
    label: Vec<String>,

    /// Repeat the action on this interval (e.g. 30s, 5m)
    #[arg(long, global = true, value_parser = parse_duration)]
    interval: Option<Duration>,

    /// Log what would be done without touching any container
    #[arg(long, global = true)]
    dry_run: bool,

    /// Keep going when a repeated cycle fails
    #[arg(long = "skip-error", global = true)]
    skip_error: bool,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML configuration file
    #[arg(long, global = true, env = "RUCKUS_CONFIG")]
    config: Option<PathBuf>,

    /// Docker daemon address (default from config)
    #[arg(long, global = true, env = "DOCKER_HOST")]
    host: Option<String>,

    /// Use TLS; the daemon certificate is always verified
    #[arg(long, global = true)]
    tls: bool,

    /// Use TLS and verify the daemon
    #[arg(long, global = true, env = "DOCKER_TLS_VERIFY")]
    tlsverify: bool,

    /// Directory with ca.pem, cert.pem and key.pem (default from config)
    #[arg(long, global = true, env = "DOCKER_CERT_PATH")]
    tlscertpath: Option<PathBuf>,

    /// CA certificate the daemon's certificate must be signed by
    #[arg(long, global = true)]
    tlscacert: Option<PathBuf>,

    /// Client certificate for TLS authentication
    #[arg(long, global = true)]
    tlscert: Option<PathBuf>,

    /// Client key for TLS authentication
    #[arg(long, global = true)]
    tlskey: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stop containers
    Stop(StopArgs),

    /// Send a signal to containers
    Kill(KillArgs),

    /// Pause all processes in containers for a while
    Pause(PauseArgs),

    /// Remove containers
    Rm(RemoveArgs),

    /// Restart containers
    Restart(RestartArgs),

    /// Run a command inside containers
    Exec(ExecArgs),

    /// Emulate network problems with tc netem
    Netem(NetemArgs),

    /// Run stress-ng next to containers, accounted to their cgroup
    Stress(StressArgs),
}

impl Commands {
    fn targets(&self) -> &[String] {
        match self {
            Self::Stop(a) => &a.targets.targets,
            Self::Kill(a) => &a.targets.targets,
            Self::Pause(a) => &a.targets.targets,
            Self::Rm(a) => &a.targets.targets,
            Self::Restart(a) => &a.targets.targets,
            Self::Exec(a) => &a.targets.targets,
            Self::Netem(a) => a.effect.targets(),
            Self::Stress(a) => &a.targets.targets,
        }
    }

    fn limit(&self) -> usize {
        match self {
            Self::Stop(a) => a.limit.limit,
            Self::Kill(a) => a.limit.limit,
            Self::Pause(a) => a.limit.limit,
            Self::Rm(a) => a.limit.limit,
            Self::Restart(a) => a.limit.limit,
            Self::Exec(a) => a.limit.limit,
            Self::Netem(a) => a.limit.limit,
            Self::Stress(a) => a.limit.limit,
        }
    }
}

fn global_params(global: &GlobalArgs, targets: &[String]) -> Result<GlobalParams> {
    let (names, pattern) = names_or_pattern(targets);
    Ok(GlobalParams {
        random: global.random,
        labels: parse_labels(&global.label).context("invalid --label")?,
        names,
        pattern,
        interval: global.interval,
        dry_run: global.dry_run,
        skip_errors: global.skip_error,
    })
}

/// TLS files from explicit flags, falling back to the certificate directory.
fn tls_options(global: &GlobalArgs, config: &Config) -> TlsOptions {
    let dir = global
        .tlscertpath
        .clone()
        .unwrap_or_else(|| config.docker.cert_path.clone());
    let defaults = TlsOptions::in_dir(&dir);
    TlsOptions {
        ca_cert: global.tlscacert.clone().unwrap_or(defaults.ca_cert),
        cert: global.tlscert.clone().unwrap_or(defaults.cert),
        key: global.tlskey.clone().unwrap_or(defaults.key),
    }
}

fn connect(global: &GlobalArgs, config: &Config) -> Result<DockerEngine> {
    let host = global
        .host
        .clone()
        .unwrap_or_else(|| config.docker.host.clone());
    let timeout = config.docker.timeout_secs;

    if !(global.tls || global.tlsverify || config.docker.tls_verify) {
        return DockerEngine::connect(&host, timeout).context("failed to configure docker client");
    }
    if global.tls && !global.tlsverify {
        tracing::warn!("--tls without --tlsverify still verifies the daemon certificate");
    }
    DockerEngine::connect_tls(&host, timeout, &tls_options(global, config))
        .context("failed to configure docker tls client")
}

/// Cancel `token` on Ctrl-C or SIGTERM.
fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "cannot listen for SIGTERM");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        tracing::info!("received stop signal, reverting chaos");
        token.cancel();
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.global.log_level, cli.global.json);

    let config = Config::load(cli.global.config.as_deref()).context("failed to load configuration")?;
    let params = global_params(&cli.global, cli.command.targets())?;

    let engine: Arc<dyn ContainerEngine> = Arc::new(connect(&cli.global, &config)?);
    let scope = Scope::new(engine, &params, cli.command.limit());

    let command = match &cli.command {
        Commands::Stop(args) => args.build(scope, &config)?,
        Commands::Kill(args) => args.build(scope)?,
        Commands::Pause(args) => args.build(scope)?,
        Commands::Rm(args) => args.build(scope),
        Commands::Restart(args) => args.build(scope, &config),
        Commands::Exec(args) => args.build(scope)?,
        Commands::Netem(args) => args.build(scope, &config)?,
        Commands::Stress(args) => args.build(scope, &config)?,
    };

    let token = CancellationToken::new();
    cancel_on_signal(token.clone());

    tracing::debug!(action = command.name(), params = ?params, "running chaos command");
    run_chaos(&token, command.as_ref(), &params)
        .await
        .context("error running chaos command")?;

    Ok(())
}
