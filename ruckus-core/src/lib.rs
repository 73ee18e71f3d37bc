//! # ruckus-core
//!
//! Chaos actions for running containers.
//!
//! This crate holds everything that decides *what* to break and *how*:
//! target selection, the chaos action family (lifecycle, netem, stress),
//! the repeatable orchestration loop, `tc` command construction with its
//! timed apply/revert lifecycle, and cgroup resolution for stress injection.
//!
//! ## Design
//!
//! The container runtime is reached only through the [`ContainerEngine`]
//! trait. `ruckus-docker` provides the Docker implementation; tests use
//! [`engine::MockEngine`], which records every call.
//!
//! Runtime options (random, dry-run, labels, interval) travel as an explicit
//! [`GlobalParams`] value. Nothing in this crate reads process-wide flags.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod action;
pub mod cgroup;
pub mod container;
pub mod engine;
pub mod error;
pub mod netem;
pub mod orchestrator;
pub mod params;
pub mod selector;

pub use action::{ChaosCommand, Scope};
pub use container::{Container, ContainerState, SELF_LABEL, SKIP_LABEL, STOP_SIGNAL_LABEL};
pub use engine::{ContainerEngine, ExecOutput, RemoveOptions, SidecarSpec};
pub use error::{CgroupError, ChaosError, EngineError, ValidationError};
pub use orchestrator::run_chaos;
pub use params::GlobalParams;
pub use selector::SelectionCriteria;
