//! # ruckus-docker
//!
//! [`ContainerEngine`](ruckus_core::ContainerEngine) implementation backed by
//! the Docker Engine API through `bollard`.
//!
//! Containers are listed and then inspected one by one so that every
//! [`Container`](ruckus_core::Container) snapshot carries labels, network
//! links and the cgroup parent. Helper containers (tc and stress-ng) are
//! created with the skip label so they are never selected as targets.
//!
//! ```no_run
//! use ruckus_docker::{DockerEngine, DEFAULT_DOCKER_HOST, DEFAULT_TIMEOUT_SECS};
//!
//! let engine = DockerEngine::connect(DEFAULT_DOCKER_HOST, DEFAULT_TIMEOUT_SECS)?;
//! # Ok::<(), ruckus_core::EngineError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod convert;
mod engine;

pub use engine::{
    DockerEngine, TlsOptions, DEFAULT_CERT_DIR, DEFAULT_DOCKER_HOST, DEFAULT_TIMEOUT_SECS,
};
