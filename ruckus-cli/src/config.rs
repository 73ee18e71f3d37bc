//! Configuration file for ruckus.
//!
//! The file is optional TOML (`--config PATH`). Every key has a default, and
//! explicit command-line flags override whatever the file says.

use ruckus_core::action::lifecycle::DEFAULT_STOP_TIMEOUT;
use ruckus_core::action::netem::DEFAULT_INTERFACE;
use ruckus_core::action::stress::DEFAULT_STRESS_IMAGE;
use ruckus_docker::{DEFAULT_CERT_DIR, DEFAULT_DOCKER_HOST, DEFAULT_TIMEOUT_SECS};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Docker daemon connection.
    #[serde(default)]
    pub docker: DockerConfig,
    /// Netem defaults.
    #[serde(default)]
    pub netem: NetemConfig,
    /// Stress defaults.
    #[serde(default)]
    pub stress: StressConfig,
    /// Stop/restart defaults.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

/// Docker daemon connection.
#[derive(Debug, Clone, Deserialize)]
pub struct DockerConfig {
    /// Daemon address (default: unix:///var/run/docker.sock).
    #[serde(default = "default_host")]
    pub host: String,
    /// API request timeout in seconds (default: 120).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Connect over TLS and verify the daemon certificate.
    #[serde(default)]
    pub tls_verify: bool,
    /// Directory with `ca.pem`, `cert.pem` and `key.pem` (default: /etc/ssl/docker).
    #[serde(default = "default_cert_path")]
    pub cert_path: PathBuf,
}

/// Netem defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct NetemConfig {
    /// Helper image with `tc` for targets that lack it.
    #[serde(default = "default_tc_image")]
    pub tc_image: String,
    /// Network interface (default: eth0).
    #[serde(default = "default_interface")]
    pub interface: String,
}

/// Stress defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct StressConfig {
    /// stress-ng image.
    #[serde(default = "default_stress_image")]
    pub image: String,
}

/// Stop/restart defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    /// Seconds to wait before killing a stopping container (default: 10).
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

// Default value functions
fn default_host() -> String {
    DEFAULT_DOCKER_HOST.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_cert_path() -> PathBuf {
    PathBuf::from(DEFAULT_CERT_DIR)
}

fn default_tc_image() -> String {
    "ghcr.io/alexei-led/pumba-alpine-nettools:latest".to_string()
}

fn default_interface() -> String {
    DEFAULT_INTERFACE.to_string()
}

fn default_stress_image() -> String {
    DEFAULT_STRESS_IMAGE.to_string()
}

fn default_stop_timeout_secs() -> u64 {
    DEFAULT_STOP_TIMEOUT.as_secs()
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            timeout_secs: default_timeout_secs(),
            tls_verify: false,
            cert_path: default_cert_path(),
        }
    }
}

impl Default for NetemConfig {
    fn default() -> Self {
        Self {
            tc_image: default_tc_image(),
            interface: default_interface(),
        }
    }
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            image: default_stress_image(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            stop_timeout_secs: default_stop_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load from `path` if given, otherwise use defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
