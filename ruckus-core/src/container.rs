//! Container snapshot as reported by the engine.

use std::collections::HashMap;
use std::fmt;

/// Label marking ruckus' own containers (never targeted).
pub const SELF_LABEL: &str = "io.ruckus";

/// Label exempting a container from every chaos action.
pub const SKIP_LABEL: &str = "io.ruckus.skip";

/// Label overriding the signal used to stop a container.
pub const STOP_SIGNAL_LABEL: &str = "io.ruckus.stop-signal";

/// Container lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerState {
    /// Created but never started.
    Created,
    /// Running.
    Running,
    /// Frozen by a pause.
    Paused,
    /// Restarting.
    Restarting,
    /// Being removed.
    Removing,
    /// Exited.
    Exited,
    /// Dead.
    Dead,
    /// State not reported or not recognised.
    Unknown,
}

impl ContainerState {
    /// Parse the engine's state string (case-insensitive).
    pub fn parse(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Removing => "removing",
            Self::Exited => "exited",
            Self::Dead => "dead",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Identity and runtime snapshot of one container.
///
/// Produced fresh by the engine on every selection pass and never cached
/// across interval ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    /// Full container id.
    pub id: String,
    /// Container name, usually with a leading `/`.
    pub name: String,
    /// Image reference the container was created from.
    pub image: String,
    /// Resolved image id.
    pub image_id: String,
    /// Lifecycle state.
    pub state: ContainerState,
    /// Container labels.
    pub labels: HashMap<String, String>,
    /// Network name to link list (`name:alias` entries).
    pub networks: HashMap<String, Vec<String>>,
    /// Cgroup parent from the host config, if one was set.
    pub cgroup_parent: Option<String>,
}

impl Container {
    /// Create a running container with the given id and name and no labels.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image: String::new(),
            image_id: String::new(),
            state: ContainerState::Running,
            labels: HashMap::new(),
            networks: HashMap::new(),
            cgroup_parent: None,
        }
    }

    /// Builder-style label setter.
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    /// Name without the engine's leading `/`.
    pub fn trimmed_name(&self) -> &str {
        self.name.strip_prefix('/').unwrap_or(&self.name)
    }

    /// First 12 characters of the id.
    pub fn short_id(&self) -> &str {
        self.id.get(..12).unwrap_or(&self.id)
    }

    /// Whether this is one of ruckus' own containers.
    pub fn is_self(&self) -> bool {
        self.label_is_true(SELF_LABEL)
    }

    /// Whether the container opted out of chaos.
    pub fn is_skipped(&self) -> bool {
        self.label_is_true(SKIP_LABEL)
    }

    /// Custom stop signal requested through [`STOP_SIGNAL_LABEL`].
    pub fn stop_signal(&self) -> Option<&str> {
        self.labels
            .get(STOP_SIGNAL_LABEL)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Image reference with an explicit tag (`:latest` when none is given).
    pub fn image_name(&self) -> String {
        if self.image.contains(':') {
            self.image.clone()
        } else {
            format!("{}:latest", self.image)
        }
    }

    /// Names of linked containers across all networks.
    pub fn links(&self) -> Vec<String> {
        self.networks
            .values()
            .flatten()
            .filter_map(|link| link.split(':').next())
            .map(str::to_string)
            .collect()
    }

    fn label_is_true(&self, key: &str) -> bool {
        self.labels.get(key).is_some_and(|v| v == "true")
    }
}
