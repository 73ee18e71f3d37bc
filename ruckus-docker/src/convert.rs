//! Conversion from Docker inspect responses to [`Container`] snapshots.

use bollard::models::{ContainerInspectResponse, SystemInfoCgroupDriverEnum};
use ruckus_core::cgroup::CgroupDriver;
use ruckus_core::{Container, ContainerState};
use std::collections::HashMap;

/// Build a [`Container`] from an inspect response.
///
/// Returns `None` when the response carries no id.
pub fn container_from_inspect(info: ContainerInspectResponse) -> Option<Container> {
    let id = info.id.filter(|id| !id.is_empty())?;
    let config = info.config.unwrap_or_default();

    let state = info
        .state
        .and_then(|s| s.status)
        .map(|status| ContainerState::parse(&status.to_string()))
        .unwrap_or(ContainerState::Unknown);

    let networks: HashMap<String, Vec<String>> = info
        .network_settings
        .and_then(|n| n.networks)
        .unwrap_or_default()
        .into_iter()
        .map(|(name, endpoint)| (name, endpoint.links.unwrap_or_default()))
        .collect();

    let cgroup_parent = info
        .host_config
        .and_then(|h| h.cgroup_parent)
        .filter(|p| !p.is_empty());

    Some(Container {
        name: info.name.unwrap_or_else(|| format!("/{id}")),
        id,
        image: config.image.unwrap_or_default(),
        image_id: info.image.unwrap_or_default(),
        state,
        labels: config.labels.unwrap_or_default(),
        networks,
        cgroup_parent,
    })
}

/// Map the daemon's reported cgroup driver; anything but systemd is cgroupfs.
pub fn cgroup_driver(driver: Option<SystemInfoCgroupDriverEnum>) -> CgroupDriver {
    match driver {
        Some(SystemInfoCgroupDriverEnum::SYSTEMD) => CgroupDriver::Systemd,
        _ => CgroupDriver::Cgroupfs,
    }
}
