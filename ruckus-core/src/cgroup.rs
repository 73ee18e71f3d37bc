//! Cgroup version/driver detection and `cgroup.procs` path resolution.
//!
//! Used in two places:
//! - the `cg-inject` helper, which migrates itself into a target
//!   container's cgroup and then execs a command (usually `stress-ng`);
//! - the stress action, which decides where the stress sidecar lives.
//!
//! Every probe takes the cgroup filesystem root as a parameter so tests can
//! point it at a temporary directory.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use crate::error::{CgroupError, ValidationError};

/// Default cgroup filesystem mount point.
pub const CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// cgroup v1 controller hierarchies a migrated process joins, in write order.
pub const V1_CONTROLLERS: [&str; 5] = ["cpu", "memory", "blkio", "cpuacct", "pids"];

const MIN_CONTAINER_ID_LEN: usize = 12;
const MAX_CONTAINER_ID_LEN: usize = 64;

/// Cgroup hierarchy version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupVersion {
    /// Per-controller hierarchies.
    V1,
    /// Unified hierarchy.
    V2,
}

/// Container runtime cgroup driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CgroupDriver {
    /// `/docker/<id>` layout (Docker's default).
    #[default]
    Cgroupfs,
    /// `system.slice/docker-<id>.scope` layout.
    Systemd,
}

impl CgroupDriver {
    /// Driver name as used on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cgroupfs => "cgroupfs",
            Self::Systemd => "systemd",
        }
    }
}

impl fmt::Display for CgroupDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CgroupDriver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cgroupfs" => Ok(Self::Cgroupfs),
            "systemd" => Ok(Self::Systemd),
            other => Err(format!(
                "unknown cgroup driver {other:?} (expected cgroupfs or systemd)"
            )),
        }
    }
}

/// Resolved cgroup placement, derived fresh at injection time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupDescriptor {
    /// Hierarchy version.
    pub version: CgroupVersion,
    /// Driver (auto-detected unless given).
    pub driver: CgroupDriver,
    /// Base path relative to the cgroup root (or controller root on v1).
    pub base: PathBuf,
}

/// Where a process should be migrated to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectTarget {
    /// A Docker container id, resolved through the driver's naming scheme.
    Container {
        /// 12-64 lowercase hex characters.
        id: String,
        /// Driver override; `None` auto-detects.
        driver: Option<CgroupDriver>,
    },
    /// An explicit base path such as `/kubepods/burstable/pod-uid/<id>`.
    BasePath(String),
}

impl InjectTarget {
    /// Build and validate a target from the helper's mutually exclusive inputs.
    ///
    /// A cgroup path that names no directory (`""`, `"."`, `"//"`) counts as
    /// absent; it would otherwise resolve to the root cgroup.
    pub fn from_inputs(
        target_id: Option<&str>,
        cgroup_path: Option<&str>,
        driver: Option<CgroupDriver>,
    ) -> Result<Self, ValidationError> {
        let cgroup_path =
            cgroup_path.filter(|p| normalize_base(p).components().next().is_some());
        match (target_id, cgroup_path) {
            (Some(_), Some(_)) => Err(ValidationError::ConflictingTargets),
            (None, Some(path)) => {
                validate_base_path(path)?;
                Ok(Self::BasePath(path.to_string()))
            }
            (Some(id), None) => {
                validate_container_id(id)?;
                Ok(Self::Container {
                    id: id.to_string(),
                    driver,
                })
            }
            (None, None) => Err(ValidationError::MissingTarget),
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Check that `id` is 12-64 lowercase hex characters.
pub fn validate_container_id(id: &str) -> Result<(), ValidationError> {
    let valid_len = (MIN_CONTAINER_ID_LEN..=MAX_CONTAINER_ID_LEN).contains(&id.len());
    let valid_chars = id
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if valid_len && valid_chars {
        Ok(())
    } else {
        Err(ValidationError::InvalidContainerId(id.to_string()))
    }
}

/// Reject base paths with `..` components.
pub fn validate_base_path(path: &str) -> Result<(), ValidationError> {
    if Path::new(path)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(ValidationError::PathTraversal(path.to_string()));
    }
    Ok(())
}

// ============================================================================
// Detection
// ============================================================================

/// v2 when `cgroup.controllers` exists at the root, v1 otherwise.
pub fn detect_version(root: &Path) -> CgroupVersion {
    if root.join("cgroup.controllers").exists() {
        CgroupVersion::V2
    } else {
        CgroupVersion::V1
    }
}

/// Infer the driver from the directories the runtime created.
///
/// A `docker` directory wins over `system.slice`; v1 looks under the `cpu`
/// controller. Falls back to cgroupfs.
pub fn detect_driver(root: &Path, version: CgroupVersion) -> CgroupDriver {
    let base = match version {
        CgroupVersion::V2 => root.to_path_buf(),
        CgroupVersion::V1 => root.join("cpu"),
    };

    if base.join("docker").exists() {
        CgroupDriver::Cgroupfs
    } else if base.join("system.slice").exists() {
        CgroupDriver::Systemd
    } else {
        CgroupDriver::Cgroupfs
    }
}

// ============================================================================
// Path resolution
// ============================================================================

fn container_base(id: &str, driver: CgroupDriver) -> PathBuf {
    match driver {
        CgroupDriver::Cgroupfs => Path::new("docker").join(id),
        CgroupDriver::Systemd => Path::new("system.slice").join(format!("docker-{id}.scope")),
    }
}

/// Relative form of `base`, with empty and `.` segments dropped.
fn normalize_base(base: &str) -> PathBuf {
    base.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect()
}

fn procs_paths_for(root: &Path, base: &Path, version: CgroupVersion) -> Vec<PathBuf> {
    match version {
        CgroupVersion::V2 => vec![root.join(base).join("cgroup.procs")],
        CgroupVersion::V1 => V1_CONTROLLERS
            .iter()
            .map(|ctrl| root.join(ctrl).join(base).join("cgroup.procs"))
            .collect(),
    }
}

/// `cgroup.procs` files for a container id: one on v2, one per controller on v1.
pub fn procs_paths(
    root: &Path,
    id: &str,
    version: CgroupVersion,
    driver: CgroupDriver,
) -> Vec<PathBuf> {
    procs_paths_for(root, &container_base(id, driver), version)
}

/// `cgroup.procs` files for an explicit base path.
pub fn procs_paths_from_base(root: &Path, base: &str, version: CgroupVersion) -> Vec<PathBuf> {
    procs_paths_for(root, &normalize_base(base), version)
}

/// Probe `root` and resolve the descriptor and `cgroup.procs` files for `target`.
pub fn resolve(root: &Path, target: &InjectTarget) -> (CgroupDescriptor, Vec<PathBuf>) {
    let version = detect_version(root);
    match target {
        InjectTarget::Container { id, driver } => {
            let driver = driver.unwrap_or_else(|| detect_driver(root, version));
            let descriptor = CgroupDescriptor {
                version,
                driver,
                base: container_base(id, driver),
            };
            (descriptor, procs_paths(root, id, version, driver))
        }
        InjectTarget::BasePath(base) => {
            let descriptor = CgroupDescriptor {
                version,
                driver: detect_driver(root, version),
                base: normalize_base(base),
            };
            (descriptor, procs_paths_from_base(root, base, version))
        }
    }
}

// ============================================================================
// Migration
// ============================================================================

/// Write `pid` followed by a newline into an existing `cgroup.procs` file.
///
/// The file is never created: a missing cgroup is an error.
pub fn write_pid(path: &Path, pid: u32) -> Result<(), CgroupError> {
    let to_err = |source| CgroupError::Write {
        path: path.to_path_buf(),
        pid,
        source,
    };

    let mut file = OpenOptions::new().write(true).open(path).map_err(to_err)?;
    file.write_all(format!("{pid}\n").as_bytes()).map_err(to_err)?;
    file.flush().map_err(to_err)
}

/// Move the current process into every path, stopping at the first failure.
pub fn migrate_self(paths: &[PathBuf]) -> Result<(), CgroupError> {
    let pid = std::process::id();
    for path in paths {
        write_pid(path, pid)?;
        tracing::debug!(path = %path.display(), pid, "joined cgroup");
    }
    Ok(())
}

/// Migrate into `target`'s cgroup, then replace this process with `argv`.
///
/// Only returns on failure.
#[cfg(unix)]
pub fn inject_and_exec(root: &Path, target: &InjectTarget, argv: &[String]) -> CgroupError {
    use std::os::unix::process::CommandExt;

    let Some((program, args)) = argv.split_first() else {
        return ValidationError::EmptyCommand.into();
    };

    let (descriptor, paths) = resolve(root, target);
    tracing::info!(
        version = ?descriptor.version,
        driver = %descriptor.driver,
        base = %descriptor.base.display(),
        "migrating into cgroup"
    );

    if let Err(e) = migrate_self(&paths) {
        return e;
    }

    let source = std::process::Command::new(program).args(args).exec();
    CgroupError::Exec {
        command: program.clone(),
        source,
    }
}

// ============================================================================
// Stress sidecar placement
// ============================================================================

/// Whether a cgroup parent uses the cgroupfs layout (absolute path).
fn is_cgroupfs_parent(parent: &str) -> bool {
    parent.starts_with('/')
}

/// Cgroup parent for a stress sidecar that should share `id`'s accounting.
///
/// A cgroupfs-style parent gets the container id appended; a systemd slice is
/// used as-is. Without a parent the driver's default layout applies.
pub fn sidecar_cgroup_parent(id: &str, parent: Option<&str>, driver: CgroupDriver) -> String {
    match parent.filter(|p| !p.is_empty()) {
        Some(p) if is_cgroupfs_parent(p) => format!("{}/{}", p.trim_end_matches('/'), id),
        Some(p) => p.to_string(),
        None => match driver {
            CgroupDriver::Cgroupfs => format!("/docker/{id}"),
            CgroupDriver::Systemd => "system.slice".to_string(),
        },
    }
}

/// `cg-inject` arguments (before `--`) that reach `id`'s cgroup.
pub fn inject_args(id: &str, parent: Option<&str>, driver: CgroupDriver) -> Vec<String> {
    match parent.filter(|p| is_cgroupfs_parent(p)) {
        Some(p) => vec![
            "--cgroup-path".into(),
            format!("{}/{}", p.trim_end_matches('/'), id),
        ],
        None => vec![
            "--target-id".into(),
            id.to_string(),
            "--cgroup-driver".into(),
            driver.to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn root_with(dirs: &[&str], files: &[&str]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for d in dirs {
            fs::create_dir_all(tmp.path().join(d)).unwrap();
        }
        for f in files {
            let p = tmp.path().join(f);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, "").unwrap();
        }
        tmp
    }

    #[test]
    fn version_from_controllers_file() {
        let v2 = root_with(&[], &["cgroup.controllers"]);
        assert_eq!(detect_version(v2.path()), CgroupVersion::V2);

        let v1 = root_with(&["cpu"], &[]);
        assert_eq!(detect_version(v1.path()), CgroupVersion::V1);
    }

    #[test]
    fn driver_prefers_docker_dir_on_v2() {
        let tmp = root_with(&["docker", "system.slice"], &["cgroup.controllers"]);
        assert_eq!(
            detect_driver(tmp.path(), CgroupVersion::V2),
            CgroupDriver::Cgroupfs
        );
    }

    #[test]
    fn driver_systemd_on_v2() {
        let tmp = root_with(&["system.slice"], &["cgroup.controllers"]);
        assert_eq!(
            detect_driver(tmp.path(), CgroupVersion::V2),
            CgroupDriver::Systemd
        );
    }

    #[test]
    fn driver_defaults_to_cgroupfs() {
        let tmp = root_with(&[], &[]);
        assert_eq!(
            detect_driver(tmp.path(), CgroupVersion::V2),
            CgroupDriver::Cgroupfs
        );
        assert_eq!(
            detect_driver(tmp.path(), CgroupVersion::V1),
            CgroupDriver::Cgroupfs
        );
    }

    #[test]
    fn driver_v1_checks_cpu_controller() {
        let tmp = root_with(&["cpu/system.slice", "memory/docker"], &[]);
        assert_eq!(
            detect_driver(tmp.path(), CgroupVersion::V1),
            CgroupDriver::Systemd
        );

        let tmp = root_with(&["cpu/docker", "cpu/system.slice"], &[]);
        assert_eq!(
            detect_driver(tmp.path(), CgroupVersion::V1),
            CgroupDriver::Cgroupfs
        );
    }

    #[test]
    fn procs_paths_v2_cgroupfs() {
        let root = Path::new("/sys/fs/cgroup");
        let paths = procs_paths(root, "abc123", CgroupVersion::V2, CgroupDriver::Cgroupfs);
        assert_eq!(
            paths,
            vec![PathBuf::from("/sys/fs/cgroup/docker/abc123/cgroup.procs")]
        );
    }

    #[test]
    fn procs_paths_v2_systemd() {
        let root = Path::new("/sys/fs/cgroup");
        let paths = procs_paths(root, "def456", CgroupVersion::V2, CgroupDriver::Systemd);
        assert_eq!(
            paths,
            vec![PathBuf::from(
                "/sys/fs/cgroup/system.slice/docker-def456.scope/cgroup.procs"
            )]
        );
    }

    #[test]
    fn procs_paths_v1_one_per_controller() {
        let root = Path::new("/sys/fs/cgroup");
        let paths = procs_paths(root, "abc123", CgroupVersion::V1, CgroupDriver::Cgroupfs);
        let expected: Vec<PathBuf> = ["cpu", "memory", "blkio", "cpuacct", "pids"]
            .iter()
            .map(|c| PathBuf::from(format!("/sys/fs/cgroup/{c}/docker/abc123/cgroup.procs")))
            .collect();
        assert_eq!(paths, expected);
    }

    #[test]
    fn procs_paths_v1_systemd() {
        let root = Path::new("/cg");
        let paths = procs_paths(root, "abc123", CgroupVersion::V1, CgroupDriver::Systemd);
        assert_eq!(paths.len(), 5);
        assert_eq!(
            paths[1],
            PathBuf::from("/cg/memory/system.slice/docker-abc123.scope/cgroup.procs")
        );
    }

    #[test]
    fn procs_paths_from_base_normalizes_slashes() {
        let root = Path::new("/sys/fs/cgroup");
        let paths =
            procs_paths_from_base(root, "/kubepods//burstable/pod-1/abc/", CgroupVersion::V2);
        assert_eq!(
            paths,
            vec![PathBuf::from(
                "/sys/fs/cgroup/kubepods/burstable/pod-1/abc/cgroup.procs"
            )]
        );

        let paths = procs_paths_from_base(root, "/kubepods/abc", CgroupVersion::V1);
        assert_eq!(
            paths[0],
            PathBuf::from("/sys/fs/cgroup/cpu/kubepods/abc/cgroup.procs")
        );
        assert_eq!(
            paths[4],
            PathBuf::from("/sys/fs/cgroup/pids/kubepods/abc/cgroup.procs")
        );
    }

    #[test]
    fn container_id_validation() {
        assert!(validate_container_id("abcdef012345").is_ok());
        assert!(validate_container_id(&"a".repeat(64)).is_ok());
        assert!(validate_container_id("abcdef01234").is_err());
        assert!(validate_container_id(&"a".repeat(65)).is_err());
        assert!(validate_container_id("ABCDEF012345").is_err());
        assert!(validate_container_id("abcdef01234g").is_err());
        assert!(validate_container_id("").is_err());
    }

    #[test]
    fn base_path_rejects_parent_components() {
        assert!(validate_base_path("/kubepods/burstable/pod/abc").is_ok());
        assert_eq!(
            validate_base_path("/kubepods/../etc"),
            Err(ValidationError::PathTraversal("/kubepods/../etc".into()))
        );
        assert!(validate_base_path("..").is_err());
    }

    #[test]
    fn inject_target_inputs() {
        assert_eq!(
            InjectTarget::from_inputs(Some("abcdef012345"), Some("/x"), None),
            Err(ValidationError::ConflictingTargets)
        );
        assert_eq!(
            InjectTarget::from_inputs(None, None, None),
            Err(ValidationError::MissingTarget)
        );
        assert!(InjectTarget::from_inputs(Some("xyz"), None, None).is_err());
        assert_eq!(
            InjectTarget::from_inputs(None, Some("/kubepods/abc"), None),
            Ok(InjectTarget::BasePath("/kubepods/abc".into()))
        );
    }

    #[test]
    fn empty_cgroup_path_never_targets_the_root() {
        for path in ["", ".", "//", "/./"] {
            assert_eq!(
                InjectTarget::from_inputs(None, Some(path), None),
                Err(ValidationError::MissingTarget),
                "path {path:?}"
            );
        }
        assert_eq!(
            InjectTarget::from_inputs(Some("abcdef012345"), Some(""), None),
            Ok(InjectTarget::Container {
                id: "abcdef012345".into(),
                driver: None,
            })
        );
    }

    #[test]
    fn resolve_detects_driver_for_container() {
        let tmp = root_with(&["system.slice"], &["cgroup.controllers"]);
        let target = InjectTarget::Container {
            id: "abcdef012345".into(),
            driver: None,
        };
        let (desc, paths) = resolve(tmp.path(), &target);
        assert_eq!(desc.version, CgroupVersion::V2);
        assert_eq!(desc.driver, CgroupDriver::Systemd);
        assert_eq!(
            paths,
            vec![tmp
                .path()
                .join("system.slice/docker-abcdef012345.scope/cgroup.procs")]
        );
    }

    #[test]
    fn write_pid_appends_newline() {
        let tmp = root_with(&[], &["docker/abc/cgroup.procs"]);
        let path = tmp.path().join("docker/abc/cgroup.procs");

        write_pid(&path, 4242).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "4242\n");
    }

    #[test]
    fn write_pid_does_not_create_missing_file() {
        let tmp = root_with(&[], &[]);
        let path = tmp.path().join("docker/abc/cgroup.procs");

        let err = write_pid(&path, 1).unwrap_err();
        assert!(matches!(err, CgroupError::Write { pid: 1, .. }));
        assert!(!path.exists());
    }

    #[test]
    fn migrate_self_stops_at_first_failure() {
        let tmp = root_with(&[], &["cpu/docker/abc/cgroup.procs"]);
        let paths = vec![
            tmp.path().join("cpu/docker/abc/cgroup.procs"),
            tmp.path().join("memory/docker/abc/cgroup.procs"),
        ];

        assert!(migrate_self(&paths).is_err());
        let written = fs::read_to_string(&paths[0]).unwrap();
        assert_eq!(written, format!("{}\n", std::process::id()));
    }

    #[test]
    fn sidecar_parent_placement() {
        let id = "abc123";
        assert_eq!(
            sidecar_cgroup_parent(id, None, CgroupDriver::Cgroupfs),
            "/docker/abc123"
        );
        assert_eq!(
            sidecar_cgroup_parent(id, None, CgroupDriver::Systemd),
            "system.slice"
        );
        assert_eq!(
            sidecar_cgroup_parent(id, Some("/kubepods/burstable/pod-abc123"), CgroupDriver::Cgroupfs),
            "/kubepods/burstable/pod-abc123/abc123"
        );
        assert_eq!(
            sidecar_cgroup_parent(id, Some("kubepods-burstable-podXYZ.slice"), CgroupDriver::Cgroupfs),
            "kubepods-burstable-podXYZ.slice"
        );
    }

    #[test]
    fn inject_args_by_parent_style() {
        assert_eq!(
            inject_args("abc123", None, CgroupDriver::Systemd),
            vec!["--target-id", "abc123", "--cgroup-driver", "systemd"]
        );
        assert_eq!(
            inject_args("abc123", Some("/kubepods/burstable/pod-abc123"), CgroupDriver::Cgroupfs),
            vec!["--cgroup-path", "/kubepods/burstable/pod-abc123/abc123"]
        );
        assert_eq!(
            inject_args("abc123", Some("kubepods.slice"), CgroupDriver::Cgroupfs),
            vec!["--target-id", "abc123", "--cgroup-driver", "cgroupfs"]
        );
    }
}
