//! Argument validation for the cg-inject helper.
//!
//! None of these cases reach a cgroup write.

use assert_cmd::Command;
use predicates::prelude::*;

fn cg_inject() -> Command {
    let mut cmd = Command::cargo_bin("cg-inject").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn rejects_non_hex_container_id() {
    cg_inject()
        .args(["--target-id", "not-a-container", "--", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid container id"));
}

#[test]
fn rejects_short_container_id() {
    cg_inject()
        .args(["--target-id", "abc123", "--", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid container id"));
}

#[test]
fn rejects_path_traversal() {
    cg_inject()
        .args(["--cgroup-path", "/docker/../../etc", "--", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must not contain '..'"));
}

#[test]
fn requires_separator_before_command() {
    cg_inject()
        .args(["--target-id", "0123456789abcdef", "true"])
        .assert()
        .failure();
}

#[test]
fn requires_a_command() {
    cg_inject()
        .args(["--target-id", "0123456789abcdef", "--"])
        .assert()
        .failure();
}

#[test]
fn rejects_both_targets() {
    cg_inject()
        .args([
            "--target-id",
            "0123456789abcdef",
            "--cgroup-path",
            "/docker/x",
            "--",
            "true",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn requires_a_target() {
    cg_inject()
        .args(["--", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--target-id"));
}

#[test]
fn rejects_unknown_driver() {
    cg_inject()
        .args([
            "--target-id",
            "0123456789abcdef",
            "--cgroup-driver",
            "lxc",
            "--",
            "true",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value 'lxc'"));
}

#[test]
fn missing_cgroup_file_fails_without_exec() {
    // The resolved cgroup.procs path does not exist for this id on any host.
    cg_inject()
        .args([
            "--cgroup-path",
            "/ruckus-test-nonexistent/0123456789abcdef",
            "--",
            "true",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cg-inject:"));
}

#[test]
fn empty_cgroup_path_is_not_a_target() {
    for path in ["", ".", "//"] {
        cg_inject()
            .args(["--cgroup-path", path, "--", "true"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("one of --target-id or --cgroup-path is required"));
    }
}
