//! Top-level and per-subcommand `--help` output, and global flag parsing
//! that doesn't require a Docker daemon.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn top_level_help_lists_every_subcommand() {
    let mut cmd = Command::cargo_bin("pack").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("rebase"))
        .stdout(predicate::str::contains("create-builder"))
        .stdout(predicate::str::contains("package-buildpack"))
        .stdout(predicate::str::contains("inspect-builder"))
        .stdout(predicate::str::contains("inspect-image"))
        .stdout(predicate::str::contains("report"));
}

#[test]
fn version_flag_prints_version() {
    let mut cmd = Command::cargo_bin("pack").unwrap();
    cmd.arg("--version");

    cmd.assert().success();
}

#[test]
fn build_help_documents_core_flags() {
    let mut cmd = Command::cargo_bin("pack").unwrap();
    cmd.arg("build").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--builder"))
        .stdout(predicate::str::contains("--env"))
        .stdout(predicate::str::contains("--publish"))
        .stdout(predicate::str::contains("--clear-cache"));
}

#[test]
fn missing_subcommand_is_a_usage_error() {
    let mut cmd = Command::cargo_bin("pack").unwrap();

    cmd.assert().failure();
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    let mut cmd = Command::cargo_bin("pack").unwrap();
    cmd.arg("not-a-real-command");

    cmd.assert().failure();
}
