//! `pack build` flag validation that fails before any Docker interaction,
//! so these run without a daemon.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn missing_builder_and_no_default_is_a_usage_error() {
    let app_dir = tempfile::tempdir().unwrap();
    let pack_home = tempfile::tempdir().unwrap();

    let mut cmd = Command::cargo_bin("pack").unwrap();
    cmd.env("PACK_HOME", pack_home.path())
        .arg("build")
        .arg("acme/app")
        .arg("--path")
        .arg(app_dir.path());

    cmd.assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("no builder specified"));
}

#[test]
fn malformed_env_pair_is_a_usage_error() {
    let app_dir = tempfile::tempdir().unwrap();
    let pack_home = tempfile::tempdir().unwrap();

    let mut cmd = Command::cargo_bin("pack").unwrap();
    cmd.env("PACK_HOME", pack_home.path())
        .arg("build")
        .arg("acme/app")
        .arg("--path")
        .arg(app_dir.path())
        .arg("--builder")
        .arg("acme/builder")
        .arg("--env")
        .arg("NOT_A_PAIR");

    cmd.assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("KEY=VALUE"));
}

#[test]
fn malformed_volume_spec_is_a_usage_error() {
    let app_dir = tempfile::tempdir().unwrap();
    let pack_home = tempfile::tempdir().unwrap();

    let mut cmd = Command::cargo_bin("pack").unwrap();
    cmd.env("PACK_HOME", pack_home.path())
        .arg("build")
        .arg("acme/app")
        .arg("--path")
        .arg(app_dir.path())
        .arg("--builder")
        .arg("acme/builder")
        .arg("--volume")
        .arg("/host-only");

    cmd.assert().failure().code(2);
}

#[test]
fn unreadable_env_file_surfaces_as_failure() {
    let app_dir = tempfile::tempdir().unwrap();
    let pack_home = tempfile::tempdir().unwrap();

    let mut cmd = Command::cargo_bin("pack").unwrap();
    cmd.env("PACK_HOME", pack_home.path())
        .arg("build")
        .arg("acme/app")
        .arg("--path")
        .arg(app_dir.path())
        .arg("--builder")
        .arg("acme/builder")
        .arg("--env-file")
        .arg(app_dir.path().join("does-not-exist.env"));

    cmd.assert().failure();
}
