// ABOUTME: Integration tests for the templify CLI commands.
// ABOUTME: Validates --help output, init, and dry-run publish and destroy.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

fn templify_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("templify"))
}

/// A directory holding a starter config and a small image file.
fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    templify_cmd()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();
    fs::write(dir.path().join("disk.qcow2"), b"image bytes").unwrap();
    dir
}

fn publish_dry_run(dir: &Path, manifest: &str) {
    templify_cmd()
        .current_dir(dir)
        .args(["publish", "disk.qcow2", "--dry-run", "--manifest", manifest])
        .assert()
        .success();
}

#[test]
fn help_shows_commands() {
    templify_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("publish"))
        .stdout(predicate::str::contains("destroy"));
}

#[test]
fn init_creates_config_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("templify.yml");

    templify_cmd()
        .current_dir(temp_dir.path())
        .arg("init")
        .assert()
        .success();

    assert!(config_path.exists(), "templify.yml should be created");
    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("zones:"), "Config should list zones");
}

#[test]
fn init_refuses_to_overwrite_existing_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(temp_dir.path().join("templify.yml"), "existing: config").unwrap();

    templify_cmd()
        .current_dir(temp_dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn publish_without_config_fails() {
    let temp_dir = tempfile::tempdir().unwrap();

    templify_cmd()
        .current_dir(temp_dir.path())
        .args(["publish", "disk.qcow2", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration file not found"));
}

#[test]
fn publish_requires_a_file() {
    templify_cmd().arg("publish").assert().failure();
}

#[test]
fn dry_run_publish_reports_every_zone() {
    let dir = project();

    templify_cmd()
        .current_dir(dir.path())
        .args(["publish", "disk.qcow2", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run"))
        .stdout(predicate::str::contains("ch-gva-2:"))
        .stdout(predicate::str::contains("de-fra-1:"));
}

#[test]
fn dry_run_publish_writes_manifest() {
    let dir = project();
    publish_dry_run(dir.path(), "published.json");

    let manifest = fs::read_to_string(dir.path().join("published.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&manifest).unwrap();
    assert_eq!(json["builder_id"], "templify.exoscale-template");
    assert_eq!(json["images"].as_array().unwrap().len(), 2);
    assert_eq!(json["images"][0]["zone"], "ch-gva-2");
}

#[test]
fn unsupported_builder_is_rejected() {
    let dir = project();

    templify_cmd()
        .current_dir(dir.path())
        .args([
            "publish",
            "disk.qcow2",
            "--dry-run",
            "--builder-id",
            "packer.amazon-ebs",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("packer.amazon-ebs"));
}

#[test]
fn quiet_publish_prints_only_the_result() {
    let dir = project();

    let output = templify_cmd()
        .current_dir(dir.path())
        .args(["--quiet", "publish", "disk.qcow2", "--dry-run"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let stdout = String::from_utf8(output).unwrap();
    assert_eq!(stdout.lines().count(), 1);
    assert!(stdout.contains("published"));
}

#[test]
fn json_publish_emits_json_lines() {
    let dir = project();

    let output = templify_cmd()
        .current_dir(dir.path())
        .args(["--json", "publish", "disk.qcow2", "--dry-run"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let stdout = String::from_utf8(output).unwrap();
    let events: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(events.len() > 1);
    assert_eq!(events.last().unwrap()["event"], "success");
}

#[test]
fn dry_run_destroy_lists_manifest_templates() {
    let dir = project();
    publish_dry_run(dir.path(), "published.json");

    templify_cmd()
        .current_dir(dir.path())
        .args(["destroy", "--manifest", "published.json", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would delete template ch-gva-2:"))
        .stdout(predicate::str::contains("Would delete template de-fra-1:"));
}

#[test]
fn destroy_rejects_malformed_manifest() {
    let dir = project();
    fs::write(dir.path().join("bad.json"), "{not json").unwrap();

    templify_cmd()
        .current_dir(dir.path())
        .args(["destroy", "--manifest", "bad.json", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read manifest"));
}
