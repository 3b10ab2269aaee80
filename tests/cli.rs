use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use std::path::Path;

mod util;
use util::MockCatalog;

fn frics(data_dir: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("frics");
    cmd.env("FRICS_CONFIG", data_dir.join("no-such-config.toml"))
        .env_remove("FRICS_BASE_URL")
        .env_remove("FRICS_DATA_DIR")
        .env_remove("RUST_LOG")
        .arg("--color")
        .arg("never")
        .arg("--data-dir")
        .arg(data_dir);
    cmd
}

fn seeded_server() -> MockCatalog {
    let server = MockCatalog::start();
    server.listing(1, &["/@alice/ssl-bypass/", "/bob/broken/"]);
    server.detail(
        "/api/project/alice/ssl-bypass/",
        "a-1",
        "ssl-bypass",
        json!("['16.0.0', '15.2.1']"),
    );
    server
}

#[test]
fn help_lists_subcommands() {
    let tmp = tempfile::tempdir().unwrap();
    frics(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("sync")
                .and(predicate::str::contains("search"))
                .and(predicate::str::contains("show")),
        );
}

#[test]
fn list_before_sync_hints_and_succeeds() {
    let tmp = tempfile::tempdir().unwrap();
    frics(tmp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("frics sync"));
    assert!(!tmp.path().join("codeshare.db").exists());
}

#[test]
fn show_unknown_project_fails() {
    let tmp = tempfile::tempdir().unwrap();
    frics(tmp.path())
        .args(["show", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn invalid_base_url_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    frics(tmp.path())
        .args(["--base-url", "ftp://example.com", "sync"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid base URL"));
}

#[test]
fn sync_then_browse() {
    let server = seeded_server();
    let tmp = tempfile::tempdir().unwrap();

    frics(tmp.path())
        .args(["--base-url", &server.base_url, "sync"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Synced 1 projects from 1 pages"));

    frics(tmp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Frida Version")
                .and(predicate::str::contains("a-1"))
                .and(predicate::str::contains("alice"))
                .and(predicate::str::contains("16.0.0"))
                .and(predicate::str::contains("15.2.1").not()),
        );

    frics(tmp.path())
        .args(["search", "SSL"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ssl-bypass"));

    frics(tmp.path())
        .args(["search", "nothing-like-this"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    frics(tmp.path())
        .args(["search", "   "])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    frics(tmp.path())
        .args(["show", "a-1", "--source-only"])
        .assert()
        .success()
        .stdout("// ssl-bypass\nconsole.log('ssl-bypass');\n");

    frics(tmp.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("records:  1").and(predicate::str::contains("partial")));
}

#[test]
fn json_output_is_machine_readable() {
    let server = seeded_server();
    let tmp = tempfile::tempdir().unwrap();

    let output = frics(tmp.path())
        .args(["--json", "--base-url", &server.base_url, "sync"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["records_written"], 1);
    assert_eq!(report["end"]["kind"], "exhausted");
    assert_eq!(report["skipped"][0]["href"], "/bob/broken/");

    let output = frics(tmp.path()).args(["--json", "list"]).output().unwrap();
    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows.as_array().map(Vec::len), Some(1));
    assert_eq!(rows[0]["id"], "a-1");
    assert_eq!(rows[0]["runtime_version"], "16.0.0");

    let output = frics(tmp.path())
        .args(["--json", "show", "a-1"])
        .output()
        .unwrap();
    let detail: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(detail["description"], "ssl-bypass description");
}

#[test]
fn resync_replaces_previous_mirror() {
    let server = seeded_server();
    let tmp = tempfile::tempdir().unwrap();
    frics(tmp.path())
        .args(["--base-url", &server.base_url, "sync"])
        .assert()
        .success();

    server.listing(1, &["/@carol/other/"]);
    server.detail("/api/project/carol/other/", "c-1", "other", json!("14.0.0"));
    frics(tmp.path())
        .args(["--base-url", &server.base_url, "sync"])
        .assert()
        .success();

    frics(tmp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("c-1").and(predicate::str::contains("a-1").not()));
}
