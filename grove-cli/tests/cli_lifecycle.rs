//! End-to-end tests of the `grove` binary with `HOME` pointed at a temp dir.

use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn grove_cmd(home: &Path, cwd: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("grove"));
    cmd.env("HOME", home)
        .env("GROVE_LOG", "off")
        .current_dir(cwd);
    cmd
}

fn project_dir(root: &TempDir, name: &str) -> std::path::PathBuf {
    let dir = root.path().join(name);
    fs::create_dir_all(&dir).expect("create project dir");
    dir
}

// ---------------------------------------------------------------------------
// 1. Empty registry
// ---------------------------------------------------------------------------

#[test]
fn ls_on_fresh_home_reports_nothing() {
    let home = TempDir::new().expect("home");
    grove_cmd(home.path(), home.path())
        .arg("ls")
        .assert()
        .success()
        .stdout(contains("No servers registered"));

    assert!(home.path().join(".config/grove/registry.json").exists());
}

#[test]
fn ls_json_on_fresh_home_is_empty_array() {
    let home = TempDir::new().expect("home");
    let assert = grove_cmd(home.path(), home.path())
        .args(["ls", "--json"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    let value: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert_eq!(value, serde_json::json!([]));
}

#[test]
fn cleanup_with_nothing_to_do() {
    let home = TempDir::new().expect("home");
    grove_cmd(home.path(), home.path())
        .arg("cleanup")
        .assert()
        .success()
        .stdout(contains("Nothing to clean up"));
}

#[test]
fn stop_unknown_server_fails() {
    let home = TempDir::new().expect("home");
    grove_cmd(home.path(), home.path())
        .args(["stop", "nope"])
        .assert()
        .failure()
        .stderr(contains("no server or workspace named 'nope'"));
}

#[test]
fn detach_unknown_server_fails() {
    let home = TempDir::new().expect("home");
    grove_cmd(home.path(), home.path())
        .args(["detach", "nope"])
        .assert()
        .failure();
}

#[test]
fn proxy_status_without_proxy() {
    let home = TempDir::new().expect("home");
    grove_cmd(home.path(), home.path())
        .args(["proxy", "status"])
        .assert()
        .success()
        .stdout(contains("stopped"));
}

// ---------------------------------------------------------------------------
// 2. Start / stop cycle
// ---------------------------------------------------------------------------

#[test]
fn start_ls_url_stop_cycle() {
    let home = TempDir::new().expect("home");
    let work = TempDir::new().expect("work");
    let project = project_dir(&work, "app");

    grove_cmd(home.path(), &project)
        .args(["start", "--name", "demo-cli", "sleep", "30"])
        .assert()
        .success()
        .stdout(contains("demo-cli").and(contains("http://localhost:")));

    let assert = grove_cmd(home.path(), &project)
        .args(["ls", "--json"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    let servers: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert_eq!(servers[0]["name"], "demo-cli");
    assert_eq!(servers[0]["status"], "running");

    grove_cmd(home.path(), &project)
        .args(["url", "demo-cli"])
        .assert()
        .success()
        .stdout(contains("http://localhost:"));

    grove_cmd(home.path(), &project)
        .args(["start", "--name", "demo-cli", "sleep", "30"])
        .assert()
        .failure()
        .stderr(contains("already running"));

    grove_cmd(home.path(), &project)
        .args(["stop", "demo-cli", "--timeout", "2"])
        .assert()
        .success()
        .stdout(contains("stopped"));

    grove_cmd(home.path(), &project)
        .args(["stop", "demo-cli"])
        .assert()
        .failure()
        .stderr(contains("is not running"));
}

#[test]
fn start_uses_project_command() {
    let home = TempDir::new().expect("home");
    let work = TempDir::new().expect("work");
    let project = project_dir(&work, "svc");
    fs::write(project.join(".grove.yaml"), "name: demo-yaml\ncommand: sleep 30\n")
        .expect("write project config");

    grove_cmd(home.path(), &project)
        .arg("start")
        .assert()
        .success()
        .stdout(contains("demo-yaml"));

    grove_cmd(home.path(), &project)
        .args(["stop", "--timeout", "2"])
        .assert()
        .success();
}

#[test]
fn start_without_command_explains_remedy() {
    let home = TempDir::new().expect("home");
    let work = TempDir::new().expect("work");
    let project = project_dir(&work, "empty");

    grove_cmd(home.path(), &project)
        .args(["start", "--name", "demo-none"])
        .assert()
        .failure()
        .stderr(contains(".grove.yaml"));
}

#[test]
fn invalid_name_suggests_sanitised_one() {
    let home = TempDir::new().expect("home");
    grove_cmd(home.path(), home.path())
        .args(["start", "--name", "Feature/Auth", "sleep", "30"])
        .assert()
        .failure()
        .stderr(contains("feature-auth"));
}

#[test]
fn project_file_name_is_validated() {
    let home = TempDir::new().expect("home");
    let work = TempDir::new().expect("work");
    let project = project_dir(&work, "svc");
    fs::write(project.join(".grove.yaml"), "name: ../escaped\ncommand: sleep 30\n")
        .expect("write project config");

    grove_cmd(home.path(), &project)
        .arg("start")
        .assert()
        .failure()
        .stderr(contains("invalid server name").and(contains("try 'escaped'")));
    assert!(!home.path().join(".config/grove/escaped.log").exists());
}

// ---------------------------------------------------------------------------
// 3. Detach, attach, prune
// ---------------------------------------------------------------------------

fn ls_json(home: &Path, cwd: &Path) -> serde_json::Value {
    let assert = grove_cmd(home, cwd).args(["ls", "--json"]).assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    serde_json::from_str(&stdout).expect("valid JSON")
}

#[test]
fn detach_leaves_process_running() {
    let home = TempDir::new().expect("home");
    let work = TempDir::new().expect("work");
    let project = project_dir(&work, "app");

    grove_cmd(home.path(), &project)
        .args(["start", "--name", "demo-detach", "sleep", "30"])
        .assert()
        .success();
    let pid = ls_json(home.path(), &project)[0]["pid"]
        .as_u64()
        .expect("pid recorded");

    grove_cmd(home.path(), &project)
        .args(["detach", "demo-detach"])
        .assert()
        .success()
        .stdout(contains("detached").and(contains(format!("pid {pid}"))));
    assert_eq!(ls_json(home.path(), &project), serde_json::json!([]));

    let killed = Command::new("kill")
        .arg(pid.to_string())
        .status()
        .expect("run kill");
    assert!(killed.success(), "process {pid} should still have been alive");
}

#[test]
fn attach_tracks_external_server() {
    let home = TempDir::new().expect("home");
    let work = TempDir::new().expect("work");
    let project = project_dir(&work, "external");
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port().to_string();

    grove_cmd(home.path(), &project)
        .args(["attach", &port, "--name", "demo-ext"])
        .assert()
        .success()
        .stdout(contains("attached").and(contains(format!("http://localhost:{port}"))));

    grove_cmd(home.path(), &project)
        .arg("ls")
        .assert()
        .success()
        .stdout(contains("demo-ext").and(contains("1 running, 1 total")));

    grove_cmd(home.path(), &project)
        .args(["restart", "demo-ext"])
        .assert()
        .failure()
        .stderr(contains("explicit command"));

    drop(listener);
    grove_cmd(home.path(), &project)
        .args(["attach", &port, "--name", "demo-late"])
        .assert()
        .failure()
        .stderr(contains("no server is listening"));
}

#[test]
fn attach_rejects_port_zero() {
    let home = TempDir::new().expect("home");
    grove_cmd(home.path(), home.path())
        .args(["attach", "0"])
        .assert()
        .failure();
}

#[test]
fn prune_dry_run_then_prune_stopped() {
    let home = TempDir::new().expect("home");
    let work = TempDir::new().expect("work");
    let project = project_dir(&work, "app");

    grove_cmd(home.path(), &project)
        .args(["start", "--name", "demo-prune", "sleep", "30"])
        .assert()
        .success();
    grove_cmd(home.path(), &project)
        .args(["stop", "demo-prune", "--timeout", "2"])
        .assert()
        .success();

    grove_cmd(home.path(), &project)
        .args(["prune", "--stopped", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("would remove demo-prune"));
    assert_eq!(ls_json(home.path(), &project)[0]["name"], "demo-prune");

    grove_cmd(home.path(), &project)
        .args(["prune", "--stopped"])
        .assert()
        .success()
        .stdout(contains("removed demo-prune"));
    assert_eq!(ls_json(home.path(), &project), serde_json::json!([]));

    grove_cmd(home.path(), &project)
        .arg("prune")
        .assert()
        .success()
        .stdout(contains("Nothing to prune"));
}
