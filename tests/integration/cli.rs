#[path = "common/mod.rs"]
mod common;

use std::{
    fs,
    path::{Path, PathBuf},
};

use assert_cmd::Command;
use common::{is_process_alive, pid_path, wait_for_path_removed};
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::tempdir;

fn write_config(dir: &Path, control: &str) -> PathBuf {
    let config_path = dir.join("modbus.yaml");
    fs::write(
        &config_path,
        format!(
            r#"version: "1"
control:
  pid_file: "{}"
  startup_grace: 200ms
{control}
"#,
            pid_path(dir).display()
        ),
    )
    .expect("failed to write config");
    config_path
}

fn modbusctl(dir: &Path, config: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("modbusctl"));
    cmd.env("HOME", dir)
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(config);
    cmd
}

#[test]
fn status_of_stopped_daemon_exits_three() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let config = write_config(dir, "  daemon: sleep\n  args: [\"30\"]");

    modbusctl(dir, &config)
        .arg("status")
        .assert()
        .code(3)
        .stdout(contains("inactive (stopped)"));
}

#[test]
fn stale_pid_file_status_exits_one() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let config = write_config(dir, "  daemon: sleep\n  args: [\"30\"]");
    fs::create_dir_all(pid_path(dir).parent().unwrap()).unwrap();
    fs::write(pid_path(dir), "999999\n").unwrap();

    modbusctl(dir, &config)
        .args(["status", "--json"])
        .assert()
        .code(1)
        .stdout(contains("\"state\": \"dead\"").and(contains("999999")));
}

#[test]
fn start_status_stop_round_trip() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let config = write_config(dir, "  daemon: sleep\n  args: [\"30\"]");

    modbusctl(dir, &config)
        .arg("start")
        .assert()
        .success()
        .stdout(contains("Started sleep"));

    let pid: u32 = fs::read_to_string(pid_path(dir))
        .expect("PID file missing after start")
        .trim()
        .parse()
        .expect("PID file content");
    assert!(is_process_alive(pid));

    modbusctl(dir, &config)
        .arg("start")
        .assert()
        .success()
        .stdout(contains("already running"));

    modbusctl(dir, &config)
        .args(["status", "--json"])
        .assert()
        .code(0)
        .stdout(contains("\"state\": \"running\""));

    modbusctl(dir, &config)
        .arg("stop")
        .assert()
        .success()
        .stdout(contains(format!("Stopped sleep (pid {pid})")));
    wait_for_path_removed(&pid_path(dir));
    assert!(!is_process_alive(pid));

    modbusctl(dir, &config).arg("status").assert().code(3);
    modbusctl(dir, &config)
        .arg("stop")
        .assert()
        .success()
        .stdout(contains("not running"));
}

#[test]
fn failed_start_exits_non_zero() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let config = write_config(dir, "  daemon: /bin/false");

    modbusctl(dir, &config)
        .arg("start")
        .assert()
        .code(1)
        .stderr(contains("exited during startup"));
    assert!(!pid_path(dir).exists());
}

#[test]
fn tolerated_start_failure_exits_zero() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let config = write_config(
        dir,
        "  daemon: /bin/false\n  tolerate_start_failure: true",
    );

    modbusctl(dir, &config)
        .arg("start")
        .assert()
        .success()
        .stdout(contains("tolerated"));
}

#[test]
fn unavailable_dependency_blocks_start() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let dependency = dir.join("dbus.pid");
    let config = write_config(
        dir,
        &format!(
            "  daemon: sleep\n  args: [\"30\"]\n  depends_on:\n    - name: cstbox-dbus\n      pid_file: \"{}\"",
            dependency.display()
        ),
    );

    modbusctl(dir, &config)
        .arg("start")
        .assert()
        .code(1)
        .stderr(contains("cstbox-dbus"));
    assert!(!pid_path(dir).exists());
}

#[test]
fn missing_config_file_is_reported() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();

    modbusctl(dir, &dir.join("absent.yaml"))
        .arg("status")
        .assert()
        .code(1)
        .stderr(contains("modbusctl:"));
}

#[test]
fn builtin_settings_apply_without_any_config_file() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    if Path::new("/etc/cstbox/modbus.yaml").exists() {
        eprintln!("Skipping: a system-wide configuration is installed");
        return;
    }

    let bare = || {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("modbusctl"));
        cmd.env("HOME", dir).env_remove("RUST_LOG").current_dir(dir);
        cmd
    };

    bare()
        .arg("status")
        .assert()
        .code(3)
        .stdout(contains("/opt/cstbox/bin/modbussvc"));
    bare()
        .arg("stop")
        .assert()
        .success()
        .stdout(contains("modbussvc is not running"));
}

#[test]
fn undefined_environment_variable_is_reported() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let config = write_config(dir, "  daemon: ${MODBUS_TEST_UNDEFINED_DAEMON}");

    modbusctl(dir, &config)
        .env_remove("MODBUS_TEST_UNDEFINED_DAEMON")
        .arg("start")
        .assert()
        .code(1)
        .stderr(contains("MODBUS_TEST_UNDEFINED_DAEMON"));
}

#[test]
fn unknown_verb_is_rejected() {
    Command::new(assert_cmd::cargo::cargo_bin!("modbusctl"))
        .arg("reload")
        .assert()
        .failure()
        .stderr(contains("reload"));
}
