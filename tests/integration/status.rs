#[path = "common/mod.rs"]
mod common;

use std::{fs, thread, time::Duration};

use common::{HomeEnvGuard, control_config, pid_path};
use cstbox_modbus::{
    constants::{STATUS_DEAD_PID_FILE, STATUS_NOT_RUNNING, STATUS_RUNNING},
    daemon::{Daemon, ServiceStatus, StartOutcome},
    error::{ControlError, PidFileError},
    status::StatusReport,
};
use tempfile::tempdir;

#[test]
fn status_codes_track_daemon_lifecycle() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let _home = HomeEnvGuard::set(dir);

    let daemon = Daemon::new(control_config(dir, "sleep", &["30"]));
    assert_eq!(daemon.status().unwrap().exit_code(), STATUS_NOT_RUNNING);

    let StartOutcome::Started { pid } = daemon.start().unwrap() else {
        panic!("start did not spawn");
    };
    let status = daemon.status().unwrap();
    assert_eq!(status, ServiceStatus::Running { pid });
    assert_eq!(status.exit_code(), STATUS_RUNNING);

    let report = StatusReport::collect(&daemon).unwrap();
    assert_eq!(report.exit_code(), STATUS_RUNNING);
    assert_eq!(report.service, "sleep");
    assert!(report.process.is_some());
    assert!(report.render(false).contains(&format!("Main PID: {pid}")));

    daemon.stop().unwrap();
    assert_eq!(daemon.status().unwrap().exit_code(), STATUS_NOT_RUNNING);
}

#[test]
fn stale_pid_file_reports_dead() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let _home = HomeEnvGuard::set(dir);

    let pid_file = pid_path(dir);
    fs::create_dir_all(pid_file.parent().unwrap()).unwrap();
    fs::write(&pid_file, "999999\n").unwrap();

    let daemon = Daemon::new(control_config(dir, "sleep", &["30"]));
    let report = StatusReport::collect(&daemon).unwrap();
    assert_eq!(report.status, ServiceStatus::Dead { pid: 999999 });
    assert_eq!(report.exit_code(), STATUS_DEAD_PID_FILE);
    assert!(report.process.is_none());

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["status"]["state"], "dead");
    assert_eq!(json["status"]["pid"], 999999);

    // status never touches the PID file
    assert!(pid_file.exists());
}

#[test]
fn crashed_daemon_reports_recent_errors() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let _home = HomeEnvGuard::set(dir);

    let daemon = Daemon::new(control_config(
        dir,
        "/bin/sh",
        &["-c", "sleep 1; echo 'serial port /dev/ttyUSB0 vanished' >&2; exit 2"],
    ));
    let StartOutcome::Started { pid } = daemon.start().unwrap() else {
        panic!("start did not spawn");
    };

    let mut status = daemon.status().unwrap();
    for _ in 0..50 {
        if status != (ServiceStatus::Running { pid }) {
            break;
        }
        thread::sleep(Duration::from_millis(100));
        status = daemon.status().unwrap();
    }
    assert_eq!(status, ServiceStatus::Dead { pid });

    let report = StatusReport::collect(&daemon).unwrap();
    assert_eq!(report.exit_code(), STATUS_DEAD_PID_FILE);
    assert!(
        report
            .recent_errors
            .iter()
            .any(|line| line.contains("vanished")),
        "recent errors: {:?}",
        report.recent_errors
    );
    assert!(report.render(false).contains("Recent errors:"));
}

#[test]
fn malformed_pid_file_is_an_error() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let _home = HomeEnvGuard::set(dir);

    let pid_file = pid_path(dir);
    fs::create_dir_all(pid_file.parent().unwrap()).unwrap();
    fs::write(&pid_file, "not-a-pid\n").unwrap();

    let daemon = Daemon::new(control_config(dir, "sleep", &["30"]));
    let err = daemon.status().unwrap_err();
    assert!(matches!(
        err,
        ControlError::PidFileError(PidFileError::Malformed { .. })
    ));
}
