#![allow(dead_code)]

use std::{
    env, fs,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use cstbox_modbus::{
    config::ControlConfig,
    daemon::PidFile,
    runtime::{self, RuntimeMode},
};
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};

pub struct HomeEnvGuard {
    previous: Option<String>,
    _lock: std::sync::MutexGuard<'static, ()>,
}

impl HomeEnvGuard {
    pub fn set(home: &Path) -> Self {
        let lock = cstbox_modbus::test_utils::env_lock();
        let previous = env::var("HOME").ok();
        unsafe {
            env::set_var("HOME", home);
        }
        runtime::init(RuntimeMode::User);
        Self {
            previous,
            _lock: lock,
        }
    }
}

impl Drop for HomeEnvGuard {
    fn drop(&mut self) {
        match &self.previous {
            Some(value) => unsafe {
                env::set_var("HOME", value);
            },
            None => unsafe {
                env::remove_var("HOME");
            },
        }
        runtime::init(RuntimeMode::User);
    }
}

/// Control settings for `daemon` with a PID file under `dir/run`.
pub fn control_config(dir: &Path, daemon: &str, args: &[&str]) -> ControlConfig {
    ControlConfig {
        daemon: daemon.to_string(),
        args: args.iter().map(|arg| arg.to_string()).collect(),
        pid_file: Some(pid_path(dir).display().to_string()),
        startup_grace: Some("200ms".into()),
        ..ControlConfig::default()
    }
}

pub fn pid_path(dir: &Path) -> PathBuf {
    dir.join("run").join("daemon.pid")
}

pub fn wait_for_pid(path: &Path) -> u32 {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(Some(pid)) = PidFile::new(path).read() {
            return pid;
        }

        if Instant::now() >= deadline {
            panic!("Timed out waiting for PID file {:?}", path);
        }

        thread::sleep(Duration::from_millis(100));
    }
}

pub fn wait_for_path_removed(path: &Path) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if !path.exists() {
            return;
        }
        thread::sleep(Duration::from_millis(100));
    }
    panic!("Timed out waiting for {:?} to be removed", path);
}

#[cfg(target_os = "linux")]
pub fn wait_for_process_exit(pid: u32) {
    let deadline = Instant::now() + Duration::from_secs(10);
    let proc_path = PathBuf::from(format!("/proc/{}", pid));
    let stat_path = PathBuf::from(format!("/proc/{}/stat", pid));

    while Instant::now() < deadline {
        if !proc_path.exists() {
            return;
        }

        // Z = zombie, X = dead
        if let Ok(stat) = fs::read_to_string(&stat_path)
            && let Some(state_start) = stat.rfind(')')
            && let Some(state) = stat[state_start + 1..].trim().chars().next()
            && (state == 'Z' || state == 'X')
        {
            return;
        }

        thread::sleep(Duration::from_millis(100));
    }

    panic!("Timed out waiting for PID {} to exit", pid);
}

pub fn is_process_alive(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    match system.process(Pid::from_u32(pid)) {
        Some(process) => process.status() != ProcessStatus::Zombie,
        None => false,
    }
}

/// Number of live processes whose command line contains `needle`.
pub fn count_processes_with_arg(needle: &str) -> usize {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::everything(),
    );
    system
        .processes()
        .values()
        .filter(|process| process.status() != ProcessStatus::Zombie)
        .filter(|process| {
            process
                .cmd()
                .iter()
                .any(|arg| arg.to_string_lossy().contains(needle))
        })
        .count()
}
