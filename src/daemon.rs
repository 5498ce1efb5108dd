//! Lifecycle control of the Modbus service daemon.
//!
//! This is the service control wrapper invoked by the host service manager:
//! `start` launches the daemon executable with its fixed arguments unless it is
//! already running, `stop` terminates it, `restart` chains both and `status`
//! reports liveness using the LSB exit code convention.
use fs2::FileExt;
#[cfg(not(target_os = "linux"))]
use nix::sys::signal;
use serde::Serialize;
use std::{
    fs::{self, File, OpenOptions},
    io::ErrorKind,
    os::unix::process::CommandExt,
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    sync::Mutex,
    thread,
    time::Instant,
};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{debug, error, info, warn};

use crate::config::{Config, ControlConfig};
use crate::constants::{
    PROCESS_CHECK_INTERVAL, STATUS_DEAD_PID_FILE, STATUS_NOT_RUNNING, STATUS_RUNNING,
    STOP_CHECKS,
};
use crate::error::{ControlError, PidFileError};
use crate::logs::{LogKind, open_log_file};

/// Single-process PID file, one decimal PID followed by a newline.
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> PidFileError {
        PidFileError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    /// Reads the recorded PID; a missing file means no PID.
    pub fn read(&self) -> Result<Option<u32>, PidFileError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_error(err)),
        };

        let trimmed = contents.trim();
        match trimmed.parse::<i32>() {
            Ok(pid) if pid > 0 => Ok(Some(pid as u32)),
            _ => Err(PidFileError::Malformed {
                path: self.path.display().to_string(),
                content: trimmed.to_string(),
            }),
        }
    }

    /// Records `pid`, creating parent directories as needed.
    ///
    /// The content goes to a sibling temporary file renamed over the PID file,
    /// so readers never observe a partially written PID.
    pub fn write(&self, pid: u32) -> Result<(), PidFileError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
        }

        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        let result = fs::write(&staging, format!("{pid}\n"))
            .and_then(|()| fs::rename(&staging, &self.path));
        if let Err(err) = result {
            let _ = fs::remove_file(&staging);
            return Err(self.io_error(err));
        }
        Ok(())
    }

    /// Deletes the PID file; an already missing file is fine.
    pub fn remove(&self) -> Result<(), PidFileError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.io_error(err)),
        }
    }
}

/// What the kernel reports for a PID.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Zombie,
    Missing,
}

#[cfg(target_os = "linux")]
fn read_proc_state(pid: u32) -> Option<char> {
    let stat = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // The state follows the parenthesised command name, which may itself hold spaces.
    let after_name = &stat[stat.rfind(')')? + 1..];
    after_name.trim_start().chars().next()
}

/// Probes `pid` without signalling it.
pub fn process_state(pid: u32) -> ProcessState {
    #[cfg(target_os = "linux")]
    {
        if !Path::new(&format!("/proc/{pid}")).exists() {
            return ProcessState::Missing;
        }

        match read_proc_state(pid) {
            Some('Z') | Some('X') => ProcessState::Zombie,
            Some(_) => ProcessState::Running,
            None => ProcessState::Missing,
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        let target = nix::unistd::Pid::from_raw(pid as i32);
        match signal::kill(target, None) {
            Ok(_) => ProcessState::Running,
            Err(nix::errno::Errno::ESRCH) => ProcessState::Missing,
            Err(_) => ProcessState::Running,
        }
    }
}

/// True when `pid` names a live, non-zombie process.
pub fn is_process_running(pid: u32) -> bool {
    process_state(pid) == ProcessState::Running
}

/// True when `pid` executes `executable`, compared by file name.
///
/// The process name, the resolved executable and the first two command-line
/// words are checked; the second word covers scripts started through their
/// interpreter.
pub fn runs_executable(pid: u32, executable: &str) -> bool {
    let Some(expected) = Path::new(executable).file_name() else {
        return false;
    };

    let target = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[target]),
        true,
        ProcessRefreshKind::everything(),
    );
    let Some(process) = system.process(target) else {
        return false;
    };

    process.name() == expected
        || process.exe().and_then(Path::file_name) == Some(expected)
        || process
            .cmd()
            .iter()
            .take(2)
            .any(|arg| Path::new(arg).file_name() == Some(expected))
}

/// Daemon liveness as reported by `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ServiceStatus {
    /// The PID file names a live process.
    Running { pid: u32 },
    /// The PID file exists but its process is gone.
    Dead { pid: u32 },
    /// No PID file.
    NotRunning,
}

impl ServiceStatus {
    /// LSB init script exit code for this status.
    pub fn exit_code(&self) -> i32 {
        match self {
            ServiceStatus::Running { .. } => STATUS_RUNNING,
            ServiceStatus::Dead { .. } => STATUS_DEAD_PID_FILE,
            ServiceStatus::NotRunning => STATUS_NOT_RUNNING,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        match self {
            ServiceStatus::Running { pid } | ServiceStatus::Dead { pid } => Some(*pid),
            ServiceStatus::NotRunning => None,
        }
    }
}

/// Result of a successful `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new daemon process was spawned.
    Started { pid: u32 },
    /// The daemon was already running; nothing was spawned.
    AlreadyRunning { pid: u32 },
    /// Starting failed but the configuration tolerates it.
    FailureTolerated { reason: String },
}

/// Result of a successful `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The daemon process was terminated.
    Stopped { pid: u32 },
    /// Nothing was running.
    NotRunning,
}

/// Controls the daemon described by a [`ControlConfig`].
pub struct Daemon {
    /// Launch settings.
    config: ControlConfig,
    /// PID file of the daemon.
    pid_file: PidFile,
    /// Handle of a daemon spawned by this controller, kept so it can be reaped.
    child: Mutex<Option<Child>>,
}

impl Daemon {
    /// Creates a controller for the given launch settings.
    pub fn new(config: ControlConfig) -> Self {
        let pid_file = PidFile::new(config.pid_file_path());
        Self {
            config,
            pid_file,
            child: Mutex::new(None),
        }
    }

    /// Creates a controller from the `control` section of a loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.control.clone())
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn pid_file(&self) -> &PidFile {
        &self.pid_file
    }

    /// Short name used in logs, PID and log file names.
    pub fn service_name(&self) -> String {
        self.config.service_name()
    }

    /// Takes the controller lock; released when the returned file is dropped.
    fn lock(&self) -> Result<File, ControlError> {
        let path = self.config.lock_file_path();
        let lock_error = |source| ControlError::LockError {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(lock_error)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(lock_error)?;
        file.lock_exclusive().map_err(lock_error)?;
        debug!("Acquired controller lock {}", path.display());
        Ok(file)
    }

    /// Liveness check that also reaps a daemon spawned by this controller.
    ///
    /// A live PID that runs another program counts as dead: the PID file
    /// outlived the daemon and the PID was reused.
    fn is_alive(&self, pid: u32) -> bool {
        if let Ok(mut guard) = self.child.lock()
            && let Some(child) = guard.as_mut()
            && child.id() == pid
        {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!("Reaped daemon process {pid} ({status})");
                    *guard = None;
                    return false;
                }
                Ok(None) => return true,
                Err(err) => debug!("Cannot poll daemon process {pid}: {err}"),
            }
        }

        if !is_process_running(pid) {
            return false;
        }

        if runs_executable(pid, &self.config.daemon) {
            return true;
        }

        warn!(
            "PID {pid} recorded in {} belongs to another program, not '{}'",
            self.pid_file.path().display(),
            self.config.daemon
        );
        false
    }

    /// Reads the PID file, discarding it when its content is not a PID.
    fn read_pid_or_discard(&self) -> Result<Option<u32>, ControlError> {
        match self.pid_file.read() {
            Err(PidFileError::Malformed { path, content }) => {
                warn!("Removing malformed PID file {path} ('{content}')");
                self.pid_file.remove()?;
                Ok(None)
            }
            other => Ok(other?),
        }
    }

    /// Reports whether the daemon is running.
    pub fn status(&self) -> Result<ServiceStatus, ControlError> {
        let status = match self.pid_file.read()? {
            None => ServiceStatus::NotRunning,
            Some(pid) if self.is_alive(pid) => ServiceStatus::Running { pid },
            Some(pid) => ServiceStatus::Dead { pid },
        };
        debug!("Service '{}' status: {:?}", self.service_name(), status);
        Ok(status)
    }

    /// Launches the daemon unless it is already running.
    ///
    /// Failures are returned as errors unless `tolerate_start_failure` is set,
    /// in which case they are logged and reported as [`StartOutcome::FailureTolerated`].
    pub fn start(&self) -> Result<StartOutcome, ControlError> {
        let result = self.lock().and_then(|lock| {
            let outcome = self.start_locked();
            drop(lock);
            outcome
        });
        self.apply_start_policy(result)
    }

    /// Terminates the daemon; succeeds without doing anything when it is not running.
    pub fn stop(&self) -> Result<StopOutcome, ControlError> {
        let _lock = self.lock()?;
        self.stop_locked()
    }

    /// Stops then starts the daemon under a single lock.
    pub fn restart(&self) -> Result<StartOutcome, ControlError> {
        let lock = self.lock()?;
        self.stop_locked()?;
        let result = self.start_locked();
        drop(lock);
        self.apply_start_policy(result)
    }

    fn apply_start_policy(
        &self,
        result: Result<StartOutcome, ControlError>,
    ) -> Result<StartOutcome, ControlError> {
        match result {
            Err(err) if self.config.tolerate_start_failure => {
                warn!(
                    "Service '{}' failed to start, continuing anyway: {err}",
                    self.service_name()
                );
                Ok(StartOutcome::FailureTolerated {
                    reason: err.to_string(),
                })
            }
            Err(err) => {
                error!("Service '{}' failed to start: {err}", self.service_name());
                Err(err)
            }
            ok => ok,
        }
    }

    fn start_locked(&self) -> Result<StartOutcome, ControlError> {
        let service_name = self.service_name();

        if let Some(pid) = self.read_pid_or_discard()? {
            if self.is_alive(pid) {
                info!("Service '{service_name}' already running (PID {pid})");
                return Ok(StartOutcome::AlreadyRunning { pid });
            }

            warn!("Removing stale PID file for '{service_name}' (PID {pid})");
            self.pid_file.remove()?;
        }

        self.check_dependencies()?;

        let pid = self.launch()?;
        info!("Service '{service_name}' started (PID {pid})");
        Ok(StartOutcome::Started { pid })
    }

    /// Fails unless every declared dependency has a live process.
    fn check_dependencies(&self) -> Result<(), ControlError> {
        for dependency in &self.config.depends_on {
            let pid = match PidFile::new(&dependency.pid_file).read() {
                Ok(pid) => pid,
                Err(err) => {
                    warn!("Ignoring unreadable PID file of '{}': {err}", dependency.name);
                    None
                }
            };

            match pid {
                Some(pid) if is_process_running(pid) => {
                    debug!("Dependency '{}' is running (PID {pid})", dependency.name);
                }
                _ => {
                    return Err(ControlError::DependencyError {
                        service: self.service_name(),
                        dependency: dependency.name.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Spawns the daemon, waits out the startup grace period and records its PID.
    fn launch(&self) -> Result<u32, ControlError> {
        let service_name = self.service_name();
        let grace = self.config.startup_grace()?;
        let start_error = |source| ControlError::ServiceStartError {
            service: service_name.clone(),
            source,
        };

        let stdout = open_log_file(&service_name, LogKind::Stdout).map_err(start_error)?;
        let stderr = open_log_file(&service_name, LogKind::Stderr).map_err(start_error)?;

        debug!(
            "Launching '{}' with arguments {:?}",
            self.config.daemon, self.config.args
        );

        let mut child = Command::new(&self.config.daemon)
            .args(&self.config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .process_group(0)
            .spawn()
            .map_err(start_error)?;
        let pid = child.id();

        let deadline = Instant::now() + grace;
        loop {
            if let Some(status) = child.try_wait().map_err(start_error)? {
                return Err(ControlError::ServiceExitedEarly {
                    service: service_name.clone(),
                    status: status.to_string(),
                });
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(PROCESS_CHECK_INTERVAL.min(deadline - now));
        }

        if let Err(err) = self.pid_file.write(pid) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(err.into());
        }

        *self.child.lock()? = Some(child);
        Ok(pid)
    }

    fn stop_locked(&self) -> Result<StopOutcome, ControlError> {
        let service_name = self.service_name();

        let Some(pid) = self.read_pid_or_discard()? else {
            info!("Service '{service_name}' is not running");
            return Ok(StopOutcome::NotRunning);
        };

        if !self.is_alive(pid) {
            warn!("Service '{service_name}' not running; removing stale PID file (PID {pid})");
            self.pid_file.remove()?;
            return Ok(StopOutcome::NotRunning);
        }

        self.terminate_pid(pid)?;
        self.pid_file.remove()?;
        info!("Service '{service_name}' stopped (PID {pid})");
        Ok(StopOutcome::Stopped { pid })
    }

    /// Polls until `pid` exits or the stop window elapses.
    fn wait_for_exit(&self, pid: u32) -> bool {
        for _ in 0..STOP_CHECKS {
            if !self.is_alive(pid) {
                return true;
            }
            thread::sleep(PROCESS_CHECK_INTERVAL);
        }
        !self.is_alive(pid)
    }

    /// Sends SIGTERM to the daemon and its process group, escalating to SIGKILL.
    fn terminate_pid(&self, pid: u32) -> Result<(), ControlError> {
        fn nix_error_to_io(err: nix::errno::Errno) -> std::io::Error {
            std::io::Error::from_raw_os_error(err as i32)
        }

        let service_name = self.service_name();
        let stop_error = |source| ControlError::ServiceStopError {
            service: service_name.clone(),
            source,
        };
        let target = nix::unistd::Pid::from_raw(pid as i32);

        let own_pgid = unsafe { libc::getpgid(0) };
        let child_pgid = unsafe { libc::getpgid(target.as_raw()) };
        if child_pgid >= 0 && child_pgid != own_pgid {
            if unsafe { libc::killpg(child_pgid, libc::SIGTERM) } < 0 {
                let err = std::io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(code) if code == libc::ESRCH => {
                        debug!("Process group {child_pgid} of '{service_name}' already gone");
                    }
                    Some(code) if code == libc::EPERM => {
                        warn!(
                            "Insufficient permissions to signal process group {child_pgid} for '{service_name}'. Falling back to direct signal"
                        );
                    }
                    _ => return Err(stop_error(err)),
                }
            } else {
                debug!("Sent SIGTERM to process group {child_pgid} of '{service_name}'");
            }
        }

        match nix::sys::signal::kill(target, Some(nix::sys::signal::SIGTERM)) {
            Ok(()) => debug!("Sent SIGTERM to '{service_name}' (PID {pid})"),
            Err(nix::errno::Errno::ESRCH) => {
                debug!("Service '{service_name}' exited before SIGTERM could be delivered");
                return Ok(());
            }
            Err(err) => return Err(stop_error(nix_error_to_io(err))),
        }

        if self.wait_for_exit(pid) {
            return Ok(());
        }

        warn!("Service '{service_name}' did not exit after SIGTERM; sending SIGKILL");
        if child_pgid >= 0
            && child_pgid != own_pgid
            && unsafe { libc::killpg(child_pgid, libc::SIGKILL) } < 0
        {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                warn!("Cannot SIGKILL process group {child_pgid} of '{service_name}': {err}");
            }
        }
        match nix::sys::signal::kill(target, Some(nix::sys::signal::SIGKILL)) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
            Err(err) => return Err(stop_error(nix_error_to_io(err))),
        }

        if !self.wait_for_exit(pid) {
            return Err(stop_error(std::io::Error::new(
                ErrorKind::TimedOut,
                format!("PID {pid} still alive after SIGKILL"),
            )));
        }

        Ok(())
    }
}
