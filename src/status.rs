//! Status reporting for the Modbus service daemon.
use chrono::{DateTime, Local};
use serde::Serialize;
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::daemon::{Daemon, ServiceStatus};
use crate::error::ControlError;
use crate::logs::{self, LogKind};

const GREEN_BOLD: &str = "\x1b[1;32m";
const RED_BOLD: &str = "\x1b[1;31m";
const RESET: &str = "\x1b[0m";

/// Number of stderr lines shown when the daemon died unexpectedly.
const RECENT_ERROR_LINES: usize = 5;

/// Process details gathered from the host for a live daemon.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessDetails {
    pub name: String,
    pub memory_bytes: u64,
    pub started_at: Option<DateTime<Local>>,
    pub uptime_secs: u64,
}

impl ProcessDetails {
    /// Looks `pid` up in the process table.
    pub fn lookup(pid: u32) -> Option<Self> {
        let target = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
        let process = system.process(target)?;

        let started_at = DateTime::from_timestamp(process.start_time() as i64, 0)
            .map(|utc| utc.with_timezone(&Local));

        Some(Self {
            name: process.name().to_string_lossy().to_string(),
            memory_bytes: process.memory(),
            started_at,
            uptime_secs: process.run_time(),
        })
    }
}

/// Everything `status` prints about the daemon.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub service: String,
    pub daemon: String,
    pub pid_file: String,
    pub status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<ProcessDetails>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recent_errors: Vec<String>,
}

impl StatusReport {
    /// Builds the report from the controller's view of the daemon.
    pub fn collect(daemon: &Daemon) -> Result<Self, ControlError> {
        let service = daemon.service_name();
        let status = daemon.status()?;

        let process = match status {
            ServiceStatus::Running { pid } => ProcessDetails::lookup(pid),
            _ => None,
        };

        let recent_errors = match status {
            ServiceStatus::Dead { .. } => {
                logs::tail(&service, LogKind::Stderr, RECENT_ERROR_LINES).unwrap_or_default()
            }
            _ => Vec::new(),
        };

        Ok(Self {
            daemon: daemon.config().daemon.clone(),
            pid_file: daemon.pid_file().path().display().to_string(),
            service,
            status,
            process,
            recent_errors,
        })
    }

    /// LSB exit code for the reported status.
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }

    /// Human-readable report, colored when `color` is set.
    pub fn render(&self, color: bool) -> String {
        let (good, bad, off) = if color {
            (GREEN_BOLD, RED_BOLD, RESET)
        } else {
            ("", "", "")
        };

        let mut lines = Vec::new();
        let active = match self.status {
            ServiceStatus::Running { .. } => format!("{good}active (running){off}"),
            ServiceStatus::Dead { .. } => format!("{bad}failed (dead, PID file present){off}"),
            ServiceStatus::NotRunning => "inactive (stopped)".to_string(),
        };

        lines.push(format!("● {} - {}", self.service, self.daemon));
        match &self.process {
            Some(details) => {
                let since = details
                    .started_at
                    .map(|at| at.format("%Y-%m-%d %H:%M:%S %Z").to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                lines.push(format!(
                    "   Active: {active} since {since}; {}",
                    format_elapsed(details.uptime_secs)
                ));
            }
            None => lines.push(format!("   Active: {active}")),
        }

        if let Some(pid) = self.status.pid() {
            match &self.process {
                Some(details) => {
                    lines.push(format!(" Main PID: {pid} ({})", details.name));
                    lines.push(format!(
                        "   Memory: {:.1}M",
                        details.memory_bytes as f64 / (1024.0 * 1024.0)
                    ));
                }
                None => lines.push(format!(" Main PID: {pid}")),
            }
        }
        lines.push(format!(" PID file: {}", self.pid_file));

        if !self.recent_errors.is_empty() {
            lines.push(String::new());
            lines.push("Recent errors:".to_string());
            lines.extend(self.recent_errors.iter().map(|line| format!("  {line}")));
        }

        lines.join("\n")
    }
}

fn format_elapsed(total_seconds: u64) -> String {
    match total_seconds {
        0..=59 => format!("{} secs ago", total_seconds),
        60..=3_599 => format!("{} mins ago", total_seconds / 60),
        3_600..=86_399 => format!("{} hours ago", total_seconds / 3_600),
        86_400..=604_799 => format!("{} days ago", total_seconds / 86_400),
        _ => format!("{} weeks ago", total_seconds / 604_800),
    }
}
