//! Log files of the managed daemon and tracing setup for both executables.
use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufRead, BufReader},
    path::PathBuf,
};

use tracing_subscriber::EnvFilter;

use crate::cli::LogLevelArg;
use crate::runtime;

/// Output stream of the daemon captured to disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogKind {
    /// Standard output logs
    Stdout,
    /// Standard error logs
    Stderr,
}

impl LogKind {
    /// String representation for file paths and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Stdout => "stdout",
            LogKind::Stderr => "stderr",
        }
    }
}

/// Installs the global tracing subscriber.
///
/// An explicit level wins, then the verbose flag, then `RUST_LOG`, then `info`.
pub fn init_logging(level: Option<LogLevelArg>, verbose: bool) {
    let filter = match level {
        Some(level) => EnvFilter::new(level.as_str()),
        None if verbose => EnvFilter::new("debug"),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

/// Path of the log file capturing `kind` output for `service`.
pub fn resolve_log_path(service: &str, kind: LogKind) -> PathBuf {
    runtime::log_dir().join(format!("{service}_{}.log", kind.as_str()))
}

/// Opens (creating if needed) the log file in append mode.
pub fn open_log_file(service: &str, kind: LogKind) -> io::Result<File> {
    let path = resolve_log_path(service, kind);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Returns the last `lines` lines of a service log, or nothing if it does not exist.
pub fn tail(service: &str, kind: LogKind, lines: usize) -> io::Result<Vec<String>> {
    let path = resolve_log_path(service, kind);
    if !path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(path)?);
    let all_lines: Vec<String> = reader.lines().map_while(Result::ok).collect();
    let start = all_lines.len().saturating_sub(lines);
    Ok(all_lines[start..].to_vec())
}
