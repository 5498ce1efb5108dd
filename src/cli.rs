//! Command-line interfaces of `modbusctl` and `modbussvc`.
use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

/// Wrapper around `LevelFilter` so clap can parse log levels from either
/// string names ("info", "debug", etc.) or numeric shorthands (0-5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    /// String representation suitable for `RUST_LOG`.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            LevelFilter::TRACE => "trace",
        }
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("log level cannot be empty".into());
        }

        if let Ok(number) = trimmed.parse::<u8>() {
            let level = match number {
                0 => LevelFilter::OFF,
                1 => LevelFilter::ERROR,
                2 => LevelFilter::WARN,
                3 => LevelFilter::INFO,
                4 => LevelFilter::DEBUG,
                5 => LevelFilter::TRACE,
                _ => {
                    return Err(format!(
                        "unsupported log level number '{number}' (expected 0-5)"
                    ));
                }
            };

            return Ok(LogLevelArg(level));
        }

        let level = match trimmed.to_ascii_lowercase().as_str() {
            "off" => LevelFilter::OFF,
            "error" | "err" => LevelFilter::ERROR,
            "warn" | "warning" => LevelFilter::WARN,
            "info" => LevelFilter::INFO,
            "debug" => LevelFilter::DEBUG,
            "trace" => LevelFilter::TRACE,
            _ => return Err(format!("invalid log level '{trimmed}'")),
        };

        Ok(LogLevelArg(level))
    }
}

/// Service control wrapper for the Modbus daemon.
#[derive(Parser, Debug)]
#[command(name = "modbusctl", version)]
#[command(about = "Start, stop and query the CSTBox Modbus service daemon", long_about = None)]
pub struct Cli {
    /// Path to the configuration file (defaults to `modbus.yaml`, then `/etc/cstbox/modbus.yaml`).
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log what the controller does (same as the `verbose` config flag).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The lifecycle verb to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Lifecycle verbs.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Launch the daemon if it is not already running.
    Start,

    /// Terminate the daemon if it is running.
    Stop,

    /// Stop then start the daemon.
    Restart,

    /// Report whether the daemon is running (exit code 0, 1 or 3).
    Status {
        /// Emit machine-readable JSON output.
        #[arg(long)]
        json: bool,
    },
}

/// Modbus device network service daemon.
#[derive(Parser, Debug)]
#[command(name = "modbussvc", version)]
#[command(about = "CSTBox Modbus devices sub-network service", long_about = None)]
pub struct DaemonCli {
    /// Path to the configuration file (defaults to `modbus.yaml`, then `/etc/cstbox/modbus.yaml`).
    #[arg(short, long)]
    pub config: Option<String>,

    /// Override the logging verbosity.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<LogLevelArg>,
}

/// Parses `modbusctl` command-line arguments.
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Parses `modbussvc` command-line arguments.
pub fn parse_daemon_args() -> DaemonCli {
    DaemonCli::parse()
}
