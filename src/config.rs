//! Configuration management for the Modbus service and its controller.
use regex::Regex;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

use crate::constants::{
    DAEMON_NAME, DEFAULT_CONFIG_FILE, DEFAULT_DAEMON_PATH, DEFAULT_STARTUP_GRACE,
    LOCK_FILE_EXTENSION, PID_FILE_EXTENSION, SYSTEM_CONFIG_FILE,
};
use crate::error::ControlError;
use crate::network::NetworkConfig;
use crate::runtime;

/// Represents the structure of the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Configuration version.
    pub version: String,
    /// How the controller launches and supervises the daemon.
    #[serde(default)]
    pub control: ControlConfig,
    /// Device sub-network published by the daemon.
    #[serde(default)]
    pub network: NetworkConfig,
}

/// Built-in settings used when no configuration file exists: the stock daemon
/// path, no arguments and an empty device network.
impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            control: ControlConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

/// Daemon launch settings, formerly the constants of the init script.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    /// Daemon executable path.
    #[serde(default = "default_daemon")]
    pub daemon: String,
    /// Fixed arguments passed to the daemon.
    #[serde(default)]
    pub args: Vec<String>,
    /// PID file location; defaults to the runtime state directory.
    pub pid_file: Option<String>,
    /// When set, a failed start is logged and reported as success.
    #[serde(default)]
    pub tolerate_start_failure: bool,
    /// Enables debug logging for the controller.
    #[serde(default)]
    pub verbose: bool,
    /// How long the daemon must survive after spawn (e.g. "500ms", "2s").
    pub startup_grace: Option<String>,
    /// Services that must be running before the daemon is started.
    #[serde(default)]
    pub depends_on: Vec<DependencyConfig>,
}

/// A service the daemon depends on, identified by its PID file.
#[derive(Debug, Clone, Deserialize)]
pub struct DependencyConfig {
    /// Service name, for diagnostics.
    pub name: String,
    /// PID file written by that service's own init script.
    pub pid_file: String,
}

fn default_daemon() -> String {
    DEFAULT_DAEMON_PATH.to_string()
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            daemon: default_daemon(),
            args: Vec::new(),
            pid_file: None,
            tolerate_start_failure: false,
            verbose: false,
            startup_grace: None,
            depends_on: Vec::new(),
        }
    }
}

impl ControlConfig {
    /// Short service name derived from the daemon executable.
    pub fn service_name(&self) -> String {
        Path::new(&self.daemon)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| DAEMON_NAME.to_string())
    }

    /// Resolved PID file path.
    pub fn pid_file_path(&self) -> PathBuf {
        match &self.pid_file {
            Some(path) => PathBuf::from(path),
            None => runtime::state_dir()
                .join(format!("{}.{}", self.service_name(), PID_FILE_EXTENSION)),
        }
    }

    /// Lock file serializing controller invocations, next to the PID file.
    pub fn lock_file_path(&self) -> PathBuf {
        self.pid_file_path().with_extension(LOCK_FILE_EXTENSION)
    }

    /// Startup grace period, falling back to the default.
    pub fn startup_grace(&self) -> Result<Duration, ControlError> {
        match self.startup_grace.as_deref() {
            Some(raw) => parse_duration(raw),
            None => Ok(DEFAULT_STARTUP_GRACE),
        }
    }
}

/// Parses a user-facing duration string in the format `<number>[ms|s|m|h]`.
pub fn parse_duration(raw: &str) -> Result<Duration, ControlError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ControlError::InvalidDuration(raw.to_string()));
    }

    let (amount_str, millis) = if let Some(stripped) = value.strip_suffix("ms") {
        (stripped.trim(), 1)
    } else if let Some(stripped) = value.strip_suffix('s') {
        (stripped.trim(), 1_000)
    } else if let Some(stripped) = value.strip_suffix('m') {
        (stripped.trim(), 60_000)
    } else if let Some(stripped) = value.strip_suffix('h') {
        (stripped.trim(), 3_600_000)
    } else {
        (value, 1_000)
    };

    let amount: u64 = amount_str
        .parse()
        .map_err(|_| ControlError::InvalidDuration(raw.to_string()))?;

    Ok(Duration::from_millis(amount.saturating_mul(millis)))
}

/// Expands `$VAR` and `${VAR}` references within a string.
fn expand_env_vars(input: &str) -> Result<String, ControlError> {
    let re = Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?")
        .expect("environment variable pattern is valid");

    let mut result = String::with_capacity(input.len());
    let mut last = 0;
    for caps in re.captures_iter(input) {
        let whole = caps.get(0).expect("capture 0 always matches");
        let var_name = &caps[1];
        let value =
            env::var(var_name).map_err(|_| ControlError::MissingEnvVar(var_name.into()))?;
        result.push_str(&input[last..whole.start()]);
        result.push_str(&value);
        last = whole.end();
    }
    result.push_str(&input[last..]);
    Ok(result)
}

/// Picks the configuration file: explicit path, then local, then system-wide.
pub fn resolve_config_path(config_path: Option<&str>) -> PathBuf {
    match config_path {
        Some(path) => PathBuf::from(path),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            PathBuf::from(DEFAULT_CONFIG_FILE)
        }
        None => PathBuf::from(SYSTEM_CONFIG_FILE),
    }
}

/// Loads and parses the configuration file, expanding environment variables.
///
/// Without an explicit path, a missing default file yields [`Config::default`].
/// An explicit path must exist.
pub fn load_config(config_path: Option<&str>) -> Result<Config, ControlError> {
    load_resolved(&resolve_config_path(config_path), config_path.is_some())
}

fn load_resolved(config_path: &Path, explicit: bool) -> Result<Config, ControlError> {
    if !explicit && !config_path.exists() {
        debug!(
            "No configuration at {}; using built-in defaults",
            config_path.display()
        );
        return Ok(Config::default());
    }

    let content = fs::read_to_string(config_path).map_err(|e| {
        ControlError::ConfigReadError(std::io::Error::new(
            e.kind(),
            format!("{} ({})", e, config_path.display()),
        ))
    })?;

    let expanded_content = expand_env_vars(&content)?;

    let config: Config = serde_yaml::from_str(&expanded_content)
        .map_err(ControlError::ConfigParseError)?;

    config.control.startup_grace()?;
    Ok(config)
}
