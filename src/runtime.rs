//! Runtime directories for PID, lock and log files.
use std::{
    env,
    path::{Path, PathBuf},
    sync::{OnceLock, RwLock},
};

/// Where to keep state and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMode {
    /// User home dir (~/.local/share/cstbox-modbus).
    User,
    /// System dirs (/var/run/cstbox, /var/log/cstbox).
    System,
}

impl RuntimeMode {
    /// System mode when running as root, user mode otherwise.
    pub fn detect() -> Self {
        if nix::unistd::geteuid().is_root() {
            RuntimeMode::System
        } else {
            RuntimeMode::User
        }
    }
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    mode: RuntimeMode,
    state_dir: PathBuf,
    log_dir: PathBuf,
}

static CONTEXT: OnceLock<RwLock<RuntimeContext>> = OnceLock::new();

fn context_lock() -> &'static RwLock<RuntimeContext> {
    CONTEXT.get_or_init(|| RwLock::new(RuntimeContext::from_mode(RuntimeMode::User)))
}

impl RuntimeContext {
    fn from_mode(mode: RuntimeMode) -> Self {
        match mode {
            RuntimeMode::User => {
                let home = env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/"));
                Self::from_user_home(&home)
            }
            RuntimeMode::System => Self {
                mode,
                state_dir: PathBuf::from("/var/run/cstbox"),
                log_dir: PathBuf::from("/var/log/cstbox"),
            },
        }
    }

    fn from_user_home(home: &Path) -> Self {
        let state_dir = home.join(".local/share/cstbox-modbus");
        let log_dir = state_dir.join("logs");
        Self {
            mode: RuntimeMode::User,
            state_dir,
            log_dir,
        }
    }
}

fn read_context() -> RuntimeContext {
    context_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

/// Sets the runtime mode, re-reading `HOME` for user mode.
pub fn init(mode: RuntimeMode) {
    let mut guard = context_lock()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = RuntimeContext::from_mode(mode);
}

/// Returns the current runtime mode.
pub fn mode() -> RuntimeMode {
    read_context().mode
}

/// State dir (PID and lock files).
pub fn state_dir() -> PathBuf {
    read_context().state_dir
}

/// Log directory for daemon output.
pub fn log_dir() -> PathBuf {
    read_context().log_dir
}
