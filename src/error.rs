//! Error handling for cstbox-modbus.
use thiserror::Error;

/// Defines all possible errors that can occur while controlling the Modbus daemon.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Error reading or accessing a configuration file.
    #[error("Failed to read config file: {0}")]
    ConfigReadError(#[from] std::io::Error),

    /// Error parsing YAML configuration.
    #[error("Invalid YAML format: {0}")]
    ConfigParseError(#[from] serde_yaml::Error),

    /// A `${VAR}` reference in the configuration has no value in the environment.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// A duration setting could not be parsed.
    #[error("Invalid duration '{0}'")]
    InvalidDuration(String),

    /// Error spawning the daemon process.
    #[error("Failed to start service '{service}': {source}")]
    ServiceStartError {
        /// The service name that failed to start.
        service: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// The daemon was spawned but exited before the startup grace period elapsed.
    #[error("Service '{service}' exited during startup with status {status}")]
    ServiceExitedEarly {
        /// The service name.
        service: String,
        /// Human-readable exit status.
        status: String,
    },

    /// Error stopping the daemon process.
    #[error("Failed to stop service '{service}': {source}")]
    ServiceStopError {
        /// The service name that failed to stop.
        service: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Error when a required dependency service is not running.
    #[error(
        "Service '{service}' is waiting for an unavailable dependency: '{dependency}'"
    )]
    DependencyError {
        /// The service that is waiting.
        service: String,
        /// The missing dependency.
        dependency: String,
    },

    /// Error acquiring the controller lock file.
    #[error("Failed to lock '{path}': {source}")]
    LockError {
        /// Lock file path.
        path: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Error for PID file.
    #[error("PID file error: {0}")]
    PidFileError(#[from] PidFileError),

    /// Error for the device network definition.
    #[error("Network definition error: {0}")]
    NetworkError(#[from] NetworkError),

    /// Error for poisoned mutex.
    #[error("Mutex is poisoned: {0}")]
    MutexPoisonError(String),
}

impl<T> From<std::sync::PoisonError<T>> for ControlError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        ControlError::MutexPoisonError(err.to_string())
    }
}

/// Error type for PID file operations.
#[derive(Debug, Error)]
pub enum PidFileError {
    /// Error reading or writing a PID file.
    #[error("PID file I/O failed for {path}: {source}")]
    Io {
        /// PID file path.
        path: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// The PID file does not hold a positive decimal PID.
    #[error("Malformed PID file {path}: '{content}'")]
    Malformed {
        /// PID file path.
        path: String,
        /// Offending content, trimmed.
        content: String,
    },
}

/// Error type for register description and value conversion.
#[derive(Debug, Error, PartialEq)]
pub enum RegisterError {
    /// Register size outside the supported 1..=4 words.
    #[error("Register size {0} is not supported (expected 1 to 4 words)")]
    InvalidSize(u16),

    /// Word count handed to a decoder does not match the register size.
    #[error("Register at {addr:#06x} expects {expected} words, got {actual}")]
    WordCountMismatch {
        /// Register address.
        addr: u16,
        /// Declared register size.
        expected: u16,
        /// Number of words provided.
        actual: usize,
    },

    /// The register spans past the last addressable register.
    #[error("Register at {addr:#06x} with size {size} overflows the address space")]
    AddressOverflow {
        /// Register address.
        addr: u16,
        /// Declared register size.
        size: u16,
    },

    /// The codec cannot be applied to a register of this size.
    #[error("Codec '{codec}' cannot be used with a {size}-word register")]
    CodecSizeMismatch {
        /// Codec name.
        codec: String,
        /// Declared register size.
        size: u16,
    },

    /// Scaling parameters that cannot be inverted.
    #[error("Invalid scaling factor {factor} / offset {offset}")]
    InvalidScale {
        /// Multiplier applied to the raw value.
        factor: f64,
        /// Offset added after scaling.
        offset: f64,
    },
}

/// Error type for the Modbus device network model.
#[derive(Debug, Error, PartialEq)]
pub enum NetworkError {
    /// Coordinator type not handled by this service.
    #[error("Coordinator '{id}' has unsupported type '{coord_type}'")]
    UnsupportedCoordinatorType {
        /// Coordinator id.
        id: String,
        /// Declared coordinator type.
        coord_type: String,
    },

    /// A coordinator with the same id is already registered.
    #[error("Coordinator '{0}' is already registered")]
    DuplicateCoordinator(String),

    /// Coordinator lookup failed.
    #[error("Unknown coordinator '{0}'")]
    UnknownCoordinator(String),

    /// Device unit address outside 1..=247.
    #[error("Device '{device}' has invalid unit address {address}")]
    InvalidAddress {
        /// Device id.
        device: String,
        /// Declared unit address.
        address: u8,
    },

    /// Two devices on the same bus share an id or a unit address.
    #[error("Coordinator '{coordinator}' declares device '{device}' twice")]
    DuplicateDevice {
        /// Coordinator id.
        coordinator: String,
        /// Device id or address.
        device: String,
    },
}
