//! Constants and default values shared by the controller and the daemon.
//!
//! Everything the init script used to hard-code (daemon path, service name,
//! stop timings) lives here so that configuration defaults and tests agree.

use std::time::Duration;

// ============================================================================
// Service Identity
// ============================================================================

/// Name under which the device network service is published.
pub const SERVICE_NAME: &str = "ModbusDriver";

/// Coordinator types handled by the Modbus device network service.
pub const COORDINATOR_TYPES: &[&str] = &["modbus"];

/// Name used for PID, lock and log files of the managed daemon.
pub const DAEMON_NAME: &str = "modbussvc";

/// Default daemon executable path when the configuration omits it.
pub const DEFAULT_DAEMON_PATH: &str = "/opt/cstbox/bin/modbussvc";

// ============================================================================
// File System Constants
// ============================================================================

/// Configuration file looked up in the working directory first.
pub const DEFAULT_CONFIG_FILE: &str = "modbus.yaml";

/// System-wide configuration file used when no local one exists.
pub const SYSTEM_CONFIG_FILE: &str = "/etc/cstbox/modbus.yaml";

/// Extension of the PID file stored in the state directory.
pub const PID_FILE_EXTENSION: &str = "pid";

/// Lock file suffix guarding start/stop against concurrent invocations.
pub const LOCK_FILE_EXTENSION: &str = "lock";

// ============================================================================
// Process Management Timing
// ============================================================================

/// Number of liveness checks after SIGTERM before escalating to SIGKILL.
pub const STOP_CHECKS: usize = 10;

/// Interval between liveness checks while stopping.
pub const PROCESS_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Time a freshly spawned daemon must stay alive to count as started.
pub const DEFAULT_STARTUP_GRACE: Duration = Duration::from_millis(500);

// ============================================================================
// LSB Status Exit Codes
// ============================================================================

/// Program is running.
pub const STATUS_RUNNING: i32 = 0;

/// Program is dead and the PID file exists.
pub const STATUS_DEAD_PID_FILE: i32 = 1;

/// Program is not running.
pub const STATUS_NOT_RUNNING: i32 = 3;

// ============================================================================
// Modbus Limits
// ============================================================================

/// Lowest assignable unit address on a serial bus.
pub const MIN_UNIT_ADDRESS: u8 = 1;

/// Highest assignable unit address on a serial bus.
pub const MAX_UNIT_ADDRESS: u8 = 247;

/// Largest register value width handled by the register codecs, in words.
pub const MAX_REGISTER_WORDS: u16 = 4;

/// Serial speed used when a coordinator omits it.
pub const DEFAULT_BAUDRATE: u32 = 9600;
