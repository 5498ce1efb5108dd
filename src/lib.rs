//! Modbus device support for the CSTBox building-automation framework.
//!
//! The crate provides the `modbusctl` service control wrapper, which starts,
//! stops and queries the `modbussvc` daemon the way an init script would, the
//! daemon itself, and the shared Modbus definitions: register descriptions
//! with their value codecs and the device sub-network service model.

/// CLI interfaces.
pub mod cli;

/// Configuration management.
pub mod config;

/// Shared constants and defaults.
pub mod constants;

/// Daemon lifecycle control.
pub mod daemon;

/// Error handling.
pub mod error;

/// Logs management.
pub mod logs;

/// Modbus device sub-network model.
pub mod network;

/// Modbus register descriptions.
pub mod register;

/// Runtime directories.
pub mod runtime;

/// Daemon body.
pub mod service;

/// Status reporting.
pub mod status;

#[doc(hidden)]
pub mod test_utils;
