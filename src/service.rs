//! Body of the `modbussvc` daemon.
use std::sync::mpsc::{self, Receiver};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::ControlError;
use crate::network::ModbusService;

/// Routes SIGINT and SIGTERM to the returned channel.
pub fn install_shutdown_handler() -> Result<Receiver<()>, ctrlc::Error> {
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;
    Ok(rx)
}

/// Publishes the device network described by `config`.
pub fn build_service(config: &Config) -> Result<ModbusService, ControlError> {
    let service = ModbusService::from_config(&config.network)?;

    let coordinators = service.coordinators().count();
    if coordinators == 0 {
        warn!("No Modbus coordinator configured; the service will be idle");
    }

    for coordinator in service.coordinators() {
        for device in coordinator.devices() {
            debug!(
                "{}/{}: unit {} ({}), {} register(s)",
                coordinator.id(),
                device.id(),
                device.address(),
                device.device_type().unwrap_or("generic"),
                device.registers().len()
            );
        }
    }

    match serde_json::to_string(&service.summary()) {
        Ok(summary) => debug!("Network summary: {summary}"),
        Err(err) => debug!("Could not serialize network summary: {err}"),
    }

    info!(
        "Service '{}' ready with {coordinators} coordinator(s) of type {:?}",
        service.name(),
        service.coordinator_types()
    );
    Ok(service)
}

/// Runs the service until a shutdown request is received or every sender is gone.
pub fn run_until(config: &Config, shutdown: &Receiver<()>) -> Result<(), ControlError> {
    let service = build_service(config)?;

    if shutdown.recv().is_err() {
        debug!("Shutdown channel closed");
    }

    info!("Service '{}' shutting down", service.name());
    Ok(())
}
