//! Modbus device sub-network management service.
//!
//! The service owns the coordinators (one per serial bus) declared in the
//! configuration, together with the devices wired on each bus and their
//! register maps. Only coordinators of the `modbus` type are accepted.
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constants::{
    COORDINATOR_TYPES, DEFAULT_BAUDRATE, MAX_UNIT_ADDRESS, MIN_UNIT_ADDRESS,
    SERVICE_NAME,
};
use crate::error::NetworkError;
use crate::register::ModbusRegister;

fn default_baudrate() -> u32 {
    DEFAULT_BAUDRATE
}

/// Device sub-network section of the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkConfig {
    /// Coordinators managed by the service.
    #[serde(default)]
    pub coordinators: Vec<CoordinatorConfig>,
}

/// One bus and the devices attached to it.
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    /// Unique coordinator id.
    pub id: String,
    /// Coordinator type; must be one of the service coordinator types.
    #[serde(rename = "type")]
    pub coord_type: String,
    /// Serial device path (e.g. `/dev/ttyUSB0`).
    pub port: String,
    /// Serial line speed.
    #[serde(default = "default_baudrate")]
    pub baudrate: u32,
    /// Devices wired on this bus.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// A Modbus slave on a bus.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Device id, unique on its coordinator.
    pub id: String,
    /// Modbus unit address.
    pub address: u8,
    /// Optional product identifier.
    pub device_type: Option<String>,
    /// Register map, keyed by register name.
    #[serde(default)]
    pub registers: BTreeMap<String, ModbusRegister>,
}

/// Registered device with a validated register map.
#[derive(Debug, Clone)]
pub struct Device {
    id: String,
    address: u8,
    device_type: Option<String>,
    registers: BTreeMap<String, ModbusRegister>,
}

impl Device {
    fn from_config(config: &DeviceConfig) -> Result<Self, NetworkError> {
        if !(MIN_UNIT_ADDRESS..=MAX_UNIT_ADDRESS).contains(&config.address) {
            return Err(NetworkError::InvalidAddress {
                device: config.id.clone(),
                address: config.address,
            });
        }

        Ok(Self {
            id: config.id.clone(),
            address: config.address,
            device_type: config.device_type.clone(),
            registers: config.registers.clone(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn device_type(&self) -> Option<&str> {
        self.device_type.as_deref()
    }

    pub fn registers(&self) -> &BTreeMap<String, ModbusRegister> {
        &self.registers
    }

    pub fn register(&self, name: &str) -> Option<&ModbusRegister> {
        self.registers.get(name)
    }

    /// Registers holding device configuration rather than measurements.
    pub fn configuration_registers(&self) -> impl Iterator<Item = (&String, &ModbusRegister)> {
        self.registers.iter().filter(|(_, reg)| reg.is_configuration())
    }
}

/// A registered bus.
#[derive(Debug, Clone)]
pub struct Coordinator {
    id: String,
    coord_type: String,
    port: String,
    baudrate: u32,
    devices: BTreeMap<String, Device>,
}

impl Coordinator {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn coord_type(&self) -> &str {
        &self.coord_type
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn baudrate(&self) -> u32 {
        self.baudrate
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn device(&self, id: &str) -> Option<&Device> {
        self.devices.get(id)
    }

    /// Looks a device up by its unit address.
    pub fn device_at(&self, address: u8) -> Option<&Device> {
        self.devices.values().find(|dev| dev.address == address)
    }
}

/// Serializable summary of the service state, used for logging and status output.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NetworkSummary {
    pub service: String,
    pub coordinators: Vec<CoordinatorSummary>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CoordinatorSummary {
    pub id: String,
    pub port: String,
    pub devices: Vec<String>,
}

/// Model of the service managing the sub-network built with Modbus products.
#[derive(Debug)]
pub struct ModbusService {
    name: &'static str,
    coord_types: &'static [&'static str],
    coordinators: BTreeMap<String, Coordinator>,
}

impl Default for ModbusService {
    fn default() -> Self {
        Self::new()
    }
}

impl ModbusService {
    /// Creates the service with no coordinator registered.
    pub fn new() -> Self {
        Self {
            name: SERVICE_NAME,
            coord_types: COORDINATOR_TYPES,
            coordinators: BTreeMap::new(),
        }
    }

    /// Creates the service and registers every configured coordinator.
    pub fn from_config(config: &NetworkConfig) -> Result<Self, NetworkError> {
        let mut service = Self::new();
        for coordinator in &config.coordinators {
            service.add_coordinator(coordinator)?;
        }
        Ok(service)
    }

    /// Name under which the service is published.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Coordinator types this service manages.
    pub fn coordinator_types(&self) -> &[&str] {
        self.coord_types
    }

    /// Whether coordinators of `coord_type` are handled here.
    pub fn accepts(&self, coord_type: &str) -> bool {
        self.coord_types.contains(&coord_type)
    }

    /// Validates and registers a coordinator with its devices.
    pub fn add_coordinator(
        &mut self,
        config: &CoordinatorConfig,
    ) -> Result<&Coordinator, NetworkError> {
        if !self.accepts(&config.coord_type) {
            return Err(NetworkError::UnsupportedCoordinatorType {
                id: config.id.clone(),
                coord_type: config.coord_type.clone(),
            });
        }

        if self.coordinators.contains_key(&config.id) {
            return Err(NetworkError::DuplicateCoordinator(config.id.clone()));
        }

        let mut devices = BTreeMap::new();
        let mut addresses = BTreeSet::new();
        for device_config in &config.devices {
            let device = Device::from_config(device_config)?;

            if !addresses.insert(device.address) || devices.contains_key(&device.id) {
                return Err(NetworkError::DuplicateDevice {
                    coordinator: config.id.clone(),
                    device: device.id,
                });
            }

            debug!(
                "Device '{}' at address {} registered on '{}' ({} registers)",
                device.id,
                device.address,
                config.id,
                device.registers.len()
            );
            devices.insert(device.id.clone(), device);
        }

        info!(
            "Coordinator '{}' on {} @ {} bauds registered with {} device(s)",
            config.id,
            config.port,
            config.baudrate,
            devices.len()
        );

        let coordinator = Coordinator {
            id: config.id.clone(),
            coord_type: config.coord_type.clone(),
            port: config.port.clone(),
            baudrate: config.baudrate,
            devices,
        };

        Ok(self
            .coordinators
            .entry(config.id.clone())
            .or_insert(coordinator))
    }

    /// Unregisters a coordinator and its devices.
    pub fn remove_coordinator(&mut self, id: &str) -> Result<Coordinator, NetworkError> {
        self.coordinators
            .remove(id)
            .ok_or_else(|| NetworkError::UnknownCoordinator(id.to_string()))
    }

    pub fn coordinator(&self, id: &str) -> Option<&Coordinator> {
        self.coordinators.get(id)
    }

    pub fn coordinators(&self) -> impl Iterator<Item = &Coordinator> {
        self.coordinators.values()
    }

    /// Looks a device up through its coordinator.
    pub fn device(&self, coordinator: &str, device: &str) -> Result<Option<&Device>, NetworkError> {
        self.coordinators
            .get(coordinator)
            .map(|coord| coord.device(device))
            .ok_or_else(|| NetworkError::UnknownCoordinator(coordinator.to_string()))
    }

    pub fn summary(&self) -> NetworkSummary {
        NetworkSummary {
            service: self.name.to_string(),
            coordinators: self
                .coordinators
                .values()
                .map(|coord| CoordinatorSummary {
                    id: coord.id.clone(),
                    port: coord.port.clone(),
                    devices: coord.devices.keys().cloned().collect(),
                })
                .collect(),
        }
    }
}
