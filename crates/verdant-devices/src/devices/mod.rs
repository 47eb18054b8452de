/*!
 * Device implementations for Verdant.
 *
 * Besides the concrete devices this module holds the factory used to build
 * devices from configuration.
 */
use std::sync::Arc;

use verdant_core::config::{DeviceConfig, EventLimitConfig};
use verdant_core::event::SharedEventBus;

use crate::device::{Device, DeviceError, Result};

pub mod capacitive_soil_moisture;

pub use capacitive_soil_moisture::CapacitiveSoilMoistureSensor;

/// Device types the factory can build
pub fn supported_device_types() -> &'static [&'static str] {
    &[capacitive_soil_moisture::DEVICE_TYPE]
}

/// Build a device from its configuration entry
pub fn create_device(
    config: &DeviceConfig,
    limits: &EventLimitConfig,
    event_bus: SharedEventBus,
) -> Result<Arc<dyn Device>> {
    match config.device_type.as_str() {
        capacitive_soil_moisture::DEVICE_TYPE => {
            let sensor = CapacitiveSoilMoistureSensor::with_event_bus(&config.id, limits, event_bus)?
                .with_name(config.name.clone());
            Ok(Arc::new(sensor))
        }
        other => Err(DeviceError::UnsupportedDeviceType(other.to_string())),
    }
}
