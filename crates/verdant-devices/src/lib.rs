/*!
 * Verdant Devices
 *
 * Device adapters that present local sensors to a cloud IoT service. Each
 * device is composed from capabilities (mode control, range control, push
 * notifications) that answer cloud requests and raise events.
 */

#![warn(missing_docs)]

// Re-export core types
pub use verdant_core::prelude;

pub mod capabilities;
pub mod device;
pub mod devices;
pub mod limiter;
pub mod message;
pub mod registry;

pub use capabilities::{Capability, ModeController, PushNotification, RangeController};
pub use device::{
    BaseDevice, Device, DeviceCapability, DeviceError, DeviceInfo, EventPublisher, Result,
};
pub use devices::{create_device, CapacitiveSoilMoistureSensor};
pub use limiter::EventLimiter;
pub use message::{Cause, EventMessage, Request, Response};
pub use registry::{DeviceRegistry, RegistryEvent};

/// Verdant devices crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the device system
pub fn init() -> std::result::Result<(), verdant_core::error::Error> {
    tracing::info!(
        "Verdant Devices {} initialized, device types: {:?}",
        VERSION,
        devices::supported_device_types()
    );
    Ok(())
}
