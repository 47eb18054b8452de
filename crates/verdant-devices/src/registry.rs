/*!
 * Device registry for Verdant.
 *
 * Owns every device of the process and routes cloud requests to them by
 * device id. All devices created through the registry publish on its
 * event bus, so a transport only needs one subscription.
 */
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, info};

use verdant_core::config::Config;
use verdant_core::event::{EventReceiver, SharedEventBus};
use verdant_core::types::Id;

use crate::device::{Device, DeviceCapability, DeviceError, DeviceInfo, Result};
use crate::devices::{create_device, CapacitiveSoilMoistureSensor};
use crate::message::{EventMessage, Request, Response};

/// Event types for device registry
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// A device was added to the registry
    DeviceAdded(DeviceInfo),
    /// A device was removed from the registry
    DeviceRemoved(Id),
}

/// Device registry
#[derive(Debug)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<Id, Arc<dyn Device>>>,
    event_bus: SharedEventBus,
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl DeviceRegistry {
    /// Create a new device registry
    pub fn new() -> Self {
        let (event_sender, _) = broadcast::channel(100);
        Self {
            devices: RwLock::new(HashMap::new()),
            event_bus: SharedEventBus::new(),
            event_sender,
        }
    }

    /// Create a registry holding every device declared in `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = Self::new();
        for device_config in &config.devices {
            let device = create_device(device_config, &config.limits, registry.event_bus())?;
            registry.register_shared(device)?;
        }
        info!("Registered {} devices from configuration", config.devices.len());
        Ok(registry)
    }

    /// The bus devices created for this registry should publish on
    pub fn event_bus(&self) -> SharedEventBus {
        self.event_bus.clone()
    }

    fn poisoned() -> DeviceError {
        DeviceError::LockPoisoned("device registry".to_string())
    }

    /// Register a device with the registry
    pub fn register_device<D: Device + 'static>(&self, device: D) -> Result<()> {
        self.register_shared(Arc::new(device))
    }

    /// Register a device that is already shared
    pub fn register_shared(&self, device: Arc<dyn Device>) -> Result<()> {
        let id = device.id().clone();
        let info = device.info().clone();

        let mut devices = self.devices.write().map_err(|_| Self::poisoned())?;
        if devices.contains_key(&id) {
            return Err(DeviceError::AlreadyRegistered(id));
        }

        devices.insert(id.clone(), device);
        let _ = self.event_sender.send(RegistryEvent::DeviceAdded(info));
        debug!("Registered device with ID {}", id);

        Ok(())
    }

    /// Unregister a device from the registry
    pub fn unregister_device(&self, id: &Id) -> Result<Arc<dyn Device>> {
        let mut devices = self.devices.write().map_err(|_| Self::poisoned())?;
        let device = devices
            .remove(id)
            .ok_or_else(|| DeviceError::DeviceNotFound(id.clone()))?;

        let _ = self.event_sender.send(RegistryEvent::DeviceRemoved(id.clone()));
        debug!("Unregistered device with ID {}", id);

        Ok(device)
    }

    /// Get a device by ID
    pub fn get_device(&self, id: &Id) -> Result<Arc<dyn Device>> {
        let devices = self.devices.read().map_err(|_| Self::poisoned())?;
        devices
            .get(id)
            .cloned()
            .ok_or_else(|| DeviceError::DeviceNotFound(id.clone()))
    }

    /// Get a device by ID as its concrete type
    ///
    /// Callbacks live on the concrete capabilities, so this is how an
    /// application reaches a device the registry built from configuration.
    pub fn get_device_as<D: Device + 'static>(&self, id: &Id) -> Result<Arc<D>> {
        let device = self.get_device(id)?;
        let device_type = device.device_type().to_string();
        device
            .into_any()
            .downcast::<D>()
            .map_err(|_| DeviceError::DeviceTypeMismatch {
                id: id.clone(),
                device_type,
            })
    }

    /// Get a soil-moisture sensor by ID
    pub fn get_sensor(&self, id: &Id) -> Result<Arc<CapacitiveSoilMoistureSensor>> {
        self.get_device_as(id)
    }

    /// Get all registered devices
    pub fn get_devices(&self) -> Result<Vec<Arc<dyn Device>>> {
        let devices = self.devices.read().map_err(|_| Self::poisoned())?;
        Ok(devices.values().cloned().collect())
    }

    /// Get devices by type
    pub fn get_devices_by_type(&self, device_type: &str) -> Result<Vec<Arc<dyn Device>>> {
        let devices = self.devices.read().map_err(|_| Self::poisoned())?;
        Ok(devices
            .values()
            .filter(|device| device.device_type() == device_type)
            .cloned()
            .collect())
    }

    /// Get devices by capability
    pub fn get_devices_by_capability(
        &self,
        capability: &DeviceCapability,
    ) -> Result<Vec<Arc<dyn Device>>> {
        let devices = self.devices.read().map_err(|_| Self::poisoned())?;
        Ok(devices
            .values()
            .filter(|device| device.has_capability(capability))
            .cloned()
            .collect())
    }

    /// Route a cloud request to the device it addresses
    pub async fn handle_request(&self, request: &Request) -> Result<Response> {
        // Lock is released before awaiting the device.
        let device = self.get_device(&request.device_id)?;
        device.handle_request(request).await
    }

    /// Subscribe to events raised by devices publishing on the registry bus
    pub fn subscribe_events(&self) -> Result<EventReceiver<EventMessage>> {
        Ok(self.event_bus.subscribe::<EventMessage>()?)
    }

    /// Subscribe to registry events
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }

    /// Count registered devices
    pub fn count_devices(&self) -> Result<usize> {
        let devices = self.devices.read().map_err(|_| Self::poisoned())?;
        Ok(devices.len())
    }

    /// Check if a device is registered
    pub fn has_device(&self, id: &Id) -> Result<bool> {
        let devices = self.devices.read().map_err(|_| Self::poisoned())?;
        Ok(devices.contains_key(id))
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
