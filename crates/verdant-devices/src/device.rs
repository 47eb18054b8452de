/*!
 * Device trait and core device abstractions.
 *
 * A device is an identifier, a type tag, and a table mapping each action it
 * understands to the capability that handles it.
 */
use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, Instrument};

use verdant_core::{
    error::Error as CoreError,
    event::{EventReceiver, SharedEventBus},
    logging::device_span,
    types::{Id, JsonObject},
};

use crate::capabilities::Capability;
use crate::limiter::EventLimiter;
use crate::message::{Cause, EventMessage, Request, Response};

/// Error type for device operations
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The device identifier is empty or malformed
    #[error("Invalid device id: {0:?}")]
    InvalidDeviceId(String),

    /// A request was delivered to the wrong device
    #[error("Request for device {actual} delivered to device {expected}")]
    DeviceMismatch {
        /// The device that received the request
        expected: Id,
        /// The device the request was addressed to
        actual: Id,
    },

    /// No device with this id is registered
    #[error("Device not found: {0}")]
    DeviceNotFound(Id),

    /// The device exists but is not of the requested concrete type
    #[error("Device {id} is a {device_type}")]
    DeviceTypeMismatch {
        /// The device looked up
        id: Id,
        /// Its actual device type
        device_type: String,
    },

    /// A device with this id is already registered
    #[error("Device already registered: {0}")]
    AlreadyRegistered(Id),

    /// No adapter exists for this device type
    #[error("Unsupported device type: {0}")]
    UnsupportedDeviceType(String),

    /// The request is missing arguments or has the wrong shape
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A value passed by the application is not acceptable
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// An internal lock was poisoned by a panicking thread
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

/// Result type for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Behavior a device can expose to the cloud
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceCapability {
    /// Named modes, switched with `setMode`
    ModeController,
    /// Numeric ranges, set with `setRangeValue` or `adjustRangeValue`
    RangeController,
    /// User-facing push notifications
    PushNotification,
    /// Custom capability
    Custom(String),
}

/// Device information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// The device ID
    pub id: Id,
    /// Optional human readable name
    pub name: Option<String>,
    /// The device type tag used by the cloud for capability negotiation
    pub device_type: String,
    /// The device capabilities
    pub capabilities: Vec<DeviceCapability>,
}

/// The core device trait
#[async_trait]
pub trait Device: Send + Sync + Debug {
    /// Get the device information
    fn info(&self) -> &DeviceInfo;

    /// Get the device ID
    fn id(&self) -> &Id {
        &self.info().id
    }

    /// Get the device name
    fn name(&self) -> Option<&str> {
        self.info().name.as_deref()
    }

    /// Get the device type
    fn device_type(&self) -> &str {
        &self.info().device_type
    }

    /// Get the device capabilities
    fn capabilities(&self) -> &[DeviceCapability] {
        &self.info().capabilities
    }

    /// Check if the device has a specific capability
    fn has_capability(&self, capability: &DeviceCapability) -> bool {
        self.capabilities().contains(capability)
    }

    /// Handle a request from the cloud
    ///
    /// Requests the device does not understand, or that a callback rejects,
    /// produce a failed [`Response`] rather than an error.
    async fn handle_request(&self, request: &Request) -> Result<Response>;

    /// Subscribe to the events this device raises
    fn subscribe_events(&self) -> Result<EventReceiver<EventMessage>>;

    /// Upcast for recovering the concrete device behind an `Arc<dyn Device>`
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Sends events on behalf of one device
#[derive(Debug, Clone)]
pub struct EventPublisher {
    device_id: Id,
    event_bus: SharedEventBus,
}

impl EventPublisher {
    /// Create a publisher for `device_id` on `event_bus`
    pub fn new(device_id: Id, event_bus: SharedEventBus) -> Self {
        Self {
            device_id,
            event_bus,
        }
    }

    /// The device events are attributed to
    pub fn device_id(&self) -> &Id {
        &self.device_id
    }

    /// Publish an event unless `limiter` says it is too soon
    ///
    /// Returns `Ok(false)` when the event was dropped by the limiter.
    pub fn send(
        &self,
        limiter: &EventLimiter,
        action: &str,
        instance_id: &str,
        cause: Cause,
        value: JsonObject,
    ) -> Result<bool> {
        let key = format!("{}:{}", action, instance_id);
        if !limiter.check(&key) {
            return Ok(false);
        }

        let event = EventMessage::new(
            self.device_id.clone(),
            action,
            Some(instance_id.to_string()),
            cause,
            value,
        );
        let receivers = self.event_bus.publish(event)?;
        trace!(device_id = %self.device_id, action, receivers, "Event published");
        Ok(true)
    }
}

/// Base implementation for devices
///
/// Concrete devices wrap a `BaseDevice`, attach their capabilities during
/// construction and delegate [`Device`] to it.
#[derive(Debug)]
pub struct BaseDevice {
    info: DeviceInfo,
    event_bus: SharedEventBus,
    handlers: HashMap<String, Arc<dyn Capability>>,
}

impl BaseDevice {
    /// Create a new base device on its own event bus
    pub fn new(device_id: &str, device_type: &str) -> Result<Self> {
        Self::with_event_bus(device_id, device_type, SharedEventBus::new())
    }

    /// Create a new base device publishing on a shared event bus
    pub fn with_event_bus(
        device_id: &str,
        device_type: &str,
        event_bus: SharedEventBus,
    ) -> Result<Self> {
        let id = Id::parse(device_id)
            .map_err(|_| DeviceError::InvalidDeviceId(device_id.to_string()))?;

        Ok(Self {
            info: DeviceInfo {
                id,
                name: None,
                device_type: device_type.to_string(),
                capabilities: Vec::new(),
            },
            event_bus,
            handlers: HashMap::new(),
        })
    }

    /// Set the human readable name
    pub fn set_name(&mut self, name: Option<String>) {
        self.info.name = name;
    }

    /// A publisher that attributes events to this device
    pub fn event_publisher(&self) -> EventPublisher {
        EventPublisher::new(self.info.id.clone(), self.event_bus.clone())
    }

    /// Attach a capability and route its actions to it
    pub fn register_capability(&mut self, capability: Arc<dyn Capability>) -> Result<()> {
        for action in capability.actions() {
            if self.handlers.contains_key(*action) {
                return Err(DeviceError::ConfigurationError(format!(
                    "action {} is already handled on device {}",
                    action, self.info.id
                )));
            }
        }

        for action in capability.actions() {
            self.handlers.insert(action.to_string(), capability.clone());
        }

        let kind = capability.capability();
        if !self.info.capabilities.contains(&kind) {
            self.info.capabilities.push(kind);
        }
        Ok(())
    }

    /// Actions this device dispatches
    pub fn actions(&self) -> Vec<&str> {
        let mut actions: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        actions.sort_unstable();
        actions
    }

    async fn dispatch(&self, request: &Request) -> Result<Response> {
        match self.handlers.get(&request.action) {
            Some(capability) => {
                debug!(
                    action = %request.action,
                    instance = request.instance(),
                    "Dispatching request"
                );
                capability.handle_request(request).await
            }
            None => {
                debug!(action = %request.action, "No handler for action");
                Ok(Response::failed(
                    request,
                    format!("action {} not supported", request.action),
                ))
            }
        }
    }
}

#[async_trait]
impl Device for BaseDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    async fn handle_request(&self, request: &Request) -> Result<Response> {
        if request.device_id != self.info.id {
            return Err(DeviceError::DeviceMismatch {
                expected: self.info.id.clone(),
                actual: request.device_id.clone(),
            });
        }

        let span = device_span(self.info.id.as_str(), &self.info.device_type);
        self.dispatch(request).instrument(span).await
    }

    fn subscribe_events(&self) -> Result<EventReceiver<EventMessage>> {
        Ok(self.event_bus.subscribe::<EventMessage>()?)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug)]
    struct Echo;

    #[async_trait]
    impl Capability for Echo {
        fn capability(&self) -> DeviceCapability {
            DeviceCapability::Custom("echo".to_string())
        }

        fn actions(&self) -> &'static [&'static str] {
            &["echo"]
        }

        async fn handle_request(&self, request: &Request) -> Result<Response> {
            Ok(Response::ok(request, request.value.clone()))
        }
    }

    #[test]
    fn test_rejects_blank_id() {
        assert!(matches!(
            BaseDevice::new("", "Test"),
            Err(DeviceError::InvalidDeviceId(_))
        ));
        assert!(matches!(
            BaseDevice::new("  ", "Test"),
            Err(DeviceError::InvalidDeviceId(_))
        ));
    }

    #[test]
    fn test_register_capability() -> Result<()> {
        let mut device = BaseDevice::new("dev-1", "Test")?;
        device.register_capability(Arc::new(Echo))?;

        assert_eq!(device.actions(), vec!["echo"]);
        assert!(device.has_capability(&DeviceCapability::Custom("echo".to_string())));

        let duplicate = device.register_capability(Arc::new(Echo));
        assert!(matches!(duplicate, Err(DeviceError::ConfigurationError(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_dispatch() -> Result<()> {
        let mut device = BaseDevice::new("dev-1", "Test")?;
        device.register_capability(Arc::new(Echo))?;

        let request = Request::new("dev-1", "echo").with_value("n", 3);
        let response = device.handle_request(&request).await?;
        assert!(response.success);
        assert_eq!(response.value["n"], serde_json::json!(3));

        let unknown = device.handle_request(&Request::new("dev-1", "reboot")).await?;
        assert!(!unknown.success);
        assert_eq!(unknown.message, "action reboot not supported");
        Ok(())
    }

    #[tokio::test]
    async fn test_dispatch_rejects_other_device() -> Result<()> {
        let device = BaseDevice::new("dev-1", "Test")?;
        let result = device.handle_request(&Request::new("dev-2", "echo")).await;
        assert!(matches!(result, Err(DeviceError::DeviceMismatch { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_publisher_respects_limiter() -> Result<()> {
        let device = BaseDevice::new("dev-1", "Test")?;
        let mut events = device.subscribe_events()?;
        let publisher = device.event_publisher();
        let limiter = EventLimiter::new(Duration::from_secs(60));

        assert!(publisher.send(&limiter, "setMode", "a", Cause::default(), JsonObject::new())?);
        assert!(!publisher.send(&limiter, "setMode", "a", Cause::default(), JsonObject::new())?);

        let event = events.try_recv().expect("one event");
        assert_eq!(event.device_id.as_str(), "dev-1");
        assert_eq!(event.instance_id.as_deref(), Some("a"));
        assert!(events.try_recv().is_err());
        Ok(())
    }
}
