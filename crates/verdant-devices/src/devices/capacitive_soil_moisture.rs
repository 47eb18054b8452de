/*!
 * Capacitive soil-moisture sensor.
 *
 * A sensor stuck in a plant pot. It exposes a watering mode, a moisture
 * range and push notifications to the cloud.
 */
use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use verdant_core::config::EventLimitConfig;
use verdant_core::event::{EventReceiver, SharedEventBus};

use crate::capabilities::{ModeController, PushNotification, RangeController};
use crate::device::{BaseDevice, Device, DeviceInfo, Result};
use crate::limiter::EventLimiter;
use crate::message::{EventMessage, Request, Response};

/// Type tag the cloud uses for this device
pub const DEVICE_TYPE: &str = "CapacitiveSoilMoistureSensor";

/// Capacitive soil-moisture sensor device
#[derive(Debug)]
pub struct CapacitiveSoilMoistureSensor {
    base: BaseDevice,
    mode: Arc<ModeController>,
    range: Arc<RangeController>,
    push: Arc<PushNotification>,
}

impl CapacitiveSoilMoistureSensor {
    /// Create a sensor with the default event limits
    pub fn new(device_id: &str) -> Result<Self> {
        Self::with_limits(device_id, &EventLimitConfig::default())
    }

    /// Create a sensor with custom event limits
    pub fn with_limits(device_id: &str, limits: &EventLimitConfig) -> Result<Self> {
        Self::with_event_bus(device_id, limits, SharedEventBus::new())
    }

    /// Create a sensor publishing on a shared event bus
    pub fn with_event_bus(
        device_id: &str,
        limits: &EventLimitConfig,
        event_bus: SharedEventBus,
    ) -> Result<Self> {
        let mut base = BaseDevice::with_event_bus(device_id, DEVICE_TYPE, event_bus)?;

        let mode = Arc::new(ModeController::new(
            base.event_publisher(),
            EventLimiter::new(limits.state()),
        ));
        let range = Arc::new(RangeController::new(
            base.event_publisher(),
            EventLimiter::new(limits.state()),
        ));
        let push = Arc::new(PushNotification::new(
            base.event_publisher(),
            EventLimiter::new(limits.sensor_value()),
        ));

        base.register_capability(mode.clone())?;
        base.register_capability(range.clone())?;
        base.register_capability(push.clone())?;

        debug!(device_id, "Created {}", DEVICE_TYPE);
        Ok(Self {
            base,
            mode,
            range,
            push,
        })
    }

    /// Set the human readable name
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.base.set_name(name);
        self
    }

    /// The watering mode capability
    pub fn mode_controller(&self) -> &ModeController {
        &self.mode
    }

    /// The moisture range capability
    pub fn range_controller(&self) -> &RangeController {
        &self.range
    }

    /// The push notification capability
    pub fn push_notification(&self) -> &PushNotification {
        &self.push
    }
}

#[async_trait]
impl Device for CapacitiveSoilMoistureSensor {
    fn info(&self) -> &DeviceInfo {
        self.base.info()
    }

    async fn handle_request(&self, request: &Request) -> Result<Response> {
        self.base.handle_request(request).await
    }

    fn subscribe_events(&self) -> Result<EventReceiver<EventMessage>> {
        self.base.subscribe_events()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceCapability, DeviceError};
    use crate::message::Cause;

    #[test]
    fn test_reports_id_and_type() -> Result<()> {
        let sensor = CapacitiveSoilMoistureSensor::new("5dc1564130xxxxxxxxxxxxxx")?;
        assert_eq!(sensor.id().as_str(), "5dc1564130xxxxxxxxxxxxxx");
        assert_eq!(sensor.device_type(), "CapacitiveSoilMoistureSensor");
        assert_eq!(sensor.name(), None);
        Ok(())
    }

    #[test]
    fn test_rejects_empty_id() {
        assert!(matches!(
            CapacitiveSoilMoistureSensor::new(""),
            Err(DeviceError::InvalidDeviceId(_))
        ));
    }

    #[test]
    fn test_capabilities() -> Result<()> {
        let sensor = CapacitiveSoilMoistureSensor::new("dev-1")?;
        assert_eq!(
            sensor.capabilities(),
            &[
                DeviceCapability::ModeController,
                DeviceCapability::RangeController,
                DeviceCapability::PushNotification,
            ]
        );
        Ok(())
    }

    #[test]
    fn test_with_name() -> Result<()> {
        let sensor =
            CapacitiveSoilMoistureSensor::new("dev-1")?.with_name(Some("Basil".to_string()));
        assert_eq!(sensor.name(), Some("Basil"));
        Ok(())
    }

    #[tokio::test]
    async fn test_routes_requests_to_capabilities() -> Result<()> {
        let sensor = CapacitiveSoilMoistureSensor::new("dev-1")?;
        sensor.mode_controller().on_set_mode(|_, _, _| true)?;
        sensor.range_controller().on_range_value(|_, _, _| true)?;

        let mode = Request::new("dev-1", "setMode").with_value("mode", "Auto");
        assert!(sensor.handle_request(&mode).await?.success);

        let range = Request::new("dev-1", "setRangeValue").with_value("rangeValue", 55);
        assert!(sensor.handle_request(&range).await?.success);

        let unknown = Request::new("dev-1", "setPowerState").with_value("state", "On");
        assert!(!sensor.handle_request(&unknown).await?.success);
        Ok(())
    }

    #[test]
    fn test_events_reach_subscribers() -> Result<()> {
        let sensor = CapacitiveSoilMoistureSensor::new("dev-1")?;
        let mut events = sensor.subscribe_events()?;

        sensor
            .range_controller()
            .send_range_value_event("moisture", 48.0, Cause::PeriodicPoll)?;
        sensor.push_notification().send_push_notification("Water me")?;

        assert_eq!(events.try_recv().expect("range event").action, "setRangeValue");
        assert_eq!(events.try_recv().expect("push event").action, "pushNotification");
        Ok(())
    }
}
