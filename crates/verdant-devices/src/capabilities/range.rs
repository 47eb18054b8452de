/*!
 * Range controller capability.
 *
 * Answers `setRangeValue` and `adjustRangeValue` and reports local value
 * changes. The soil-moisture sensor uses it for its moisture level.
 */
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use verdant_core::types::{number_to_json, Id, JsonObject};

use super::{lock_poisoned, unexpected_action, Capability};
use crate::device::{DeviceCapability, DeviceError, EventPublisher, Result};
use crate::limiter::EventLimiter;
use crate::message::{Cause, Request, Response};

/// Set an absolute value
pub const SET_RANGE_VALUE: &str = "setRangeValue";

/// Change the value by a delta
pub const ADJUST_RANGE_VALUE: &str = "adjustRangeValue";

/// Called with the device id, instance id and requested value.
///
/// The callback may rewrite the value; returning `false` rejects the request.
pub type SetRangeValueCallback = Arc<dyn Fn(&Id, &str, &mut f64) -> bool + Send + Sync>;

/// Called with the device id, instance id and the requested delta.
///
/// The callback must write back the resulting absolute value; returning
/// `false` rejects the request.
pub type AdjustRangeValueCallback = Arc<dyn Fn(&Id, &str, &mut f64) -> bool + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    set: Option<SetRangeValueCallback>,
    adjust: Option<AdjustRangeValueCallback>,
}

/// Range controller
pub struct RangeController {
    publisher: EventPublisher,
    limiter: EventLimiter,
    callbacks: RwLock<Callbacks>,
    values: RwLock<HashMap<String, f64>>,
}

impl fmt::Debug for RangeController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeController")
            .field("device_id", self.publisher.device_id())
            .field("limit", &self.limiter.interval())
            .field("values", &self.values)
            .finish()
    }
}

impl RangeController {
    /// Create a range controller publishing through `publisher`
    pub fn new(publisher: EventPublisher, limiter: EventLimiter) -> Self {
        Self {
            publisher,
            limiter,
            callbacks: RwLock::new(Callbacks::default()),
            values: RwLock::new(HashMap::new()),
        }
    }

    /// Install the `setRangeValue` callback
    pub fn on_range_value<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&Id, &str, &mut f64) -> bool + Send + Sync + 'static,
    {
        self.callbacks
            .write()
            .map_err(|_| lock_poisoned("range callbacks"))?
            .set = Some(Arc::new(callback));
        Ok(())
    }

    /// Install the `adjustRangeValue` callback
    pub fn on_adjust_range_value<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&Id, &str, &mut f64) -> bool + Send + Sync + 'static,
    {
        self.callbacks
            .write()
            .map_err(|_| lock_poisoned("range callbacks"))?
            .adjust = Some(Arc::new(callback));
        Ok(())
    }

    /// Last value accepted or reported for `instance`
    pub fn current_value(&self, instance: &str) -> Option<f64> {
        self.values.read().ok()?.get(instance).copied()
    }

    /// Report a value change measured on the device
    ///
    /// Returns `Ok(false)` when the event was rate limited.
    pub fn send_range_value_event(&self, instance: &str, value: f64, cause: Cause) -> Result<bool> {
        if !value.is_finite() {
            return Err(DeviceError::InvalidValue(format!(
                "range value must be finite, got {}",
                value
            )));
        }
        self.remember(instance, value)?;

        let mut payload = JsonObject::new();
        payload.insert("rangeValue".to_string(), number_to_json(value));
        self.publisher
            .send(&self.limiter, SET_RANGE_VALUE, instance, cause, payload)
    }

    fn remember(&self, instance: &str, value: f64) -> Result<()> {
        self.values
            .write()
            .map_err(|_| lock_poisoned("range values"))?
            .insert(instance.to_string(), value);
        Ok(())
    }

    fn apply(&self, request: &Request, field: &str) -> Result<Response> {
        let mut value = request
            .value
            .get(field)
            .and_then(JsonValue::as_f64)
            .ok_or_else(|| {
                DeviceError::InvalidRequest(format!(
                    "{} requires a numeric \"{}\"",
                    request.action, field
                ))
            })?;
        let instance = request.instance();

        let callback = {
            let callbacks = self
                .callbacks
                .read()
                .map_err(|_| lock_poisoned("range callbacks"))?;
            match request.action.as_str() {
                SET_RANGE_VALUE => callbacks.set.clone(),
                _ => callbacks.adjust.clone(),
            }
        };
        let Some(callback) = callback else {
            warn!(device_id = %request.device_id, "No callback registered for {}", request.action);
            return Ok(Response::failed(
                request,
                format!("no callback registered for {}", request.action),
            ));
        };
        let accepted = callback(self.publisher.device_id(), instance, &mut value);

        if !accepted {
            debug!(device_id = %request.device_id, instance, value, "Range change rejected");
            return Ok(Response::failed(request, "range change rejected"));
        }

        self.remember(instance, value)?;
        info!(device_id = %request.device_id, instance, value, "Range value changed");

        let mut payload = JsonObject::new();
        payload.insert("rangeValue".to_string(), number_to_json(value));
        Ok(Response::ok(request, payload))
    }
}

#[async_trait]
impl Capability for RangeController {
    fn capability(&self) -> DeviceCapability {
        DeviceCapability::RangeController
    }

    fn actions(&self) -> &'static [&'static str] {
        &[SET_RANGE_VALUE, ADJUST_RANGE_VALUE]
    }

    async fn handle_request(&self, request: &Request) -> Result<Response> {
        match request.action.as_str() {
            SET_RANGE_VALUE => self.apply(request, "rangeValue"),
            ADJUST_RANGE_VALUE => self.apply(request, "rangeValueDelta"),
            _ => Err(unexpected_action("RangeController", request)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use verdant_core::event::SharedEventBus;

    use crate::message::EventMessage;

    fn controller(limit: Duration) -> (RangeController, SharedEventBus) {
        let bus = SharedEventBus::new();
        let publisher = EventPublisher::new(Id::from("dev-1"), bus.clone());
        (RangeController::new(publisher, EventLimiter::new(limit)), bus)
    }

    #[tokio::test]
    async fn test_set_range_value() -> Result<()> {
        let (range, _) = controller(Duration::ZERO);
        range.on_range_value(|_, instance, value| {
            assert_eq!(instance, "moistureThreshold");
            *value = value.clamp(0.0, 100.0);
            true
        })?;

        let request = Request::new("dev-1", SET_RANGE_VALUE)
            .with_instance("moistureThreshold")
            .with_value("rangeValue", 140);
        let response = range.handle_request(&request).await?;

        assert!(response.success);
        assert_eq!(response.value["rangeValue"], json!(100));
        assert_eq!(range.current_value("moistureThreshold"), Some(100.0));
        Ok(())
    }

    #[tokio::test]
    async fn test_adjust_range_value_returns_absolute() -> Result<()> {
        let (range, _) = controller(Duration::ZERO);
        let level = Arc::new(Mutex::new(40.0_f64));
        let shared = level.clone();
        range.on_adjust_range_value(move |_, _, delta| {
            let mut level = shared.lock().unwrap();
            *level += *delta;
            *delta = *level;
            true
        })?;

        let request = Request::new("dev-1", ADJUST_RANGE_VALUE).with_value("rangeValueDelta", -2.5);
        let response = range.handle_request(&request).await?;

        assert!(response.success);
        assert_eq!(response.value["rangeValue"], json!(37.5));
        assert_eq!(*level.lock().unwrap(), 37.5);
        Ok(())
    }

    #[tokio::test]
    async fn test_set_range_value_rejected() -> Result<()> {
        let (range, _) = controller(Duration::ZERO);
        range.on_range_value(|_, _, value| *value <= 100.0)?;

        let request = Request::new("dev-1", SET_RANGE_VALUE)
            .with_instance("moistureThreshold")
            .with_value("rangeValue", 140);
        let response = range.handle_request(&request).await?;

        assert!(!response.success);
        assert_eq!(response.message, "range change rejected");
        assert_eq!(range.current_value("moistureThreshold"), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_callback_can_replace_other_callbacks() -> Result<()> {
        let range = Arc::new(controller(Duration::ZERO).0);
        let inner = range.clone();
        range.on_range_value(move |_, _, _| {
            inner.on_range_value(|_, _, _| false).is_ok()
                && inner.on_adjust_range_value(|_, _, _| true).is_ok()
        })?;

        let set = Request::new("dev-1", SET_RANGE_VALUE).with_value("rangeValue", 20);
        assert!(range.handle_request(&set).await?.success);
        assert!(!range.handle_request(&set).await?.success);

        let adjust = Request::new("dev-1", ADJUST_RANGE_VALUE).with_value("rangeValueDelta", 5);
        assert!(range.handle_request(&adjust).await?.success);
        Ok(())
    }

    #[tokio::test]
    async fn test_adjust_requires_delta() {
        let (range, _) = controller(Duration::ZERO);
        let _ = range.on_adjust_range_value(|_, _, _| true);

        let request = Request::new("dev-1", ADJUST_RANGE_VALUE).with_value("rangeValue", 50);
        let result = range.handle_request(&request).await;
        assert!(matches!(result, Err(DeviceError::InvalidRequest(m)) if m.contains("rangeValueDelta")));
    }

    #[tokio::test]
    async fn test_adjust_without_callback_fails() -> Result<()> {
        let (range, _) = controller(Duration::ZERO);
        range.on_range_value(|_, _, _| true)?;

        let request = Request::new("dev-1", ADJUST_RANGE_VALUE).with_value("rangeValueDelta", 1);
        let response = range.handle_request(&request).await?;
        assert!(!response.success);
        Ok(())
    }

    #[tokio::test]
    async fn test_non_numeric_value_is_invalid() {
        let (range, _) = controller(Duration::ZERO);
        let request = Request::new("dev-1", SET_RANGE_VALUE).with_value("rangeValue", "wet");
        let result = range.handle_request(&request).await;
        assert!(matches!(result, Err(DeviceError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_send_range_value_event() -> Result<()> {
        let (range, bus) = controller(Duration::from_secs(60));
        let mut events = bus.subscribe::<EventMessage>()?;

        assert!(range.send_range_value_event("moisture", 63.0, Cause::PeriodicPoll)?);
        assert!(!range.send_range_value_event("moisture", 62.0, Cause::PeriodicPoll)?);
        assert!(range.send_range_value_event("threshold", 30.0, Cause::PhysicalInteraction)?);

        let first = events.try_recv().expect("moisture event");
        assert_eq!(first.action, SET_RANGE_VALUE);
        assert_eq!(first.instance_id.as_deref(), Some("moisture"));
        assert_eq!(first.value["rangeValue"], json!(63));
        assert_eq!(first.cause, Cause::PeriodicPoll);

        let second = events.try_recv().expect("threshold event");
        assert_eq!(second.instance_id.as_deref(), Some("threshold"));
        assert!(events.try_recv().is_err());
        Ok(())
    }

    #[test]
    fn test_send_range_value_event_rejects_nan() {
        let (range, _) = controller(Duration::ZERO);
        assert!(matches!(
            range.send_range_value_event("moisture", f64::NAN, Cause::default()),
            Err(DeviceError::InvalidValue(_))
        ));
    }
}
