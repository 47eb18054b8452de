/*!
 * Mode controller capability.
 *
 * Answers `setMode` and reports local mode changes. A device may expose
 * several independent modes, each addressed by its instance id.
 */
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use verdant_core::types::{Id, JsonObject};

use super::{lock_poisoned, unexpected_action, Capability};
use crate::device::{DeviceCapability, DeviceError, EventPublisher, Result};
use crate::limiter::EventLimiter;
use crate::message::{Cause, Request, Response};

/// Action answered and raised by the mode controller
pub const SET_MODE: &str = "setMode";

/// Called with the device id, instance id and requested mode.
///
/// The callback may rewrite the mode; returning `false` rejects the request.
pub type SetModeCallback = Arc<dyn Fn(&Id, &str, &mut String) -> bool + Send + Sync>;

/// Mode controller
pub struct ModeController {
    publisher: EventPublisher,
    limiter: EventLimiter,
    on_set_mode: RwLock<Option<SetModeCallback>>,
    modes: RwLock<HashMap<String, String>>,
}

impl fmt::Debug for ModeController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModeController")
            .field("device_id", self.publisher.device_id())
            .field("limit", &self.limiter.interval())
            .field("modes", &self.modes)
            .finish()
    }
}

impl ModeController {
    /// Create a mode controller publishing through `publisher`
    pub fn new(publisher: EventPublisher, limiter: EventLimiter) -> Self {
        Self {
            publisher,
            limiter,
            on_set_mode: RwLock::new(None),
            modes: RwLock::new(HashMap::new()),
        }
    }

    /// Install the `setMode` callback, replacing any previous one
    pub fn on_set_mode<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&Id, &str, &mut String) -> bool + Send + Sync + 'static,
    {
        let mut slot = self
            .on_set_mode
            .write()
            .map_err(|_| lock_poisoned("mode callback"))?;
        *slot = Some(Arc::new(callback));
        Ok(())
    }

    /// Last mode accepted or reported for `instance`
    pub fn current_mode(&self, instance: &str) -> Option<String> {
        self.modes.read().ok()?.get(instance).cloned()
    }

    /// Report a mode change that happened on the device
    ///
    /// Returns `Ok(false)` when the event was rate limited.
    pub fn send_mode_event(&self, instance: &str, mode: &str, cause: Cause) -> Result<bool> {
        if mode.is_empty() {
            return Err(DeviceError::InvalidValue("mode must not be empty".to_string()));
        }
        self.remember(instance, mode)?;

        let mut value = JsonObject::new();
        value.insert("mode".to_string(), JsonValue::from(mode));
        self.publisher
            .send(&self.limiter, SET_MODE, instance, cause, value)
    }

    fn remember(&self, instance: &str, mode: &str) -> Result<()> {
        self.modes
            .write()
            .map_err(|_| lock_poisoned("modes"))?
            .insert(instance.to_string(), mode.to_string());
        Ok(())
    }

    fn set_mode(&self, request: &Request) -> Result<Response> {
        let mut mode = request
            .value
            .get("mode")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                DeviceError::InvalidRequest(format!("{} requires a string \"mode\"", SET_MODE))
            })?
            .to_string();
        let instance = request.instance();

        // Cloned out so the callback may replace itself.
        let callback = self
            .on_set_mode
            .read()
            .map_err(|_| lock_poisoned("mode callback"))?
            .clone();
        let Some(callback) = callback else {
            warn!(device_id = %request.device_id, "No callback registered for {}", SET_MODE);
            return Ok(Response::failed(
                request,
                format!("no callback registered for {}", SET_MODE),
            ));
        };
        let accepted = callback(self.publisher.device_id(), instance, &mut mode);

        if !accepted {
            debug!(device_id = %request.device_id, instance, mode = %mode, "Mode change rejected");
            return Ok(Response::failed(request, "mode change rejected"));
        }

        self.remember(instance, &mode)?;
        info!(device_id = %request.device_id, instance, mode = %mode, "Mode changed");

        let mut value = JsonObject::new();
        value.insert("mode".to_string(), JsonValue::from(mode));
        Ok(Response::ok(request, value))
    }
}

#[async_trait]
impl Capability for ModeController {
    fn capability(&self) -> DeviceCapability {
        DeviceCapability::ModeController
    }

    fn actions(&self) -> &'static [&'static str] {
        &[SET_MODE]
    }

    async fn handle_request(&self, request: &Request) -> Result<Response> {
        match request.action.as_str() {
            SET_MODE => self.set_mode(request),
            _ => Err(unexpected_action("ModeController", request)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use verdant_core::event::SharedEventBus;

    fn controller(limit: Duration) -> (ModeController, SharedEventBus) {
        let bus = SharedEventBus::new();
        let publisher = EventPublisher::new(Id::from("dev-1"), bus.clone());
        (ModeController::new(publisher, EventLimiter::new(limit)), bus)
    }

    fn set_mode_request(mode: &str) -> Request {
        Request::new("dev-1", SET_MODE)
            .with_instance("wateringMode")
            .with_value("mode", mode)
    }

    #[tokio::test]
    async fn test_set_mode_without_callback_fails() -> Result<()> {
        let (modes, _) = controller(Duration::ZERO);
        let response = modes.handle_request(&set_mode_request("Auto")).await?;
        assert!(!response.success);
        assert_eq!(modes.current_mode("wateringMode"), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_set_mode_callback_can_rewrite() -> Result<()> {
        let (modes, _) = controller(Duration::ZERO);
        modes.on_set_mode(|device_id, instance, mode| {
            assert_eq!(device_id.as_str(), "dev-1");
            assert_eq!(instance, "wateringMode");
            *mode = mode.to_uppercase();
            true
        })?;

        let response = modes.handle_request(&set_mode_request("auto")).await?;
        assert!(response.success);
        assert_eq!(response.value["mode"], serde_json::json!("AUTO"));
        assert_eq!(modes.current_mode("wateringMode").as_deref(), Some("AUTO"));
        Ok(())
    }

    #[tokio::test]
    async fn test_set_mode_rejected() -> Result<()> {
        let (modes, _) = controller(Duration::ZERO);
        modes.on_set_mode(|_, _, mode| *mode != "Flood")?;

        let response = modes.handle_request(&set_mode_request("Flood")).await?;
        assert!(!response.success);
        assert_eq!(modes.current_mode("wateringMode"), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_callback_can_replace_itself() -> Result<()> {
        let modes = Arc::new(controller(Duration::ZERO).0);
        let inner = modes.clone();
        modes.on_set_mode(move |_, _, _| inner.on_set_mode(|_, _, _| false).is_ok())?;

        let first = modes.handle_request(&set_mode_request("Auto")).await?;
        assert!(first.success);

        let second = modes.handle_request(&set_mode_request("Manual")).await?;
        assert!(!second.success);
        assert_eq!(modes.current_mode("wateringMode").as_deref(), Some("Auto"));
        Ok(())
    }

    #[tokio::test]
    async fn test_set_mode_requires_mode_field() {
        let (modes, _) = controller(Duration::ZERO);
        let request = Request::new("dev-1", SET_MODE).with_value("mode", 3);
        let result = modes.handle_request(&request).await;
        assert!(matches!(result, Err(DeviceError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_send_mode_event() -> Result<()> {
        let (modes, bus) = controller(Duration::from_secs(60));
        let mut events = bus.subscribe::<crate::message::EventMessage>()?;

        assert!(modes.send_mode_event("wateringMode", "Manual", Cause::PhysicalInteraction)?);
        assert!(!modes.send_mode_event("wateringMode", "Auto", Cause::PhysicalInteraction)?);
        assert_eq!(modes.current_mode("wateringMode").as_deref(), Some("Auto"));

        let event = events.try_recv().expect("first event published");
        assert_eq!(event.action, SET_MODE);
        assert_eq!(event.value["mode"], serde_json::json!("Manual"));
        assert!(events.try_recv().is_err());
        Ok(())
    }

    #[test]
    fn test_send_mode_event_rejects_empty_mode() {
        let (modes, _) = controller(Duration::ZERO);
        assert!(matches!(
            modes.send_mode_event("i", "", Cause::default()),
            Err(DeviceError::InvalidValue(_))
        ));
    }
}
