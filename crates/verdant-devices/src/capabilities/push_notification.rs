/*!
 * Push notification capability.
 *
 * Outbound only: the device asks the cloud to show a message to the user,
 * e.g. "Soil is dry, water the basil".
 */
use async_trait::async_trait;
use serde_json::Value as JsonValue;

use verdant_core::types::JsonObject;

use super::{unexpected_action, Capability};
use crate::device::{DeviceCapability, DeviceError, EventPublisher, Result};
use crate::limiter::EventLimiter;
use crate::message::{Cause, Request, Response};

/// Action raised for notifications
pub const PUSH_NOTIFICATION: &str = "pushNotification";

/// Push notification capability
#[derive(Debug)]
pub struct PushNotification {
    publisher: EventPublisher,
    limiter: EventLimiter,
}

impl PushNotification {
    /// Create the capability publishing through `publisher`
    pub fn new(publisher: EventPublisher, limiter: EventLimiter) -> Self {
        Self { publisher, limiter }
    }

    /// Send a notification to the user
    ///
    /// Returns `Ok(false)` when the notification was rate limited.
    pub fn send_push_notification(&self, text: &str) -> Result<bool> {
        if text.trim().is_empty() {
            return Err(DeviceError::InvalidValue(
                "notification text must not be empty".to_string(),
            ));
        }

        let mut value = JsonObject::new();
        value.insert("alert".to_string(), JsonValue::from(text));
        self.publisher.send(
            &self.limiter,
            PUSH_NOTIFICATION,
            "",
            Cause::AlertNotification,
            value,
        )
    }
}

#[async_trait]
impl Capability for PushNotification {
    fn capability(&self) -> DeviceCapability {
        DeviceCapability::PushNotification
    }

    fn actions(&self) -> &'static [&'static str] {
        &[]
    }

    async fn handle_request(&self, request: &Request) -> Result<Response> {
        Err(unexpected_action("PushNotification", request))
    }
}
