/*!
 * Messages exchanged with the cloud transport.
 *
 * Requests arrive from the cloud and are answered with a [`Response`].
 * Devices report local changes with an [`EventMessage`].
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use verdant_core::types::{Id, JsonObject};

/// A request sent by the cloud to one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Target device
    pub device_id: Id,
    /// Action name, e.g. `setMode`
    pub action: String,
    /// Capability instance the request addresses, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    /// Action arguments
    #[serde(default)]
    pub value: JsonObject,
}

impl Request {
    /// Create a request without arguments
    pub fn new(device_id: impl Into<Id>, action: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            action: action.into(),
            instance_id: None,
            value: JsonObject::new(),
        }
    }

    /// Address a capability instance
    pub fn with_instance(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    /// Add an argument
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.value.insert(key.into(), value.into());
        self
    }

    /// Instance id, or the empty string when the request has none
    pub fn instance(&self) -> &str {
        self.instance_id.as_deref().unwrap_or_default()
    }
}

/// The device's answer to a [`Request`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// Responding device
    pub device_id: Id,
    /// Action being answered
    pub action: String,
    /// Echo of the request's instance id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    /// Whether the device accepted the request
    pub success: bool,
    /// Human readable outcome
    pub message: String,
    /// Resulting state
    #[serde(default)]
    pub value: JsonObject,
}

impl Response {
    /// Successful response carrying the resulting state
    pub fn ok(request: &Request, value: JsonObject) -> Self {
        Self {
            device_id: request.device_id.clone(),
            action: request.action.clone(),
            instance_id: request.instance_id.clone(),
            success: true,
            message: "OK".to_string(),
            value,
        }
    }

    /// Failed response with a reason
    pub fn failed(request: &Request, message: impl Into<String>) -> Self {
        Self {
            device_id: request.device_id.clone(),
            action: request.action.clone(),
            instance_id: request.instance_id.clone(),
            success: false,
            message: message.into(),
            value: JsonObject::new(),
        }
    }
}

/// Why an event was raised
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Cause {
    /// Someone touched the device
    #[default]
    PhysicalInteraction,
    /// A scheduled measurement
    PeriodicPoll,
    /// Triggered from an app
    AppInteraction,
    /// A notification meant for the user
    #[serde(rename = "ALERT")]
    AlertNotification,
}

/// Marker serialized as the message `type`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Device-originated event
    #[default]
    Event,
}

/// An event raised by a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    /// Always [`MessageType::Event`]
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Originating device
    pub device_id: Id,
    /// Action name, e.g. `setRangeValue`
    pub action: String,
    /// Capability instance, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    /// Why the event was raised
    pub cause: Cause,
    /// Event payload
    pub value: JsonObject,
    /// Creation time, unix seconds on the wire
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    /// Token the cloud uses to correlate acknowledgements
    pub reply_token: Uuid,
}

impl EventMessage {
    /// Create an event stamped with the current time and a fresh reply token
    pub fn new(
        device_id: Id,
        action: impl Into<String>,
        instance_id: Option<String>,
        cause: Cause,
        value: JsonObject,
    ) -> Self {
        Self {
            message_type: MessageType::Event,
            device_id,
            action: action.into(),
            instance_id: instance_id.filter(|instance| !instance.is_empty()),
            cause,
            value,
            created_at: Utc::now(),
            reply_token: Uuid::new_v4(),
        }
    }
}
