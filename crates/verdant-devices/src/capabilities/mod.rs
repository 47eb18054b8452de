/*!
 * Capabilities a device can be composed from.
 *
 * Each capability owns the actions it answers and the events it raises.
 * Devices hold them as handles and dispatch requests through an action table
 * (see [`BaseDevice::register_capability`](crate::device::BaseDevice::register_capability)).
 */
use std::fmt::Debug;

use async_trait::async_trait;

use crate::device::{DeviceCapability, DeviceError, Result};
use crate::message::{Request, Response};

pub mod mode;
pub mod push_notification;
pub mod range;

pub use mode::{ModeController, SetModeCallback};
pub use push_notification::PushNotification;
pub use range::{AdjustRangeValueCallback, RangeController, SetRangeValueCallback};

/// A reusable behavior attached to a device
#[async_trait]
pub trait Capability: Send + Sync + Debug {
    /// Which capability this is
    fn capability(&self) -> DeviceCapability;

    /// Request actions this capability answers
    fn actions(&self) -> &'static [&'static str];

    /// Answer a request for one of [`Capability::actions`]
    async fn handle_request(&self, request: &Request) -> Result<Response>;
}

pub(crate) fn unexpected_action(capability: &str, request: &Request) -> DeviceError {
    DeviceError::InvalidRequest(format!(
        "{} cannot handle action {}",
        capability, request.action
    ))
}

pub(crate) fn lock_poisoned(what: &str) -> DeviceError {
    DeviceError::LockPoisoned(what.to_string())
}
