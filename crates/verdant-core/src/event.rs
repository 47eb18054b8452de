/*!
 * Typed event bus for Verdant.
 *
 * Devices publish outbound messages here; transports and tests subscribe to
 * the message types they care about. Each message type gets its own
 * broadcast channel, created lazily on first publish or subscribe.
 */
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::trace;

use crate::error::{Error, Result};

/// Default number of events buffered per channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

type EventSender<T> = broadcast::Sender<T>;

/// Receiver half handed out by [`EventBus::subscribe`]
pub type EventReceiver<T> = broadcast::Receiver<T>;

/// Event bus for publishing and subscribing to events
#[derive(Debug)]
pub struct EventBus {
    channels: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    channel_capacity: usize,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with a specific channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            channel_capacity: capacity.max(1),
        }
    }

    fn sender<T: Clone + Debug + Send + Sync + 'static>(&self) -> Result<EventSender<T>> {
        let type_id = TypeId::of::<T>();
        let mut channels = self
            .channels
            .lock()
            .map_err(|_| Error::event("Failed to lock channels"))?;

        if let Some(sender) = channels.get(&type_id) {
            return sender
                .downcast_ref::<EventSender<T>>()
                .cloned()
                .ok_or_else(|| Error::event("Failed to downcast sender"));
        }

        let (sender, _) = broadcast::channel(self.channel_capacity);
        channels.insert(type_id, Box::new(sender.clone()));
        Ok(sender)
    }

    /// Publish an event, returning the number of receivers it reached
    ///
    /// Publishing with nobody listening is not an error.
    pub fn publish<T: Clone + Debug + Send + Sync + 'static>(&self, event: T) -> Result<usize> {
        // `send` only fails when no receiver is alive, which may change
        // between any check and the send itself.
        Ok(self.sender::<T>()?.send(event).unwrap_or_else(|_| {
            trace!("No receivers for {}", std::any::type_name::<T>());
            0
        }))
    }

    /// Subscribe to events of a specific type
    pub fn subscribe<T: Clone + Debug + Send + Sync + 'static>(&self) -> Result<EventReceiver<T>> {
        Ok(self.sender::<T>()?.subscribe())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A shared event bus that can be cloned
#[derive(Debug, Clone, Default)]
pub struct SharedEventBus(Arc<EventBus>);

impl SharedEventBus {
    /// Create a new shared event bus
    pub fn new() -> Self {
        Self(Arc::new(EventBus::new()))
    }

    /// Create a new shared event bus with a specific channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Arc::new(EventBus::with_capacity(capacity)))
    }

    /// Publish an event
    pub fn publish<T: Clone + Debug + Send + Sync + 'static>(&self, event: T) -> Result<usize> {
        self.0.publish(event)
    }

    /// Subscribe to events of a specific type
    pub fn subscribe<T: Clone + Debug + Send + Sync + 'static>(&self) -> Result<EventReceiver<T>> {
        self.0.subscribe()
    }
}
