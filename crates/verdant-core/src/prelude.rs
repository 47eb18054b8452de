/*!
 * Prelude module for Verdant Core.
 *
 * Re-exports the types most device code needs.
 */

pub use crate::error::{Error, Result};

pub use crate::types::{number_to_json, Id, JsonObject};

pub use crate::event::{EventBus, EventReceiver, SharedEventBus};

pub use crate::config::{
    Config, ConfigBuilder, DeviceConfig, EventLimitConfig, LoggingConfig, SharedConfig,
};

pub use tracing::{debug, error, info, trace, warn};

pub use crate::init;
