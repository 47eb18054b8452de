/*!
 * Verdant Core
 *
 * Shared building blocks for the Verdant device adapters: identifiers,
 * the typed event bus, configuration loading and logging setup.
 */

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod prelude;
pub mod types;

/// Re-export of dependencies that are part of the public API
pub mod deps {
    pub use serde_json;
    pub use tokio;
    pub use tracing;
    pub use uuid;
}

/// Verdant core crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library initialization
pub fn init() -> Result<(), error::Error> {
    logging::init()?;
    tracing::info!("Verdant Core {} initialized", VERSION);
    Ok(())
}
