/*!
 * Outbound event rate limiting.
 *
 * The cloud drops devices that flood it, so every event kind is throttled to
 * at most one message per interval.
 */
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

/// Per-key minimum interval between events
#[derive(Debug)]
pub struct EventLimiter {
    interval: Duration,
    last_sent: Mutex<HashMap<String, Instant>>,
}

impl EventLimiter {
    /// Create a limiter with the given minimum interval
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// The configured minimum interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns `true` and records the send if `key` may emit an event now
    pub fn check(&self, key: &str) -> bool {
        if self.interval.is_zero() {
            return true;
        }

        let now = Instant::now();
        // A poisoned map only holds timestamps.
        let mut last_sent = self.last_sent.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(last) = last_sent.get(key) {
            let elapsed = now.duration_since(*last);
            if elapsed < self.interval {
                warn!(
                    key,
                    wait_ms = (self.interval - elapsed).as_millis() as u64,
                    "Event dropped, sent too soon after the previous one"
                );
                return false;
            }
        }

        last_sent.insert(key.to_string(), now);
        true
    }
}
