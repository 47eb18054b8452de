/*!
 * Core data types for Verdant.
 *
 * Identifiers handed out by the cloud platform and the small helpers
 * used when turning readings into wire values.
 */
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// An opaque identifier assigned by the cloud platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    /// Create an ID from a string, rejecting empty or blank input
    pub fn parse<S: AsRef<str>>(s: S) -> Result<Self> {
        let s = s.as_ref();
        if s.trim().is_empty() {
            return Err(Error::validation("identifier must not be empty"));
        }
        Ok(Self(s.to_string()))
    }

    /// Create an ID from a string without validation
    pub fn from_string<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().to_string())
    }

    /// Create a new ID with a random UUID
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the string representation of the ID
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the ID is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<Uuid> for Id {
    fn from(uuid: Uuid) -> Self {
        Self::from_string(uuid.to_string())
    }
}

/// A JSON object as carried in request and event payloads
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Encode a number the way the cloud expects it
///
/// Integral values become JSON integers, everything else a float.
pub fn number_to_json(value: f64) -> serde_json::Value {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        serde_json::Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}
