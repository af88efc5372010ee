//! Session configuration.

use serde::{Deserialize, Serialize};

use pipesync_types::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
    /// Maximum data rows in a local file preview.
    pub preview_rows: usize,
    /// Check registered names against the runtime when a session starts.
    pub reconcile_on_start: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            event_capacity: 256,
            preview_rows: 100,
            reconcile_on_start: true,
        }
    }
}

impl SessionConfig {
    /// Parse a JSON document; absent keys keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
