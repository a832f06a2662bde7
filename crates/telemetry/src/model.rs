//! The event record uploaded to the telemetry collector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp layout expected by the collector.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One usage event.
///
/// Serializes as a flat JSON object: the fixed fields followed by any extra
/// properties at the same level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// The API surface that produced the event (e.g. `chat_whatsapp`).
    pub api: String,
    /// Event category (e.g. `api`).
    pub telemetry_type: String,
    /// Opaque identifier of the user the event concerns.
    pub server_id: String,
    /// UTC time, formatted with [`TIMESTAMP_FORMAT`].
    pub timestamp: String,
    /// Client surface reported by this deployment.
    pub os: String,
    #[serde(flatten)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl TelemetryEvent {
    /// Create an event stamped with the current time.
    pub fn new(
        telemetry_type: impl Into<String>,
        api: impl Into<String>,
        server_id: impl Into<String>,
        os: impl Into<String>,
    ) -> Self {
        Self::at(Utc::now(), telemetry_type, api, server_id, os)
    }

    pub fn at(
        time: DateTime<Utc>,
        telemetry_type: impl Into<String>,
        api: impl Into<String>,
        server_id: impl Into<String>,
        os: impl Into<String>,
    ) -> Self {
        Self {
            api: api.into(),
            telemetry_type: telemetry_type.into(),
            server_id: server_id.into(),
            timestamp: time.format(TIMESTAMP_FORMAT).to_string(),
            os: os.into(),
            properties: serde_json::Map::new(),
        }
    }

    /// Attach an extra property. Later values replace earlier ones.
    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}
