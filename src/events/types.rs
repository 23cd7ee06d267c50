//! Event schema published on the [`EventBus`](super::EventBus).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse grouping used for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Sdk,
    Model,
    Llm,
    Stt,
    Tts,
    Vad,
    Voice,
    Storage,
    Device,
    Error,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sdk => "sdk",
            Self::Model => "model",
            Self::Llm => "llm",
            Self::Stt => "stt",
            Self::Tts => "tts",
            Self::Vad => "vad",
            Self::Voice => "voice",
            Self::Storage => "storage",
            Self::Device => "device",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bitmask naming the sinks an event is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventDestination(u8);

impl EventDestination {
    pub const NONE: Self = Self(0);
    /// Host-facing listeners (UI, diagnostics).
    pub const PUBLIC: Self = Self(0b01);
    /// Telemetry pipeline only.
    pub const ANALYTICS: Self = Self(0b10);
    pub const ALL: Self = Self(0b11);

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn intersects(&self, other: EventDestination) -> bool {
        self.0 & other.0 != 0
    }

    pub fn union(self, other: EventDestination) -> Self {
        Self(self.0 | other.0)
    }

    pub fn without(self, other: EventDestination) -> Self {
        Self(self.0 & !other.0)
    }
}

impl Default for EventDestination {
    fn default() -> Self {
        Self::ALL
    }
}

/// A single published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub category: EventCategory,
    /// Short namespaced type, e.g. `model.did_load`.
    pub event_type: String,
    pub payload: serde_json::Value,
    pub destination: EventDestination,
    /// Epoch milliseconds; 0 means "fill in at publish".
    pub timestamp_ms: u64,
    pub correlation_id: Option<String>,
}

impl Event {
    pub fn new(category: EventCategory, event_type: impl Into<String>) -> Self {
        Self {
            category,
            event_type: event_type.into(),
            payload: serde_json::Value::Null,
            destination: EventDestination::ALL,
            timestamp_ms: 0,
            correlation_id: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_destination(mut self, destination: EventDestination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}
