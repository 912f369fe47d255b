//! Closed event taxonomy shared by the soul engine and the flux runtime.
//!
//! Events are immutable, value-typed, and carry no back-pointers. The kind
//! set is closed: serialization round-trips for every variant here, and
//! deserialization rejects unknown kinds rather than accepting them loosely.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of event kinds the core ever produces or consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    DialogueStart,
    DialogueTurn,
    DialogueEnd,
    ModeChange,
    InterceptRequest,
    InterceptResult,
    EigenvectorProbe,
    StateSnapshot,
    Ping,
    Error,
    Pulse,
    Thought,
    Feeling,
    Observation,
    SelfChallenge,
    Perturbation,
    Gratitude,
    DreamStart,
    DreamPattern,
    DreamInsight,
    DreamEnd,
}

/// A flat, string-keyed payload. Values may be strings, numbers, booleans,
/// null, or arrays of the same — never nested maps, keeping serialization
/// trivially invertible.
pub type Payload = BTreeMap<String, Value>;

/// An immutable, timestamped, typed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
    pub state_snapshot: Option<Payload>,
    pub correlation_id: Option<String>,
}

impl Event {
    fn new(kind: EventKind, payload: Payload) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            payload,
            state_snapshot: None,
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_state_snapshot(mut self, snapshot: Payload) -> Self {
        self.state_snapshot = Some(snapshot);
        self
    }

    pub fn dialogue_turn(message: impl Into<String>, is_request: bool) -> Self {
        let mut payload = Payload::new();
        payload.insert("message".into(), Value::String(message.into()));
        payload.insert("is_request".into(), Value::Bool(is_request));
        Self::new(EventKind::DialogueTurn, payload)
    }

    pub fn mode_change(to_mode: impl Into<String>) -> Self {
        let mut payload = Payload::new();
        payload.insert("to_mode".into(), Value::String(to_mode.into()));
        Self::new(EventKind::ModeChange, payload)
    }

    pub fn intercept_request(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut payload = Payload::new();
        payload.insert("operation".into(), Value::String(operation.into()));
        payload.insert("reason".into(), Value::String(reason.into()));
        Self::new(EventKind::InterceptRequest, payload)
    }

    pub fn pulse(interactions: u64, session_tokens: u64, mode: impl Into<String>, healthy: bool) -> Self {
        let mut payload = Payload::new();
        payload.insert("interactions".into(), Value::from(interactions));
        payload.insert("session_tokens".into(), Value::from(session_tokens));
        payload.insert("mode".into(), Value::String(mode.into()));
        payload.insert("healthy".into(), Value::Bool(healthy));
        Self::new(EventKind::Pulse, payload)
    }

    pub fn error(source_kind: EventKind, message: impl Into<String>) -> Self {
        let mut payload = Payload::new();
        payload.insert("source_kind".into(), serde_json::to_value(source_kind).unwrap());
        payload.insert("message".into(), Value::String(message.into()));
        Self::new(EventKind::Error, payload)
    }

    pub fn perturbation(content: impl Into<String>, intensity: f64) -> Self {
        let mut payload = Payload::new();
        payload.insert("content".into(), Value::String(content.into()));
        payload.insert("intensity".into(), serde_json::to_value(intensity).unwrap());
        Self::new(EventKind::Perturbation, payload)
    }

    pub fn ambient(kind: EventKind, content: impl Into<String>) -> Self {
        let mut payload = Payload::new();
        payload.insert("content".into(), Value::String(content.into()));
        Self::new(kind, payload)
    }

    pub fn ping() -> Self {
        Self::new(EventKind::Ping, Payload::new())
    }

    /// Serialize to a JSON string. Round-trips with [`Event::from_json`].
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a JSON string. Rejects payloads whose `kind` is not a member
    /// of the closed [`EventKind`] set.
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let e = Event::dialogue_turn("hello", true).with_correlation_id("abc-123");
        let encoded = e.to_json().unwrap();
        let decoded = Event::from_json(&encoded).unwrap();
        assert_eq!(decoded.kind, EventKind::DialogueTurn);
        assert_eq!(decoded.correlation_id.as_deref(), Some("abc-123"));
        assert_eq!(decoded.payload.get("message").unwrap(), "hello");
    }

    #[test]
    fn rejects_unknown_kind() {
        let bad = r#"{"kind":"not_a_real_kind","timestamp":"2024-01-01T00:00:00Z","payload":{},"state_snapshot":null,"correlation_id":null}"#;
        assert!(Event::from_json(bad).is_err());
    }

    #[test]
    fn pulse_carries_expected_fields() {
        let e = Event::pulse(5, 120, "reflect", true);
        assert_eq!(e.kind, EventKind::Pulse);
        assert_eq!(e.payload.get("interactions").unwrap(), 5);
        assert_eq!(e.payload.get("mode").unwrap(), "reflect");
    }
}
