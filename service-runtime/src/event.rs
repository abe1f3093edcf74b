//! Service event channel payloads

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An event emitted by a service
///
/// String emissions carry only a message; structured emissions carry the
/// caller-supplied payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEvent {
    /// Human-readable message, for string emissions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Structured payload, for object emissions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl ServiceEvent {
    /// Event wrapping a plain message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            payload: None,
        }
    }

    /// Event carrying a structured payload
    pub fn payload(payload: Value) -> Self {
        Self {
            message: None,
            payload: Some(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_message_event_serialises_without_payload() {
        let event = ServiceEvent::message("cache warmed");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, json!({"message": "cache warmed"}));
    }

    #[test]
    fn test_payload_event_round_trips() {
        let event = ServiceEvent::payload(json!({"connections": 3}));
        let text = serde_json::to_string(&event).unwrap();
        let back: ServiceEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(back, event);
    }
}
