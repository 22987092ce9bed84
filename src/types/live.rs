//! Events emitted to live-stream subscribers

use serde::Serialize;

/// One event in a live stream: either a processed sample or a terminal error.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent<T> {
    Message(T),
    /// Connection-level failure; always the last event of a stream
    Error(String),
}

impl<T: Serialize> LiveEvent<T> {
    /// SSE event tag for this event.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Error(_) => "error",
        }
    }

    /// JSON payload for the SSE `data:` field.
    pub fn data_json(&self) -> String {
        let encoded = match self {
            Self::Message(sample) => serde_json::to_string(sample),
            Self::Error(message) => serde_json::to_string(&serde_json::json!({ "error": message })),
        };
        encoded.unwrap_or_else(|e| format!(r#"{{"error":"encoding failed: {e}"}}"#))
    }
}

impl<T> LiveEvent<T> {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_event_payload() {
        let ev: LiveEvent<u32> = LiveEvent::Error("Stream timeout".to_string());
        assert_eq!(ev.event_name(), "error");
        assert_eq!(ev.data_json(), r#"{"error":"Stream timeout"}"#);
        assert!(ev.is_error());
    }

    #[test]
    fn test_message_event_payload() {
        let ev = LiveEvent::Message(serde_json::json!({"count": 3}));
        assert_eq!(ev.event_name(), "message");
        assert_eq!(ev.data_json(), r#"{"count":3}"#);
    }
}
