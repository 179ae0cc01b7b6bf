//! Client and relay frames.
//!
//! Frames are JSON arrays whose first element names the frame type.

use serde_json::{json, Value};

use crate::error::ProtoError;
use crate::event::{EventId, SignedMessage};

/// Prefix a relay uses when it already stores the event.
const DUPLICATE_PREFIX: &str = "duplicate:";

/// Frames sent from client to relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientFrame<'a> {
    /// Publish an event: `["EVENT", <event>]`.
    Event(&'a SignedMessage),
}

impl ClientFrame<'_> {
    /// Serialize to the wire representation.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be serialized.
    pub fn to_json(&self) -> Result<String, ProtoError> {
        match self {
            Self::Event(event) => serde_json::to_string(&("EVENT", event))
                .map_err(|e| ProtoError::Encoding(e.to_string())),
        }
    }

    /// Parse a client frame; returns the published event.
    ///
    /// Used by relay-side code and tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not an `EVENT` frame.
    pub fn parse_event(text: &str) -> Result<SignedMessage, ProtoError> {
        let (label, event): (String, SignedMessage) = serde_json::from_str(text)?;
        if label != "EVENT" {
            return Err(ProtoError::Decoding(format!(
                "expected EVENT frame, got {label}"
            )));
        }
        Ok(event)
    }
}

/// Frames sent from relay to client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayFrame {
    /// Command result for a published event.
    Ok {
        /// Event the result refers to.
        event_id: EventId,
        /// Whether the relay stored the event.
        accepted: bool,
        /// Machine-prefixed human-readable reason.
        message: String,
    },
    /// Human-readable notice.
    Notice(String),
    /// Subscription closed by the relay.
    Closed {
        /// Subscription id.
        subscription: String,
        /// Reason.
        message: String,
    },
    /// Authentication challenge.
    Auth(String),
    /// Any other frame type, by label.
    Other(String),
}

impl RelayFrame {
    /// Build an `OK` frame.
    #[must_use]
    pub fn ok(event_id: EventId, accepted: bool, message: impl Into<String>) -> Self {
        Self::Ok {
            event_id,
            accepted,
            message: message.into(),
        }
    }

    /// Parse a relay frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a well-formed relay frame.
    pub fn parse(text: &str) -> Result<Self, ProtoError> {
        let value: Value = serde_json::from_str(text)?;
        let items = value
            .as_array()
            .ok_or_else(|| ProtoError::Decoding("relay frame must be a JSON array".to_string()))?;
        let label = items
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| ProtoError::Decoding("relay frame missing type label".to_string()))?;

        match label {
            "OK" => {
                let event_id = EventId::from_hex(str_at(items, 1, "OK event id")?)?;
                let accepted = items
                    .get(2)
                    .and_then(Value::as_bool)
                    .ok_or_else(|| ProtoError::Decoding("OK frame missing status".to_string()))?;
                let message = items.get(3).and_then(Value::as_str).unwrap_or_default();
                Ok(Self::ok(event_id, accepted, message))
            }
            "NOTICE" => Ok(Self::Notice(str_at(items, 1, "NOTICE message")?.to_string())),
            "CLOSED" => Ok(Self::Closed {
                subscription: str_at(items, 1, "CLOSED subscription")?.to_string(),
                message: items
                    .get(2)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            "AUTH" => Ok(Self::Auth(str_at(items, 1, "AUTH challenge")?.to_string())),
            other => Ok(Self::Other(other.to_string())),
        }
    }

    /// Serialize to the wire representation.
    #[must_use]
    pub fn to_json(&self) -> String {
        match self {
            Self::Ok {
                event_id,
                accepted,
                message,
            } => json!(["OK", event_id.to_hex(), accepted, message]).to_string(),
            Self::Notice(message) => json!(["NOTICE", message]).to_string(),
            Self::Closed {
                subscription,
                message,
            } => json!(["CLOSED", subscription, message]).to_string(),
            Self::Auth(challenge) => json!(["AUTH", challenge]).to_string(),
            Self::Other(label) => json!([label]).to_string(),
        }
    }

    /// For an `OK` frame: whether the relay holds the event afterwards.
    ///
    /// A rejection whose reason starts with `duplicate:` still means the
    /// event is on the relay.
    #[must_use]
    pub fn is_stored(&self) -> bool {
        match self {
            Self::Ok {
                accepted, message, ..
            } => *accepted || message.starts_with(DUPLICATE_PREFIX),
            _ => false,
        }
    }
}

fn str_at<'a>(items: &'a [Value], index: usize, what: &str) -> Result<&'a str, ProtoError> {
    items
        .get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| ProtoError::Decoding(format!("missing {what}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{compute_event_id, Kind};

    fn sample_event() -> SignedMessage {
        let pubkey = "ab".repeat(32);
        let id = compute_event_id(&pubkey, 10, Kind::TEXT_NOTE, &[], "hi").expect("id");
        SignedMessage {
            id,
            pubkey,
            created_at: 10,
            kind: Kind::TEXT_NOTE,
            tags: vec![],
            content: "hi".to_string(),
            sig: "cd".repeat(64),
        }
    }

    #[test]
    fn test_event_frame_shape() {
        let event = sample_event();
        let json = ClientFrame::Event(&event).to_json().expect("serialize");
        let value: Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value[0], "EVENT");
        assert_eq!(value[1]["content"], "hi");
        assert_eq!(value[1]["id"], event.id.to_hex());
    }

    #[test]
    fn test_event_frame_parse_back() {
        let event = sample_event();
        let json = ClientFrame::Event(&event).to_json().expect("serialize");
        let parsed = ClientFrame::parse_event(&json).expect("parse");
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_parse_event_rejects_other_labels() {
        let event = sample_event();
        let json = serde_json::to_string(&("REQ", &event)).expect("serialize");
        assert!(ClientFrame::parse_event(&json).is_err());
    }

    #[test]
    fn test_parse_ok_accepted() {
        let id = EventId::from_bytes([7; 32]);
        let text = format!(r#"["OK","{}",true,""]"#, id.to_hex());
        let frame = RelayFrame::parse(&text).expect("parse");
        assert_eq!(frame, RelayFrame::ok(id, true, ""));
        assert!(frame.is_stored());
    }

    #[test]
    fn test_parse_ok_rejected() {
        let id = EventId::from_bytes([7; 32]);
        let text = format!(r#"["OK","{}",false,"blocked: not on allowlist"]"#, id.to_hex());
        let frame = RelayFrame::parse(&text).expect("parse");
        assert!(!frame.is_stored());
        if let RelayFrame::Ok { message, .. } = frame {
            assert_eq!(message, "blocked: not on allowlist");
        } else {
            panic!("expected OK frame");
        }
    }

    #[test]
    fn test_duplicate_rejection_counts_as_stored() {
        let frame = RelayFrame::ok(EventId::from_bytes([1; 32]), false, "duplicate: have it");
        assert!(frame.is_stored());
    }

    #[test]
    fn test_parse_ok_without_message() {
        let id = EventId::from_bytes([2; 32]);
        let text = format!(r#"["OK","{}",true]"#, id.to_hex());
        let frame = RelayFrame::parse(&text).expect("parse");
        assert_eq!(frame, RelayFrame::ok(id, true, ""));
    }

    #[test]
    fn test_parse_notice() {
        let frame = RelayFrame::parse(r#"["NOTICE","slow down"]"#).expect("parse");
        assert_eq!(frame, RelayFrame::Notice("slow down".to_string()));
        assert!(!frame.is_stored());
    }

    #[test]
    fn test_parse_closed_and_auth() {
        let closed = RelayFrame::parse(r#"["CLOSED","sub1","error: shutting down"]"#)
            .expect("parse");
        assert!(matches!(closed, RelayFrame::Closed { .. }));
        let auth = RelayFrame::parse(r#"["AUTH","challenge-string"]"#).expect("parse");
        assert_eq!(auth, RelayFrame::Auth("challenge-string".to_string()));
    }

    #[test]
    fn test_parse_unknown_label() {
        let frame = RelayFrame::parse(r#"["EOSE","sub1"]"#).expect("parse");
        assert_eq!(frame, RelayFrame::Other("EOSE".to_string()));
    }

    #[test]
    fn test_parse_rejects_non_array() {
        let err = RelayFrame::parse(r#"{"type":"OK"}"#).expect_err("object is not a frame");
        assert!(err.to_string().contains("JSON array"));
    }

    #[test]
    fn test_parse_rejects_bad_ok() {
        assert!(RelayFrame::parse(r#"["OK"]"#).is_err());
        assert!(RelayFrame::parse(r#"["OK","nothex",true,""]"#).is_err());
        let id = "00".repeat(32);
        assert!(RelayFrame::parse(&format!(r#"["OK","{id}","yes",""]"#)).is_err());
    }

    #[test]
    fn test_ok_to_json_parses_back() {
        let frame = RelayFrame::ok(EventId::from_bytes([9; 32]), false, "invalid: bad sig");
        let parsed = RelayFrame::parse(&frame.to_json()).expect("parse");
        assert_eq!(parsed, frame);
    }
}
