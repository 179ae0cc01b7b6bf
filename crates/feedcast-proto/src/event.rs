//! Event definitions.
//!
//! A [`SignedMessage`] is a NIP-01 event: its `id` is the SHA-256 of the
//! canonical array `[0, pubkey, created_at, kind, tags, content]` and `sig` is
//! a Schnorr signature over that id by `pubkey`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::ProtoError;

/// A single event tag, e.g. `["r", "https://example.com/post"]`.
pub type Tag = Vec<String>;

/// Event kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kind(u16);

impl Kind {
    /// Short text note.
    pub const TEXT_NOTE: Self = Self(1);

    /// Create a kind from its numeric value.
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Numeric value of the kind.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content-addressed event identifier (32 bytes, hex on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId([u8; 32]);

impl EventId {
    /// Wrap raw digest bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex id.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not 32 bytes of hex.
    pub fn from_hex(s: &str) -> Result<Self, ProtoError> {
        let raw = hex::decode(s)
            .map_err(|e| ProtoError::Validation(format!("invalid event id: {e}")))?;
        let bytes: [u8; 32] = raw.try_into().map_err(|v: Vec<u8>| {
            ProtoError::Validation(format!("event id must be 32 bytes, got {}", v.len()))
        })?;
        Ok(Self(bytes))
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for EventId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// An unsigned message ready to be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Note body.
    pub content: String,
    /// Event kind.
    pub kind: Kind,
}

impl OutboundMessage {
    /// Create a text note.
    #[must_use]
    pub fn text_note(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: Kind::TEXT_NOTE,
        }
    }

    /// Whether the content is empty after trimming whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// A signed, content-addressed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage {
    /// SHA-256 of the canonical serialization.
    pub id: EventId,
    /// Author's x-only public key, hex.
    pub pubkey: String,
    /// Unix timestamp in seconds.
    pub created_at: u64,
    /// Event kind.
    pub kind: Kind,
    /// Event tags.
    pub tags: Vec<Tag>,
    /// Note body.
    pub content: String,
    /// Schnorr signature over `id`, hex.
    pub sig: String,
}

impl SignedMessage {
    /// Recompute the id from the signed fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the fields cannot be serialized.
    pub fn compute_id(&self) -> Result<EventId, ProtoError> {
        compute_event_id(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )
    }

    /// Check that `id` matches the signed fields.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::Validation`] on mismatch.
    pub fn verify_id(&self) -> Result<(), ProtoError> {
        let expected = self.compute_id()?;
        if expected != self.id {
            return Err(ProtoError::Validation(format!(
                "event id mismatch: expected {expected}, found {}",
                self.id
            )));
        }
        Ok(())
    }
}

/// Canonical serialization hashed into the event id.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn canonical_serialization(
    pubkey: &str,
    created_at: u64,
    kind: Kind,
    tags: &[Tag],
    content: &str,
) -> Result<String, ProtoError> {
    serde_json::to_string(&(0u8, pubkey, created_at, kind, tags, content))
        .map_err(|e| ProtoError::Encoding(e.to_string()))
}

/// Compute the content-addressed id of an event.
///
/// # Errors
///
/// Returns an error if the canonical form cannot be serialized.
pub fn compute_event_id(
    pubkey: &str,
    created_at: u64,
    kind: Kind,
    tags: &[Tag],
    content: &str,
) -> Result<EventId, ProtoError> {
    let canonical = canonical_serialization(pubkey, created_at, kind, tags, content)?;
    let digest = Sha256::digest(canonical.as_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    Ok(EventId(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    const PUBKEY: &str = "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    fn sample_event() -> SignedMessage {
        let content = "Hello\n\nL1".to_string();
        let id = compute_event_id(PUBKEY, 1_700_000_000, Kind::TEXT_NOTE, &[], &content)
            .expect("id");
        SignedMessage {
            id,
            pubkey: PUBKEY.to_string(),
            created_at: 1_700_000_000,
            kind: Kind::TEXT_NOTE,
            tags: vec![],
            content,
            sig: "00".repeat(64),
        }
    }

    #[test]
    fn test_canonical_serialization_layout() {
        let canonical =
            canonical_serialization("abcd", 1_700_000_000, Kind::TEXT_NOTE, &[], "Hello\n\nL1")
                .expect("serialize");
        assert_eq!(canonical, r#"[0,"abcd",1700000000,1,[],"Hello\n\nL1"]"#);
    }

    #[test]
    fn test_canonical_serialization_with_tags() {
        let tags = vec![vec!["r".to_string(), "https://example.com".to_string()]];
        let canonical = canonical_serialization("abcd", 5, Kind::TEXT_NOTE, &tags, "x")
            .expect("serialize");
        assert_eq!(canonical, r#"[0,"abcd",5,1,[["r","https://example.com"]],"x"]"#);
    }

    #[test]
    fn test_event_id_hex_roundtrip() {
        let id = EventId::from_bytes([0xab; 32]);
        let parsed = EventId::from_hex(&id.to_hex()).expect("parse");
        assert_eq!(id, parsed);
        assert_eq!(id.to_string().len(), 64);
    }

    #[test]
    fn test_event_id_rejects_short_hex() {
        let err = EventId::from_hex("abcd").expect_err("too short");
        assert!(err.to_string().contains("32 bytes"));
    }

    #[test]
    fn test_event_id_rejects_non_hex() {
        assert!(EventId::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_signed_message_wire_field_names() {
        let event = sample_event();
        let value = serde_json::to_value(&event).expect("serialize");
        for field in ["id", "pubkey", "created_at", "kind", "tags", "content", "sig"] {
            assert!(value.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(value["kind"], 1);
        assert_eq!(value["id"], event.id.to_hex());
    }

    #[test]
    fn test_signed_message_deserialize() {
        let event = sample_event();
        let json = serde_json::to_string(&event).expect("serialize");
        let parsed: SignedMessage = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, event);
        parsed.verify_id().expect("id should match");
    }

    #[test]
    fn test_verify_id_detects_tampering() {
        let mut event = sample_event();
        event.content.push('!');
        let err = event.verify_id().expect_err("tampered content");
        assert!(err.to_string().contains("event id mismatch"));
    }

    #[test]
    fn test_outbound_text_note() {
        let msg = OutboundMessage::text_note("Hello");
        assert_eq!(msg.kind, Kind::TEXT_NOTE);
        assert!(!msg.is_blank());
        assert!(OutboundMessage::text_note(" \n\t ").is_blank());
    }

    #[test_case(Kind::TEXT_NOTE, 1 ; "text note")]
    #[test_case(Kind::new(30023), 30023 ; "long form")]
    fn test_kind_value(kind: Kind, expected: u16) {
        assert_eq!(kind.as_u16(), expected);
        assert_eq!(serde_json::to_string(&kind).expect("serialize"), expected.to_string());
    }

    proptest! {
        #[test]
        fn prop_event_id_is_deterministic(content in ".*", created_at in any::<u64>()) {
            let a = compute_event_id(PUBKEY, created_at, Kind::TEXT_NOTE, &[], &content).expect("id");
            let b = compute_event_id(PUBKEY, created_at, Kind::TEXT_NOTE, &[], &content).expect("id");
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_timestamp_changes_id(content in ".*", created_at in 0u64..u64::MAX) {
            let a = compute_event_id(PUBKEY, created_at, Kind::TEXT_NOTE, &[], &content).expect("id");
            let b = compute_event_id(PUBKEY, created_at + 1, Kind::TEXT_NOTE, &[], &content).expect("id");
            prop_assert_ne!(a, b);
        }
    }
}
