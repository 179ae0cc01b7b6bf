//! # feedcast-proto
//!
//! Wire definitions for publishing notes to Nostr relays: event kinds, the
//! unsigned outbound message, the signed event with its content-addressed id,
//! and the client/relay frames exchanged over a relay WebSocket.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod frames;

pub use error::ProtoError;
pub use event::{compute_event_id, EventId, Kind, OutboundMessage, SignedMessage, Tag};
pub use frames::{ClientFrame, RelayFrame};
