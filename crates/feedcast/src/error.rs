//! Error types for feedcast.
//!
//! Only [`CastError`] ever leaves the process (at startup). Everything the
//! poll loop produces is absorbed by the dispatcher and turned into log
//! output.

use std::time::Duration;

use feedcast_proto::ProtoError;
use thiserror::Error;

use crate::policy::PublishPolicy;

/// Startup-level errors.
#[derive(Debug, Error)]
pub enum CastError {
    /// Missing or invalid setting.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Feed could not be read. The watcher reports these as "no item".
#[derive(Debug, Error)]
pub enum FeedError {
    /// HTTP request failed before a response arrived.
    #[error("feed request failed: {0}")]
    Request(String),

    /// Server answered with a non-success status.
    #[error("feed returned HTTP {0}")]
    Status(u16),

    /// Local feed file could not be read.
    #[error("feed file unreadable: {0}")]
    Io(#[from] std::io::Error),

    /// Body was not a recognizable feed.
    #[error("feed parse failed: {0}")]
    Parse(String),

    /// URL scheme is neither http(s) nor file.
    #[error("unsupported feed scheme: {0}")]
    UnsupportedScheme(String),
}

/// Signing failed; the cycle's publish is abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningError {
    /// Key material is malformed.
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    /// The event could not be serialized for hashing.
    #[error("event serialization failed: {0}")]
    Serialization(String),

    /// The produced signature did not verify.
    #[error("signature self-check failed: {0}")]
    Verification(String),
}

/// A single relay endpoint failed. Never propagates past the pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    /// Address is not a ws:// or wss:// URI.
    #[error("invalid relay address: {0}")]
    InvalidAddress(String),

    /// Connection could not be established.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Sending or receiving failed on an open connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// Relay answered `OK false`.
    #[error("rejected by relay: {0}")]
    Rejected(String),

    /// Relay closed the connection before answering.
    #[error("connection closed by relay")]
    Closed,

    /// No answer within the per-endpoint timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Relay sent something unintelligible.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<ProtoError> for EndpointError {
    fn from(err: ProtoError) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Whole-cycle publish failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// Message could not be signed.
    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),

    /// No relay accepted the message.
    #[error("all {attempted} relay(s) failed")]
    AllEndpointsFailed {
        /// Number of relays attempted.
        attempted: usize,
    },

    /// Some relays accepted, but fewer than the policy requires.
    #[error("publish policy '{policy}' not met: {accepted} of {attempted} relay(s) accepted")]
    PolicyNotMet {
        /// Policy in force.
        policy: PublishPolicy,
        /// Relays that accepted.
        accepted: usize,
        /// Relays attempted.
        attempted: usize,
    },
}
