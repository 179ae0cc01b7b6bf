//! Feedcast - RSS/Atom to Nostr crossposter
//!
//! Polls a feed on a fixed interval and publishes each new entry as a signed
//! Nostr text note to a set of relays.
//!
//! The pieces, in data-flow order:
//!
//! - [`feed`]: fetches the newest entry ([`FeedWatcher`], [`FeedSource`])
//! - [`detector`]: decides whether it was already published ([`ChangeDetector`])
//! - [`signer`]: turns note text into a signed event ([`Signer`])
//! - [`relay`]: fans the event out to every relay ([`RelayPool`])
//! - [`dispatcher`]: runs the loop and absorbs every per-cycle error ([`Dispatcher`])

#![forbid(unsafe_code)]

pub mod config;
pub mod detector;
pub mod dispatcher;
pub mod error;
pub mod feed;
pub mod policy;
pub mod relay;
pub mod signer;

pub use config::{CastConfig, RawConfig, DEFAULT_RELAYS};
pub use detector::ChangeDetector;
pub use dispatcher::{build_content, CycleOutcome, Dispatcher, SkipReason};
pub use error::{CastError, EndpointError, FeedError, PublishError, SigningError};
pub use feed::{FakeFeed, FeedItem, FeedSource, FeedWatcher};
pub use policy::PublishPolicy;
pub use relay::{
    ConnectionState, EndpointReport, FakeBehavior, FakeConnector, PublishOutcome, RelayConnector,
    RelayLink, RelayPool, WsConnector,
};
pub use signer::{verify_signature, PrivateKey, Signer};
