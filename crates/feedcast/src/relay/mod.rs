//! Relay fan-out.
//!
//! A [`RelayPool`] owns one endpoint per distinct relay address and
//! broadcasts each signed event to all of them concurrently, each attempt
//! under its own timeout. Connections are opened lazily, reused across
//! broadcasts and dropped on any failure so the next broadcast reconnects.

mod fake;
mod link;
mod outcome;
mod pool;

pub use fake::{FakeBehavior, FakeConnector, FakeLink};
pub use link::{RelayConnector, RelayLink, WsConnector, WsLink};
pub use outcome::{EndpointReport, PublishOutcome};
pub use pool::{ConnectionState, RelayEndpoint, RelayPool, DEFAULT_ENDPOINT_TIMEOUT};
