//! In-memory relays for tests and dry runs.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use feedcast_proto::SignedMessage;
use parking_lot::Mutex;
use url::Url;

use crate::error::EndpointError;

use super::link::{RelayConnector, RelayLink};

/// How a fake relay answers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FakeBehavior {
    /// Accept every event.
    #[default]
    Accept,
    /// Answer `OK false` with this message.
    Reject(String),
    /// Accept, but only after sleeping this long.
    Delay(Duration),
    /// Fail to connect.
    RefuseConnect,
    /// Connect only after sleeping this long, then accept.
    SlowConnect(Duration),
    /// Drop the connection instead of answering.
    DropConnection,
}

#[derive(Debug, Default)]
struct FakeState {
    behaviors: Mutex<HashMap<String, FakeBehavior>>,
    published: Mutex<Vec<(Url, SignedMessage)>>,
    connects: AtomicUsize,
    attempts: AtomicUsize,
    closes: AtomicUsize,
}

impl FakeState {
    fn behavior(&self, url: &Url) -> FakeBehavior {
        self.behaviors
            .lock()
            .get(url.as_str())
            .cloned()
            .unwrap_or_default()
    }
}

/// A connector whose relays live in memory.
///
/// Clones share state, so a test can keep one handle and give another to
/// the pool.
#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    state: Arc<FakeState>,
}

impl FakeConnector {
    /// Every relay accepts by default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how the relay at `address` behaves from now on.
    ///
    /// Unparsable addresses are ignored.
    pub fn set_behavior(&self, address: &str, behavior: FakeBehavior) {
        if let Ok(url) = Url::parse(address.trim()) {
            self.state.behaviors.lock().insert(url.to_string(), behavior);
        }
    }

    /// Connection attempts, including refused ones.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Publish attempts on open connections.
    #[must_use]
    pub fn publish_attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// Connections closed through [`RelayLink::close`].
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Events accepted so far, with the relay that took them.
    #[must_use]
    pub fn published(&self) -> Vec<(Url, SignedMessage)> {
        self.state.published.lock().clone()
    }

    /// Events accepted by one relay.
    #[must_use]
    pub fn published_to(&self, address: &str) -> Vec<SignedMessage> {
        let Ok(url) = Url::parse(address.trim()) else {
            return Vec::new();
        };
        self.state
            .published
            .lock()
            .iter()
            .filter(|(relay, _)| *relay == url)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

impl RelayConnector for FakeConnector {
    type Link = FakeLink;

    fn connect(&self, url: &Url) -> impl Future<Output = Result<FakeLink, EndpointError>> + Send {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        let behavior = self.state.behavior(url);
        let url = url.clone();
        let state = Arc::clone(&self.state);
        async move {
            match behavior {
                FakeBehavior::RefuseConnect => {
                    return Err(EndpointError::Connect(format!("{url}: connection refused")));
                }
                FakeBehavior::SlowConnect(delay) => tokio::time::sleep(delay).await,
                _ => {}
            }
            Ok(FakeLink { url, state })
        }
    }
}

/// An open connection to a fake relay.
#[derive(Debug)]
pub struct FakeLink {
    url: Url,
    state: Arc<FakeState>,
}

impl RelayLink for FakeLink {
    fn publish(
        &mut self,
        event: &SignedMessage,
    ) -> impl Future<Output = Result<(), EndpointError>> + Send {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);
        let behavior = self.state.behavior(&self.url);
        let url = self.url.clone();
        let state = Arc::clone(&self.state);
        let event = event.clone();
        async move {
            match behavior {
                FakeBehavior::Accept | FakeBehavior::SlowConnect(_) => {}
                FakeBehavior::Delay(delay) => tokio::time::sleep(delay).await,
                FakeBehavior::Reject(message) => return Err(EndpointError::Rejected(message)),
                FakeBehavior::RefuseConnect | FakeBehavior::DropConnection => {
                    return Err(EndpointError::Closed);
                }
            }
            state.published.lock().push((url, event));
            Ok(())
        }
    }

    fn close(&mut self) -> impl Future<Output = ()> + Send {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        async {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).expect("url")
    }

    #[tokio::test]
    async fn test_default_behavior_accepts() {
        let connector = FakeConnector::new();
        let mut link = connector.connect(&url("wss://a.example")).await.expect("connect");
        let event = SignedMessage {
            id: feedcast_proto::EventId::from_bytes([1; 32]),
            pubkey: "ab".repeat(32),
            created_at: 1,
            kind: feedcast_proto::Kind::TEXT_NOTE,
            tags: Vec::new(),
            content: "hi".to_string(),
            sig: "cd".repeat(64),
        };
        link.publish(&event).await.expect("accepted");
        assert_eq!(connector.published_to("wss://a.example/"), vec![event]);
        assert_eq!(connector.publish_attempts(), 1);
    }

    #[tokio::test]
    async fn test_refuse_connect() {
        let connector = FakeConnector::new();
        connector.set_behavior("wss://down.example", FakeBehavior::RefuseConnect);
        let err = connector
            .connect(&url("wss://down.example"))
            .await
            .expect_err("refused");
        assert!(matches!(err, EndpointError::Connect(_)));
        assert_eq!(connector.connect_count(), 1);
    }

    #[test]
    fn test_behavior_keys_are_normalized() {
        let connector = FakeConnector::new();
        connector.set_behavior("wss://a.example", FakeBehavior::Reject("no".to_string()));
        assert_eq!(
            connector.state.behavior(&url("wss://a.example/")),
            FakeBehavior::Reject("no".to_string())
        );
        assert_eq!(connector.state.behavior(&url("wss://b.example")), FakeBehavior::Accept);
    }
}
