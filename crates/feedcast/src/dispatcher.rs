//! The poll loop.
//!
//! Each cycle fetches the newest feed item, skips it if it was already
//! published, signs a text note and fans it out to the relays. The cycle
//! body absorbs every error: nothing a feed or relay does can stop the loop.

use std::fmt;
use std::time::Duration;

use feedcast_proto::OutboundMessage;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::detector::ChangeDetector;
use crate::error::PublishError;
use crate::feed::{FeedItem, FeedSource};
use crate::policy::PublishPolicy;
use crate::relay::{PublishOutcome, RelayConnector, RelayPool};
use crate::signer::Signer;

/// Why a cycle published nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The feed had no entry, or could not be read.
    NoItem,
    /// The newest entry was already published.
    AlreadyPublished,
    /// The entry rendered to empty content.
    EmptyContent,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoItem => write!(f, "no item"),
            Self::AlreadyPublished => write!(f, "already published"),
            Self::EmptyContent => write!(f, "empty content"),
        }
    }
}

/// Result of one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing to publish.
    Unchanged(SkipReason),
    /// Published and recorded.
    Committed {
        /// Identifier of the published item.
        identifier: String,
        /// Per-relay results.
        outcome: PublishOutcome,
    },
    /// Publish attempted but not recorded; retried next cycle.
    PublishFailed {
        /// Identifier of the item.
        identifier: String,
        /// Cause.
        error: PublishError,
        /// Per-relay results, absent when signing failed.
        outcome: Option<PublishOutcome>,
    },
}

impl CycleOutcome {
    /// Short label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Unchanged(_) => "unchanged",
            Self::Committed { .. } => "committed",
            Self::PublishFailed { .. } => "publish_failed",
        }
    }

    /// Per-relay results, if a broadcast happened.
    #[must_use]
    pub const fn publish_outcome(&self) -> Option<&PublishOutcome> {
        match self {
            Self::Unchanged(_) => None,
            Self::Committed { outcome, .. } => Some(outcome),
            Self::PublishFailed { outcome, .. } => outcome.as_ref(),
        }
    }
}

/// Render the note text for an item: title, blank line, link, trimmed.
#[must_use]
pub fn build_content(item: &FeedItem) -> String {
    let content = match &item.link {
        Some(link) => format!("{}\n\n{}", item.title, link),
        None => item.title.clone(),
    };
    content.trim().to_string()
}

/// Drives the fetch, dedup, sign and broadcast cycle.
pub struct Dispatcher<F, C: RelayConnector> {
    feed: F,
    detector: ChangeDetector,
    signer: Signer,
    pool: RelayPool<C>,
    policy: PublishPolicy,
    poll_interval: Duration,
}

impl<F: FeedSource, C: RelayConnector> Dispatcher<F, C> {
    /// Assemble a dispatcher from its parts.
    #[must_use]
    pub fn new(feed: F, signer: Signer, pool: RelayPool<C>, poll_interval: Duration) -> Self {
        Self {
            feed,
            detector: ChangeDetector::new(),
            signer,
            pool,
            policy: PublishPolicy::default(),
            poll_interval,
        }
    }

    /// Use a different publish-success policy.
    #[must_use]
    pub fn with_policy(mut self, policy: PublishPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Use a different change detector.
    #[must_use]
    pub fn with_detector(mut self, detector: ChangeDetector) -> Self {
        self.detector = detector;
        self
    }

    /// The change detector.
    #[must_use]
    pub const fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    /// The relay pool.
    #[must_use]
    pub const fn pool(&self) -> &RelayPool<C> {
        &self.pool
    }

    /// Mutable access to the relay pool.
    pub fn pool_mut(&mut self) -> &mut RelayPool<C> {
        &mut self.pool
    }

    /// The signer.
    #[must_use]
    pub const fn signer(&self) -> &Signer {
        &self.signer
    }

    /// Open relay connections before the first cycle.
    ///
    /// Returns `false` if `shutdown` fired first, in which case every
    /// connection is closed again.
    pub async fn warm_up(&mut self, shutdown: &mut watch::Receiver<bool>) -> bool {
        if *shutdown.borrow() {
            return false;
        }
        let interrupted = tokio::select! {
            _ = self.pool.connect_all() => false,
            _ = shutdown.changed() => true,
        };
        if interrupted {
            info!("shutdown during relay warm-up");
            self.pool.close_all().await;
        }
        !interrupted
    }

    /// Run one cycle.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let outcome = self.cycle().await;
        let (accepted, failed) = outcome
            .publish_outcome()
            .map_or((0, 0), |o| (o.accepted_count(), o.failed_count()));
        info!(outcome = outcome.label(), accepted, failed, "cycle complete");
        outcome
    }

    async fn cycle(&mut self) -> CycleOutcome {
        let Some(item) = self.feed.fetch_latest().await else {
            info!("no new posts");
            return CycleOutcome::Unchanged(SkipReason::NoItem);
        };

        if !self.detector.is_new(&item.identifier) {
            info!(identifier = %item.identifier, "no new posts");
            return CycleOutcome::Unchanged(SkipReason::AlreadyPublished);
        }

        let content = build_content(&item);
        if content.is_empty() {
            warn!(identifier = %item.identifier, "skipping item with empty content");
            return CycleOutcome::Unchanged(SkipReason::EmptyContent);
        }
        if let Some(body) = &item.body {
            debug!(identifier = %item.identifier, chars = body.chars().count(), "item body");
        }

        info!(identifier = %item.identifier, title = %item.title, "publishing new post");
        let event = match self.signer.sign(&OutboundMessage::text_note(content)) {
            Ok(event) => event,
            Err(e) => {
                warn!(identifier = %item.identifier, error = %e, "signing failed");
                return CycleOutcome::PublishFailed {
                    identifier: item.identifier,
                    error: e.into(),
                    outcome: None,
                };
            }
        };

        let outcome = self.pool.broadcast(&event).await;
        match self.policy.evaluate(&outcome) {
            Ok(()) => {
                self.detector.commit(item.identifier.clone());
                info!(
                    identifier = %item.identifier,
                    event = %event.id,
                    accepted = outcome.accepted_count(),
                    total = outcome.len(),
                    "post published"
                );
                CycleOutcome::Committed {
                    identifier: item.identifier,
                    outcome,
                }
            }
            Err(error) => {
                warn!(identifier = %item.identifier, error = %error, "publish failed, will retry");
                CycleOutcome::PublishFailed {
                    identifier: item.identifier,
                    error,
                    outcome: Some(outcome),
                }
            }
        }
    }

    /// Poll until `shutdown` turns true, then close relay connections.
    ///
    /// Shutdown is only observed between cycles; a cycle in flight always
    /// completes.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.poll_interval, relays = self.pool.len(), "poll loop started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            self.run_cycle().await;

            tokio::select! {
                () = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    // A dropped sender also means stop.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("shutting down, closing relay connections");
        self.pool.close_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FakeFeed;
    use crate::relay::FakeConnector;
    use crate::signer::PrivateKey;

    fn dispatcher(feed: FakeFeed, relays: &[&str]) -> (Dispatcher<FakeFeed, FakeConnector>, FakeConnector) {
        let connector = FakeConnector::new();
        let mut pool = RelayPool::with_connector(connector.clone(), Duration::from_secs(2));
        for relay in relays {
            pool.add_endpoint(relay).expect("relay");
        }
        let key = PrivateKey::parse(&"22".repeat(32)).expect("key");
        let dispatcher = Dispatcher::new(feed, Signer::new(&key), pool, Duration::from_secs(30));
        (dispatcher, connector)
    }

    #[test]
    fn test_build_content_title_and_link() {
        assert_eq!(build_content(&FeedItem::linked("L1", "Hello")), "Hello\n\nL1");
    }

    #[test]
    fn test_build_content_trims() {
        assert_eq!(build_content(&FeedItem::linked("L1", "")), "L1");
        assert_eq!(build_content(&FeedItem::unlinked("L3", "  ")), "");
        assert_eq!(build_content(&FeedItem::unlinked("L3", "Only a title")), "Only a title");
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(SkipReason::AlreadyPublished.to_string(), "already published");
    }

    #[tokio::test]
    async fn test_empty_feed_is_unchanged() {
        let (mut dispatcher, connector) = dispatcher(FakeFeed::new(), &["wss://a.example"]);
        assert_eq!(dispatcher.run_cycle().await, CycleOutcome::Unchanged(SkipReason::NoItem));
        assert_eq!(connector.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_commit_only_after_success() {
        let feed = FakeFeed::with_item(FeedItem::linked("L1", "Hello"));
        let (mut dispatcher, connector) = dispatcher(feed, &["wss://a.example"]);
        connector.set_behavior("wss://a.example", crate::relay::FakeBehavior::RefuseConnect);

        let outcome = dispatcher.run_cycle().await;
        assert!(matches!(
            outcome,
            CycleOutcome::PublishFailed {
                error: PublishError::AllEndpointsFailed { attempted: 1 },
                ..
            }
        ));
        assert!(dispatcher.detector().last_published().is_none());

        connector.set_behavior("wss://a.example", crate::relay::FakeBehavior::Accept);
        assert!(matches!(dispatcher.run_cycle().await, CycleOutcome::Committed { .. }));
        assert_eq!(dispatcher.detector().last_published(), Some("L1"));
    }

    #[tokio::test]
    async fn test_policy_all_requires_every_relay() {
        let feed = FakeFeed::with_item(FeedItem::linked("L1", "Hello"));
        let (dispatcher, connector) = dispatcher(feed, &["wss://a.example", "wss://b.example"]);
        let mut dispatcher = dispatcher.with_policy(PublishPolicy::All);
        connector.set_behavior("wss://b.example", crate::relay::FakeBehavior::Reject("no".to_string()));

        let outcome = dispatcher.run_cycle().await;
        assert!(matches!(
            outcome,
            CycleOutcome::PublishFailed {
                error: PublishError::PolicyNotMet { accepted: 1, attempted: 2, .. },
                ..
            }
        ));
        assert_eq!(outcome.publish_outcome().map(PublishOutcome::len), Some(2));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let feed = FakeFeed::with_item(FeedItem::linked("L1", "Hello"));
        let (mut dispatcher, connector) = dispatcher(feed.clone(), &["wss://a.example"]);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            dispatcher.run(rx).await;
            dispatcher
        });
        // Let the first cycle finish, then signal.
        while feed.fetch_count() == 0 {
            tokio::task::yield_now().await;
        }
        tx.send(true).expect("send");
        let dispatcher = handle.await.expect("join");

        assert_eq!(dispatcher.detector().last_published(), Some("L1"));
        assert_eq!(connector.close_count(), 1);
    }

    #[tokio::test]
    async fn test_warm_up_connects_every_relay() {
        let (mut dispatcher, connector) =
            dispatcher(FakeFeed::new(), &["wss://a.example", "wss://b.example"]);
        let (_tx, mut rx) = watch::channel(false);

        assert!(dispatcher.warm_up(&mut rx).await);
        assert_eq!(connector.connect_count(), 2);
        assert!(dispatcher.pool().endpoints().iter().all(|e| e.is_connected()));
    }

    #[tokio::test]
    async fn test_warm_up_skipped_after_shutdown() {
        let (mut dispatcher, connector) = dispatcher(FakeFeed::new(), &["wss://a.example"]);
        let (_tx, mut rx) = watch::channel(true);

        assert!(!dispatcher.warm_up(&mut rx).await);
        assert_eq!(connector.connect_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_warm_up() {
        let (mut dispatcher, connector) =
            dispatcher(FakeFeed::new(), &["wss://fast.example", "wss://slow.example"]);
        connector.set_behavior(
            "wss://slow.example",
            crate::relay::FakeBehavior::SlowConnect(Duration::from_secs(60)),
        );
        let (tx, mut rx) = watch::channel(false);

        let started = tokio::time::Instant::now();
        let (completed, ()) = tokio::join!(dispatcher.warm_up(&mut rx), async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            tx.send(true).expect("send");
        });

        assert!(!completed);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(dispatcher.pool().endpoints().iter().all(|e| !e.is_connected()));
    }

    #[tokio::test]
    async fn test_run_returns_immediately_if_already_shut_down() {
        let feed = FakeFeed::with_item(FeedItem::linked("L1", "Hello"));
        let (mut dispatcher, _) = dispatcher(feed.clone(), &["wss://a.example"]);
        let (_tx, rx) = watch::channel(true);

        dispatcher.run(rx).await;
        assert_eq!(feed.fetch_count(), 0);
    }
}
