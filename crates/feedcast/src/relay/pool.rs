//! The relay pool.

use std::time::Duration;

use feedcast_proto::SignedMessage;
use futures::future::join_all;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::EndpointError;

use super::link::{RelayConnector, RelayLink, WsConnector};
use super::outcome::{EndpointReport, PublishOutcome};

/// Per-endpoint bound on connect + send + acknowledgement.
pub const DEFAULT_ENDPOINT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection state of one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection yet, or closed on shutdown.
    Disconnected,
    /// Connected and the last attempt succeeded.
    Connected,
    /// Last attempt failed; the next broadcast reconnects.
    Failed,
}

/// One relay address and its lazily opened connection.
pub struct RelayEndpoint<L> {
    url: Url,
    link: Option<L>,
    state: ConnectionState,
    last_error: Option<EndpointError>,
}

impl<L: RelayLink> RelayEndpoint<L> {
    fn new(url: Url) -> Self {
        Self {
            url,
            link: None,
            state: ConnectionState::Disconnected,
            last_error: None,
        }
    }

    /// Relay address.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Current connection state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether a connection is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Error from the most recent failed attempt.
    #[must_use]
    pub const fn last_error(&self) -> Option<&EndpointError> {
        self.last_error.as_ref()
    }

    async fn ensure_link<C>(&mut self, connector: &C) -> Result<&mut L, EndpointError>
    where
        C: RelayConnector<Link = L>,
    {
        let link = match self.link.take() {
            Some(link) => link,
            None => connector.connect(&self.url).await?,
        };
        Ok(self.link.insert(link))
    }

    async fn deliver<C>(&mut self, connector: &C, event: &SignedMessage) -> Result<(), EndpointError>
    where
        C: RelayConnector<Link = L>,
    {
        self.ensure_link(connector).await?.publish(event).await
    }

    fn record(&mut self, result: &Result<(), EndpointError>) {
        match result {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                self.last_error = None;
            }
            Err(e) => {
                // Whatever state the connection is in, start fresh next time.
                self.link = None;
                self.state = ConnectionState::Failed;
                self.last_error = Some(e.clone());
            }
        }
    }
}

/// Fans signed events out to every configured relay.
pub struct RelayPool<C: RelayConnector = WsConnector> {
    connector: C,
    endpoints: Vec<RelayEndpoint<C::Link>>,
    timeout: Duration,
}

impl RelayPool<WsConnector> {
    /// Create a WebSocket pool with the given per-endpoint timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self::with_connector(WsConnector, timeout)
    }
}

impl<C: RelayConnector> RelayPool<C> {
    /// Create a pool over a custom connector.
    #[must_use]
    pub const fn with_connector(connector: C, timeout: Duration) -> Self {
        Self {
            connector,
            endpoints: Vec::new(),
            timeout,
        }
    }

    /// Add a relay address.
    ///
    /// Addresses are normalized before comparison, so `wss://r.example` and
    /// `wss://r.example/` are one endpoint. Returns `Ok(false)` for a
    /// duplicate.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::InvalidAddress`] unless the address is a
    /// `ws://` or `wss://` URI with a host.
    pub fn add_endpoint(&mut self, address: &str) -> Result<bool, EndpointError> {
        let url = parse_relay_url(address)?;
        if self.endpoints.iter().any(|e| e.url == url) {
            debug!(relay = %url, "skipping duplicate relay");
            return Ok(false);
        }
        self.endpoints.push(RelayEndpoint::new(url));
        Ok(true)
    }

    /// Configured endpoints, in insertion order.
    #[must_use]
    pub fn endpoints(&self) -> &[RelayEndpoint<C::Link>] {
        &self.endpoints
    }

    /// Number of distinct endpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether the pool has no endpoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Per-endpoint timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The connector in use.
    #[must_use]
    pub const fn connector(&self) -> &C {
        &self.connector
    }

    /// Send `event` to every endpoint concurrently.
    ///
    /// Returns once each endpoint has accepted, failed or timed out. A
    /// failure at one endpoint never affects the others.
    pub async fn broadcast(&mut self, event: &SignedMessage) -> PublishOutcome {
        let limit = self.timeout;
        let connector = &self.connector;

        let attempts = self.endpoints.iter_mut().map(|endpoint| async move {
            let result = match timeout(limit, endpoint.deliver(connector, event)).await {
                Ok(result) => result,
                Err(_) => Err(EndpointError::Timeout(limit)),
            };
            endpoint.record(&result);
            EndpointReport {
                url: endpoint.url.clone(),
                result,
            }
        });
        let outcome = PublishOutcome::new(join_all(attempts).await);

        for report in outcome.reports() {
            match &report.result {
                Ok(()) => debug!(relay = %report.url, event = %event.id, "relay accepted event"),
                Err(e) => warn!(relay = %report.url, event = %event.id, error = %e, "relay publish failed"),
            }
        }
        outcome
    }

    /// Open every connection up front. Returns how many came up.
    ///
    /// Failures are logged and left for the next broadcast to retry.
    pub async fn connect_all(&mut self) -> usize {
        let limit = self.timeout;
        let connector = &self.connector;

        let attempts = self.endpoints.iter_mut().map(|endpoint| async move {
            let result = match timeout(limit, endpoint.ensure_link(connector)).await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(EndpointError::Timeout(limit)),
            };
            endpoint.record(&result);
            if let Err(e) = &result {
                warn!(relay = %endpoint.url, error = %e, "relay connect failed");
            }
            result.is_ok()
        });
        let connected = join_all(attempts).await.into_iter().filter(|ok| *ok).count();
        info!(connected, total = self.endpoints.len(), "relay warm-up finished");
        connected
    }

    /// Close every open connection.
    pub async fn close_all(&mut self) {
        let limit = self.timeout;
        let closes = self.endpoints.iter_mut().map(|endpoint| async move {
            if let Some(mut link) = endpoint.link.take() {
                if timeout(limit, link.close()).await.is_err() {
                    debug!(relay = %endpoint.url, "relay close timed out");
                }
            }
            endpoint.state = ConnectionState::Disconnected;
        });
        join_all(closes).await;
    }
}

fn parse_relay_url(address: &str) -> Result<Url, EndpointError> {
    let address = address.trim();
    let url = Url::parse(address)
        .map_err(|e| EndpointError::InvalidAddress(format!("'{address}': {e}")))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(EndpointError::InvalidAddress(format!(
            "'{address}': scheme must be ws or wss"
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(EndpointError::InvalidAddress(format!("'{address}': missing host")));
    }
    Ok(url)
}
