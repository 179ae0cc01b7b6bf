//! Feed retrieval.
//!
//! [`FeedWatcher`] is stateless: every call fetches the feed and
//! returns its first entry. Unreachable, unparsable or empty feeds all come
//! back as `None`, with the cause logged.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use crate::error::{CastError, FeedError};

/// Title used when an entry carries no title element at all.
pub const DEFAULT_TITLE: &str = "New Post";

static TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]*>").unwrap_or_else(|_| unreachable!()));

/// The newest entry of a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    /// Dedup key: the canonical link when present, else the entry id.
    pub identifier: String,
    /// Entry title.
    pub title: String,
    /// Canonical link rendered into the note.
    pub link: Option<String>,
    /// Plain-text body (content or summary, HTML stripped).
    pub body: Option<String>,
}

impl FeedItem {
    /// Create an item whose identifier is also its link.
    #[must_use]
    pub fn linked(link: impl Into<String>, title: impl Into<String>) -> Self {
        let link = link.into();
        Self {
            identifier: link.clone(),
            title: title.into(),
            link: Some(link),
            body: None,
        }
    }

    /// Create an item with no link.
    #[must_use]
    pub fn unlinked(identifier: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            title: title.into(),
            link: None,
            body: None,
        }
    }

    /// Attach a plain-text body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    fn from_entry(entry: feed_rs::model::Entry) -> Self {
        let link = entry
            .links
            .first()
            .map(|l| l.href.trim().to_string())
            .filter(|href| !href.is_empty());
        let identifier = link.clone().unwrap_or_else(|| entry.id.clone());
        let title = entry
            .title
            .map_or_else(|| DEFAULT_TITLE.to_string(), |t| t.content);
        let body = entry
            .content
            .and_then(|c| c.body)
            .or_else(|| entry.summary.map(|s| s.content))
            .map(|raw| strip_html(&raw).trim().to_string())
            .filter(|text| !text.is_empty());

        Self {
            identifier,
            title,
            link,
            body,
        }
    }
}

/// Source of the latest feed item.
pub trait FeedSource {
    /// Fetch the newest item, or `None` when there is nothing to read.
    fn fetch_latest(&self) -> impl Future<Output = Option<FeedItem>> + Send;
}

/// Reads a feed over HTTP(S) or from a `file://` URL.
#[derive(Debug, Clone)]
pub struct FeedWatcher {
    url: Url,
    client: reqwest::Client,
}

impl FeedWatcher {
    /// Create a watcher with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`CastError::Config`] for an unsupported scheme or if the HTTP
    /// client cannot be built.
    pub fn new(url: Url, timeout: Duration) -> Result<Self, CastError> {
        if !matches!(url.scheme(), "http" | "https" | "file") {
            return Err(CastError::Config(format!(
                "FEED_URL must be an http, https or file URL (got '{url}')"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("feedcast/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CastError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { url, client })
    }

    /// Feed address.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Fetch and parse, surfacing the failure cause.
    ///
    /// # Errors
    ///
    /// Returns a [`FeedError`] describing why the feed could not be read.
    pub async fn try_fetch_latest(&self) -> Result<Option<FeedItem>, FeedError> {
        let bytes = match self.url.scheme() {
            "http" | "https" => {
                let response = self
                    .client
                    .get(self.url.clone())
                    .send()
                    .await
                    .map_err(|e| FeedError::Request(e.to_string()))?;
                let status = response.status();
                if !status.is_success() {
                    return Err(FeedError::Status(status.as_u16()));
                }
                response
                    .bytes()
                    .await
                    .map_err(|e| FeedError::Request(e.to_string()))?
                    .to_vec()
            }
            "file" => {
                let path = self
                    .url
                    .to_file_path()
                    .map_err(|()| FeedError::UnsupportedScheme(self.url.to_string()))?;
                tokio::fs::read(path).await?
            }
            other => return Err(FeedError::UnsupportedScheme(other.to_string())),
        };
        debug!(url = %self.url, bytes = bytes.len(), "fetched feed");
        parse_latest(&bytes)
    }
}

impl FeedSource for FeedWatcher {
    fn fetch_latest(&self) -> impl Future<Output = Option<FeedItem>> + Send {
        async move {
            match self.try_fetch_latest().await {
                Ok(item) => item,
                Err(e) => {
                    warn!(url = %self.url, error = %e, "feed unavailable");
                    None
                }
            }
        }
    }
}

/// Parse a feed document and return its first entry.
///
/// # Errors
///
/// Returns [`FeedError::Parse`] if the bytes are not RSS, Atom or JSON Feed.
pub fn parse_latest(bytes: &[u8]) -> Result<Option<FeedItem>, FeedError> {
    let feed = feed_rs::parser::parse(bytes).map_err(|e| FeedError::Parse(e.to_string()))?;
    Ok(feed.entries.into_iter().next().map(FeedItem::from_entry))
}

/// Decode HTML entities, then drop tags.
#[must_use]
pub fn strip_html(text: &str) -> String {
    let decoded = html_escape::decode_html_entities(text);
    TAG_REGEX.replace_all(&decoded, "").into_owned()
}

/// In-memory feed for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct FakeFeed {
    current: Arc<Mutex<Option<FeedItem>>>,
    fetches: Arc<AtomicUsize>,
}

impl FakeFeed {
    /// Create an empty fake feed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the given item.
    #[must_use]
    pub fn with_item(item: FeedItem) -> Self {
        let feed = Self::new();
        feed.set(item);
        feed
    }

    /// Replace the latest item.
    pub fn set(&self, item: FeedItem) {
        *self.current.lock() = Some(item);
    }

    /// Make the feed look empty or unreachable.
    pub fn clear(&self) {
        *self.current.lock() = None;
    }

    /// Number of fetches served.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl FeedSource for FakeFeed {
    fn fetch_latest(&self) -> impl Future<Output = Option<FeedItem>> + Send {
        let item = self.current.lock().clone();
        self.fetches.fetch_add(1, Ordering::SeqCst);
        async move { item }
    }
}
