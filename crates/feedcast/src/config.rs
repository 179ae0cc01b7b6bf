//! Runtime configuration.
//!
//! Settings arrive as raw strings (from flags or environment variables via
//! clap) and are validated once, at startup, into a [`CastConfig`].

use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::CastError;
use crate::policy::PublishPolicy;
use crate::signer::PrivateKey;

/// Relays used when none are configured.
pub const DEFAULT_RELAYS: &[&str] = &[
    "wss://relay.damus.io",
    "wss://relay.snort.social",
    "wss://relay.nostr.band",
    "wss://relay.primal.net",
    "wss://relay.highlighter.foundation",
    "wss://relay.nsecbunker.com",
];

/// Default delay between poll cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default feed request timeout.
pub const DEFAULT_FEED_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of published identifiers remembered.
pub const DEFAULT_DEDUP_MEMORY: usize = 1;

/// Largest accepted `DEDUP_MEMORY`.
pub const MAX_DEDUP_MEMORY: usize = 4096;

/// Unvalidated settings, one field per option.
#[derive(Debug, Clone, Default)]
pub struct RawConfig {
    /// Feed address.
    pub feed_url: Option<String>,
    /// Secret key, nsec or hex.
    pub private_key: Option<String>,
    /// Comma or whitespace separated relay list.
    pub relays: Option<String>,
    /// Seconds between polls.
    pub poll_interval: Option<String>,
    /// Per-relay timeout in seconds.
    pub relay_timeout: Option<String>,
    /// Feed request timeout in seconds.
    pub feed_timeout: Option<String>,
    /// `any`, `majority` or `all`.
    pub publish_policy: Option<String>,
    /// Number of identifiers remembered.
    pub dedup_memory: Option<String>,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct CastConfig {
    /// Feed address.
    pub feed_url: Url,
    /// Signing key.
    pub private_key: PrivateKey,
    /// Relay addresses, in order, possibly with duplicates.
    pub relays: Vec<String>,
    /// Delay between poll cycles.
    pub poll_interval: Duration,
    /// Per-relay timeout.
    pub relay_timeout: Duration,
    /// Feed request timeout.
    pub feed_timeout: Duration,
    /// Publish-success policy.
    pub publish_policy: PublishPolicy,
    /// Number of identifiers remembered.
    pub dedup_memory: usize,
}

impl CastConfig {
    /// Validate raw settings.
    ///
    /// # Errors
    ///
    /// Returns [`CastError::Config`] naming the first bad or missing setting.
    pub fn from_raw(raw: RawConfig) -> Result<Self, CastError> {
        let feed_url = required(raw.feed_url, "FEED_URL")?;
        let feed_url = Url::parse(&feed_url)
            .map_err(|e| CastError::Config(format!("FEED_URL '{feed_url}' is invalid: {e}")))?;
        if !matches!(feed_url.scheme(), "http" | "https" | "file") {
            return Err(CastError::Config(format!(
                "FEED_URL must use http, https or file (got '{}')",
                feed_url.scheme()
            )));
        }

        let private_key = required(raw.private_key, "PRIVATE_KEY")?;
        let private_key = PrivateKey::parse(&private_key)
            .map_err(|e| CastError::Config(format!("PRIVATE_KEY: {e}")))?;

        let relays = match non_empty(raw.relays) {
            Some(list) => split_relays(&list),
            None => DEFAULT_RELAYS.iter().map(ToString::to_string).collect(),
        };
        if relays.is_empty() {
            return Err(CastError::Config("RELAY_ADDRESSES lists no relays".to_string()));
        }

        let poll_interval = seconds(raw.poll_interval, "POLL_INTERVAL_SECONDS", DEFAULT_POLL_INTERVAL)?;
        let relay_timeout = seconds(
            raw.relay_timeout,
            "RELAY_TIMEOUT_SECONDS",
            crate::relay::DEFAULT_ENDPOINT_TIMEOUT,
        )?;
        let feed_timeout = seconds(raw.feed_timeout, "FEED_TIMEOUT_SECONDS", DEFAULT_FEED_TIMEOUT)?;

        let publish_policy = match non_empty(raw.publish_policy) {
            Some(policy) => policy.parse()?,
            None => PublishPolicy::default(),
        };

        let dedup_memory = match non_empty(raw.dedup_memory) {
            Some(value) => positive(&value, "DEDUP_MEMORY")?,
            None => DEFAULT_DEDUP_MEMORY,
        };
        if dedup_memory > MAX_DEDUP_MEMORY {
            return Err(CastError::Config(format!(
                "DEDUP_MEMORY must be at most {MAX_DEDUP_MEMORY} (got {dedup_memory})"
            )));
        }

        Ok(Self {
            feed_url,
            private_key,
            relays,
            poll_interval,
            relay_timeout,
            feed_timeout,
            publish_policy,
            dedup_memory,
        })
    }
}

/// Split a relay list on commas and whitespace, dropping empty pieces.
#[must_use]
pub fn split_relays(list: &str) -> Vec<String> {
    list.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(value: Option<String>, name: &str) -> Result<String, CastError> {
    non_empty(value).ok_or_else(|| CastError::Config(format!("{name} is not set")))
}

fn positive<T>(value: &str, name: &str) -> Result<T, CastError>
where
    T: FromStr + PartialEq + Default,
{
    match value.parse::<T>() {
        Ok(n) if n != T::default() => Ok(n),
        _ => Err(CastError::Config(format!(
            "{name} must be a positive integer (got '{value}')"
        ))),
    }
}

fn seconds(value: Option<String>, name: &str, default: Duration) -> Result<Duration, CastError> {
    match non_empty(value) {
        Some(value) => positive(&value, name).map(Duration::from_secs),
        None => Ok(default),
    }
}
