//! feedcast - RSS/Atom to Nostr crossposter
//!
//! Reads settings from flags or the environment, then polls the feed until
//! SIGINT or SIGTERM.

use anyhow::Context;
use clap::Parser;
use feedcast::{CastConfig, ChangeDetector, Dispatcher, FeedWatcher, RawConfig, RelayPool, Signer};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "feedcast")]
#[command(about = "Crosspost the newest feed entry to Nostr relays")]
#[command(version)]
struct Cli {
    /// RSS/Atom feed URL (http, https or file)
    #[arg(long, env = "FEED_URL")]
    feed_url: Option<String>,

    /// Secret key, nsec1... or 64 hex characters
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// Relay URIs, comma or whitespace separated
    #[arg(long, env = "RELAY_ADDRESSES")]
    relays: Option<String>,

    /// Seconds between polls
    #[arg(long, env = "POLL_INTERVAL_SECONDS")]
    poll_interval: Option<String>,

    /// Per-relay timeout in seconds
    #[arg(long, env = "RELAY_TIMEOUT_SECONDS")]
    relay_timeout: Option<String>,

    /// Feed request timeout in seconds
    #[arg(long, env = "FEED_TIMEOUT_SECONDS")]
    feed_timeout: Option<String>,

    /// How many relays must accept: any, majority or all
    #[arg(long, env = "PUBLISH_POLICY")]
    publish_policy: Option<String>,

    /// Number of published identifiers to remember
    #[arg(long, env = "DEDUP_MEMORY")]
    dedup_memory: Option<String>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn raw_config(&self) -> RawConfig {
        RawConfig {
            feed_url: self.feed_url.clone(),
            private_key: self.private_key.clone(),
            relays: self.relays.clone(),
            poll_interval: self.poll_interval.clone(),
            relay_timeout: self.relay_timeout.clone(),
            feed_timeout: self.feed_timeout.clone(),
            publish_policy: self.publish_policy.clone(),
            dedup_memory: self.dedup_memory.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = build_filter(std::env::var("RUST_LOG").ok().as_deref());
    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    let config = CastConfig::from_raw(cli.raw_config()).context("invalid configuration")?;
    info!(
        feed = %config.feed_url,
        relays = config.relays.len(),
        interval = ?config.poll_interval,
        policy = %config.publish_policy,
        "loaded config"
    );

    let signer = Signer::new(&config.private_key);
    info!(pubkey = %signer.public_key_hex(), npub = %signer.npub(), "signing identity");

    let feed = FeedWatcher::new(config.feed_url.clone(), config.feed_timeout)?;

    let mut pool = RelayPool::new(config.relay_timeout);
    for relay in &config.relays {
        if let Err(e) = pool.add_endpoint(relay) {
            warn!(relay = %relay, error = %e, "ignoring relay");
        }
    }
    if pool.is_empty() {
        anyhow::bail!("no usable relay addresses");
    }

    let mut dispatcher = Dispatcher::new(feed, signer, pool, config.poll_interval)
        .with_policy(config.publish_policy)
        .with_detector(ChangeDetector::with_memory(config.dedup_memory));

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    if !dispatcher.warm_up(&mut shutdown_rx).await {
        info!("feedcast stopped");
        return Ok(());
    }

    if cli.once {
        dispatcher.run_cycle().await;
        dispatcher.pool_mut().close_all().await;
        return Ok(());
    }

    dispatcher.run(shutdown_rx).await;
    info!("feedcast stopped");
    Ok(())
}

/// `RUST_LOG` wins when it parses; otherwise log this crate at info.
fn build_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("feedcast=info"))
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
