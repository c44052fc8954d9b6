//! IP threat classification
//!
//! [`ThreatChecker`] keeps an in-memory index of blocked network ranges and
//! individual addresses, rebuilt from [`feeds`] on a fixed period. Readers
//! always see one complete snapshot; a refresh builds a new index and swaps
//! it in.

pub mod feeds;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use ipnet::IpNet;
use parking_lot::Mutex;
use reqwest::Client;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{info, warn};

use crate::config::ThreatConfig;
use feeds::{FeedData, FeedSource};

/// Immutable snapshot of everything currently considered blocked
#[derive(Debug, Default)]
pub struct ThreatIndex {
    ranges: Arc<Vec<IpNet>>,
    addresses: Arc<HashSet<IpAddr>>,
}

impl ThreatIndex {
    pub fn new(ranges: Vec<IpNet>, addresses: HashSet<IpAddr>) -> Self {
        Self {
            ranges: Arc::new(ranges),
            addresses: Arc::new(addresses.into_iter().map(|ip| ip.to_canonical()).collect()),
        }
    }

    /// IPv4-mapped IPv6 addresses are matched as their IPv4 form.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        let ip = ip.to_canonical();
        // O(1) check against individual blocked IPs before the range scan
        if self.addresses.contains(&ip) {
            return true;
        }
        self.ranges.iter().any(|net| net.contains(&ip))
    }

    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn address_count(&self) -> usize {
        self.addresses.len()
    }
}

/// Outcome of one refresh cycle
#[derive(Debug, Clone, Default)]
pub struct RefreshSummary {
    /// Ranges fetched this cycle, remote and hardcoded
    pub ranges: usize,
    /// Addresses fetched this cycle
    pub addresses: usize,
    /// Whether the live range list was swapped for the fetched one
    pub ranges_replaced: bool,
    pub addresses_replaced: bool,
    /// Names of feeds that failed
    pub failed: Vec<String>,
}

pub struct ThreatChecker {
    index: ArcSwap<ThreatIndex>,
    feeds: Vec<FeedSource>,
    client: Client,
    refresh_interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ThreatChecker {
    pub fn new(config: &ThreatConfig, feeds: Vec<FeedSource>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("dubly-threat-feeds/", env!("CARGO_PKG_VERSION")))
            .timeout(config.fetch_timeout)
            .build()
            .context("failed to build HTTP client for threat feeds")?;

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            index: ArcSwap::from_pointee(ThreatIndex::default()),
            feeds,
            client,
            refresh_interval: config.refresh_interval,
            shutdown_tx,
            worker: Mutex::new(None),
        })
    }

    /// Replace the live index directly (seeding from a snapshot, tests)
    pub fn install(&self, index: ThreatIndex) {
        self.index.store(Arc::new(index));
    }

    pub fn snapshot(&self) -> Arc<ThreatIndex> {
        self.index.load_full()
    }

    /// Returns true if `ip` is in a blocked range or on an address blocklist.
    ///
    /// Unparseable input is never blocked.
    pub fn is_blocked(&self, ip: &str) -> bool {
        let Ok(addr) = ip.trim().parse::<IpAddr>() else {
            return false;
        };
        self.index.load().contains(&addr)
    }

    /// Spawn the refresh loop: refresh immediately, then every interval.
    ///
    /// Calling `start` on a running checker does nothing.
    pub fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }

        let checker = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        *worker = Some(tokio::spawn(async move {
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                checker.refresh().await;

                tokio::select! {
                    _ = tokio::time::sleep(checker.refresh_interval) => {}
                    _ = shutdown_rx.changed() => {
                        info!("Threat checker received shutdown signal");
                        break;
                    }
                }
            }
        }));
    }

    /// Stop the refresh loop.
    ///
    /// Interrupts the wait between refreshes but lets an in-flight refresh
    /// finish; returns once the loop has exited.
    pub async fn stop(&self) {
        self.shutdown_tx.send_replace(true);

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Threat checker task ended abnormally: {}", e);
            }
        }
    }

    /// Fetch every feed concurrently and swap in the rebuilt index.
    ///
    /// Ranges are replaced only when at least one remote range feed
    /// delivered entries; hardcoded lists alone never displace a learned
    /// range list. Addresses are replaced when the new set is non-empty.
    /// A cycle in which every network source fails leaves the index as it
    /// was.
    pub async fn refresh(&self) -> RefreshSummary {
        let mut tasks = JoinSet::new();
        for source in &self.feeds {
            let client = self.client.clone();
            let source = source.clone();
            tasks.spawn(async move {
                let result = feeds::load(&client, &source).await;
                (source.name().to_string(), source.is_remote(), result)
            });
        }

        let mut remote_ranges = Vec::new();
        let mut static_ranges = Vec::new();
        let mut addresses = HashSet::new();
        let mut failed = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, true, Ok(FeedData::Ranges(found)))) => remote_ranges.extend(found),
                Ok((_, false, Ok(FeedData::Ranges(found)))) => static_ranges.extend(found),
                Ok((_, _, Ok(FeedData::Addresses(found)))) => addresses.extend(found),
                Ok((name, _, Err(e))) => {
                    warn!(feed = %name, error = %e, "threat feed refresh failed");
                    failed.push(name);
                }
                Err(e) => {
                    warn!(error = %e, "threat feed task failed");
                    failed.push("<task>".to_string());
                }
            }
        }

        let current = self.index.load_full();

        let ranges_replaced =
            !remote_ranges.is_empty() || (current.ranges.is_empty() && !static_ranges.is_empty());
        let addresses_replaced = !addresses.is_empty();

        let summary = RefreshSummary {
            ranges: remote_ranges.len() + static_ranges.len(),
            addresses: addresses.len(),
            ranges_replaced,
            addresses_replaced,
            failed,
        };

        let next = ThreatIndex {
            ranges: if ranges_replaced {
                remote_ranges.extend(static_ranges);
                Arc::new(remote_ranges)
            } else {
                Arc::clone(&current.ranges)
            },
            addresses: if addresses_replaced {
                Arc::new(addresses)
            } else {
                Arc::clone(&current.addresses)
            },
        };

        info!(
            ranges = next.range_count(),
            addresses = next.address_count(),
            failed_feeds = summary.failed.len(),
            "threat index refreshed"
        );
        self.index.store(Arc::new(next));

        summary
    }
}
