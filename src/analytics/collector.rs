//! Buffered click collector with periodic, enriched batch flushes
//!
//! The hot path only does a non-blocking enqueue. A single worker task owns
//! the receiving end of the buffer and, on every tick and once more on
//! shutdown, drains it, drops automated traffic, enriches what is left and
//! writes it to the [`ClickSink`] as one batch.
//!
//! A click pushed while the shutdown drain is running may or may not make it
//! into the final batch. Clicks pushed after the worker exits are dropped.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use crate::analytics::bot::is_bot;
use crate::analytics::enrich::{parse_user_agent, referer_host};
use crate::analytics::geoip::GeoResolver;
use crate::analytics::models::{EnrichedClick, RawClick};
use crate::config::AnalyticsConfig;
use crate::storage::ClickSink;
use crate::threat::ThreatChecker;

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Buffer capacity; pushes beyond it are dropped
    pub buffer_size: usize,
    pub flush_interval: Duration,
    /// Drop bot / threat clicks instead of persisting them
    pub filter_automated: bool,
}

impl From<&AnalyticsConfig> for CollectorConfig {
    fn from(config: &AnalyticsConfig) -> Self {
        Self {
            buffer_size: config.buffer_size,
            flush_interval: config.flush_interval,
            filter_automated: config.filter_automated,
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            buffer_size: 50_000,
            flush_interval: Duration::from_secs(30),
            filter_automated: true,
        }
    }
}

/// Classifies and enriches raw clicks at flush time
#[derive(Clone)]
pub struct ClickEnricher {
    geo: Arc<GeoResolver>,
    threats: Option<Arc<ThreatChecker>>,
}

impl ClickEnricher {
    pub fn new(geo: Arc<GeoResolver>, threats: Option<Arc<ThreatChecker>>) -> Self {
        Self { geo, threats }
    }

    /// Bot User-Agent or blocked IP
    pub fn is_automated(&self, click: &RawClick) -> bool {
        if is_bot(&click.user_agent) {
            return true;
        }
        self.threats
            .as_ref()
            .is_some_and(|threats| threats.is_blocked(&click.ip))
    }

    pub fn enrich(&self, click: RawClick) -> EnrichedClick {
        let ua = parse_user_agent(&click.user_agent);
        let referer_domain = referer_host(&click.referer);
        let geo = self.geo.lookup(&click.ip);

        EnrichedClick {
            link_id: click.link_id,
            clicked_at: click.clicked_at,
            ip: click.ip,
            user_agent: click.user_agent,
            referer: click.referer,
            referer_domain,
            geo,
            browser: ua.browser,
            browser_version: ua.browser_version,
            os: ua.os,
            device_type: ua.device_type,
        }
    }
}

/// Worker that owns the buffer's receiving end
struct FlushWorker {
    receiver: mpsc::Receiver<RawClick>,
    sink: Arc<dyn ClickSink>,
    enricher: ClickEnricher,
    capacity: usize,
    flush_interval: Duration,
    filter_automated: bool,
}

impl FlushWorker {
    async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Skip the first tick which fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush().await;
                }
                _ = shutdown_rx.changed() => {
                    info!("Analytics collector received shutdown signal, flushing...");
                    self.flush().await;
                    break;
                }
            }
        }
    }

    /// Drain whatever is buffered right now
    fn drain(&mut self) -> Vec<RawClick> {
        let mut batch = Vec::new();
        while batch.len() < self.capacity {
            match self.receiver.try_recv() {
                Ok(click) => batch.push(click),
                Err(_) => break,
            }
        }
        batch
    }

    async fn flush(&mut self) {
        let batch = self.drain();
        if batch.is_empty() {
            return;
        }

        let received = batch.len();
        let records: Vec<EnrichedClick> = batch
            .into_iter()
            .filter(|click| !(self.filter_automated && self.enricher.is_automated(click)))
            .map(|click| self.enricher.enrich(click))
            .collect();

        let skipped = received - records.len();
        if skipped > 0 {
            debug!(skipped, "skipped automated clicks");
        }

        if records.is_empty() {
            return;
        }

        match self.sink.insert_clicks(&records).await {
            Ok(()) => info!("analytics: flushed {} clicks", records.len()),
            Err(e) => error!(
                "analytics flush failed, dropping {} clicks: {:#}",
                records.len(),
                e
            ),
        }
    }
}

pub struct AnalyticsCollector {
    sender: mpsc::Sender<RawClick>,
    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AnalyticsCollector {
    /// Create the collector and spawn its flush worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: CollectorConfig, sink: Arc<dyn ClickSink>, enricher: ClickEnricher) -> Self {
        let capacity = config.buffer_size.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = FlushWorker {
            receiver,
            sink,
            enricher,
            capacity,
            flush_interval: config.flush_interval,
            filter_automated: config.filter_automated,
        };

        let handle = tokio::spawn(worker.run(shutdown_rx));

        Self {
            sender,
            shutdown_tx,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Record a click without blocking.
    ///
    /// If the buffer is full (or the collector is shut down) the click is
    /// dropped; redirect availability wins over analytics completeness.
    pub fn push(&self, click: RawClick) {
        if self.sender.try_send(click).is_err() {
            trace!("analytics buffer full or closed, dropping click");
        }
    }

    /// Stop periodic flushing, flush what is buffered and wait for it.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Analytics collector task ended abnormally: {}", e);
            }
        }
    }
}
