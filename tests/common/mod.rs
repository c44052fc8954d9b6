//! Shared test doubles for integration tests

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use dubly::analytics::{EnrichedClick, RawClick};
use dubly::storage::ClickSink;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Click sink that keeps every batch in memory
#[derive(Default)]
pub struct MemorySink {
    clicks: Mutex<Vec<EnrichedClick>>,
    batches: AtomicUsize,
    fail: bool,
}

impl MemorySink {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn clicks(&self) -> Vec<EnrichedClick> {
        self.clicks.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.clicks.lock().len()
    }

    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    /// Poll until at least `count` clicks have arrived
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.len() >= count
    }
}

#[async_trait]
impl ClickSink for MemorySink {
    async fn insert_clicks(&self, clicks: &[EnrichedClick]) -> Result<()> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("sink unavailable");
        }
        self.clicks.lock().extend_from_slice(clicks);
        Ok(())
    }
}

pub fn raw_click(link_id: i64, ip: &str, user_agent: &str) -> RawClick {
    RawClick {
        link_id,
        clicked_at: 1_700_000_000 + link_id,
        ip: ip.to_string(),
        user_agent: user_agent.to_string(),
        referer: String::new(),
    }
}
