//! Analytics collector integration tests
//!
//! Cover buffering, periodic and shutdown flushes, automated-traffic
//! filtering, and sink failures.

mod common;

use common::{raw_click, MemorySink, CHROME_UA};
use dubly::analytics::{AnalyticsCollector, ClickEnricher, CollectorConfig, DeviceType, GeoResolver};
use dubly::config::ThreatConfig;
use dubly::models::NewLink;
use dubly::storage::{ClickSink, SqliteStorage, Storage};
use dubly::threat::{feeds, ThreatChecker, ThreatIndex};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn config(buffer_size: usize, flush_interval: Duration) -> CollectorConfig {
    CollectorConfig {
        buffer_size,
        flush_interval,
        filter_automated: true,
    }
}

fn plain_enricher() -> ClickEnricher {
    ClickEnricher::new(Arc::new(GeoResolver::disabled()), None)
}

fn collector_with(sink: &Arc<MemorySink>, config: CollectorConfig, enricher: ClickEnricher) -> AnalyticsCollector {
    let sink: Arc<dyn ClickSink> = sink.clone();
    AnalyticsCollector::new(config, sink, enricher)
}

#[tokio::test]
async fn test_shutdown_flushes_buffered_clicks() {
    let sink = Arc::new(MemorySink::default());
    let collector = collector_with(&sink, config(100, Duration::from_secs(3600)), plain_enricher());

    for id in 1..=10 {
        collector.push(raw_click(id, "203.0.113.9", CHROME_UA));
    }
    assert_eq!(sink.len(), 0, "nothing should be written before a flush");

    collector.shutdown().await;

    let clicks = sink.clicks();
    assert_eq!(clicks.len(), 10);

    let ids: HashSet<i64> = clicks.iter().map(|c| c.link_id).collect();
    assert_eq!(ids.len(), 10, "each click should be written exactly once");

    let first = clicks.iter().find(|c| c.link_id == 1).unwrap();
    assert_eq!(first.browser, "Chrome");
    assert_eq!(first.device_type, DeviceType::Desktop);
    assert_eq!(first.geo.country, "");
}

#[tokio::test]
async fn test_overflow_drops_excess_clicks() {
    let sink = Arc::new(MemorySink::default());
    let collector = collector_with(&sink, config(1, Duration::from_secs(3600)), plain_enricher());

    for id in 1..=5 {
        collector.push(raw_click(id, "203.0.113.9", CHROME_UA));
    }

    collector.shutdown().await;

    let clicks = sink.clicks();
    assert_eq!(clicks.len(), 1);
    assert_eq!(clicks[0].link_id, 1, "the first click should be the one kept");
}

#[tokio::test]
async fn test_periodic_flush() {
    let sink = Arc::new(MemorySink::default());
    let collector = collector_with(&sink, config(100, Duration::from_millis(50)), plain_enricher());

    for id in 1..=3 {
        collector.push(raw_click(id, "203.0.113.9", CHROME_UA));
    }

    assert!(
        sink.wait_for(3, Duration::from_secs(5)).await,
        "periodic flush should write clicks without shutdown"
    );

    collector.shutdown().await;
    assert_eq!(sink.len(), 3);
}

#[tokio::test]
async fn test_empty_flushes_skip_sink() {
    let sink = Arc::new(MemorySink::default());
    let collector = collector_with(&sink, config(100, Duration::from_millis(20)), plain_enricher());

    tokio::time::sleep(Duration::from_millis(120)).await;
    collector.shutdown().await;

    assert_eq!(sink.batches(), 0);
}

#[tokio::test]
async fn test_bot_clicks_are_not_persisted() {
    let sink = Arc::new(MemorySink::default());
    let collector = collector_with(&sink, config(100, Duration::from_secs(3600)), plain_enricher());

    collector.push(raw_click(1, "203.0.113.9", CHROME_UA));
    collector.push(raw_click(2, "203.0.113.9", "curl/8.4.0"));
    collector.push(raw_click(
        3,
        "203.0.113.9",
        "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
    ));

    collector.shutdown().await;

    let clicks = sink.clicks();
    assert_eq!(clicks.len(), 1);
    assert_eq!(clicks[0].link_id, 1);
}

#[tokio::test]
async fn test_threat_ip_clicks_are_not_persisted() {
    let threats = ThreatChecker::new(&ThreatConfig::default(), Vec::new()).unwrap();
    threats.install(ThreatIndex::new(
        feeds::parse_cidr_list(&["198.51.100.0/24"]),
        ["192.0.2.1".parse().unwrap()].into_iter().collect(),
    ));
    let enricher = ClickEnricher::new(Arc::new(GeoResolver::disabled()), Some(Arc::new(threats)));

    let sink = Arc::new(MemorySink::default());
    let collector = collector_with(&sink, config(100, Duration::from_secs(3600)), enricher);

    collector.push(raw_click(1, "198.51.100.77", CHROME_UA));
    collector.push(raw_click(2, "192.0.2.1", CHROME_UA));
    collector.push(raw_click(3, "203.0.113.9", CHROME_UA));

    collector.shutdown().await;

    let ids: Vec<i64> = sink.clicks().iter().map(|c| c.link_id).collect();
    assert_eq!(ids, vec![3]);
}

#[tokio::test]
async fn test_filtering_can_be_disabled() {
    let sink = Arc::new(MemorySink::default());
    let config = CollectorConfig {
        buffer_size: 100,
        flush_interval: Duration::from_secs(3600),
        filter_automated: false,
    };
    let collector = collector_with(&sink, config, plain_enricher());

    collector.push(raw_click(1, "203.0.113.9", CHROME_UA));
    collector.push(raw_click(2, "203.0.113.9", "curl/8.4.0"));

    collector.shutdown().await;

    let clicks = sink.clicks();
    assert_eq!(clicks.len(), 2);
    let bot = clicks.iter().find(|c| c.link_id == 2).unwrap();
    assert_eq!(bot.user_agent, "curl/8.4.0");
}

#[tokio::test]
async fn test_sink_failure_drops_batch() {
    let sink = Arc::new(MemorySink::failing());
    let collector = collector_with(&sink, config(100, Duration::from_millis(20)), plain_enricher());

    collector.push(raw_click(1, "203.0.113.9", CHROME_UA));
    tokio::time::sleep(Duration::from_millis(100)).await;
    collector.push(raw_click(2, "203.0.113.9", CHROME_UA));

    tokio::time::timeout(Duration::from_secs(5), collector.shutdown())
        .await
        .expect("shutdown should complete despite sink failures");

    assert_eq!(sink.len(), 0);
    assert!(sink.batches() >= 1);
}

#[tokio::test]
async fn test_shutdown_is_idempotent_and_push_after_is_dropped() {
    let sink = Arc::new(MemorySink::default());
    let collector = collector_with(&sink, config(100, Duration::from_secs(3600)), plain_enricher());

    collector.push(raw_click(1, "203.0.113.9", CHROME_UA));
    collector.shutdown().await;
    collector.shutdown().await;

    collector.push(raw_click(2, "203.0.113.9", CHROME_UA));
    collector.shutdown().await;

    let ids: Vec<i64> = sink.clicks().iter().map(|c| c.link_id).collect();
    assert_eq!(ids, vec![1]);
}

#[tokio::test]
async fn test_concurrent_pushes() {
    let sink = Arc::new(MemorySink::default());
    let collector = Arc::new(collector_with(
        &sink,
        config(10_000, Duration::from_secs(3600)),
        plain_enricher(),
    ));

    let mut handles = Vec::new();
    for task in 0..10i64 {
        let collector = Arc::clone(&collector);
        handles.push(tokio::spawn(async move {
            for n in 0..100i64 {
                collector.push(raw_click(task * 100 + n, "203.0.113.9", CHROME_UA));
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    collector.shutdown().await;

    let ids: HashSet<i64> = sink.clicks().iter().map(|c| c.link_id).collect();
    assert_eq!(ids.len(), 1000);
}

#[tokio::test]
async fn test_sqlite_sink_records_clicks() {
    let storage = Arc::new(SqliteStorage::new("sqlite::memory:", 1).await.unwrap());
    storage.init().await.unwrap();

    let link = storage
        .create_link(&NewLink {
            slug: "launch".to_string(),
            domain: "short.example".to_string(),
            destination: "https://example.com/launch".to_string(),
        })
        .await
        .unwrap();

    let sink: Arc<dyn ClickSink> = storage.clone();
    let collector = AnalyticsCollector::new(
        config(100, Duration::from_secs(3600)),
        sink,
        plain_enricher(),
    );

    collector.push(raw_click(link.id, "203.0.113.9", CHROME_UA));
    collector.push(raw_click(link.id, "203.0.113.10", CHROME_UA));
    collector.shutdown().await;

    assert_eq!(storage.count_clicks(link.id).await.unwrap(), 2);
}
