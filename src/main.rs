use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dubly::analytics::{AnalyticsCollector, ClickEnricher, CollectorConfig, GeoResolver};
use dubly::cache::RedirectCache;
use dubly::config::Config;
use dubly::redirect;
use dubly::storage::{CachedStorage, ClickSink, SqliteStorage, Storage};
use dubly::threat::{feeds, ThreatChecker};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    info!("Using SQLite storage: {}", config.database.url);
    let sqlite = Arc::new(
        SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
    );
    sqlite.init().await?;
    info!("Database initialized successfully");

    let cache = Arc::new(RedirectCache::new(config.cache.max_entries));
    info!("Redirect cache capacity: {}", cache.capacity());
    let storage: Arc<dyn Storage> = Arc::new(CachedStorage::new(sqlite.clone(), cache));

    let geo = Arc::new(GeoResolver::open(config.analytics.geoip_path.as_deref()));

    let threats = if config.threat.enabled {
        let checker = Arc::new(ThreatChecker::new(&config.threat, feeds::default_feeds())?);
        checker.start();
        info!(
            "Threat feeds enabled, refreshing every {}s",
            config.threat.refresh_interval.as_secs()
        );
        Some(checker)
    } else {
        info!("Threat feeds disabled");
        None
    };

    let sink: Arc<dyn ClickSink> = sqlite;
    let collector = Arc::new(AnalyticsCollector::new(
        CollectorConfig::from(&config.analytics),
        sink,
        ClickEnricher::new(geo, threats.clone()),
    ));

    let router = redirect::create_redirect_router(storage, Arc::clone(&collector));

    let addr = format!(
        "{}:{}",
        config.redirect_server.host, config.redirect_server.port
    );
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind redirect server to {}", addr))?;
    info!("🚀 Redirect server listening on http://{}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped, flushing analytics...");
    collector.shutdown().await;
    if let Some(threats) = threats {
        threats.stop().await;
    }
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
