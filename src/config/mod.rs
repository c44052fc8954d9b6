use anyhow::{bail, Context};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub redirect_server: ServerConfig,
    pub cache: CacheConfig,
    pub analytics: AnalyticsConfig,
    pub threat: ThreatConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of links held by the redirect cache
    pub max_entries: usize,
}

#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Path to a MaxMind City .mmdb file; geo enrichment is off when unset
    pub geoip_path: Option<String>,
    /// Capacity of the click buffer; clicks beyond it are dropped
    pub buffer_size: usize,
    pub flush_interval: Duration,
    /// Skip persisting clicks classified as bot or threat traffic
    pub filter_automated: bool,
}

#[derive(Debug, Clone)]
pub struct ThreatConfig {
    pub enabled: bool,
    pub refresh_interval: Duration,
    /// Per-request timeout for feed downloads
    pub fetch_timeout: Duration,
}

impl Default for ThreatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_interval: Duration::from_secs(24 * 60 * 60),
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_vars<F>(var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        let database_url =
            get("DATABASE_URL").unwrap_or_else(|| "sqlite://./dubly.db?mode=rwc".to_string());
        let max_connections = parse_positive(&get, "DATABASE_MAX_CONNECTIONS", 5u32)?;

        let redirect_host = get("REDIRECT_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let redirect_port = get("REDIRECT_PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse::<u16>()
            .context("REDIRECT_PORT must be a valid port number")?;

        let cache_size = parse_positive(&get, "LINK_CACHE_SIZE", 10_000usize)?;

        let buffer_size = parse_positive(&get, "ANALYTICS_BUFFER_SIZE", 50_000usize)?;
        let flush_interval_secs = parse_positive(&get, "ANALYTICS_FLUSH_INTERVAL_SECS", 30u64)?;
        let filter_automated = parse_bool(&get, "ANALYTICS_FILTER_AUTOMATED", true)?;

        let threat_defaults = ThreatConfig::default();
        let threat_enabled = parse_bool(&get, "THREAT_FEEDS_ENABLED", threat_defaults.enabled)?;
        let refresh_secs = parse_positive(
            &get,
            "THREAT_REFRESH_INTERVAL_SECS",
            threat_defaults.refresh_interval.as_secs(),
        )?;
        let fetch_timeout_secs = parse_positive(
            &get,
            "THREAT_FETCH_TIMEOUT_SECS",
            threat_defaults.fetch_timeout.as_secs(),
        )?;

        Ok(Config {
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            redirect_server: ServerConfig {
                host: redirect_host,
                port: redirect_port,
            },
            cache: CacheConfig {
                max_entries: cache_size,
            },
            analytics: AnalyticsConfig {
                geoip_path: get("GEOIP_PATH"),
                buffer_size,
                flush_interval: Duration::from_secs(flush_interval_secs),
                filter_automated,
            },
            threat: ThreatConfig {
                enabled: threat_enabled,
                refresh_interval: Duration::from_secs(refresh_secs),
                fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            },
        })
    }
}

fn parse_positive<T, G>(get: &G, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr + PartialEq + Default,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(default);
    };

    let value = raw
        .trim()
        .parse::<T>()
        .with_context(|| format!("{key} must be a positive integer, got '{raw}'"))?;

    if value == T::default() {
        bail!("{key} must be positive");
    }

    Ok(value)
}

fn parse_bool<G>(get: &G, key: &str, default: bool) -> anyhow::Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(default);
    };

    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => bail!("{key} must be a boolean (true/false), got '{other}'"),
    }
}
