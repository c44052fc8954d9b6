//! Data models for analytics

use serde::{Deserialize, Serialize};

/// Geographic location derived from an IP address.
///
/// All fields are empty / zero when no geo database is configured or the
/// lookup found nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// ISO country code (e.g., "US", "GB")
    pub country: String,

    /// City name (English)
    pub city: String,

    /// First subdivision (state/province), English name
    pub region: String,

    pub latitude: f64,
    pub longitude: f64,
}

/// Lightweight click event recorded on the hot path.
///
/// Enrichment (GeoIP, UA parsing, referer host) is deferred to flush time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawClick {
    pub link_id: i64,

    /// Unix timestamp of the redirect
    pub clicked_at: i64,

    /// Client IP as reported by the request path; may be unparseable
    pub ip: String,

    pub user_agent: String,

    /// Raw Referer header value, empty when absent
    pub referer: String,
}

/// Device class derived from the User-Agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Bot,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Desktop => "desktop",
            DeviceType::Mobile => "mobile",
            DeviceType::Bot => "bot",
        }
    }
}

/// Fully enriched click, written once to the click sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedClick {
    pub link_id: i64,
    pub clicked_at: i64,
    pub ip: String,
    pub user_agent: String,
    pub referer: String,

    /// Hostname of the referer URL, empty if absent or unparseable
    pub referer_domain: String,

    pub geo: GeoLocation,
    pub browser: String,
    pub browser_version: String,
    pub os: String,
    pub device_type: DeviceType,
}
