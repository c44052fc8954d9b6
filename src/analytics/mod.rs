//! Click analytics pipeline
//!
//! Raw clicks are buffered by the [`AnalyticsCollector`] and enriched off the
//! hot path with User-Agent, referer and GeoIP data before being persisted
//! in batches. Bot and threat traffic is redirected but not recorded.

pub mod bot;
pub mod collector;
pub mod enrich;
pub mod geoip;
pub mod models;

pub use bot::is_bot;
pub use collector::{AnalyticsCollector, ClickEnricher, CollectorConfig};
pub use geoip::GeoResolver;
pub use models::{DeviceType, EnrichedClick, GeoLocation, RawClick};
