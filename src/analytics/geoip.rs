//! GeoIP lookup service using a MaxMind GeoLite2/GeoIP2 City MMDB
//!
//! The database is optional. Without one (or if it fails to open) the
//! resolver runs in no-op mode for the lifetime of the process and every
//! lookup returns an empty [`GeoLocation`].

use anyhow::{Context, Result};
use maxminddb::{geoip2, Mmap, Reader};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::analytics::models::GeoLocation;

#[derive(Clone, Default)]
pub struct GeoResolver {
    reader: Option<Arc<Reader<Mmap>>>,
}

impl GeoResolver {
    /// Resolver that never finds anything
    pub fn disabled() -> Self {
        Self { reader: None }
    }

    /// Memory-map the database at `path`, failing if it cannot be opened
    pub fn try_open(path: &str) -> Result<Self> {
        let reader = unsafe { Reader::open_mmap(path) }
            .with_context(|| format!("Failed to open GeoIP City database at {}", path))?;

        Ok(Self {
            reader: Some(Arc::new(reader)),
        })
    }

    /// Open the database if a path is configured, falling back to no-op mode.
    ///
    /// A failed open is not retried.
    pub fn open(path: Option<&str>) -> Self {
        let Some(path) = path.filter(|p| !p.trim().is_empty()) else {
            info!("No GeoIP database configured, geo enrichment disabled");
            return Self::disabled();
        };

        match Self::try_open(path) {
            Ok(resolver) => {
                info!("Loaded GeoIP database from {}", path);
                resolver
            }
            Err(e) => {
                warn!("{:#}; geo enrichment disabled", e);
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.reader.is_some()
    }

    /// Look up an IP given as a string. Unparseable input yields an empty result.
    pub fn lookup(&self, ip: &str) -> GeoLocation {
        match ip.trim().parse::<IpAddr>() {
            Ok(addr) => self.lookup_addr(addr),
            Err(_) => GeoLocation::default(),
        }
    }

    /// IPv4-mapped IPv6 addresses are looked up as IPv4.
    pub fn lookup_addr(&self, ip: IpAddr) -> GeoLocation {
        let Some(ref reader) = self.reader else {
            return GeoLocation::default();
        };

        let Ok(result) = reader.lookup(ip.to_canonical()) else {
            return GeoLocation::default();
        };

        match result.decode::<geoip2::City>() {
            Ok(Some(city)) => Self::extract_from_city(&city),
            _ => GeoLocation::default(),
        }
    }

    fn extract_from_city(city: &geoip2::City) -> GeoLocation {
        let region = city
            .subdivisions
            .first()
            .and_then(|subdivision| subdivision.names.english)
            .map(|s| s.to_string())
            .unwrap_or_default();

        GeoLocation {
            country: city.country.iso_code.map(|s| s.to_string()).unwrap_or_default(),
            city: city.city.names.english.map(|s| s.to_string()).unwrap_or_default(),
            region,
            latitude: city.location.latitude.unwrap_or_default(),
            longitude: city.location.longitude.unwrap_or_default(),
        }
    }
}
