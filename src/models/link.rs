use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A short link as stored by the lookup store.
///
/// Caches and the analytics pipeline only ever hold read-only copies, so a
/// cached `Link` may be stale until the write path invalidates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Link {
    pub id: i64,
    pub slug: String,
    pub domain: String,
    pub destination: String,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Link {
    pub fn short_url(&self) -> String {
        format!("https://{}/{}", self.domain, self.slug)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewLink {
    pub slug: String,
    pub domain: String,
    pub destination: String,
}

/// Replacement values for a link's mutable fields.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkUpdate {
    pub slug: String,
    pub domain: String,
    pub destination: String,
}
