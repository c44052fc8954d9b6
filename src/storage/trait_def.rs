use crate::analytics::EnrichedClick;
use crate::models::{Link, LinkUpdate, NewLink};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("a link with this domain and slug already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Lookup store for links.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables, etc.)
    async fn init(&self) -> Result<()>;

    /// Create a new link. Fails with `Conflict` if (domain, slug) is taken.
    async fn create_link(&self, link: &NewLink) -> StorageResult<Link>;

    /// Get a link by domain and slug
    async fn get_by_key(&self, domain: &str, slug: &str) -> Result<Option<Link>>;

    /// Get a link by identifier
    async fn get_by_id(&self, id: i64) -> Result<Option<Link>>;

    /// Replace slug, domain and destination. Returns `None` if the link does not exist.
    async fn update_link(&self, id: i64, update: &LinkUpdate) -> StorageResult<Option<Link>>;

    /// Deactivate a link (soft delete)
    async fn soft_delete(&self, id: i64) -> Result<bool>;
}

/// Durable destination for enriched click records.
#[async_trait]
pub trait ClickSink: Send + Sync {
    /// Persist the whole batch or nothing.
    async fn insert_clicks(&self, clicks: &[EnrichedClick]) -> Result<()>;
}
