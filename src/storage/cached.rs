use crate::cache::RedirectCache;
use crate::models::{Link, LinkUpdate, NewLink};
use crate::storage::{Storage, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Storage wrapper that serves key lookups through a [`RedirectCache`] and
/// keeps it consistent on writes.
///
/// Writes that change a link's key invalidate the key the link had *before*
/// the write. Invalidating the new key instead would leave the old slug
/// redirecting from cache after a rename.
pub struct CachedStorage {
    inner: Arc<dyn Storage>,
    cache: Arc<RedirectCache>,
}

impl CachedStorage {
    pub fn new(inner: Arc<dyn Storage>, cache: Arc<RedirectCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<RedirectCache> {
        &self.cache
    }
}

#[async_trait]
impl Storage for CachedStorage {
    async fn init(&self) -> Result<()> {
        self.inner.init().await
    }

    async fn create_link(&self, link: &NewLink) -> StorageResult<Link> {
        // Nothing to invalidate: misses are never cached
        self.inner.create_link(link).await
    }

    async fn get_by_key(&self, domain: &str, slug: &str) -> Result<Option<Link>> {
        if let Some(cached) = self.cache.get(domain, slug) {
            return Ok(Some(cached));
        }

        // Cache miss - fetch from underlying storage. The row may predate a
        // concurrent write; it is only cached if no invalidation happened
        // since the generation was taken.
        let generation = self.cache.generation();
        let result = self.inner.get_by_key(domain, slug).await?;

        if let Some(ref link) = result {
            if !self.cache.set_if_current(generation, domain, slug, link.clone()) {
                tracing::debug!(domain = %domain, slug = %slug, "skipped caching link read during a write");
            }
        }

        Ok(result)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Link>> {
        self.inner.get_by_id(id).await
    }

    async fn update_link(&self, id: i64, update: &LinkUpdate) -> StorageResult<Option<Link>> {
        let original = self.inner.get_by_id(id).await?;

        let result = self.inner.update_link(id, update).await?;

        if let (Some(original), Some(_)) = (&original, &result) {
            self.cache.invalidate(&original.domain, &original.slug);
            tracing::debug!(
                link_id = id,
                domain = %original.domain,
                slug = %original.slug,
                "invalidated cached link after update"
            );
        }

        Ok(result)
    }

    async fn soft_delete(&self, id: i64) -> Result<bool> {
        let current = self.inner.get_by_id(id).await?;

        let deleted = self.inner.soft_delete(id).await?;

        if deleted {
            if let Some(link) = current {
                self.cache.invalidate(&link.domain, &link.slug);
            }
        }

        Ok(deleted)
    }
}
