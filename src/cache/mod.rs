//! Bounded recency-evicted cache of links keyed by (domain, slug)
//!
//! Sits in front of the lookup store on the redirect path. Entries are only
//! ever removed by capacity pressure or by explicit invalidation from the
//! write path; there is no TTL.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

use crate::models::Link;

/// Composite cache key: case-folded domain plus exact, case-sensitive slug.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    domain: String,
    slug: String,
}

impl CacheKey {
    pub fn new(domain: &str, slug: &str) -> Self {
        Self {
            domain: domain.to_lowercase(),
            slug: slug.to_string(),
        }
    }
}

struct Entries {
    links: LruCache<CacheKey, Link>,
    /// Bumped by every invalidation
    generation: u64,
}

/// Thread-safe LRU index from (domain, slug) to [`Link`].
///
/// `get` counts as a use, so it needs exclusive access to the recency list;
/// every critical section is a single hash lookup plus a list splice.
pub struct RedirectCache {
    entries: Mutex<Entries>,
}

impl RedirectCache {
    /// Create a cache holding at most `capacity` links. A capacity of zero is
    /// bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(Entries {
                links: LruCache::new(capacity),
                generation: 0,
            }),
        }
    }

    pub fn get(&self, domain: &str, slug: &str) -> Option<Link> {
        self.entries
            .lock()
            .links
            .get(&CacheKey::new(domain, slug))
            .cloned()
    }

    /// Insert or replace a link, evicting the least recently used entry when full.
    pub fn set(&self, domain: &str, slug: &str, link: Link) {
        self.entries.lock().links.put(CacheKey::new(domain, slug), link);
    }

    /// Token for [`set_if_current`](Self::set_if_current); take it before
    /// reading the link from the store.
    pub fn generation(&self) -> u64 {
        self.entries.lock().generation
    }

    /// Insert only if nothing was invalidated since `generation` was taken.
    ///
    /// A read-through miss that raced with a write may hold the pre-write
    /// row; it must not land in the cache after that write's invalidation.
    pub fn set_if_current(&self, generation: u64, domain: &str, slug: &str, link: Link) -> bool {
        let mut entries = self.entries.lock();
        if entries.generation != generation {
            return false;
        }
        entries.links.put(CacheKey::new(domain, slug), link);
        true
    }

    /// Drop the entry for (domain, slug), if any.
    ///
    /// Callers renaming a link must pass the key it had *before* the rename.
    pub fn invalidate(&self, domain: &str, slug: &str) {
        let mut entries = self.entries.lock();
        entries.links.pop(&CacheKey::new(domain, slug));
        entries.generation = entries.generation.wrapping_add(1);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().links.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().links.cap().get()
    }
}
