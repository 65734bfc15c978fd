use crate::cache::CacheId;
use crate::cache::pagecache::{CacheError, PageCache};
use crate::config::CacheConfig;

use std::collections::HashMap;

use log::debug;
use parking_lot::Mutex;

/// A set of page caches sharing one lock.
///
/// `PageCache` has no synchronization of its own. Every call into a cache
/// of the group goes through [`CacheGroup::with_cache`], which holds the
/// group mutex for the whole call.
#[derive(Default)]
pub struct CacheGroup {
    caches: Mutex<HashMap<CacheId, PageCache>>,
}

impl CacheGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache and adds it to the group. The cache is built
    /// before the lock is taken.
    pub fn create_cache(&self, config: CacheConfig) -> Result<CacheId, CacheError> {
        let cache = PageCache::with_config(config)?;
        let id = cache.id();
        self.caches.lock().insert(id, cache);
        Ok(id)
    }

    /// Runs `f` on one cache with the group lock held.
    pub fn with_cache<R>(
        &self,
        id: CacheId,
        f: impl FnOnce(&mut PageCache) -> R,
    ) -> Result<R, CacheError> {
        let mut caches = self.caches.lock();
        let cache = caches.get_mut(&id).ok_or(CacheError::UnknownCache(id))?;
        Ok(f(cache))
    }

    pub fn destroy_cache(&self, id: CacheId) -> Result<(), CacheError> {
        let cache = self
            .caches
            .lock()
            .remove(&id)
            .ok_or(CacheError::UnknownCache(id))?;
        cache.destroy();
        debug!("cache {id:?} left its group");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.caches.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.lock().is_empty()
    }
}
