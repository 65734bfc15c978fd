use crate::cache::{CacheError, PageCache, PageHandle, PageRef, PageRefMut};
use crate::config::CacheConfig;
use crate::pages::PageId;
use crate::storage::{StorageBackend, StorageError};

use log::debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PagerError {
    #[error("page cache error")]
    Cache(#[from] CacheError),
    #[error("storage error")]
    Storage(#[from] StorageError),
    #[error("page {0} is past the end of the file")]
    OutOfBounds(PageId),
}

/// Serves pages from the cache, reading them from storage on a miss and
/// writing dirty pages back on [`Pager::flush`].
///
/// Pages are written only by `flush`; nothing is evicted, so the cache grows
/// with the set of pages touched.
pub struct Pager<S: StorageBackend> {
    storage: S,
    cache: PageCache,
}

impl<S: StorageBackend> Pager<S> {
    pub fn new(storage: S, initial_slot_hint: usize) -> Result<Self, PagerError> {
        let cache =
            PageCache::with_config(CacheConfig::new(storage.page_size(), initial_slot_hint))?;
        Ok(Self { storage, cache })
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    fn load(&mut self, page_id: PageId) -> Result<PageHandle, PagerError> {
        if self.cache.lookup(page_id).is_some() {
            return Ok(self.cache.fetch(page_id)?);
        }
        if page_id.get() > self.storage.last_page_id().get() {
            return Err(PagerError::OutOfBounds(page_id));
        }

        let handle = self.cache.fetch(page_id)?;
        let read = {
            let mut page = self.cache.page_mut(handle)?;
            self.storage.read_page(page_id, &mut page)
        };
        if let Err(err) = read {
            // do not leave a page with stale content behind
            self.cache.remove(handle)?;
            return Err(err.into());
        }
        Ok(handle)
    }

    pub fn get_page(&mut self, page_id: PageId) -> Result<PageRef<'_>, PagerError> {
        let handle = self.load(page_id)?;
        Ok(self.cache.page(handle)?)
    }

    /// Returns a writable page, marking it dirty (or most recently dirtied
    /// if it already was).
    pub fn get_page_mut(&mut self, page_id: PageId) -> Result<PageRefMut<'_>, PagerError> {
        let handle = self.load(page_id)?;
        if self.cache.state(handle)?.is_dirty() {
            self.cache.touch(handle)?;
        } else {
            self.cache.make_dirty(handle)?;
        }
        Ok(self.cache.page_mut(handle)?)
    }

    /// Appends a zeroed page to the file and caches it.
    pub fn new_page(&mut self) -> Result<PageId, PagerError> {
        let page_id = self.storage.allocate_page()?;
        let handle = self.cache.fetch(page_id)?;
        self.cache.page_mut(handle)?.fill(0);
        Ok(page_id)
    }

    /// Drops a page from the cache, losing any unflushed change.
    pub fn discard(&mut self, page_id: PageId) -> Result<bool, PagerError> {
        match self.cache.lookup(page_id) {
            Some(handle) => {
                self.cache.remove(handle)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Writes every dirty page, oldest first, then syncs the file.
    ///
    /// Pages are marked clean as soon as they are written, so after an error
    /// only the pages not yet written remain dirty.
    pub fn flush(&mut self) -> Result<usize, PagerError> {
        let pending: Vec<PageHandle> = self.cache.dirty_pages().collect();
        for &handle in pending.iter().rev() {
            let page = self.cache.page(handle)?;
            self.storage.write_page(handle.page_id(), &page)?;
            self.cache.make_clean(handle)?;
        }
        if !pending.is_empty() {
            self.storage.fsync();
        }
        debug!("flushed {} pages", pending.len());
        Ok(pending.len())
    }

    /// Flushes and hands the storage back, tearing the cache down.
    pub fn close(mut self) -> Result<S, PagerError> {
        self.flush()?;
        let Self { storage, cache } = self;
        cache.destroy();
        Ok(storage)
    }
}
