mod dirty;
mod group;
mod hash;
mod pagecache;
mod slot;

use crate::pages::PageId;

use std::sync::atomic::{AtomicU32, Ordering};

pub use group::CacheGroup;
pub use pagecache::{
    CacheError, CacheStats, InvariantViolation, PageCache, PageHandle, PageRef, PageRefMut,
};

/// Identifies one cache for the lifetime of the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheId(u32);

impl CacheId {
    fn next() -> Self {
        static NEXT_CACHE_ID: AtomicU32 = AtomicU32::new(0);
        Self(NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Hook for a replacement policy. The cache reports accesses and removals
/// but never evicts on its own; acting on `should_evict` is up to the owner.
pub trait EvictionPolicy: Send {
    fn record_access(&mut self, page_id: PageId);
    fn remove(&mut self, page_id: PageId);
    fn should_evict(&self) -> Option<PageId>;
}

/// Policy used when none is configured: nothing is ever a candidate.
#[derive(Debug, Default)]
pub struct NoEviction;

impl EvictionPolicy for NoEviction {
    fn record_access(&mut self, _page_id: PageId) {}

    fn remove(&mut self, _page_id: PageId) {}

    fn should_evict(&self) -> Option<PageId> {
        None
    }
}
