use crate::cache::dirty::{DirtyList, DirtyListOp};
use crate::cache::hash::HashTable;
use crate::cache::slot::{Arena, SlotId};
use crate::cache::{CacheId, EvictionPolicy, NoEviction};
use crate::config::CacheConfig;
use crate::pages::{PageId, PageState};

use std::collections::HashSet;
use std::ops::{Deref, DerefMut};

use log::{debug, trace, warn};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("page handle belongs to another cache")]
    ForeignEntry,
    #[error("page handle refers to a retired entry")]
    StaleHandle,
    #[error("page {0} is not cached")]
    NotCached(PageId),
    #[error("cache corrupted: {0}")]
    Corrupted(&'static str),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CacheError {
    #[error("allocation of {bytes} bytes failed")]
    Allocation { bytes: usize },
    #[error("page size must not be zero")]
    InvalidPageSize,
    #[error("unknown cache {0:?}")]
    UnknownCache(CacheId),
    #[error("invariant violation")]
    Invariant(#[from] InvariantViolation),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub resizes: u32,
}

/// Reference to a cached page returned by [`PageCache::fetch`].
///
/// A handle is only valid for the cache that issued it and only until the
/// page is removed; both are checked on every use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PageHandle {
    cache: CacheId,
    slot: SlotId,
    generation: u32,
    page_id: PageId,
}

impl PageHandle {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn cache_id(&self) -> CacheId {
        self.cache
    }
}

/// In-memory cache of database pages.
///
/// Pages live in an arena of fixed-size slots, most of them carved out of a
/// single bulk allocation made at creation. Three structures index the
/// arena and must agree with each other at all times:
///
/// ```text
///   hash table   page number -> entry (chained, grows at load factor 1)
///   dirty list   every Dirty entry, newest first, doubly linked
///   free list    every entry not in the hash table, LIFO
/// ```
///
/// The cache does no locking: callers sharing it must hold one lock for
/// the whole of every call (see [`CacheGroup`](crate::cache::CacheGroup)).
pub struct PageCache {
    id: CacheId,
    page_size: usize,
    min_reserved: usize,
    max_configured: usize,
    arena: Arena,
    hash: HashTable,
    dirty: DirtyList,
    stats: CacheStats,
    eviction_policy: Box<dyn EvictionPolicy>,
}

impl PageCache {
    /// Creates a cache for pages of `page_size` bytes.
    ///
    /// At least 1024 slots are pre-allocated in one block. If that block
    /// cannot be allocated the cache still works, allocating slots one by
    /// one. Failing to allocate the hash table is fatal.
    pub fn create(page_size: usize, initial_slot_hint: usize) -> Result<Self, CacheError> {
        Self::with_config(CacheConfig::new(page_size, initial_slot_hint))
    }

    pub fn with_config(config: CacheConfig) -> Result<Self, CacheError> {
        if config.page_size == 0 {
            return Err(CacheError::InvalidPageSize);
        }

        let mut cache = Self {
            id: CacheId::next(),
            page_size: config.page_size,
            min_reserved: config.min_reserved,
            max_configured: config.max_configured,
            arena: Arena::new(config.page_size),
            hash: HashTable::new(),
            dirty: DirtyList::default(),
            stats: CacheStats::default(),
            eviction_policy: Box::new(NoEviction),
        };
        cache.hash.resize(&mut cache.arena)?;

        if let Err(err) = cache.arena.init_bulk(config.initial_slot_hint) {
            warn!(
                "cache {:?}: {err}, pages will be allocated one at a time",
                cache.id
            );
        }
        debug!(
            "cache {:?} created: page size {}, {} free slots, {} hash buckets",
            cache.id,
            cache.page_size,
            cache.free_count(),
            cache.hash.slot_count()
        );

        Ok(cache)
    }

    pub fn with_eviction_policy(mut self, policy: Box<dyn EvictionPolicy>) -> Self {
        self.eviction_policy = policy;
        self
    }

    pub fn id(&self) -> CacheId {
        self.id
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn slot_size(&self) -> usize {
        self.arena.slot_size()
    }

    pub fn min_reserved(&self) -> usize {
        self.min_reserved
    }

    pub fn max_configured(&self) -> usize {
        self.max_configured
    }

    pub fn set_cache_size(&mut self, max_configured: usize) {
        self.max_configured = max_configured;
    }

    /// Number of pages currently cached.
    pub fn page_count(&self) -> usize {
        self.hash.page_count()
    }

    pub fn hash_slot_count(&self) -> usize {
        self.hash.slot_count()
    }

    pub fn free_count(&self) -> usize {
        self.arena.free_slots().count()
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.iter(&self.arena).count()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Page the configured eviction policy would give up first, if any.
    pub fn eviction_candidate(&self) -> Option<PageId> {
        self.eviction_policy.should_evict()
    }

    fn handle(&self, id: SlotId) -> PageHandle {
        let entry = &self.arena[id];
        PageHandle {
            cache: self.id,
            slot: id,
            generation: entry.generation,
            page_id: entry.key,
        }
    }

    fn resolve(&self, handle: PageHandle) -> Result<SlotId, InvariantViolation> {
        if handle.cache != self.id {
            return Err(InvariantViolation::ForeignEntry);
        }
        if !self.arena.contains(handle.slot)
            || self.arena[handle.slot].generation != handle.generation
        {
            return Err(InvariantViolation::StaleHandle);
        }
        Ok(handle.slot)
    }

    /// Returns the cached entry for `page_id` without creating one.
    pub fn lookup(&self, page_id: PageId) -> Option<PageHandle> {
        self.hash
            .lookup(&self.arena, page_id)
            .map(|id| self.handle(id))
    }

    /// Returns the entry for `page_id`, creating a clean one on a miss.
    ///
    /// The content of a newly created entry is whatever the slot last held;
    /// filling it from storage is the caller's job.
    pub fn fetch(&mut self, page_id: PageId) -> Result<PageHandle, CacheError> {
        if let Some(id) = self.hash.lookup(&self.arena, page_id) {
            self.stats.hits += 1;
            self.eviction_policy.record_access(page_id);
            return Ok(self.handle(id));
        }

        if self.hash.needs_resize() {
            self.hash.resize(&mut self.arena)?;
            self.stats.resizes += 1;
        }

        let id = self.arena.allocate_slot()?;
        let entry = &mut self.arena[id];
        entry.key = page_id;
        entry.state = PageState::Clean;
        let bulk_local = entry.is_bulk_local();
        self.hash.insert(&mut self.arena, id);
        self.stats.misses += 1;
        self.eviction_policy.record_access(page_id);
        trace!(
            "cache {:?}: page {page_id} cached (bulk: {bulk_local}, pages: {})",
            self.id,
            self.hash.page_count()
        );

        Ok(self.handle(id))
    }

    pub fn state(&self, handle: PageHandle) -> Result<PageState, CacheError> {
        let id = self.resolve(handle)?;
        Ok(self.arena[id].state)
    }

    pub fn page(&self, handle: PageHandle) -> Result<PageRef<'_>, CacheError> {
        let id = self.resolve(handle)?;
        let entry = &self.arena[id];
        Ok(PageRef {
            page_id: entry.key,
            state: entry.state,
            data: self.arena.content(id),
        })
    }

    pub fn page_mut(&mut self, handle: PageHandle) -> Result<PageRefMut<'_>, CacheError> {
        let id = self.resolve(handle)?;
        let entry = &self.arena[id];
        let (page_id, state) = (entry.key, entry.state);
        Ok(PageRefMut {
            page_id,
            state,
            data: self.arena.content_mut(id),
        })
    }

    /// Marks the page dirty and links it at the head of the dirty list.
    /// Does nothing if it already is dirty.
    pub fn make_dirty(&mut self, handle: PageHandle) -> Result<(), CacheError> {
        let id = self.resolve(handle)?;
        if !self.arena[id].state.is_dirty() {
            self.arena[id].state = PageState::Dirty;
            self.dirty.manage(&mut self.arena, id, DirtyListOp::ADD);
        }
        Ok(())
    }

    /// Marks the page clean and unlinks it from the dirty list.
    /// Does nothing if it already is clean.
    pub fn make_clean(&mut self, handle: PageHandle) -> Result<(), CacheError> {
        let id = self.resolve(handle)?;
        self.clean(id);
        Ok(())
    }

    fn clean(&mut self, id: SlotId) {
        if self.arena[id].state.is_dirty() {
            self.dirty.manage(&mut self.arena, id, DirtyListOp::REMOVE);
            self.arena[id].state = PageState::Clean;
        }
    }

    /// Moves an already dirty page back to the head of the dirty list.
    pub fn touch(&mut self, handle: PageHandle) -> Result<(), CacheError> {
        let id = self.resolve(handle)?;
        if self.arena[id].state.is_dirty() {
            self.dirty.manage(&mut self.arena, id, DirtyListOp::FRONT);
        }
        Ok(())
    }

    /// Cleans every dirty page, returning how many there were.
    ///
    /// Stops with an error if a clean page is found on the dirty list.
    pub fn make_all_clean(&mut self) -> Result<usize, CacheError> {
        let mut cleaned = 0;
        while let Some(id) = self.dirty.head() {
            if !self.arena[id].state.is_dirty() {
                return Err(InvariantViolation::Corrupted("clean page on dirty list").into());
            }
            self.clean(id);
            cleaned += 1;
        }
        Ok(cleaned)
    }

    /// Dirty pages, most recently dirtied first.
    pub fn dirty_pages(&self) -> impl Iterator<Item = PageHandle> + '_ {
        self.dirty.iter(&self.arena).map(|id| self.handle(id))
    }

    /// Retires a page: it leaves the hash table (and the dirty list, if it
    /// was dirty, discarding its changes) and its slot goes back to the free
    /// list. The handle is invalid afterwards.
    pub fn remove(&mut self, handle: PageHandle) -> Result<(), CacheError> {
        let id = self.resolve(handle)?;
        let page_id = self.arena[id].key;
        if !self.hash.remove(&mut self.arena, id) {
            return Err(InvariantViolation::NotCached(page_id).into());
        }
        self.retire(id);
        trace!("cache {:?}: page {page_id} removed", self.id);
        Ok(())
    }

    fn retire(&mut self, id: SlotId) {
        let page_id = self.arena[id].key;
        self.clean(id);
        self.eviction_policy.remove(page_id);
        self.arena.release_slot(id);
    }

    /// Removes every page numbered `first` or above, returning how many.
    pub fn truncate(&mut self, first: PageId) -> usize {
        let doomed: Vec<SlotId> = self
            .hash
            .iter(&self.arena)
            .filter(|&id| self.arena[id].key.get() >= first.get())
            .collect();
        for &id in &doomed {
            let removed = self.hash.remove(&mut self.arena, id);
            debug_assert!(removed);
            self.retire(id);
        }
        doomed.len()
    }

    /// Tears the cache down, releasing the bulk block and every standalone
    /// page buffer.
    pub fn destroy(mut self) {
        let dropped = self.truncate(PageId::new(0));
        debug!(
            "cache {:?} destroyed: {dropped} pages dropped, {} bulk bytes released, {:?}",
            self.id,
            self.arena.bulk_len(),
            self.stats
        );
    }

    /// Checks that the hash table, dirty list and free list agree.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        use InvariantViolation::Corrupted;

        let slot_count = self.hash.slot_count();
        let mut cached = HashSet::new();
        let mut keys = HashSet::new();
        for bucket in 0..slot_count {
            for id in self.hash.chain(&self.arena, bucket) {
                let entry = &self.arena[id];
                if entry.key.get() as usize % slot_count != bucket {
                    return Err(Corrupted("page hashed into the wrong bucket"));
                }
                if !keys.insert(entry.key) || !cached.insert(id) {
                    return Err(Corrupted("page cached twice"));
                }
                if entry.lru_next.is_some() || entry.lru_prev.is_some() {
                    return Err(Corrupted("unexpected lru link"));
                }
                if cached.len() > self.arena.len() {
                    return Err(Corrupted("cycle in hash chain"));
                }
            }
        }
        if cached.len() != self.hash.page_count() {
            return Err(Corrupted("page count out of sync with hash table"));
        }

        let mut dirty = HashSet::new();
        let mut prev = None;
        for id in self.dirty.iter(&self.arena) {
            let entry = &self.arena[id];
            if !entry.state.is_dirty() || !cached.contains(&id) {
                return Err(Corrupted("clean or uncached page on dirty list"));
            }
            if entry.dirty_prev != prev {
                return Err(Corrupted("broken dirty list back link"));
            }
            if !dirty.insert(id) {
                return Err(Corrupted("page on dirty list twice"));
            }
            prev = Some(id);
        }
        if self.dirty.tail() != prev {
            return Err(Corrupted("dirty list tail out of sync"));
        }
        let dirty_cached = cached
            .iter()
            .filter(|&&id| self.arena[id].state.is_dirty())
            .count();
        if dirty_cached != dirty.len() {
            return Err(Corrupted("dirty page missing from dirty list"));
        }

        let mut free = 0;
        for id in self.arena.free_slots() {
            let entry = &self.arena[id];
            if cached.contains(&id) || entry.state.is_dirty() || entry.dirty_next.is_some() {
                return Err(Corrupted("free slot still in use"));
            }
            free += 1;
            if free > self.arena.len() {
                return Err(Corrupted("cycle in free list"));
            }
        }
        if free + cached.len() != self.arena.len() {
            return Err(Corrupted("slot neither cached nor free"));
        }

        Ok(())
    }
}

pub struct PageRef<'page> {
    page_id: PageId,
    state: PageState,
    data: &'page [u8],
}

pub struct PageRefMut<'page> {
    page_id: PageId,
    state: PageState,
    data: &'page mut [u8],
}

impl PageRef<'_> {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn state(&self) -> PageState {
        self.state
    }
}

impl PageRefMut<'_> {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn state(&self) -> PageState {
        self.state
    }
}

impl Deref for PageRef<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data
    }
}

impl Deref for PageRefMut<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data
    }
}

impl DerefMut for PageRefMut<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_BULK_SLOTS, MIN_HASH_SLOTS};

    use std::collections::VecDeque;

    const PAGE_SIZE: usize = 512;

    fn cache() -> PageCache {
        PageCache::create(PAGE_SIZE, 0).unwrap()
    }

    #[test]
    fn create_sizes_hash_and_free_list() {
        let cache = cache();
        assert_eq!(cache.hash_slot_count(), MIN_HASH_SLOTS);
        assert_eq!(cache.free_count(), DEFAULT_BULK_SLOTS);
        assert_eq!(cache.page_count(), 0);
        assert!(cache.slot_size() > PAGE_SIZE);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn bounds_are_stored_only() {
        let mut cache = PageCache::with_config(CacheConfig {
            min_reserved: 10,
            max_configured: 20,
            ..CacheConfig::new(PAGE_SIZE, 0)
        })
        .unwrap();
        assert_eq!((cache.min_reserved(), cache.max_configured()), (10, 20));
        for n in 0..30 {
            cache.fetch(PageId::new(n)).unwrap();
        }
        assert_eq!(cache.page_count(), 30);
        cache.set_cache_size(50);
        assert_eq!(cache.max_configured(), 50);
    }

    #[derive(Default)]
    struct Fifo(VecDeque<PageId>);

    impl EvictionPolicy for Fifo {
        fn record_access(&mut self, page_id: PageId) {
            if !self.0.contains(&page_id) {
                self.0.push_back(page_id);
            }
        }

        fn remove(&mut self, page_id: PageId) {
            self.0.retain(|&p| p != page_id);
        }

        fn should_evict(&self) -> Option<PageId> {
            self.0.front().copied()
        }
    }

    #[test]
    fn eviction_policy_is_told_about_accesses() {
        let mut cache = cache().with_eviction_policy(Box::new(Fifo::default()));
        assert_eq!(cache.eviction_candidate(), None);
        let first = cache.fetch(PageId::new(4)).unwrap();
        cache.fetch(PageId::new(5)).unwrap();
        cache.fetch(PageId::new(4)).unwrap();
        assert_eq!(cache.eviction_candidate(), Some(PageId::new(4)));

        cache.remove(first).unwrap();
        assert_eq!(cache.eviction_candidate(), Some(PageId::new(5)));
        assert_eq!(cache.truncate(PageId::new(0)), 1);
        assert_eq!(cache.eviction_candidate(), None);
    }

    #[test]
    fn zero_page_size_is_rejected() {
        assert_eq!(
            PageCache::create(0, 0).err(),
            Some(CacheError::InvalidPageSize)
        );
    }

    #[test]
    fn failed_bulk_allocation_degrades() {
        let mut cache = PageCache::create(PAGE_SIZE, usize::MAX / 4).unwrap();
        assert_eq!(cache.free_count(), 0);

        let handle = cache.fetch(PageId::new(1)).unwrap();
        assert_eq!(cache.page(handle).unwrap().len(), PAGE_SIZE);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn failed_slot_allocation_is_a_miss_with_error() {
        let mut cache = PageCache::create(isize::MAX as usize, 0).unwrap();
        assert_eq!(cache.free_count(), 0);

        assert!(matches!(
            cache.fetch(PageId::new(1)),
            Err(CacheError::Allocation { .. })
        ));
        assert_eq!(cache.page_count(), 0);
        assert_eq!(cache.lookup(PageId::new(1)), None);
        assert_eq!(cache.stats().misses, 0);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn unallocatable_bulk_still_creates_cache() {
        let cache = PageCache::create(1 << 40, 1 << 20).unwrap();
        assert_eq!(cache.free_count(), 0);
        assert_eq!(cache.hash_slot_count(), MIN_HASH_SLOTS);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn make_all_clean_refuses_clean_page_on_dirty_list() {
        let mut cache = cache();
        let handle = cache.fetch(PageId::new(2)).unwrap();
        cache.make_dirty(handle).unwrap();
        // break the state/dirty list agreement behind the cache's back
        cache.arena[handle.slot].state = PageState::Clean;

        assert_eq!(
            cache.make_all_clean(),
            Err(CacheError::Invariant(InvariantViolation::Corrupted(
                "clean page on dirty list"
            )))
        );
        assert!(cache.check_invariants().is_err());
    }

    #[test]
    fn page_round_trip() {
        let mut cache = cache();
        let handle = cache.fetch(PageId::new(7)).unwrap();
        assert_eq!(cache.state(handle).unwrap(), PageState::Clean);
        cache.page_mut(handle).unwrap().fill(0xAA);
        cache.make_dirty(handle).unwrap();

        let again = cache.fetch(PageId::new(7)).unwrap();
        assert_eq!(again, handle);
        let page = cache.page(again).unwrap();
        assert_eq!(page.state(), PageState::Dirty);
        assert!(page.iter().all(|&byte| byte == 0xAA));

        cache.make_clean(again).unwrap();
        let third = cache.fetch(PageId::new(7)).unwrap();
        let page = cache.page(third).unwrap();
        assert_eq!(page.state(), PageState::Clean);
        assert_eq!(page.page_id(), PageId::new(7));
        assert!(page.iter().all(|&byte| byte == 0xAA));
        assert_eq!(cache.stats().hits, 2);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn hit_returns_same_buffer() {
        let mut cache = cache();
        let first = cache.fetch(PageId::new(3)).unwrap();
        let ptr = cache.page(first).unwrap().as_ptr();
        let second = cache.fetch(PageId::new(3)).unwrap();
        assert_eq!(cache.page(second).unwrap().as_ptr(), ptr);
        assert_eq!(cache.page_count(), 1);
    }

    #[test]
    fn lookup_does_not_create() {
        let mut cache = cache();
        assert!(cache.lookup(PageId::new(9)).is_none());
        let handle = cache.fetch(PageId::new(9)).unwrap();
        assert_eq!(cache.lookup(PageId::new(9)), Some(handle));
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn make_dirty_and_clean_are_idempotent() {
        let mut cache = cache();
        let handle = cache.fetch(PageId::new(1)).unwrap();
        cache.make_clean(handle).unwrap();
        assert_eq!(cache.dirty_count(), 0);

        cache.make_dirty(handle).unwrap();
        cache.make_dirty(handle).unwrap();
        assert_eq!(cache.dirty_count(), 1);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn touch_moves_dirty_page_to_front() {
        let mut cache = cache();
        let pages: Vec<_> = (0..3)
            .map(|n| cache.fetch(PageId::new(n)).unwrap())
            .collect();
        for &page in &pages {
            cache.make_dirty(page).unwrap();
        }
        cache.touch(pages[0]).unwrap();
        assert_eq!(
            cache.dirty_pages().collect::<Vec<_>>(),
            vec![pages[0], pages[2], pages[1]]
        );

        // clean pages are left alone
        let clean = cache.fetch(PageId::new(10)).unwrap();
        cache.touch(clean).unwrap();
        assert_eq!(cache.dirty_count(), 3);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn make_all_clean_drains_dirty_list() {
        let mut cache = cache();
        let pages: Vec<_> = (0..20)
            .map(|n| cache.fetch(PageId::new(n)).unwrap())
            .collect();
        for page in pages.iter().step_by(2) {
            cache.make_dirty(*page).unwrap();
        }
        assert_eq!(cache.make_all_clean().unwrap(), 10);
        assert_eq!(cache.dirty_pages().next(), None);
        for &page in &pages {
            assert_eq!(cache.state(page).unwrap(), PageState::Clean);
        }
        cache.check_invariants().unwrap();
    }

    #[test]
    fn resize_happens_when_table_is_full() {
        let mut cache = cache();
        for n in 0..MIN_HASH_SLOTS as u32 {
            cache.fetch(PageId::new(n)).unwrap();
        }
        assert_eq!(cache.hash_slot_count(), MIN_HASH_SLOTS);
        assert_eq!(cache.stats().resizes, 0);

        cache.fetch(PageId::new(MIN_HASH_SLOTS as u32)).unwrap();
        assert_eq!(cache.hash_slot_count(), 2 * MIN_HASH_SLOTS);
        assert_eq!(cache.stats().resizes, 1);
        assert_eq!(cache.page_count(), MIN_HASH_SLOTS + 1);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn remove_recycles_slot_and_invalidates_handle() {
        let mut cache = cache();
        let a = cache.fetch(PageId::new(1)).unwrap();
        let b = cache.fetch(PageId::new(2)).unwrap();
        cache.make_dirty(b).unwrap();
        let free = cache.free_count();

        cache.remove(a).unwrap();
        cache.remove(b).unwrap();
        assert_eq!(cache.free_count(), free + 2);
        assert_eq!(cache.dirty_count(), 0);
        assert_eq!(
            cache.remove(a),
            Err(CacheError::Invariant(InvariantViolation::StaleHandle))
        );
        assert_eq!(
            cache.make_dirty(b),
            Err(CacheError::Invariant(InvariantViolation::StaleHandle))
        );

        // free list is LIFO: page 2's slot comes back first
        let c = cache.fetch(PageId::new(3)).unwrap();
        let d = cache.fetch(PageId::new(4)).unwrap();
        assert_eq!(c.slot, b.slot);
        assert_eq!(d.slot, a.slot);
        assert_eq!(cache.lookup(PageId::new(1)), None);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn foreign_handle_is_refused() {
        let mut one = cache();
        let mut other = cache();
        let handle = one.fetch(PageId::new(5)).unwrap();
        other.fetch(PageId::new(5)).unwrap();

        assert_eq!(
            other.make_dirty(handle),
            Err(CacheError::Invariant(InvariantViolation::ForeignEntry))
        );
        assert_eq!(other.dirty_count(), 0);
        other.check_invariants().unwrap();
    }

    #[test]
    fn truncate_removes_tail_pages() {
        let mut cache = cache();
        for n in 0..10 {
            let handle = cache.fetch(PageId::new(n)).unwrap();
            cache.make_dirty(handle).unwrap();
        }
        assert_eq!(cache.truncate(PageId::new(6)), 4);
        assert_eq!(cache.page_count(), 6);
        assert_eq!(cache.dirty_count(), 6);
        assert!(cache.lookup(PageId::new(6)).is_none());
        assert!(cache.lookup(PageId::new(5)).is_some());
        cache.check_invariants().unwrap();
    }

    #[test]
    fn standalone_slots_after_bulk_is_exhausted() {
        let mut cache = PageCache::create(16, 0).unwrap();
        for n in 0..(DEFAULT_BULK_SLOTS as u32 + 5) {
            cache.fetch(PageId::new(n)).unwrap();
        }
        assert_eq!(cache.free_count(), 0);
        assert_eq!(cache.page_count(), DEFAULT_BULK_SLOTS + 5);

        let last = cache.lookup(PageId::new(DEFAULT_BULK_SLOTS as u32 + 4)).unwrap();
        cache.page_mut(last).unwrap().copy_from_slice(&[7; 16]);
        assert_eq!(&*cache.page(last).unwrap(), &[7u8; 16][..]);
        cache.check_invariants().unwrap();
        cache.destroy();
    }
}
