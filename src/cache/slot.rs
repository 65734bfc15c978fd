use crate::cache::pagecache::CacheError;
use crate::config::DEFAULT_BULK_SLOTS;
use crate::pages::{PageId, PageState};

use std::mem;
use std::ops::{Index, IndexMut, Range};

use log::debug;

/// Index of a page entry in the cache arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct SlotId(u32);

impl SlotId {
    /// Fails once the arena outgrows the `u32` index space.
    fn new(idx: usize) -> Result<Self, CacheError> {
        u32::try_from(idx)
            .map(Self)
            .map_err(|_| CacheError::Allocation {
                bytes: mem::size_of::<PageEntry>(),
            })
    }

    pub(crate) fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Where the bytes of a page entry live.
pub(crate) enum Slot {
    /// A page-sized view into the bulk block owned by the arena.
    BulkView(Range<usize>),
    /// A buffer allocated for this entry alone.
    Standalone(Box<[u8]>),
    /// A standalone buffer that was handed back to the system on release.
    Vacant,
}

/// Bookkeeping for one cached page. Links are arena indices, never owners.
pub(crate) struct PageEntry {
    pub(crate) key: PageId,
    pub(crate) state: PageState,
    pub(crate) slot: Slot,
    pub(crate) generation: u32,
    pub(crate) hash_next: Option<SlotId>,
    pub(crate) free_next: Option<SlotId>,
    pub(crate) dirty_next: Option<SlotId>,
    pub(crate) dirty_prev: Option<SlotId>,
    // reserved for an eviction policy
    pub(crate) lru_next: Option<SlotId>,
    pub(crate) lru_prev: Option<SlotId>,
}

impl PageEntry {
    fn new(slot: Slot) -> Self {
        Self {
            key: PageId::new(0),
            state: PageState::Clean,
            slot,
            generation: 0,
            hash_next: None,
            free_next: None,
            dirty_next: None,
            dirty_prev: None,
            lru_next: None,
            lru_prev: None,
        }
    }

    fn clear_links(&mut self) {
        self.hash_next = None;
        self.free_next = None;
        self.dirty_next = None;
        self.dirty_prev = None;
        self.lru_next = None;
        self.lru_prev = None;
    }

    pub(crate) fn is_bulk_local(&self) -> bool {
        matches!(self.slot, Slot::BulkView(_))
    }
}

/// Allocates a zeroed buffer without aborting the process on failure.
pub(crate) fn try_alloc_zeroed(bytes: usize) -> Result<Box<[u8]>, CacheError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(bytes)
        .map_err(|_| CacheError::Allocation { bytes })?;
    buf.resize(bytes, 0);
    Ok(buf.into_boxed_slice())
}

/// Owner of every page entry of a cache and of the bulk block their
/// contents may point into.
///
/// ```text
///  bulk: | page 0 | page 1 | page 2 | ... | page n-1 |
///            ^        ^
///  entries: [e0]     [e1]    [e2: Standalone(Box)]  [e3: Vacant]
///
///  free list: e3 -> e1 -> ...   (LIFO through `free_next`)
/// ```
pub(crate) struct Arena {
    page_size: usize,
    entries: Vec<PageEntry>,
    bulk: Box<[u8]>,
    free_head: Option<SlotId>,
}

impl Arena {
    pub(crate) fn new(page_size: usize) -> Self {
        Self {
            page_size,
            entries: Vec::new(),
            bulk: Box::default(),
            free_head: None,
        }
    }

    /// Size of one slot: page content plus its entry header.
    pub(crate) fn slot_size(&self) -> usize {
        self.page_size + mem::size_of::<PageEntry>()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn bulk_len(&self) -> usize {
        self.bulk.len()
    }

    pub(crate) fn contains(&self, id: SlotId) -> bool {
        id.idx() < self.entries.len()
    }

    /// Carves one allocation into `max(requested, 1024)` page slots and
    /// seeds the free list with them.
    ///
    /// Returns the number of slots added. On failure the arena is left
    /// untouched.
    pub(crate) fn init_bulk(&mut self, requested: usize) -> Result<usize, CacheError> {
        let count = requested.max(DEFAULT_BULK_SLOTS);
        let bytes = self
            .page_size
            .checked_mul(count)
            .ok_or(CacheError::Allocation { bytes: usize::MAX })?;
        // the last index must fit before anything is allocated
        SlotId::new(self.entries.len().saturating_add(count - 1))?;
        let bulk = try_alloc_zeroed(bytes)?;
        let header_bytes = mem::size_of::<PageEntry>().saturating_mul(count);
        self.entries
            .try_reserve_exact(count)
            .map_err(|_| CacheError::Allocation {
                bytes: header_bytes,
            })?;
        self.bulk = bulk;

        for i in 0..count {
            let start = i * self.page_size;
            let id = self.push(PageEntry::new(Slot::BulkView(start..start + self.page_size)))?;
            self.push_free(id);
        }
        debug!(
            "bulk block of {bytes} bytes carved into {count} slots of {} bytes",
            self.slot_size()
        );

        Ok(count)
    }

    fn push(&mut self, entry: PageEntry) -> Result<SlotId, CacheError> {
        let id = SlotId::new(self.entries.len())?;
        self.entries.push(entry);
        Ok(id)
    }

    fn push_free(&mut self, id: SlotId) {
        let head = self.free_head;
        self[id].free_next = head;
        self.free_head = Some(id);
    }

    /// Hands out a detached entry, recycling the most recently freed one
    /// before allocating.
    pub(crate) fn allocate_slot(&mut self) -> Result<SlotId, CacheError> {
        if let Some(id) = self.free_head {
            if matches!(self[id].slot, Slot::Vacant) {
                self[id].slot = Slot::Standalone(try_alloc_zeroed(self.page_size)?);
            }
            self.free_head = self[id].free_next;
            self[id].clear_links();
            return Ok(id);
        }

        let buf = try_alloc_zeroed(self.page_size)?;
        self.entries
            .try_reserve(1)
            .map_err(|_| CacheError::Allocation {
                bytes: mem::size_of::<PageEntry>(),
            })?;
        self.push(PageEntry::new(Slot::Standalone(buf)))
    }

    /// Returns a detached entry to the free list.
    ///
    /// Standalone buffers are dropped here; bulk views stay with the block.
    /// The header is always kept so the free list order is preserved.
    pub(crate) fn release_slot(&mut self, id: SlotId) {
        let entry = &mut self[id];
        debug_assert!(entry.dirty_next.is_none() && entry.dirty_prev.is_none());
        entry.generation = entry.generation.wrapping_add(1);
        entry.state = PageState::Clean;
        entry.clear_links();
        if matches!(entry.slot, Slot::Standalone(_)) {
            entry.slot = Slot::Vacant;
        }
        self.push_free(id);
    }

    pub(crate) fn free_slots(&self) -> FreeSlots<'_> {
        FreeSlots {
            arena: self,
            next: self.free_head,
        }
    }

    pub(crate) fn content(&self, id: SlotId) -> &[u8] {
        match &self[id].slot {
            Slot::BulkView(range) => &self.bulk[range.clone()],
            Slot::Standalone(buf) => &buf[..],
            Slot::Vacant => &[],
        }
    }

    pub(crate) fn content_mut(&mut self, id: SlotId) -> &mut [u8] {
        let idx = id.idx();
        match &mut self.entries[idx].slot {
            Slot::BulkView(range) => &mut self.bulk[range.clone()],
            Slot::Standalone(buf) => &mut buf[..],
            Slot::Vacant => &mut [],
        }
    }
}

impl Index<SlotId> for Arena {
    type Output = PageEntry;

    fn index(&self, id: SlotId) -> &Self::Output {
        &self.entries[id.idx()]
    }
}

impl IndexMut<SlotId> for Arena {
    fn index_mut(&mut self, id: SlotId) -> &mut Self::Output {
        &mut self.entries[id.idx()]
    }
}

pub(crate) struct FreeSlots<'a> {
    arena: &'a Arena,
    next: Option<SlotId>,
}

impl Iterator for FreeSlots<'_> {
    type Item = SlotId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        self.next = self.arena[id].free_next;
        Some(id)
    }
}
