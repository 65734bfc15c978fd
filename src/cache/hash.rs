use crate::cache::pagecache::CacheError;
use crate::cache::slot::{Arena, SlotId};
use crate::config::MIN_HASH_SLOTS;
use crate::pages::PageId;

use log::debug;

/// Chained hash table from page number to arena entry.
///
/// Page numbers are used as their own hash: the bucket of a key is
/// `key % buckets.len()`. Chains are threaded through `PageEntry::hash_next`
/// and new entries become the head of their chain.
pub(crate) struct HashTable {
    buckets: Vec<Option<SlotId>>,
    page_count: usize,
}

impl HashTable {
    pub(crate) fn new() -> Self {
        Self {
            buckets: Vec::new(),
            page_count: 0,
        }
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.buckets.len()
    }

    pub(crate) fn page_count(&self) -> usize {
        self.page_count
    }

    pub(crate) fn needs_resize(&self) -> bool {
        self.page_count >= self.buckets.len()
    }

    fn bucket(&self, key: PageId) -> usize {
        key.get() as usize % self.buckets.len()
    }

    pub(crate) fn lookup(&self, arena: &Arena, key: PageId) -> Option<SlotId> {
        if self.buckets.is_empty() {
            return None;
        }
        let mut cur = self.buckets[self.bucket(key)];
        while let Some(id) = cur {
            if arena[id].key == key {
                return Some(id);
            }
            cur = arena[id].hash_next;
        }
        None
    }

    /// Prepends `id` to the chain of its key. The key must not be present.
    pub(crate) fn insert(&mut self, arena: &mut Arena, id: SlotId) {
        let bucket = self.bucket(arena[id].key);
        arena[id].hash_next = self.buckets[bucket];
        self.buckets[bucket] = Some(id);
        self.page_count += 1;
    }

    /// Grows the table to `max(2 * slots, 256)` buckets.
    ///
    /// Each old chain is walked head to tail and every entry is prepended
    /// to its new bucket, so entries that stay together end up in reverse
    /// order.
    pub(crate) fn resize(&mut self, arena: &mut Arena) -> Result<(), CacheError> {
        let new_count = (self.buckets.len() * 2).max(MIN_HASH_SLOTS);
        let mut buckets = Vec::new();
        buckets
            .try_reserve_exact(new_count)
            .map_err(|_| CacheError::Allocation {
                bytes: new_count * std::mem::size_of::<Option<SlotId>>(),
            })?;
        buckets.resize(new_count, None);

        for head in self.buckets.iter().copied() {
            let mut cur = head;
            while let Some(id) = cur {
                cur = arena[id].hash_next;
                let bucket = arena[id].key.get() as usize % new_count;
                arena[id].hash_next = buckets[bucket];
                buckets[bucket] = Some(id);
            }
        }
        debug!(
            "page hash resized from {} to {new_count} buckets ({} pages)",
            self.buckets.len(),
            self.page_count
        );
        self.buckets = buckets;

        Ok(())
    }

    /// Unlinks `id`, matching by identity rather than key.
    ///
    /// Returns `false` if the entry is not in the table.
    pub(crate) fn remove(&mut self, arena: &mut Arena, id: SlotId) -> bool {
        if self.buckets.is_empty() {
            return false;
        }
        let bucket = self.bucket(arena[id].key);
        let mut prev: Option<SlotId> = None;
        let mut cur = self.buckets[bucket];
        while let Some(c) = cur {
            if c == id {
                let next = arena[c].hash_next.take();
                match prev {
                    Some(p) => arena[p].hash_next = next,
                    None => self.buckets[bucket] = next,
                }
                self.page_count -= 1;
                return true;
            }
            prev = cur;
            cur = arena[c].hash_next;
        }
        false
    }

    /// Entries of one bucket, chain head first.
    pub(crate) fn chain<'a>(&self, arena: &'a Arena, bucket: usize) -> Chain<'a> {
        Chain {
            arena,
            next: self.buckets.get(bucket).copied().flatten(),
        }
    }

    /// Every cached entry, bucket by bucket.
    pub(crate) fn iter<'a>(&'a self, arena: &'a Arena) -> impl Iterator<Item = SlotId> + 'a {
        (0..self.buckets.len()).flat_map(move |bucket| self.chain(arena, bucket))
    }
}

pub(crate) struct Chain<'a> {
    arena: &'a Arena,
    next: Option<SlotId>,
}

impl Iterator for Chain<'_> {
    type Item = SlotId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        self.next = self.arena[id].hash_next;
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(arena: &mut Arena, key: u32) -> SlotId {
        let id = arena.allocate_slot().unwrap();
        arena[id].key = PageId::new(key);
        id
    }

    fn table() -> HashTable {
        let mut table = HashTable::new();
        table.resize(&mut Arena::new(8)).unwrap();
        table
    }

    #[test]
    fn first_resize_reaches_minimum() {
        let table = table();
        assert_eq!(table.slot_count(), MIN_HASH_SLOTS);
        assert_eq!(table.page_count(), 0);
    }

    #[test]
    fn colliding_keys_share_a_chain() {
        let mut arena = Arena::new(8);
        let mut table = table();
        let a = entry(&mut arena, 3);
        let b = entry(&mut arena, 3 + 256);
        table.insert(&mut arena, a);
        table.insert(&mut arena, b);

        assert_eq!(table.chain(&arena, 3).collect::<Vec<_>>(), vec![b, a]);
        assert_eq!(table.lookup(&arena, PageId::new(3)), Some(a));
        assert_eq!(table.lookup(&arena, PageId::new(259)), Some(b));
        assert_eq!(table.lookup(&arena, PageId::new(515)), None);
    }

    #[test]
    fn resize_reverses_chain_order() {
        let mut arena = Arena::new(8);
        let mut table = table();
        // all three land in bucket 1 of both the 256 and the 512 table
        let ids: Vec<_> = [1, 513, 1025]
            .into_iter()
            .map(|key| entry(&mut arena, key))
            .collect();
        for &id in &ids {
            table.insert(&mut arena, id);
        }
        assert_eq!(
            table.chain(&arena, 1).collect::<Vec<_>>(),
            vec![ids[2], ids[1], ids[0]]
        );

        table.resize(&mut arena).unwrap();
        assert_eq!(table.slot_count(), 512);
        assert_eq!(table.page_count(), 3);
        assert_eq!(table.chain(&arena, 1).collect::<Vec<_>>(), ids);
    }

    #[test]
    fn remove_by_identity() {
        let mut arena = Arena::new(8);
        let mut table = table();
        let a = entry(&mut arena, 10);
        let b = entry(&mut arena, 266);
        let c = entry(&mut arena, 522);
        for id in [a, b, c] {
            table.insert(&mut arena, id);
        }

        assert!(table.remove(&mut arena, b));
        assert!(!table.remove(&mut arena, b));
        assert_eq!(table.page_count(), 2);
        assert_eq!(table.chain(&arena, 10).collect::<Vec<_>>(), vec![c, a]);

        assert!(table.remove(&mut arena, c));
        assert_eq!(table.chain(&arena, 10).collect::<Vec<_>>(), vec![a]);
        assert_eq!(table.iter(&arena).count(), 1);
    }
}
