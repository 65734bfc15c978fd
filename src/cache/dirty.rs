use crate::cache::slot::{Arena, SlotId};

use bitflags::bitflags;

bitflags! {
    /// How `DirtyList::manage` changes the position of an entry.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub(crate) struct DirtyListOp: u8 {
        const REMOVE = 0x01;
        const ADD = 0x02;
        const FRONT = Self::REMOVE.bits() | Self::ADD.bits();
    }
}

/// Doubly linked list of dirty entries, most recently dirtied first.
#[derive(Default)]
pub(crate) struct DirtyList {
    head: Option<SlotId>,
    tail: Option<SlotId>,
}

impl DirtyList {
    pub(crate) fn head(&self) -> Option<SlotId> {
        self.head
    }

    pub(crate) fn tail(&self) -> Option<SlotId> {
        self.tail
    }

    /// Removes and/or adds `id` at the head; both bits move it to the front.
    pub(crate) fn manage(&mut self, arena: &mut Arena, id: SlotId, op: DirtyListOp) {
        if op.contains(DirtyListOp::REMOVE) {
            self.unlink(arena, id);
        }
        if op.contains(DirtyListOp::ADD) {
            self.push_front(arena, id);
        }
    }

    fn unlink(&mut self, arena: &mut Arena, id: SlotId) {
        let next = arena[id].dirty_next.take();
        let prev = arena[id].dirty_prev.take();
        match next {
            Some(next) => arena[next].dirty_prev = prev,
            None => self.tail = prev,
        }
        match prev {
            Some(prev) => arena[prev].dirty_next = next,
            None => self.head = next,
        }
    }

    fn push_front(&mut self, arena: &mut Arena, id: SlotId) {
        arena[id].dirty_prev = None;
        arena[id].dirty_next = self.head;
        match self.head {
            Some(head) => arena[head].dirty_prev = Some(id),
            None => self.tail = Some(id),
        }
        self.head = Some(id);
    }

    /// Walks from the newest to the oldest dirty entry.
    pub(crate) fn iter<'a>(&self, arena: &'a Arena) -> DirtyIter<'a> {
        DirtyIter {
            arena,
            next: self.head,
        }
    }
}

pub(crate) struct DirtyIter<'a> {
    arena: &'a Arena,
    next: Option<SlotId>,
}

impl Iterator for DirtyIter<'_> {
    type Item = SlotId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        self.next = self.arena[id].dirty_next;
        Some(id)
    }
}
