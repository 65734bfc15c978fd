use std::fmt;

use zerocopy::little_endian::U32;
use zerocopy_derive::*;

/// Number of a database page, stored little endian so it can be embedded
/// as-is in on-disk headers.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(transparent)]
pub struct PageId(U32);

impl PageId {
    pub fn new(page_id: u32) -> Self {
        Self(U32::new(page_id))
    }

    pub fn get(&self) -> u32 {
        self.0.get()
    }

    pub fn set(&mut self, page_id: u32) {
        self.0.set(page_id);
    }
}

impl From<u32> for PageId {
    fn from(page_id: u32) -> Self {
        Self::new(page_id)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Whether the cached copy of a page differs from what is on disk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PageState {
    #[default]
    Clean,
    Dirty,
}

impl PageState {
    pub fn is_dirty(&self) -> bool {
        matches!(self, PageState::Dirty)
    }
}
