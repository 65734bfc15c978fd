use std::sync::LazyLock;

pub const DEFAULT_PAGE_SIZE: usize = 4096;
/// Slots carved out of the bulk block when no larger hint is given.
pub const DEFAULT_BULK_SLOTS: usize = 1024;
/// Smallest bucket count of the page hash table.
pub const MIN_HASH_SLOTS: usize = 256;

#[allow(non_snake_case)]
pub struct Config {
    // size in bytes of one database page
    pub PAGE_SIZE: usize,
    // number of slots requested from the bulk allocator
    pub BULK_SLOT_HINT: usize,
}

pub static CONFIG: LazyLock<Config> = LazyLock::new(|| Config {
    PAGE_SIZE: DEFAULT_PAGE_SIZE,
    BULK_SLOT_HINT: DEFAULT_BULK_SLOTS,
});

/// Per-cache settings.
///
/// `min_reserved` and `max_configured` are only stored by the cache; they are
/// inputs for an eviction policy and are not enforced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    pub page_size: usize,
    pub initial_slot_hint: usize,
    pub min_reserved: usize,
    pub max_configured: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            page_size: CONFIG.PAGE_SIZE,
            initial_slot_hint: CONFIG.BULK_SLOT_HINT,
            min_reserved: 0,
            max_configured: 0,
        }
    }
}

impl CacheConfig {
    pub fn new(page_size: usize, initial_slot_hint: usize) -> Self {
        Self {
            page_size,
            initial_slot_hint,
            ..Self::default()
        }
    }
}
