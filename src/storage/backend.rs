use crate::pages::PageId;

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("io error")]
    Io(#[from] std::io::Error),
    #[error("file corrupted")]
    FileCorrupted,
    #[error("buffer of {0} bytes does not match the page size")]
    BufferSize(usize),
}

pub trait StorageBackend: Sync + Send {
    fn page_size(&self) -> usize;
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StorageError>;
    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StorageError>;
    fn fsync(&self);
    fn allocate_page(&self) -> Result<PageId, StorageError>;
    fn last_page_id(&self) -> PageId;
}

/// Database file made of fixed-size pages. Page 0 is written on creation.
pub struct FileStorage {
    file: File,
    page_size: usize,
    last_page_id: AtomicU32,
}

impl FileStorage {
    /// Creates a new storage file, truncating any existing one.
    pub fn create<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self, StorageError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(StorageError::Io)?;

        let file = Self {
            file,
            page_size,
            last_page_id: AtomicU32::new(0),
        };
        file.write_page(PageId::new(0), &vec![0; page_size])?;
        file.fsync();

        Ok(file)
    }

    /// Opens an existing storage file.
    pub fn open<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self, StorageError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(false)
            .truncate(false)
            .open(path)
            .map_err(StorageError::Io)?;

        let len = file.metadata()?.len() as usize;
        if len == 0 || !len.is_multiple_of(page_size) {
            return Err(StorageError::FileCorrupted);
        }

        let last_page_id = (len / page_size) as u32 - 1;
        Ok(Self {
            file,
            page_size,
            last_page_id: AtomicU32::new(last_page_id),
        })
    }

    fn offset(&self, page_id: PageId, len: usize) -> Result<u64, StorageError> {
        if len != self.page_size {
            return Err(StorageError::BufferSize(len));
        }
        Ok(page_id.get() as u64 * self.page_size as u64)
    }
}

impl StorageBackend for FileStorage {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StorageError> {
        let offset = self.offset(page_id, buf.len())?;

        self.file
            .read_exact_at(buf, offset)
            .map_err(StorageError::Io)
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StorageError> {
        let offset = self.offset(page_id, buf.len())?;

        self.file
            .write_all_at(buf, offset)
            .map_err(StorageError::Io)
    }

    /// Syncs file data and metadata to the disk.
    ///
    /// # Panics
    ///
    /// Panics if the underlying `File::sync_all` operation fails.
    fn fsync(&self) {
        let result = self.file.sync_all();
        if result.is_err() {
            // if fsync fails, we can't make sure data is flushed to disk
            // ref: https://wiki.postgresql.org/wiki/Fsync_Errors
            panic!("flush (fsync) failed");
        }
    }

    fn allocate_page(&self) -> Result<PageId, StorageError> {
        let last_page_id = self.last_page_id.fetch_add(1, Ordering::Relaxed) + 1;
        let new_page_id = PageId::new(last_page_id);
        self.write_page(new_page_id, &vec![0; self.page_size])?;
        Ok(new_page_id)
    }

    fn last_page_id(&self) -> PageId {
        PageId::new(self.last_page_id.load(Ordering::Relaxed))
    }
}
