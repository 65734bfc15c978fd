mod backend;

pub use backend::{FileStorage, StorageBackend, StorageError};
