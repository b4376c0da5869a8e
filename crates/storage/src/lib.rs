//! Storage backend for the videogrid engine
//!
//! The engine treats the store as a flat namespace of blobs addressed by
//! well-known paths (see [`paths`]). Backends hand out random-read and write
//! handles; writes become visible atomically when the handle is saved.
//! Pipeline stages run on OS threads, so the interface is synchronous.

mod blob;
mod fs;
mod meta;
pub mod paths;
mod retry;

pub use blob::{decode_item_blob, encode_column_blob, encode_item_blob, read_column_rows};
pub use fs::FilesystemStorage;
pub use meta::{read_database_metadata, write_database_metadata, write_job_descriptor};
pub use retry::retry_backoff;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transient storage failure: {0}")]
    Transient(String),

    #[error("storage retries exhausted after {attempts} attempts: {what}")]
    RetriesExhausted { what: String, attempts: u32 },

    #[error("short read at offset {offset}: wanted {wanted} bytes, got {got}")]
    ShortRead {
        offset: u64,
        wanted: usize,
        got: usize,
    },

    #[error("malformed blob: {0}")]
    MalformedBlob(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Read-only handle supporting positioned reads
pub trait RandomReadFile: Send {
    fn read_at(&mut self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    fn size(&mut self) -> StorageResult<u64>;
}

impl std::fmt::Debug for dyn RandomReadFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn RandomReadFile")
    }
}

/// Append-only write handle; contents become visible only after `save`
pub trait WriteFile: Send {
    fn append(&mut self, data: &[u8]) -> StorageResult<()>;

    fn save(self: Box<Self>) -> StorageResult<()>;
}

/// Storage capability consumed by the planner, pipeline, and metadata writes
pub trait StorageBackend: Send + Sync {
    fn random_read_file(&self, path: &str) -> StorageResult<Box<dyn RandomReadFile>>;

    fn write_file(&self, path: &str) -> StorageResult<Box<dyn WriteFile>>;

    fn exists(&self, path: &str) -> StorageResult<bool>;

    fn list_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

/// Read a whole blob into memory
pub fn read_all(storage: &dyn StorageBackend, path: &str) -> StorageResult<Vec<u8>> {
    let mut file = storage.random_read_file(path)?;
    let size = file.size()?;
    file.read_at(0, size as usize)
}

/// Write a whole blob and save it as one atomic unit
pub fn write_all(storage: &dyn StorageBackend, path: &str, data: &[u8]) -> StorageResult<()> {
    let mut file = storage.write_file(path)?;
    file.append(data)?;
    file.save()
}
