//! Local content port (driven/secondary port)
//!
//! Interface for reading and writing content in the local sync tree. The
//! real adapter wraps filesystem I/O; tests use an in-memory double.
//! Errors use [`TransportError`] so the retry engine classifies local
//! failures (disk full, permission) with the same taxonomy as remote ones.

use crate::domain::errors::TransportError;
use crate::domain::newtypes::{ContentHash, LocalPath};

/// Port trait for local file content
#[async_trait::async_trait]
pub trait LocalStore: Send + Sync {
    /// Reads up to `len` bytes of content starting at `offset`
    ///
    /// A short read means end of file.
    async fn read_chunk(
        &self,
        path: &LocalPath,
        offset: u64,
        len: u64,
    ) -> Result<Vec<u8>, TransportError>;

    /// Writes one chunk at `offset`, extending the file as needed
    async fn write_chunk(
        &self,
        path: &LocalPath,
        offset: u64,
        data: &[u8],
    ) -> Result<(), TransportError>;

    /// Removes the file or folder at `path`
    async fn remove(&self, path: &LocalPath) -> Result<(), TransportError>;

    /// Moves or renames `from` to `to`
    async fn relocate(&self, from: &LocalPath, to: &LocalPath) -> Result<(), TransportError>;

    /// Creates a folder (and missing parents) at `path`
    async fn create_folder(&self, path: &LocalPath) -> Result<(), TransportError>;

    /// Computes the content hash of the file at `path`
    async fn content_hash(&self, path: &LocalPath) -> Result<ContentHash, TransportError>;
}
