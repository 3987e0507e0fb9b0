//! File System Abstraction
//!
//! The reconciliation engine never touches `std::fs` directly: the metadata
//! cache and the collector go through [`FileSystemAccess`] so tests can inject
//! failures (e.g. a write that errors half-way) without a real broken disk.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub is_directory: bool,
}

/// File system access trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn replace(fs: &dyn FileSystemAccess, path: &Path, data: Bytes) -> Result<()> {
///     let tmp = path.with_extension("tmp");
///     fs.write_file(&tmp, data).await?;
///     fs.rename(&tmp, path).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a file, creating or truncating it
    ///
    /// The write is flushed and synced before returning.
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Rename `from` to `to`, replacing `to` if it exists
    ///
    /// On the same filesystem this is atomic: readers see either the old or
    /// the new file, never a mix.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Open a file for streaming reads
    async fn open_read_stream(
        &self,
        path: &Path,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;

    /// Create (or truncate) a file for streaming writes
    async fn open_write_stream(
        &self,
        path: &Path,
    ) -> Result<Box<dyn tokio::io::AsyncWrite + Send + Unpin>>;

    /// Delete a file, treating "already gone" as success
    async fn remove_if_exists(&self, path: &Path) -> Result<()> {
        if self.exists(path).await? {
            self.delete_file(path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_metadata() {
        let metadata = FileMetadata {
            size: 1024,
            is_directory: false,
        };

        assert_eq!(metadata.size, 1024);
        assert!(!metadata.is_directory);
    }
}
