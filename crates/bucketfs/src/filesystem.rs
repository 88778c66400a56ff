//! Filesystem-shaped adapter trait definition
//!
//! Defines the operation surface callers program against, independent of
//! the object-storage client underneath.

use async_trait::async_trait;
use bucketfs_core::{CallConfig, FileAttributes, Result, StorageAttributes, Visibility};
use bytes::Bytes;
use futures::stream::BoxStream;

/// Body of a streaming read
pub type FileStream = BoxStream<'static, Result<Bytes>>;

/// Body of a streaming write
pub type ContentStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Async trait for filesystem adapters
///
/// Paths are logical: slash separated, relative to the adapter's root.
/// Every failure is reported as the operation's own error kind, carrying
/// the path(s) involved and the underlying cause.
#[async_trait]
pub trait FilesystemAdapter: Send + Sync {
    /// Check whether a file exists
    ///
    /// A missing file is `Ok(false)`, not an error. Clients that cannot tell
    /// a missing key from a missing bucket (an S3 HEAD answers both with a
    /// bare 404) report `Ok(false)` for a missing bucket as well.
    async fn file_exists(&self, path: &str) -> Result<bool>;

    /// Check whether a directory exists
    ///
    /// True when a directory marker exists or any object lives below it.
    async fn directory_exists(&self, path: &str) -> Result<bool>;

    /// Write a file from memory
    ///
    /// # Arguments
    /// * `path` - Logical file path
    /// * `contents` - File contents
    /// * `config` - Per-call upload options and `visibility`
    async fn write(&self, path: &str, contents: Bytes, config: &CallConfig) -> Result<()>;

    /// Write a file from a stream without buffering it whole
    async fn write_stream(&self, path: &str, contents: ContentStream, config: &CallConfig) -> Result<()>;

    /// Read a whole file into memory
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Open a file for streaming reads
    async fn read_stream(&self, path: &str) -> Result<FileStream>;

    /// Delete a single file
    async fn delete(&self, path: &str) -> Result<()>;

    /// Delete a directory and everything below it
    async fn delete_directory(&self, path: &str) -> Result<()>;

    /// Create a directory
    ///
    /// Unless `config` says otherwise, the directory gets the default
    /// directory visibility.
    async fn create_directory(&self, path: &str, config: &CallConfig) -> Result<()>;

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()>;

    async fn visibility(&self, path: &str) -> Result<FileAttributes>;

    async fn mime_type(&self, path: &str) -> Result<FileAttributes>;

    async fn last_modified(&self, path: &str) -> Result<FileAttributes>;

    async fn file_size(&self, path: &str) -> Result<FileAttributes>;

    /// List the entries below `path`
    ///
    /// With `deep` every nested file and directory marker is returned,
    /// otherwise only the immediate children. Entries arrive in storage
    /// order; nothing is sorted.
    fn list_contents<'a>(&'a self, path: &'a str, deep: bool) -> BoxStream<'a, Result<StorageAttributes>>;

    /// Move a file
    ///
    /// Implemented as copy then delete. If the delete fails, the error is
    /// reported but the copy at `destination` is left in place.
    async fn move_file(&self, source: &str, destination: &str, config: &CallConfig) -> Result<()>;

    /// Copy a file, keeping its visibility
    async fn copy_file(&self, source: &str, destination: &str, config: &CallConfig) -> Result<()>;
}
