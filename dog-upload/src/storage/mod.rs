//! Storage drivers: where chunk artifacts and finished files physically live.
//!
//! Paths handed to a driver are always relative, `/`-separated keys. Drivers
//! reject anything that could escape their root.

mod local;
mod memory;
#[cfg(feature = "s3")]
mod s3;

pub use local::LocalStorageDriver;
pub use memory::MemoryStorageDriver;
#[cfg(feature = "s3")]
pub use s3::{S3Config, S3StorageDriver};

use std::path::{Component, Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::{TransferProgress, UploadError, UploadResult};

/// Stream of bytes used for reads and streamed writes
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Progress callback for [`StorageDriver::upload_file`]
pub type ProgressFn = dyn Fn(TransferProgress) + Send + Sync;

/// Content handed to [`StorageDriver::upload_file`]
pub enum UploadSource {
    /// In-memory buffer
    Bytes(Bytes),
    /// A file on the local disk
    Path(PathBuf),
    /// A byte stream; `size` is used only for progress reporting
    Stream { stream: ByteStream, size: Option<u64> },
}

impl UploadSource {
    pub fn stream(stream: ByteStream, size: Option<u64>) -> Self {
        Self::Stream { stream, size }
    }
}

impl From<Bytes> for UploadSource {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for UploadSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl std::fmt::Debug for UploadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Path(p) => f.debug_tuple("Path").field(p).finish(),
            Self::Stream { size, .. } => f.debug_struct("Stream").field("size", size).finish(),
        }
    }
}

/// Abstraction over a physical byte store
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Short backend label used in logs
    fn name(&self) -> &'static str;

    /// Create the directory tree if absent. Idempotent.
    async fn ensure_dir(&self, dir: &str) -> UploadResult<()>;

    /// Write `source` to `path`, returning the number of bytes written.
    ///
    /// `on_progress` may be called any number of times, including only once
    /// at completion. A reader of `path` never observes a partial write.
    async fn upload_file(
        &self,
        source: UploadSource,
        path: &str,
        on_progress: Option<&ProgressFn>,
    ) -> UploadResult<u64>;

    async fn exists(&self, path: &str) -> UploadResult<bool>;

    /// Move `from` to `to`. Readers of `to` see either nothing or the complete file.
    async fn rename(&self, from: &str, to: &str) -> UploadResult<()>;

    /// Best-effort removal; a missing path is not an error.
    async fn delete(&self, path: &str) -> UploadResult<()>;

    /// Stream the contents of `path`. Fails with `Storage` if it does not exist.
    async fn read(&self, path: &str) -> UploadResult<ByteStream>;

    /// Remove a directory and whatever is left in it. Missing is not an error.
    async fn remove_dir(&self, dir: &str) -> UploadResult<()>;
}

/// Reject absolute paths and anything other than normal segments.
pub(crate) fn validate_key(key: &str) -> UploadResult<()> {
    if key.is_empty() || key.starts_with('/') || key.starts_with('\\') || key.contains("..") {
        return Err(UploadError::validation(format!("unsafe storage path: {key}")));
    }
    let all_normal = Path::new(key)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !all_normal {
        return Err(UploadError::validation(format!("unsafe storage path: {key}")));
    }
    Ok(())
}
