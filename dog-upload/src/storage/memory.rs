use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use parking_lot::RwLock;

use super::{validate_key, ByteStream, ProgressFn, StorageDriver, UploadSource};
use crate::{TransferProgress, UploadError, UploadResult};

#[derive(Default)]
struct Inner {
    files: RwLock<BTreeMap<String, Bytes>>,
    dirs: RwLock<BTreeSet<String>>,
    fail_uploads: AtomicBool,
    fail_renames: AtomicBool,
}

/// In-memory storage driver for tests and demos.
///
/// Clones share the same contents. Failure switches let tests simulate
/// backend outages at specific steps.
#[derive(Clone, Default)]
pub struct MemoryStorageDriver {
    inner: Arc<Inner>,
}

impl MemoryStorageDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored under `prefix`
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.inner
            .files
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn contents(&self, path: &str) -> Option<Bytes> {
        self.inner.files.read().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.files.read().is_empty()
    }

    pub fn has_dir(&self, dir: &str) -> bool {
        self.inner.dirs.read().contains(dir.trim_end_matches('/'))
    }

    /// Make every subsequent `upload_file` fail
    pub fn fail_uploads(&self, fail: bool) {
        self.inner.fail_uploads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `rename` fail
    pub fn fail_renames(&self, fail: bool) {
        self.inner.fail_renames.store(fail, Ordering::SeqCst);
    }

    async fn collect(source: UploadSource) -> UploadResult<Bytes> {
        match source {
            UploadSource::Bytes(bytes) => Ok(bytes),
            UploadSource::Path(path) => Ok(Bytes::from(tokio::fs::read(&path).await?)),
            UploadSource::Stream { mut stream, .. } => {
                let mut buf = BytesMut::new();
                while let Some(piece) = stream.next().await {
                    buf.extend_from_slice(&piece?);
                }
                Ok(buf.freeze())
            }
        }
    }
}

#[async_trait]
impl StorageDriver for MemoryStorageDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ensure_dir(&self, dir: &str) -> UploadResult<()> {
        validate_key(dir)?;
        self.inner.dirs.write().insert(dir.trim_end_matches('/').to_string());
        Ok(())
    }

    async fn upload_file(
        &self,
        source: UploadSource,
        path: &str,
        on_progress: Option<&ProgressFn>,
    ) -> UploadResult<u64> {
        validate_key(path)?;
        if self.inner.fail_uploads.load(Ordering::SeqCst) {
            return Err(UploadError::storage(format!("injected upload failure: {path}")));
        }

        let bytes = Self::collect(source).await?;
        let written = bytes.len() as u64;
        self.inner.files.write().insert(path.to_string(), bytes);

        if let Some(report) = on_progress {
            report(TransferProgress::new(written, written));
        }
        Ok(written)
    }

    async fn exists(&self, path: &str) -> UploadResult<bool> {
        validate_key(path)?;
        Ok(self.inner.files.read().contains_key(path))
    }

    async fn rename(&self, from: &str, to: &str) -> UploadResult<()> {
        validate_key(from)?;
        validate_key(to)?;
        if self.inner.fail_renames.load(Ordering::SeqCst) {
            return Err(UploadError::storage(format!("injected rename failure: {from} -> {to}")));
        }

        let mut files = self.inner.files.write();
        let bytes = files
            .remove(from)
            .ok_or_else(|| UploadError::storage(format!("rename source missing: {from}")))?;
        files.insert(to.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, path: &str) -> UploadResult<()> {
        validate_key(path)?;
        self.inner.files.write().remove(path);
        Ok(())
    }

    async fn read(&self, path: &str) -> UploadResult<ByteStream> {
        validate_key(path)?;
        let bytes = self
            .contents(path)
            .ok_or_else(|| UploadError::storage(format!("no such file: {path}")))?;
        Ok(Box::pin(futures::stream::once(async move {
            Ok::<_, std::io::Error>(bytes)
        })))
    }

    async fn remove_dir(&self, dir: &str) -> UploadResult<()> {
        validate_key(dir)?;
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.inner.files.write().retain(|k, _| !k.starts_with(&prefix));
        self.inner
            .dirs
            .write()
            .retain(|d| d != dir.trim_end_matches('/') && !d.starts_with(&prefix));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rename_is_a_move() {
        let driver = MemoryStorageDriver::new();
        driver.upload_file(Bytes::from_static(b"abc").into(), "t/a", None).await.unwrap();
        driver.rename("t/a", "f/a").await.unwrap();

        assert!(driver.contents("t/a").is_none());
        assert_eq!(driver.contents("f/a").unwrap(), Bytes::from_static(b"abc"));
    }

    #[tokio::test]
    async fn remove_dir_drops_everything_below() {
        let driver = MemoryStorageDriver::new();
        driver.ensure_dir("t/upl_1").await.unwrap();
        driver.upload_file(b"1".to_vec().into(), "t/upl_1/000000.part", None).await.unwrap();
        driver.upload_file(b"2".to_vec().into(), "t/upl_10/000000.part", None).await.unwrap();

        driver.remove_dir("t/upl_1").await.unwrap();
        assert!(driver.keys_with_prefix("t/upl_1/").is_empty());
        assert!(!driver.has_dir("t/upl_1"));
        assert_eq!(driver.keys_with_prefix("t/upl_10/").len(), 1);
    }

    #[tokio::test]
    async fn injected_failures_surface_as_storage_errors() {
        let driver = MemoryStorageDriver::new();
        driver.fail_uploads(true);
        let err = driver.upload_file(b"x".to_vec().into(), "a", None).await.unwrap_err();
        assert!(matches!(err, UploadError::Storage { .. }));
        assert!(driver.is_empty());
    }
}
