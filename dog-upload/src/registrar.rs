//! Boundary to the media catalog that takes ownership of finished files.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{UploadError, UploadResult};

/// Catalog status of a registered file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaStatus {
    Uploaded,
}

/// What the orchestrator sends to the registrar after a successful assembly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMediaFile {
    pub user_id: String,
    pub filename: String,
    pub mime: Option<String>,
    pub size: u64,
    pub path: String,
    pub url: String,
    pub status: MediaStatus,
}

/// The registrar's record of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredMedia {
    pub id: String,
    #[serde(flatten)]
    pub file: NewMediaFile,
}

/// Persists catalog metadata for a finished upload.
///
/// `finish` may call this more than once for the same `path` when an earlier
/// attempt failed after the registrar committed. Implementations dedupe.
#[async_trait]
pub trait MediaRegistrar: Send + Sync {
    async fn create_file(&self, file: NewMediaFile) -> UploadResult<RegisteredMedia>;
}

#[derive(Default)]
struct Inner {
    by_path: RwLock<HashMap<String, RegisteredMedia>>,
    fail_next: AtomicUsize,
    fail_always: AtomicBool,
}

/// In-memory registrar, deduplicating by `path`
#[derive(Clone, Default)]
pub struct MemoryMediaRegistrar {
    inner: Arc<Inner>,
}

impl MemoryMediaRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` calls
    pub fn fail_next(&self, count: usize) {
        self.inner.fail_next.store(count, Ordering::SeqCst);
    }

    /// Fail every call until switched off
    pub fn fail_always(&self, fail: bool) {
        self.inner.fail_always.store(fail, Ordering::SeqCst);
    }

    pub fn files(&self) -> Vec<RegisteredMedia> {
        self.inner.by_path.read().values().cloned().collect()
    }

    pub fn get_by_path(&self, path: &str) -> Option<RegisteredMedia> {
        self.inner.by_path.read().get(path).cloned()
    }

    fn should_fail(&self) -> bool {
        if self.inner.fail_always.load(Ordering::SeqCst) {
            return true;
        }
        self.inner
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl MediaRegistrar for MemoryMediaRegistrar {
    async fn create_file(&self, file: NewMediaFile) -> UploadResult<RegisteredMedia> {
        if self.should_fail() {
            return Err(UploadError::registrar("media registrar unavailable"));
        }

        let mut by_path = self.inner.by_path.write();
        let record = by_path
            .entry(file.path.clone())
            .or_insert_with(|| RegisteredMedia {
                id: Uuid::new_v4().to_string(),
                file,
            });
        Ok(record.clone())
    }
}
