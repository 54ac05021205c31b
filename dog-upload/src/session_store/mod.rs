mod file;
mod memory;

pub use file::FileSessionStore;
pub use memory::MemorySessionStore;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{SessionPatch, UploadId, UploadResult, UploadSession};

/// Storage for upload session state with optimistic versioning.
///
/// Every successful mutation bumps `version` by exactly one. `get` hands out
/// snapshots; callers never touch the stored record directly.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session with `version = 1` and `expires_at = now + ttl`.
    /// Fails with a `Conflict` (`AlreadyExists`) if the id is taken.
    async fn create(&self, session: UploadSession, ttl: Duration) -> UploadResult<UploadSession>;

    /// Snapshot of a session, `None` when absent.
    async fn get(&self, upload_id: &UploadId) -> UploadResult<Option<UploadSession>>;

    /// Apply `patch` only if the stored version equals `expected_version`.
    ///
    /// Returns `false` without mutating anything on a version mismatch or a
    /// missing record.
    async fn patch_cas(
        &self,
        upload_id: &UploadId,
        expected_version: u64,
        patch: SessionPatch,
    ) -> UploadResult<bool>;

    /// Move `expires_at` to `now + ttl`. Fails with `NotFound` if missing.
    async fn touch(&self, upload_id: &UploadId, ttl: Duration) -> UploadResult<UploadSession>;

    /// Idempotent removal.
    async fn delete(&self, upload_id: &UploadId) -> UploadResult<()>;

    /// Sessions whose `expires_at` is before `now`, in any state.
    async fn expired(&self, now: DateTime<Utc>) -> UploadResult<Vec<UploadSession>>;
}
