mod memory;

pub use memory::MemoryLockCoordinator;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::UploadResult;

/// Proof of holding a lock - only the holder can release it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseToken(pub String);

impl LeaseToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LeaseToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-key advisory mutual exclusion.
///
/// Acquisition never waits: a held, unexpired lease fails immediately with a
/// `Conflict` (`LockBusy`). A distributed implementation can back this with a
/// lease-based lock service without the orchestrator noticing.
#[async_trait]
pub trait LockCoordinator: Send + Sync {
    async fn try_acquire(&self, key: &str, lease: Duration) -> UploadResult<LeaseToken>;

    /// Push the lease deadline to `now + lease`. Fails with `Conflict`
    /// (`LockBusy`) once `token` no longer owns `key`.
    async fn renew(&self, key: &str, token: &LeaseToken, lease: Duration) -> UploadResult<()>;

    /// Release if `token` still owns `key`; a stale token is ignored.
    fn release(&self, key: &str, token: &LeaseToken);
}

/// Releases its lease when dropped.
pub struct LockGuard<'a> {
    locks: &'a dyn LockCoordinator,
    key: String,
    token: LeaseToken,
}

impl<'a> LockGuard<'a> {
    pub async fn acquire(
        locks: &'a dyn LockCoordinator,
        key: &str,
        lease: Duration,
    ) -> UploadResult<LockGuard<'a>> {
        let token = locks.try_acquire(key, lease).await?;
        Ok(Self {
            locks,
            key: key.to_string(),
            token,
        })
    }

    pub fn token(&self) -> &LeaseToken {
        &self.token
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.locks.release(&self.key, &self.token);
    }
}

/// Owned handle for extending a held lease from long-running work, such as
/// a stream that outlives the borrow of its [`LockGuard`].
#[derive(Clone)]
pub struct LeaseRenewal {
    locks: Arc<dyn LockCoordinator>,
    key: String,
    token: LeaseToken,
    lease: Duration,
}

impl LeaseRenewal {
    pub fn new(locks: Arc<dyn LockCoordinator>, guard: &LockGuard<'_>, lease: Duration) -> Self {
        Self {
            locks,
            key: guard.key().to_string(),
            token: guard.token().clone(),
            lease,
        }
    }

    pub async fn renew(&self) -> UploadResult<()> {
        self.locks.renew(&self.key, &self.token, self.lease).await
    }
}

/// Run `work` while holding the lock for `key`.
///
/// The lease is released when `work` finishes, fails, or panics.
pub async fn with_lock<F, Fut, T>(
    locks: &dyn LockCoordinator,
    key: &str,
    lease: Duration,
    work: F,
) -> UploadResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = UploadResult<T>>,
{
    let _guard = LockGuard::acquire(locks, key, lease).await?;
    work().await
}
