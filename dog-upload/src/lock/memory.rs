use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::clock::{deadline, Clock, SystemClock};
use crate::{ConflictReason, LeaseToken, LockCoordinator, UploadError, UploadResult};

#[derive(Debug, Clone)]
struct Lease {
    token: LeaseToken,
    until: DateTime<Utc>,
}

/// Process-local lease table
#[derive(Clone)]
pub struct MemoryLockCoordinator {
    leases: Arc<Mutex<HashMap<String, Lease>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryLockCoordinator {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            leases: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Whether `key` is held by an unexpired lease
    pub fn is_held(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.leases
            .lock()
            .get(key)
            .map_or(false, |lease| lease.until > now)
    }
}

impl Default for MemoryLockCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockCoordinator for MemoryLockCoordinator {
    async fn try_acquire(&self, key: &str, lease: Duration) -> UploadResult<LeaseToken> {
        let now = self.clock.now();
        let mut leases = self.leases.lock();

        if let Some(current) = leases.get(key) {
            if current.until > now {
                return Err(UploadError::conflict(
                    ConflictReason::LockBusy,
                    format!("another operation is in progress for {key}"),
                ));
            }
            debug!(key, "taking over expired lease");
        }

        let token = LeaseToken::new();
        leases.insert(
            key.to_string(),
            Lease {
                token: token.clone(),
                until: deadline(now, lease),
            },
        );
        Ok(token)
    }

    async fn renew(&self, key: &str, token: &LeaseToken, lease: Duration) -> UploadResult<()> {
        let now = self.clock.now();
        let mut leases = self.leases.lock();
        match leases.get_mut(key) {
            Some(current) if &current.token == token => {
                current.until = deadline(now, lease);
                Ok(())
            }
            _ => Err(UploadError::conflict(
                ConflictReason::LockBusy,
                format!("lease on {key} was lost"),
            )),
        }
    }

    fn release(&self, key: &str, token: &LeaseToken) {
        let mut leases = self.leases.lock();
        if leases.get(key).map_or(false, |lease| &lease.token == token) {
            leases.remove(key);
        }
    }
}
