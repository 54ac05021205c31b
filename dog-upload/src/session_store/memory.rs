use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::clock::{deadline, Clock, SystemClock};
use crate::{
    ConflictReason, SessionPatch, SessionStore, UploadError, UploadId, UploadResult,
    UploadSession,
};

/// In-memory session store for tests and single-process deployments
#[derive(Clone)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<UploadId, UploadSession>>>,
    clock: Arc<dyn Clock>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Number of stored sessions
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, mut session: UploadSession, ttl: Duration) -> UploadResult<UploadSession> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session.upload_id) {
            return Err(UploadError::conflict(
                ConflictReason::AlreadyExists,
                format!("upload session already exists: {}", session.upload_id),
            ));
        }

        session.version = 1;
        session.expires_at = deadline(self.clock.now(), ttl);
        sessions.insert(session.upload_id.clone(), session.clone());
        Ok(session)
    }

    async fn get(&self, upload_id: &UploadId) -> UploadResult<Option<UploadSession>> {
        Ok(self.sessions.read().get(upload_id).cloned())
    }

    async fn patch_cas(
        &self,
        upload_id: &UploadId,
        expected_version: u64,
        patch: SessionPatch,
    ) -> UploadResult<bool> {
        let mut sessions = self.sessions.write();
        match sessions.get_mut(upload_id) {
            Some(session) if session.version == expected_version => {
                patch.merge_into(session);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn touch(&self, upload_id: &UploadId, ttl: Duration) -> UploadResult<UploadSession> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(upload_id)
            .ok_or_else(|| UploadError::not_found(upload_id.as_str()))?;
        session.expires_at = deadline(self.clock.now(), ttl);
        session.version += 1;
        Ok(session.clone())
    }

    async fn delete(&self, upload_id: &UploadId) -> UploadResult<()> {
        self.sessions.write().remove(upload_id);
        Ok(())
    }

    async fn expired(&self, now: DateTime<Utc>) -> UploadResult<Vec<UploadSession>> {
        Ok(self
            .sessions
            .read()
            .values()
            .filter(|s| s.expires_at < now)
            .cloned()
            .collect())
    }
}
