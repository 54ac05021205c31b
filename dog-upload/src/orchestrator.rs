//! The upload state machine.
//!
//! ```text
//! INITIALIZED --chunk--> RECEIVING --finish--> FINALIZING --registered--> COMPLETED
//!                             ^                     |
//!                             +------ failure ------+
//! any non-terminal state --abort / ttl--> ABORTED / EXPIRED
//! ```
//!
//! `write_chunk`, `finish` and `abort` run under the per-session lock; every
//! state change goes through a compare-and-swap on the session version.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::clock::{deadline, Clock, SystemClock};
use crate::keys::{sanitize_filename, validate_subdir, DefaultKeyStrategy, KeyStrategy};
use crate::lock::{with_lock, LeaseRenewal, LockGuard};
use crate::registrar::{MediaRegistrar, MediaStatus, NewMediaFile};
use crate::storage::{ByteStream, StorageDriver, UploadSource};
use crate::{
    total_chunks, AbortReceipt, ChunkReceipt, ConflictReason, FinishOptions, FinishReceipt,
    InitReceipt, LockCoordinator, MemoryLockCoordinator, MemorySessionStore, SessionPatch,
    SessionStore, UploadConfig, UploadError, UploadId, UploadInit, UploadResult, UploadSession,
    UploadState, UploadStatusView,
};

const MAX_FILENAME_CHARS: usize = 255;
const MISSING_LIST_LIMIT: usize = 10;

/// Outcome of one [`UploadOrchestrator::reap_expired`] pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Unfinished sessions moved to `EXPIRED` and cleaned up
    pub expired: usize,
    /// Completed records dropped after their retention window
    pub purged: usize,
    /// Sessions skipped because an operation held their lock
    pub skipped: usize,
}

/// Composes the session store, lock coordinator, storage driver and media
/// registrar into the resumable upload protocol.
pub struct UploadOrchestrator {
    sessions: Arc<dyn SessionStore>,
    locks: Arc<dyn LockCoordinator>,
    storage: Arc<dyn StorageDriver>,
    registrar: Arc<dyn MediaRegistrar>,
    keys: Arc<dyn KeyStrategy>,
    clock: Arc<dyn Clock>,
    config: UploadConfig,
}

/// Builder for [`UploadOrchestrator`]; unset collaborators get in-memory defaults
pub struct UploadOrchestratorBuilder {
    storage: Arc<dyn StorageDriver>,
    registrar: Arc<dyn MediaRegistrar>,
    sessions: Option<Arc<dyn SessionStore>>,
    locks: Option<Arc<dyn LockCoordinator>>,
    keys: Option<Arc<dyn KeyStrategy>>,
    clock: Option<Arc<dyn Clock>>,
    config: UploadConfig,
}

impl UploadOrchestratorBuilder {
    pub fn with_sessions<S: SessionStore + 'static>(mut self, sessions: S) -> Self {
        self.sessions = Some(Arc::new(sessions));
        self
    }

    pub fn with_locks<L: LockCoordinator + 'static>(mut self, locks: L) -> Self {
        self.locks = Some(Arc::new(locks));
        self
    }

    pub fn with_key_strategy<K: KeyStrategy + 'static>(mut self, keys: K) -> Self {
        self.keys = Some(Arc::new(keys));
        self
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn with_config(mut self, config: UploadConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> UploadOrchestrator {
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let sessions = self
            .sessions
            .unwrap_or_else(|| Arc::new(MemorySessionStore::with_clock(Arc::clone(&clock))));
        let locks = self
            .locks
            .unwrap_or_else(|| Arc::new(MemoryLockCoordinator::with_clock(Arc::clone(&clock))));
        let keys = self
            .keys
            .unwrap_or_else(|| Arc::new(DefaultKeyStrategy::new(self.config.temp_dir.clone())));

        UploadOrchestrator {
            sessions,
            locks,
            storage: self.storage,
            registrar: self.registrar,
            keys,
            clock,
            config: self.config,
        }
    }
}

impl UploadOrchestrator {
    pub fn builder<S, R>(storage: S, registrar: R) -> UploadOrchestratorBuilder
    where
        S: StorageDriver + 'static,
        R: MediaRegistrar + 'static,
    {
        UploadOrchestratorBuilder {
            storage: Arc::new(storage),
            registrar: Arc::new(registrar),
            sessions: None,
            locks: None,
            keys: None,
            clock: None,
            config: UploadConfig::default(),
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn StorageDriver> {
        &self.storage
    }

    /// Open a new session for `user_id`.
    #[instrument(skip_all, fields(user_id = %user_id, size = meta.size))]
    pub async fn init(&self, user_id: &str, meta: UploadInit) -> UploadResult<InitReceipt> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(UploadError::validation("userId is required"));
        }

        let filename = meta.filename.trim();
        if filename.chars().count() > MAX_FILENAME_CHARS {
            return Err(UploadError::validation(format!(
                "filename exceeds {MAX_FILENAME_CHARS} characters"
            )));
        }
        if sanitize_filename(filename).is_none() {
            return Err(UploadError::validation("filename is required"));
        }

        if meta.size == 0 {
            return Err(UploadError::validation("size must be greater than zero"));
        }
        if meta.size > self.config.max_upload_bytes {
            return Err(UploadError::validation(format!(
                "size {} exceeds maximum {}",
                meta.size, self.config.max_upload_bytes
            )));
        }
        if self.config.chunk_size == 0 {
            return Err(UploadError::internal("chunk size is not configured"));
        }

        let chunks = total_chunks(meta.size, self.config.chunk_size);
        if chunks > self.config.max_chunks {
            return Err(UploadError::validation(format!(
                "upload needs {chunks} chunks, maximum is {}",
                self.config.max_chunks
            )));
        }

        let mime = normalize_mime(meta.mime.as_deref(), &self.config.allowed_mime_types)?;

        let session = UploadSession::new(
            UploadId::new(),
            user_id.to_string(),
            filename.to_string(),
            mime,
            meta.size,
            self.config.chunk_size,
            self.clock.now(),
        );
        let created = self.sessions.create(session, self.config.session_ttl).await?;

        info!(
            upload_id = %created.upload_id,
            total_chunks = created.total_chunks,
            "upload initialized"
        );

        Ok(InitReceipt {
            upload_id: created.upload_id,
            chunk_size: created.chunk_size,
            total_chunks: created.total_chunks,
            expires_at: created.expires_at,
        })
    }

    /// Accept chunk `index`. Re-sending a chunk that was already recorded is a no-op.
    #[instrument(skip_all, fields(upload_id = %upload_id, index = index, len = data.len()))]
    pub async fn write_chunk(
        &self,
        upload_id: &UploadId,
        index: u32,
        data: Bytes,
    ) -> UploadResult<ChunkReceipt> {
        check_id(upload_id)?;
        with_lock(
            self.locks.as_ref(),
            upload_id.as_str(),
            self.config.lock_lease,
            || self.write_chunk_locked(upload_id, index, data),
        )
        .await
    }

    async fn write_chunk_locked(
        &self,
        upload_id: &UploadId,
        index: u32,
        data: Bytes,
    ) -> UploadResult<ChunkReceipt> {
        let session = self.load_live(upload_id).await?;
        if !session.state.accepts_chunks() {
            return Err(invalid_state(&session, "write chunks"));
        }

        let expected = session.expected_chunk_len(index).ok_or_else(|| {
            UploadError::validation(format!(
                "chunk index {index} out of range [0, {})",
                session.total_chunks
            ))
        })?;
        if data.len() as u64 != expected {
            return Err(UploadError::validation(format!(
                "chunk {index} must be {expected} bytes, got {}",
                data.len()
            )));
        }

        let key = self.keys.chunk_key(upload_id, index);
        let stored = self.storage.exists(&key).await?;

        if stored && session.received_indexes.contains(&index) {
            debug!("chunk already recorded");
            return Ok(chunk_receipt(&session, index));
        }

        if stored {
            debug!("chunk artifact present, skipping write");
        } else {
            self.storage.ensure_dir(&self.keys.session_dir(upload_id)).await?;
            self.storage
                .upload_file(UploadSource::Bytes(data), &key, None)
                .await?;
        }

        let expires_at = deadline(self.clock.now(), self.config.session_ttl);
        let updated = self
            .patch_with_retry(upload_id, session, |current| {
                if !current.state.accepts_chunks() {
                    return Err(invalid_state(current, "write chunks"));
                }
                let mut indexes = current.received_indexes.clone();
                indexes.insert(index);
                Ok(SessionPatch::new()
                    .with_index(index)
                    .with_received_bytes(current.bytes_for(&indexes))
                    .with_state(UploadState::Receiving)
                    .with_expires_at(expires_at))
            })
            .await?;

        Ok(chunk_receipt(&updated, index))
    }

    /// Snapshot plus progress. Expired sessions read as not found.
    pub async fn get_status(&self, upload_id: &UploadId) -> UploadResult<UploadStatusView> {
        check_id(upload_id)?;
        Ok(self.load_live(upload_id).await?.into())
    }

    /// Assemble, verify, publish and register the upload.
    ///
    /// Calling this again on a completed session returns the same receipt.
    /// The lock lease is renewed as each chunk is read, so a long assembly
    /// keeps other callers out.
    #[instrument(skip_all, fields(upload_id = %upload_id))]
    pub async fn finish(
        &self,
        upload_id: &UploadId,
        options: FinishOptions,
    ) -> UploadResult<FinishReceipt> {
        check_id(upload_id)?;
        let lease = self.config.lock_lease;
        let guard = LockGuard::acquire(self.locks.as_ref(), upload_id.as_str(), lease).await?;
        let renewal = LeaseRenewal::new(Arc::clone(&self.locks), &guard, lease);
        self.finish_locked(upload_id, options, renewal).await
    }

    async fn finish_locked(
        &self,
        upload_id: &UploadId,
        options: FinishOptions,
        renewal: LeaseRenewal,
    ) -> UploadResult<FinishReceipt> {
        let session = self.load_live(upload_id).await?;

        match session.state {
            UploadState::Completed => {
                debug!("replaying completed upload");
                return session
                    .result
                    .ok_or_else(|| UploadError::internal("completed session has no result"));
            }
            UploadState::Initialized | UploadState::Receiving | UploadState::Finalizing => {}
            UploadState::Aborted | UploadState::Expired => {
                return Err(invalid_state(&session, "finish"));
            }
        }

        if !session.is_complete() {
            return Err(UploadError::conflict(
                ConflictReason::IncompleteChunks,
                format!(
                    "{} of {} chunks received, missing {:?}",
                    session.received_indexes.len(),
                    session.total_chunks,
                    session.missing_indexes(MISSING_LIST_LIMIT)
                ),
            ));
        }

        let subdir = match options.subdir.as_deref() {
            Some(subdir) => validate_subdir(subdir, &self.config.temp_dir)?,
            None => self.config.default_subdir.clone(),
        };
        let expected_sha256 = options.sha256.as_deref().map(normalize_sha256).transpose()?;

        // the first attempt fixes the permanent path, retries publish over it
        let session = self.sessions.touch(upload_id, self.config.session_ttl).await?;
        let planned = self.keys.final_key(&subdir, &session);
        let session = self
            .patch_with_retry(upload_id, session, |current| match current.state {
                UploadState::Receiving | UploadState::Finalizing => {
                    let patch = SessionPatch::new().with_state(UploadState::Finalizing);
                    Ok(match current.final_path {
                        Some(_) => patch,
                        None => patch.with_final_path(planned.clone()),
                    })
                }
                _ => Err(invalid_state(current, "finish")),
            })
            .await?;
        let final_key = session
            .final_path
            .clone()
            .ok_or_else(|| UploadError::internal("final path was not recorded"))?;
        if final_key != planned {
            debug!(path = %final_key, "reusing path from an earlier attempt");
        }

        let published = self
            .publish(&session, &final_key, expected_sha256.as_deref(), &renewal)
            .await;
        let receipt = match published {
            Ok(receipt) => receipt,
            Err(e) => {
                if let Err(lost) = renewal.renew().await {
                    warn!(
                        error = %e,
                        lease = %lost,
                        "finish failed after losing the lock, leaving the session alone"
                    );
                    return Err(e);
                }
                warn!(error = %e, "finish failed, session back to RECEIVING");
                if let Err(cleanup) = self.storage.delete(&self.keys.assembly_key(upload_id)).await {
                    warn!(error = %cleanup, "failed to delete assembly artifact");
                }
                self.revert_to_receiving(upload_id, session).await;
                return Err(e);
            }
        };

        let retain_until = deadline(self.clock.now(), self.config.completed_retention);
        let completed = self
            .patch_with_retry(upload_id, session, |_| {
                Ok(SessionPatch::new()
                    .with_state(UploadState::Completed)
                    .with_result(receipt.clone())
                    .with_expires_at(retain_until))
            })
            .await?;

        self.remove_temp_artifacts(&completed).await;
        info!(path = %receipt.path, media_id = %receipt.id, "upload completed");
        Ok(receipt)
    }

    /// Concatenate the chunks, check size and digest, move the result to
    /// `final_key` and register it.
    async fn publish(
        &self,
        session: &UploadSession,
        final_key: &str,
        expected_sha256: Option<&str>,
        renewal: &LeaseRenewal,
    ) -> UploadResult<FinishReceipt> {
        let assembly_key = self.keys.assembly_key(&session.upload_id);
        let hasher = Arc::new(Mutex::new(Sha256::new()));
        let chunks = self.chunk_stream(session, Arc::clone(&hasher), renewal.clone());

        let written = self
            .storage
            .upload_file(
                UploadSource::stream(chunks, Some(session.size)),
                &assembly_key,
                None,
            )
            .await?;

        if written != session.size {
            return Err(UploadError::storage(format!(
                "assembled {written} bytes, expected {}",
                session.size
            )));
        }

        let digest = hex::encode(std::mem::take(&mut *hasher.lock()).finalize());
        if let Some(expected) = expected_sha256 {
            if expected != digest {
                return Err(UploadError::conflict(
                    ConflictReason::ChecksumMismatch,
                    format!("checksum mismatch: expected {expected}, got {digest}"),
                ));
            }
        }

        renewal.renew().await?;
        if let Some((dir, _)) = final_key.rsplit_once('/') {
            self.storage.ensure_dir(dir).await?;
        }
        self.storage.rename(&assembly_key, final_key).await?;

        let url = self.config.public_url(final_key);
        let registered = self
            .registrar
            .create_file(NewMediaFile {
                user_id: session.user_id.clone(),
                filename: session.filename.clone(),
                mime: session.mime.clone(),
                size: session.size,
                path: final_key.to_string(),
                url: url.clone(),
                status: MediaStatus::Uploaded,
            })
            .await
            .inspect_err(|e| warn!(path = %final_key, error = %e, "media registration failed, artifact kept"))?;

        Ok(FinishReceipt {
            url,
            path: final_key.to_string(),
            id: registered.id,
            mime: session.mime.clone(),
            size: session.size,
        })
    }

    /// Chunk artifacts in index order, hashed on the way through. The lease
    /// is renewed before each chunk; losing it ends the stream with an error.
    fn chunk_stream(
        &self,
        session: &UploadSession,
        hasher: Arc<Mutex<Sha256>>,
        renewal: LeaseRenewal,
    ) -> ByteStream {
        let storage = Arc::clone(&self.storage);
        let keys: Vec<String> = (0..session.total_chunks)
            .map(|index| self.keys.chunk_key(&session.upload_id, index))
            .collect();

        Box::pin(async_stream::stream! {
            for key in keys {
                if let Err(e) = renewal.renew().await {
                    yield Err(std::io::Error::other(e.to_string()));
                    return;
                }
                let mut part = match storage.read(&key).await {
                    Ok(part) => part,
                    Err(e) => {
                        yield Err(std::io::Error::other(format!("failed to read {key}: {e}")));
                        return;
                    }
                };
                while let Some(piece) = part.next().await {
                    match piece {
                        Ok(bytes) => {
                            hasher.lock().update(&bytes);
                            yield Ok(bytes);
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }
        })
    }

    async fn revert_to_receiving(&self, upload_id: &UploadId, session: UploadSession) {
        let reverted = self
            .patch_with_retry(upload_id, session, |current| {
                if current.state != UploadState::Finalizing {
                    return Err(invalid_state(current, "revert"));
                }
                Ok(SessionPatch::new().with_state(UploadState::Receiving))
            })
            .await;
        if let Err(e) = reverted {
            warn!(error = %e, "could not revert session to RECEIVING");
        }
    }

    /// Drop every chunk artifact and the session record. Unknown ids succeed.
    #[instrument(skip_all, fields(upload_id = %upload_id))]
    pub async fn abort(&self, upload_id: &UploadId) -> UploadResult<AbortReceipt> {
        check_id(upload_id)?;
        with_lock(
            self.locks.as_ref(),
            upload_id.as_str(),
            self.config.lock_lease,
            || self.abort_locked(upload_id),
        )
        .await
    }

    async fn abort_locked(&self, upload_id: &UploadId) -> UploadResult<AbortReceipt> {
        let receipt = AbortReceipt {
            aborted: true,
            upload_id: upload_id.clone(),
        };

        let Some(session) = self.sessions.get(upload_id).await? else {
            if let Err(e) = self.storage.remove_dir(&self.keys.session_dir(upload_id)).await {
                warn!(error = %e, "failed to clean orphaned session directory");
            }
            debug!("abort on unknown upload");
            return Ok(receipt);
        };

        if session.state == UploadState::Completed {
            return Err(invalid_state(&session, "abort"));
        }

        self.retire(session, UploadState::Aborted).await?;
        info!("upload aborted");
        Ok(receipt)
    }

    /// Expire lapsed sessions and purge completed records past retention.
    pub async fn reap_expired(&self) -> UploadResult<ReapReport> {
        let now = self.clock.now();
        let mut report = ReapReport::default();

        for candidate in self.sessions.expired(now).await? {
            let upload_id = candidate.upload_id.clone();
            let outcome = with_lock(
                self.locks.as_ref(),
                upload_id.as_str(),
                self.config.lock_lease,
                || self.reap_one(&upload_id, now),
            )
            .await;

            match outcome {
                Ok(Some(UploadState::Completed)) => report.purged += 1,
                Ok(Some(_)) => report.expired += 1,
                Ok(None) => {}
                Err(e) if e.conflict_reason() == Some(ConflictReason::LockBusy) => {
                    debug!(upload_id = %upload_id, "session busy, skipping");
                    report.skipped += 1;
                }
                Err(e) => warn!(upload_id = %upload_id, error = %e, "failed to reap session"),
            }
        }

        if report != ReapReport::default() {
            info!(
                expired = report.expired,
                purged = report.purged,
                skipped = report.skipped,
                "reaped upload sessions"
            );
        }
        Ok(report)
    }

    /// Returns the state the session was in when reaped, `None` if it was
    /// gone or had been extended in the meantime.
    async fn reap_one(
        &self,
        upload_id: &UploadId,
        now: DateTime<Utc>,
    ) -> UploadResult<Option<UploadState>> {
        let Some(session) = self.sessions.get(upload_id).await? else {
            return Ok(None);
        };
        if session.expires_at >= now {
            return Ok(None);
        }

        let state = session.state;
        if state == UploadState::Completed {
            self.sessions.delete(upload_id).await?;
        } else {
            self.retire(session, UploadState::Expired).await?;
        }
        Ok(Some(state))
    }

    /// Mark `terminal`, delete every artifact including a final file left by
    /// a failed finish, then delete the record.
    async fn retire(&self, session: UploadSession, terminal: UploadState) -> UploadResult<()> {
        let upload_id = session.upload_id.clone();
        let marked = self
            .patch_with_retry(&upload_id, session.clone(), |current| {
                if !current.state.can_transition_to(terminal) {
                    return Err(invalid_state(current, terminal.as_str()));
                }
                Ok(SessionPatch::new().with_state(terminal))
            })
            .await;
        if let Err(e) = &marked {
            debug!(upload_id = %upload_id, error = %e, "could not mark session {terminal}");
        }

        self.remove_temp_artifacts(&session).await;
        if let Some(path) = &session.final_path {
            if let Err(e) = self.storage.delete(path).await {
                warn!(
                    upload_id = %upload_id,
                    path = %path,
                    error = %e,
                    "failed to delete unregistered final artifact"
                );
            }
        }
        self.sessions.delete(&upload_id).await
    }

    /// Best-effort removal of chunk artifacts, the assembly file and the
    /// session directory.
    async fn remove_temp_artifacts(&self, session: &UploadSession) {
        let upload_id = &session.upload_id;
        for index in 0..session.total_chunks {
            let key = self.keys.chunk_key(upload_id, index);
            if let Err(e) = self.storage.delete(&key).await {
                warn!(upload_id = %upload_id, key = %key, error = %e, "failed to delete chunk artifact");
            }
        }
        if let Err(e) = self.storage.delete(&self.keys.assembly_key(upload_id)).await {
            warn!(upload_id = %upload_id, error = %e, "failed to delete assembly artifact");
        }
        if let Err(e) = self.storage.remove_dir(&self.keys.session_dir(upload_id)).await {
            warn!(upload_id = %upload_id, error = %e, "failed to remove session directory");
        }
    }

    async fn load_live(&self, upload_id: &UploadId) -> UploadResult<UploadSession> {
        let session = self
            .sessions
            .get(upload_id)
            .await?
            .ok_or_else(|| UploadError::not_found(upload_id.as_str()))?;
        if session.is_expired_at(self.clock.now()) {
            return Err(UploadError::not_found(upload_id.as_str()));
        }
        Ok(session)
    }

    /// Optimistic read-modify-write. `build` sees the latest snapshot on every
    /// attempt; after `cas_retries` lost races the caller gets a `Conflict`.
    async fn patch_with_retry<F>(
        &self,
        upload_id: &UploadId,
        mut current: UploadSession,
        build: F,
    ) -> UploadResult<UploadSession>
    where
        F: Fn(&UploadSession) -> UploadResult<SessionPatch>,
    {
        for attempt in 1..=self.config.cas_retries {
            let patch = build(&current)?;
            if self
                .sessions
                .patch_cas(upload_id, current.version, patch.clone())
                .await?
            {
                patch.merge_into(&mut current);
                return Ok(current);
            }

            debug!(upload_id = %upload_id, attempt, "version conflict, reloading session");
            current = self
                .sessions
                .get(upload_id)
                .await?
                .ok_or_else(|| UploadError::not_found(upload_id.as_str()))?;
        }

        Err(UploadError::conflict(
            ConflictReason::VersionConflict,
            format!(
                "session {upload_id} changed concurrently {} times",
                self.config.cas_retries
            ),
        ))
    }
}

fn check_id(upload_id: &UploadId) -> UploadResult<()> {
    if upload_id.is_well_formed() {
        Ok(())
    } else {
        Err(UploadError::validation(format!("malformed uploadId: {upload_id}")))
    }
}

fn invalid_state(session: &UploadSession, action: &str) -> UploadError {
    UploadError::conflict(
        ConflictReason::InvalidState,
        format!("cannot {action} while upload is {}", session.state),
    )
}

fn chunk_receipt(session: &UploadSession, index: u32) -> ChunkReceipt {
    ChunkReceipt {
        received_bytes: session.received_bytes,
        percent: session.percent(),
        received_index: index,
    }
}

/// `type/subtype`, lowercased; must be in `allowed` when that is non-empty.
fn normalize_mime(mime: Option<&str>, allowed: &[String]) -> UploadResult<Option<String>> {
    let Some(mime) = mime.map(str::trim).filter(|m| !m.is_empty()) else {
        return Ok(None);
    };
    let mime = mime.to_ascii_lowercase();

    let well_formed = mime.split_once('/').map_or(false, |(kind, sub)| {
        let token = |s: &str| {
            !s.is_empty()
                && s.chars()
                    .all(|c| c.is_ascii_alphanumeric() || "!#$&^_.+-".contains(c))
        };
        token(kind) && token(sub)
    });
    if !well_formed {
        return Err(UploadError::validation(format!("invalid mime type: {mime}")));
    }
    if !allowed.is_empty() && !allowed.iter().any(|a| a == &mime) {
        return Err(UploadError::validation(format!("mime type not allowed: {mime}")));
    }
    Ok(Some(mime))
}

fn normalize_sha256(digest: &str) -> UploadResult<String> {
    let digest = digest.trim().to_ascii_lowercase();
    if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(UploadError::validation("sha256 must be 64 hex characters"));
    }
    Ok(digest)
}
