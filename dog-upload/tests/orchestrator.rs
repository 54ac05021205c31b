use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};

use dog_upload::{
    ByteStream, ConflictReason, ErrorKind, FileSessionStore, FinishOptions, LocalStorageDriver,
    LockCoordinator, ManualClock, MemoryLockCoordinator, MemoryMediaRegistrar, MemorySessionStore,
    MemoryStorageDriver, ProgressFn, StorageDriver, UploadConfig, UploadId, UploadInit,
    UploadOrchestrator, UploadResult, UploadSource, UploadState,
};

const CHUNK: u64 = 8;

struct Harness {
    uploads: UploadOrchestrator,
    storage: MemoryStorageDriver,
    registrar: MemoryMediaRegistrar,
    locks: MemoryLockCoordinator,
    clock: ManualClock,
}

/// Test factory functions
fn create_harness() -> Harness {
    create_harness_with(test_config())
}

fn test_config() -> UploadConfig {
    UploadConfig::new()
        .with_chunk_size(CHUNK)
        .with_session_ttl(Duration::from_secs(60))
        .with_completed_retention(Duration::from_secs(300))
}

fn create_harness_with(config: UploadConfig) -> Harness {
    let storage = MemoryStorageDriver::new();
    let registrar = MemoryMediaRegistrar::new();
    let clock = ManualClock::default();
    let locks = MemoryLockCoordinator::with_clock(Arc::new(clock.clone()));
    let sessions = MemorySessionStore::with_clock(Arc::new(clock.clone()));

    let uploads = UploadOrchestrator::builder(storage.clone(), registrar.clone())
        .with_sessions(sessions)
        .with_locks(locks.clone())
        .with_clock(clock.clone())
        .with_config(config)
        .build();

    Harness {
        uploads,
        storage,
        registrar,
        locks,
        clock,
    }
}

/// Deterministic payload: byte `i` is `i % 251`
fn payload(size: u64) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

fn chunk_of(data: &[u8], index: u32) -> Bytes {
    let start = index as usize * CHUNK as usize;
    let end = (start + CHUNK as usize).min(data.len());
    Bytes::copy_from_slice(&data[start..end])
}

async fn start_upload(h: &Harness, size: u64) -> UploadId {
    h.uploads
        .init("user-1", UploadInit::new("a.zip", size).with_mime("application/zip"))
        .await
        .unwrap()
        .upload_id
}

async fn upload_all(h: &Harness, id: &UploadId, data: &[u8]) {
    let chunks = (data.len() as u64).div_ceil(CHUNK) as u32;
    for index in 0..chunks {
        h.uploads.write_chunk(id, index, chunk_of(data, index)).await.unwrap();
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// A1. Out-of-order chunks assemble into one contiguous artifact
#[tokio::test]
async fn test_out_of_order_upload_completes() {
    let h = create_harness();
    let data = payload(3 * CHUNK);

    // Arrange
    let init = h
        .uploads
        .init("user-1", UploadInit::new("a.zip", 3 * CHUNK))
        .await
        .unwrap();
    assert_eq!(init.total_chunks, 3);
    assert_eq!(init.chunk_size, CHUNK);

    // Act: 2, 0, 1
    for index in [2, 0, 1] {
        h.uploads
            .write_chunk(&init.upload_id, index, chunk_of(&data, index))
            .await
            .unwrap();
    }
    let status = h.uploads.get_status(&init.upload_id).await.unwrap();
    let receipt = h
        .uploads
        .finish(&init.upload_id, FinishOptions::new())
        .await
        .unwrap();

    // Assert
    assert_eq!(status.percent, 100);
    assert_eq!(status.session.state, UploadState::Receiving);
    assert_eq!(receipt.size, 3 * CHUNK);
    assert!(receipt.path.starts_with("uploads/"));
    assert!(receipt.path.ends_with(&format!("{}-a.zip", init.upload_id)));
    assert_eq!(receipt.url, format!("/files/{}", receipt.path));
    assert_eq!(h.storage.contents(&receipt.path).unwrap(), Bytes::from(data));

    // chunks are gone, only the final artifact remains
    assert!(h.storage.keys_with_prefix("__uploads/").is_empty());
    assert_eq!(h.storage.len(), 1);

    let registered = h.registrar.get_by_path(&receipt.path).unwrap();
    assert_eq!(registered.id, receipt.id);
    assert_eq!(registered.file.user_id, "user-1");
    assert_eq!(registered.file.size, 3 * CHUNK);

    let completed = h.uploads.get_status(&init.upload_id).await.unwrap();
    assert_eq!(completed.session.state, UploadState::Completed);
    assert_eq!(completed.session.result, Some(receipt));
}

/// A2. The final chunk may be shorter than the chunk size
#[tokio::test]
async fn test_short_final_chunk() {
    let h = create_harness();
    let data = payload(2 * CHUNK + 3);
    let id = start_upload(&h, data.len() as u64).await;

    upload_all(&h, &id, &data).await;
    let receipt = h.uploads.finish(&id, FinishOptions::new()).await.unwrap();

    assert_eq!(receipt.size, 2 * CHUNK + 3);
    assert_eq!(receipt.mime.as_deref(), Some("application/zip"));
    assert_eq!(h.storage.contents(&receipt.path).unwrap().len(), data.len());
}

/// A3. Re-sending a chunk does not double count
#[tokio::test]
async fn test_duplicate_chunk_is_idempotent() {
    let h = create_harness();
    let data = payload(3 * CHUNK);
    let id = start_upload(&h, 3 * CHUNK).await;

    let first = h.uploads.write_chunk(&id, 0, chunk_of(&data, 0)).await.unwrap();
    let before = h.uploads.get_status(&id).await.unwrap();
    let second = h.uploads.write_chunk(&id, 0, chunk_of(&data, 0)).await.unwrap();
    let after = h.uploads.get_status(&id).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second.received_bytes, CHUNK);
    assert_eq!(second.percent, 33);
    assert_eq!(after.session.received_indexes.len(), 1);
    assert_eq!(after.session.version, before.session.version);
}

/// A4. Finishing before every chunk arrived is a retryable conflict
#[tokio::test]
async fn test_early_finish_conflicts() {
    let h = create_harness();
    let data = payload(2 * CHUNK);
    let id = start_upload(&h, 2 * CHUNK).await;

    // nothing uploaded yet
    let err = h.uploads.finish(&id, FinishOptions::new()).await.unwrap_err();
    assert_eq!(err.conflict_reason(), Some(ConflictReason::IncompleteChunks));

    h.uploads.write_chunk(&id, 1, chunk_of(&data, 1)).await.unwrap();
    let err = h.uploads.finish(&id, FinishOptions::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.conflict_reason(), Some(ConflictReason::IncompleteChunks));
    assert!(err.is_retryable());
    assert!(err.message().contains("[0]"));

    let status = h.uploads.get_status(&id).await.unwrap();
    assert_eq!(status.session.state, UploadState::Receiving);
}

/// A5. Abort leaves zero artifacts and is idempotent
#[tokio::test]
async fn test_abort_removes_every_artifact() {
    let h = create_harness();
    let data = payload(3 * CHUNK);
    let id = start_upload(&h, 3 * CHUNK).await;
    h.uploads.write_chunk(&id, 0, chunk_of(&data, 0)).await.unwrap();
    h.uploads.write_chunk(&id, 2, chunk_of(&data, 2)).await.unwrap();

    let first = h.uploads.abort(&id).await.unwrap();
    let second = h.uploads.abort(&id).await.unwrap();

    assert!(first.aborted);
    assert!(second.aborted);
    assert_eq!(first.upload_id, id);
    assert!(h.storage.keys_with_prefix(&format!("__uploads/{id}")).is_empty());
    assert!(!h.storage.has_dir(&format!("__uploads/{id}")));

    let err = h.uploads.get_status(&id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

/// A5b. A final file published by a finish whose registration failed is
/// removed by abort
#[tokio::test]
async fn test_abort_after_failed_registration_removes_final_file() {
    let h = create_harness();
    let data = payload(2 * CHUNK);
    let id = start_upload(&h, 2 * CHUNK).await;
    upload_all(&h, &id, &data).await;

    h.registrar.fail_next(1);
    h.uploads.finish(&id, FinishOptions::new()).await.unwrap_err();
    let published = h.uploads.get_status(&id).await.unwrap().session.final_path.unwrap();
    assert!(h.storage.contents(&published).is_some());

    h.uploads.abort(&id).await.unwrap();

    assert!(h.storage.is_empty(), "left behind: {:?}", h.storage.keys_with_prefix(""));
    assert!(h.registrar.files().is_empty());
}

/// A6. Aborting an id that never existed succeeds
#[tokio::test]
async fn test_abort_unknown_upload() {
    let h = create_harness();
    let receipt = h.uploads.abort(&UploadId::from("upl_never_created")).await.unwrap();
    assert!(receipt.aborted);
}

/// A7. Completed uploads belong to the registrar and cannot be aborted
#[tokio::test]
async fn test_abort_after_completion_conflicts() {
    let h = create_harness();
    let data = payload(CHUNK);
    let id = start_upload(&h, CHUNK).await;
    upload_all(&h, &id, &data).await;
    let receipt = h.uploads.finish(&id, FinishOptions::new()).await.unwrap();

    let err = h.uploads.abort(&id).await.unwrap_err();

    assert_eq!(err.conflict_reason(), Some(ConflictReason::InvalidState));
    assert!(h.storage.contents(&receipt.path).is_some());
}

/// A8. finish on a completed session replays the receipt
#[tokio::test]
async fn test_finish_is_replayed_after_completion() {
    let h = create_harness();
    let data = payload(2 * CHUNK);
    let id = start_upload(&h, 2 * CHUNK).await;
    upload_all(&h, &id, &data).await;

    let first = h.uploads.finish(&id, FinishOptions::new()).await.unwrap();
    let replay = h.uploads.finish(&id, FinishOptions::new()).await.unwrap();

    assert_eq!(first, replay);
    assert_eq!(h.registrar.files().len(), 1);
}

/// B1. Sessions past their TTL read as missing
#[tokio::test]
async fn test_lazy_expiry() {
    let h = create_harness();
    let data = payload(2 * CHUNK);
    let id = start_upload(&h, 2 * CHUNK).await;

    h.clock.advance(Duration::from_secs(61));

    let err = h.uploads.get_status(&id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = h.uploads.write_chunk(&id, 0, chunk_of(&data, 0)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = h.uploads.finish(&id, FinishOptions::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

/// B2. Every accepted chunk slides the TTL window forward
#[tokio::test]
async fn test_chunks_extend_ttl() {
    let h = create_harness();
    let data = payload(2 * CHUNK);
    let id = start_upload(&h, 2 * CHUNK).await;

    h.clock.advance(Duration::from_secs(50));
    h.uploads.write_chunk(&id, 0, chunk_of(&data, 0)).await.unwrap();
    h.clock.advance(Duration::from_secs(50));

    let status = h.uploads.get_status(&id).await.unwrap();
    assert_eq!(status.session.received_indexes.len(), 1);
}

/// C1. A registrar failure keeps the artifact and lets finish be retried
#[tokio::test]
async fn test_registrar_failure_is_recoverable() {
    let h = create_harness();
    let data = payload(2 * CHUNK);
    let id = start_upload(&h, 2 * CHUNK).await;
    upload_all(&h, &id, &data).await;

    // Arrange: the registrar is down for one call
    h.registrar.fail_next(1);

    // Act
    let err = h.uploads.finish(&id, FinishOptions::new()).await.unwrap_err();

    // Assert: nothing was marked complete, nothing was lost
    assert_eq!(err.kind(), ErrorKind::Registrar);
    assert_eq!(err.kind().status_code(), 502);
    let status = h.uploads.get_status(&id).await.unwrap();
    assert_eq!(status.session.state, UploadState::Receiving);
    assert_eq!(h.storage.keys_with_prefix("uploads/").len(), 1);
    assert_eq!(h.storage.keys_with_prefix(&format!("__uploads/{id}/")).len(), 2);

    let receipt = h.uploads.finish(&id, FinishOptions::new()).await.unwrap();
    assert_eq!(h.storage.contents(&receipt.path).unwrap(), Bytes::from(data));
    assert_eq!(h.registrar.files().len(), 1);
    assert!(h.storage.keys_with_prefix("__uploads/").is_empty());
}

/// C2. A failed rename sends the session back to RECEIVING
#[tokio::test]
async fn test_storage_failure_during_finish_is_recoverable() {
    let h = create_harness();
    let data = payload(2 * CHUNK);
    let id = start_upload(&h, 2 * CHUNK).await;
    upload_all(&h, &id, &data).await;

    h.storage.fail_renames(true);
    let err = h.uploads.finish(&id, FinishOptions::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);

    let status = h.uploads.get_status(&id).await.unwrap();
    assert_eq!(status.session.state, UploadState::Receiving);
    assert!(h.storage.contents(&format!("__uploads/{id}/assembled.tmp")).is_none());
    assert!(h.registrar.files().is_empty());

    h.storage.fail_renames(false);
    h.uploads.finish(&id, FinishOptions::new()).await.unwrap();
}

/// C3. A wrong digest is a conflict; the right one succeeds
#[tokio::test]
async fn test_checksum_verification() {
    let h = create_harness();
    let data = payload(3 * CHUNK);
    let id = start_upload(&h, 3 * CHUNK).await;
    upload_all(&h, &id, &data).await;

    let err = h
        .uploads
        .finish(&id, FinishOptions::new().with_sha256("0".repeat(64)))
        .await
        .unwrap_err();
    assert_eq!(err.conflict_reason(), Some(ConflictReason::ChecksumMismatch));
    assert_eq!(
        h.uploads.get_status(&id).await.unwrap().session.state,
        UploadState::Receiving
    );
    assert!(h.storage.keys_with_prefix("uploads/").is_empty());

    let receipt = h
        .uploads
        .finish(
            &id,
            FinishOptions::new()
                .with_sha256(sha256_hex(&data).to_uppercase())
                .with_subdir("media/archives"),
        )
        .await
        .unwrap();
    assert!(receipt.path.starts_with("media/archives/"));
}

/// D1. Malformed requests are validation errors
#[tokio::test]
async fn test_validation_errors() {
    let h = create_harness_with(
        test_config()
            .with_max_upload_bytes(10 * CHUNK)
            .allow_mime_type("application/zip"),
    );

    let cases = [
        ("", UploadInit::new("a.zip", 1)),
        ("user-1", UploadInit::new("a.zip", 0)),
        ("user-1", UploadInit::new("   ", 1)),
        ("user-1", UploadInit::new("a.zip", 10 * CHUNK + 1)),
        ("user-1", UploadInit::new("a.zip", 1).with_mime("not a mime")),
        ("user-1", UploadInit::new("a.gif", 1).with_mime("image/gif")),
    ];
    for (user, meta) in cases {
        let err = h.uploads.init(user, meta.clone()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "{meta:?} should be rejected");
        assert!(!err.is_retryable());
    }

    let data = payload(2 * CHUNK);
    let id = start_upload(&h, 2 * CHUNK).await;

    // wrong length for a full chunk
    let err = h.uploads.write_chunk(&id, 0, Bytes::from_static(b"abc")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    // out of range
    let err = h.uploads.write_chunk(&id, 2, chunk_of(&data, 1)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    // empty body
    let err = h.uploads.write_chunk(&id, 1, Bytes::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    upload_all(&h, &id, &data).await;
    let err = h
        .uploads
        .finish(&id, FinishOptions::new().with_subdir("../etc"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = h
        .uploads
        .finish(&id, FinishOptions::new().with_sha256("abc"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = h.uploads.get_status(&UploadId::from("../../etc")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

/// C4. A retried finish publishes to the path chosen by the first attempt
#[tokio::test]
async fn test_retried_finish_keeps_its_first_path() {
    let h = create_harness();
    let data = payload(2 * CHUNK);
    let id = start_upload(&h, 2 * CHUNK).await;
    upload_all(&h, &id, &data).await;

    h.registrar.fail_next(1);
    h.uploads
        .finish(&id, FinishOptions::new().with_subdir("a"))
        .await
        .unwrap_err();
    let receipt = h
        .uploads
        .finish(&id, FinishOptions::new().with_subdir("b"))
        .await
        .unwrap();

    assert!(receipt.path.starts_with("a/"), "{}", receipt.path);
    assert!(h.storage.keys_with_prefix("b/").is_empty());
    assert_eq!(h.storage.len(), 1);
    assert_eq!(h.storage.contents(&receipt.path).unwrap(), Bytes::from(data));
    assert_eq!(h.registrar.files().len(), 1);
}

/// C5. The temp directory is not a valid destination
#[tokio::test]
async fn test_finish_into_temp_dir_is_rejected() {
    let h = create_harness();
    let data = payload(CHUNK);
    let other = start_upload(&h, CHUNK).await;
    let id = start_upload(&h, CHUNK).await;
    upload_all(&h, &id, &data).await;

    let err = h
        .uploads
        .finish(&id, FinishOptions::new().with_subdir(format!("__uploads/{other}")))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(h.uploads.get_status(&id).await.unwrap().session.state, UploadState::Receiving);

    let receipt = h.uploads.finish(&id, FinishOptions::new()).await.unwrap();
    h.uploads.abort(&other).await.unwrap();
    assert!(h.storage.contents(&receipt.path).is_some());
}

/// D2. Unknown ids are not found
#[tokio::test]
async fn test_unknown_upload_is_not_found() {
    let h = create_harness();
    let id = UploadId::new();

    assert_eq!(h.uploads.get_status(&id).await.unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(
        h.uploads.write_chunk(&id, 0, Bytes::from_static(b"x")).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

/// E1. A held session lock fails fast with a retryable conflict
#[tokio::test]
async fn test_lock_busy_fails_fast() {
    let h = create_harness();
    let data = payload(CHUNK);
    let id = start_upload(&h, CHUNK).await;

    let token = h.locks.try_acquire(id.as_str(), Duration::from_secs(30)).await.unwrap();
    let err = h.uploads.write_chunk(&id, 0, chunk_of(&data, 0)).await.unwrap_err();
    assert_eq!(err.conflict_reason(), Some(ConflictReason::LockBusy));
    assert!(err.is_retryable());
    let err = h.uploads.abort(&id).await.unwrap_err();
    assert_eq!(err.conflict_reason(), Some(ConflictReason::LockBusy));

    h.locks.release(id.as_str(), &token);
    h.uploads.write_chunk(&id, 0, chunk_of(&data, 0)).await.unwrap();
}

/// Storage that advances the clock on every read, as a slow disk would, and
/// records whether the session lock was still held at each read.
struct SlowReads {
    inner: MemoryStorageDriver,
    clock: ManualClock,
    locks: MemoryLockCoordinator,
    step: Duration,
    held_at_reads: Arc<Mutex<Vec<bool>>>,
}

#[async_trait]
impl StorageDriver for SlowReads {
    fn name(&self) -> &'static str {
        "slow-reads"
    }

    async fn ensure_dir(&self, dir: &str) -> UploadResult<()> {
        self.inner.ensure_dir(dir).await
    }

    async fn upload_file(
        &self,
        source: UploadSource,
        path: &str,
        on_progress: Option<&ProgressFn>,
    ) -> UploadResult<u64> {
        self.inner.upload_file(source, path, on_progress).await
    }

    async fn exists(&self, path: &str) -> UploadResult<bool> {
        self.inner.exists(path).await
    }

    async fn rename(&self, from: &str, to: &str) -> UploadResult<()> {
        self.inner.rename(from, to).await
    }

    async fn delete(&self, path: &str) -> UploadResult<()> {
        self.inner.delete(path).await
    }

    async fn read(&self, path: &str) -> UploadResult<ByteStream> {
        self.clock.advance(self.step);
        if let Some(id) = path.strip_prefix("__uploads/").and_then(|rest| rest.split('/').next()) {
            self.held_at_reads.lock().unwrap().push(self.locks.is_held(id));
        }
        self.inner.read(path).await
    }

    async fn remove_dir(&self, dir: &str) -> UploadResult<()> {
        self.inner.remove_dir(dir).await
    }
}

/// E2. An assembly that outlasts the lease keeps the lock by renewing it
#[tokio::test]
async fn test_long_finish_renews_its_lease() {
    let lease = Duration::from_secs(30);
    let clock = ManualClock::default();
    let locks = MemoryLockCoordinator::with_clock(Arc::new(clock.clone()));
    let inner = MemoryStorageDriver::new();
    let held_at_reads = Arc::new(Mutex::new(Vec::new()));
    let storage = SlowReads {
        inner: inner.clone(),
        clock: clock.clone(),
        locks: locks.clone(),
        step: Duration::from_secs(25),
        held_at_reads: Arc::clone(&held_at_reads),
    };
    let uploads = UploadOrchestrator::builder(storage, MemoryMediaRegistrar::new())
        .with_sessions(MemorySessionStore::with_clock(Arc::new(clock.clone())))
        .with_locks(locks.clone())
        .with_clock(clock.clone())
        .with_config(
            test_config()
                .with_lock_lease(lease)
                .with_session_ttl(Duration::from_secs(3600)),
        )
        .build();

    let data = payload(3 * CHUNK);
    let id = uploads
        .init("user-1", UploadInit::new("a.zip", 3 * CHUNK))
        .await
        .unwrap()
        .upload_id;
    for index in 0..3 {
        uploads.write_chunk(&id, index, chunk_of(&data, index)).await.unwrap();
    }

    // three reads take 75s against a 30s lease
    let receipt = uploads.finish(&id, FinishOptions::new()).await.unwrap();

    assert_eq!(*held_at_reads.lock().unwrap(), vec![true, true, true]);
    assert_eq!(inner.contents(&receipt.path).unwrap(), Bytes::from(data));
    assert!(!locks.is_held(id.as_str()));
}

/// F1. The reaper reclaims expired uploads and purges old completions
#[tokio::test]
async fn test_reaper_reclaims_storage() {
    let h = create_harness();
    let data = payload(2 * CHUNK);

    let abandoned = start_upload(&h, 2 * CHUNK).await;
    h.uploads.write_chunk(&abandoned, 0, chunk_of(&data, 0)).await.unwrap();

    let finished = start_upload(&h, 2 * CHUNK).await;
    upload_all(&h, &finished, &data).await;
    let receipt = h.uploads.finish(&finished, FinishOptions::new()).await.unwrap();

    // abandoned upload expires first
    h.clock.advance(Duration::from_secs(61));
    let report = h.uploads.reap_expired().await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(report.purged, 0);
    assert!(h.storage.keys_with_prefix("__uploads/").is_empty());
    assert_eq!(h.uploads.get_status(&finished).await.unwrap().session.state, UploadState::Completed);

    // completed record goes after its retention window, the artifact stays
    h.clock.advance(Duration::from_secs(300));
    let report = h.uploads.reap_expired().await.unwrap();
    assert_eq!(report.purged, 1);
    assert_eq!(h.uploads.get_status(&finished).await.unwrap_err().kind(), ErrorKind::NotFound);
    assert!(h.storage.contents(&receipt.path).is_some());
}

/// F2. Busy sessions are left for the next pass
#[tokio::test]
async fn test_reaper_skips_busy_sessions() {
    let h = create_harness();
    let id = start_upload(&h, CHUNK).await;
    h.clock.advance(Duration::from_secs(61));

    let token = h.locks.try_acquire(id.as_str(), Duration::from_secs(3600)).await.unwrap();
    let report = h.uploads.reap_expired().await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.expired, 0);

    h.locks.release(id.as_str(), &token);
    let report = h.uploads.reap_expired().await.unwrap();
    assert_eq!(report.expired, 1);
}

/// F3. Expiry also removes a final file whose registration failed
#[tokio::test]
async fn test_reaper_removes_unregistered_final_file() {
    let h = create_harness();
    let data = payload(CHUNK);
    let id = start_upload(&h, CHUNK).await;
    upload_all(&h, &id, &data).await;

    h.registrar.fail_next(1);
    h.uploads.finish(&id, FinishOptions::new()).await.unwrap_err();
    assert_eq!(h.storage.keys_with_prefix("uploads/").len(), 1);

    h.clock.advance(Duration::from_secs(61));
    let report = h.uploads.reap_expired().await.unwrap();

    assert_eq!(report.expired, 1);
    assert!(h.storage.is_empty());
}

/// G1. Local disk and JSON session documents, end to end
#[tokio::test]
async fn test_filesystem_backends_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalStorageDriver::new(dir.path().join("files")).await.unwrap();
    let sessions = FileSessionStore::new(dir.path().join("sessions")).await.unwrap();
    let uploads = UploadOrchestrator::builder(storage, MemoryMediaRegistrar::new())
        .with_sessions(sessions)
        .with_config(UploadConfig::new().with_chunk_size(CHUNK))
        .build();

    let data = payload(3 * CHUNK - 1);
    let init = uploads
        .init("user-1", UploadInit::new("report.pdf", data.len() as u64))
        .await
        .unwrap();
    for index in [1, 2, 0] {
        uploads
            .write_chunk(&init.upload_id, index, chunk_of(&data, index))
            .await
            .unwrap();
    }
    let receipt = uploads
        .finish(&init.upload_id, FinishOptions::new().with_sha256(sha256_hex(&data)))
        .await
        .unwrap();

    let on_disk = std::fs::read(dir.path().join("files").join(&receipt.path)).unwrap();
    assert_eq!(on_disk, data);
    assert!(!dir
        .path()
        .join("files/__uploads")
        .join(init.upload_id.as_str())
        .exists());
    assert!(dir
        .path()
        .join("sessions")
        .join(format!("{}.json", init.upload_id))
        .exists());
}
