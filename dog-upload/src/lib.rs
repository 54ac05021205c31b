//! # dog-upload: resumable chunked uploads for DogRS applications
//!
//! `dog-upload` lets a client send a large file in independently retriable
//! chunks and turns them into exactly one durable artifact, even when chunks
//! arrive out of order, are sent twice, or race each other.
//!
//! ## Key Features
//!
//! - **Session state machine**: `INITIALIZED → RECEIVING → FINALIZING → COMPLETED`,
//!   with `ABORTED`/`EXPIRED` exits and a safe fall-back to `RECEIVING` when finishing fails
//! - **Optimistic concurrency**: every mutation is a compare-and-swap on the session version
//! - **Per-session leases**: non-blocking locks that fail fast instead of queueing
//! - **Storage agnostic**: local filesystem, in-memory, or S3-compatible (`s3` feature)
//! - **Server agnostic**: no HTTP coupling; see `dog-upload-axum` for the REST surface
//!
//! ## Quick Start
//!
//! ```rust
//! use bytes::Bytes;
//! use dog_upload::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> UploadResult<()> {
//! let uploads = UploadOrchestrator::builder(MemoryStorageDriver::new(), MemoryMediaRegistrar::new())
//!     .with_config(UploadConfig::new().with_chunk_size(4))
//!     .build();
//!
//! let init = uploads.init("user-1", UploadInit::new("digits.txt", 10)).await?;
//! assert_eq!(init.total_chunks, 3);
//!
//! // chunks may arrive in any order
//! uploads.write_chunk(&init.upload_id, 2, Bytes::from_static(b"89")).await?;
//! uploads.write_chunk(&init.upload_id, 0, Bytes::from_static(b"0123")).await?;
//! uploads.write_chunk(&init.upload_id, 1, Bytes::from_static(b"4567")).await?;
//!
//! let done = uploads.finish(&init.upload_id, FinishOptions::new()).await?;
//! assert_eq!(done.size, 10);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  UploadOrchestrator  │  ← state machine and business rules
//! ├──────┬──────┬────────┤
//! │ Sess │ Lock │Storage │  ← narrow, swappable ports
//! └──────┴──────┴────────┘
//!            │
//!     MediaRegistrar        ← takes ownership of finished files
//! ```

pub mod clock;
mod config;
mod error;
pub mod keys;
mod lock;
mod orchestrator;
mod reaper;
pub mod registrar;
mod session_store;
pub mod storage;
mod types;

// Re-export main types for clean API
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::UploadConfig;
pub use error::{ConflictReason, ErrorKind, UploadError, UploadResult};
pub use keys::{DefaultKeyStrategy, KeyStrategy};
pub use lock::{
    with_lock, LeaseRenewal, LeaseToken, LockCoordinator, LockGuard, MemoryLockCoordinator,
};
pub use orchestrator::{ReapReport, UploadOrchestrator, UploadOrchestratorBuilder};
pub use reaper::SessionReaper;
pub use registrar::{MediaRegistrar, MediaStatus, MemoryMediaRegistrar, NewMediaFile, RegisteredMedia};
pub use session_store::{FileSessionStore, MemorySessionStore, SessionStore};
pub use storage::{
    ByteStream, LocalStorageDriver, MemoryStorageDriver, ProgressFn, StorageDriver, UploadSource,
};
#[cfg(feature = "s3")]
pub use storage::{S3Config, S3StorageDriver};
pub use types::{
    percent, total_chunks, AbortReceipt, ChunkReceipt, FinishOptions, FinishReceipt, InitReceipt,
    SessionPatch, TransferProgress, UploadId, UploadInit, UploadSession, UploadState,
    UploadStatusView,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        FinishOptions, LocalStorageDriver, MemoryMediaRegistrar, MemoryStorageDriver,
        UploadConfig, UploadError, UploadId, UploadInit, UploadOrchestrator, UploadResult,
    };
}
