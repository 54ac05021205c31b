//! JSON-document session store: one `<upload_id>.json` file per session.
//!
//! Writes land in a temp sibling and are renamed into place, so a reader never
//! sees a half-written document. Mutations are serialized by a store-wide
//! async mutex, which makes the version check and the write one atomic step
//! for every caller sharing this store instance.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::clock::{deadline, Clock, SystemClock};
use crate::{
    ConflictReason, SessionPatch, SessionStore, UploadError, UploadId, UploadResult,
    UploadSession,
};

pub struct FileSessionStore {
    root: PathBuf,
    write_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl FileSessionStore {
    pub async fn new(root: impl AsRef<Path>) -> UploadResult<Self> {
        Self::with_clock(root, Arc::new(SystemClock)).await
    }

    pub async fn with_clock(root: impl AsRef<Path>, clock: Arc<dyn Clock>) -> UploadResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
            clock,
        })
    }

    fn document_path(&self, upload_id: &UploadId) -> UploadResult<PathBuf> {
        if !upload_id.is_well_formed() {
            return Err(UploadError::validation(format!("invalid upload id: {upload_id}")));
        }
        Ok(self.root.join(format!("{upload_id}.json")))
    }

    async fn read_document(path: &Path) -> UploadResult<Option<UploadSession>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(&self, path: &Path, session: &UploadSession) -> UploadResult<()> {
        let bytes = serde_json::to_vec_pretty(session)?;
        let temp_path = self.root.join(format!(".{}.tmp", Uuid::new_v4().simple()));

        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            fs::rename(&temp_path, path).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    #[instrument(skip(self, session), fields(upload_id = %session.upload_id))]
    async fn create(&self, mut session: UploadSession, ttl: Duration) -> UploadResult<UploadSession> {
        let path = self.document_path(&session.upload_id)?;
        let _guard = self.write_lock.lock().await;

        if fs::try_exists(&path).await? {
            return Err(UploadError::conflict(
                ConflictReason::AlreadyExists,
                format!("upload session already exists: {}", session.upload_id),
            ));
        }

        session.version = 1;
        session.expires_at = deadline(self.clock.now(), ttl);
        self.write_document(&path, &session).await?;
        Ok(session)
    }

    async fn get(&self, upload_id: &UploadId) -> UploadResult<Option<UploadSession>> {
        let path = self.document_path(upload_id)?;
        Self::read_document(&path).await
    }

    #[instrument(skip(self, patch), fields(upload_id = %upload_id))]
    async fn patch_cas(
        &self,
        upload_id: &UploadId,
        expected_version: u64,
        patch: SessionPatch,
    ) -> UploadResult<bool> {
        let path = self.document_path(upload_id)?;
        let _guard = self.write_lock.lock().await;

        let Some(mut session) = Self::read_document(&path).await? else {
            return Ok(false);
        };
        if session.version != expected_version {
            return Ok(false);
        }

        patch.merge_into(&mut session);
        self.write_document(&path, &session).await?;
        Ok(true)
    }

    async fn touch(&self, upload_id: &UploadId, ttl: Duration) -> UploadResult<UploadSession> {
        let path = self.document_path(upload_id)?;
        let _guard = self.write_lock.lock().await;

        let mut session = Self::read_document(&path)
            .await?
            .ok_or_else(|| UploadError::not_found(upload_id.as_str()))?;
        session.expires_at = deadline(self.clock.now(), ttl);
        session.version += 1;
        self.write_document(&path, &session).await?;
        Ok(session)
    }

    async fn delete(&self, upload_id: &UploadId) -> UploadResult<()> {
        let path = self.document_path(upload_id)?;
        let _guard = self.write_lock.lock().await;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn expired(&self, now: DateTime<Utc>) -> UploadResult<Vec<UploadSession>> {
        let mut expired = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_document(&path).await {
                Ok(Some(session)) if session.expires_at < now => expired.push(session),
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable session document"),
            }
        }

        Ok(expired)
    }
}
