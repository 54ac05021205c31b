use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::instrument;
use uuid::Uuid;

use super::{validate_key, ByteStream, ProgressFn, StorageDriver, UploadSource};
use crate::{TransferProgress, UploadError, UploadResult};

const PROGRESS_STEP: u64 = 64 * 1024;

/// Storage driver rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalStorageDriver {
    root: PathBuf,
}

impl LocalStorageDriver {
    pub async fn new(root: impl AsRef<Path>) -> UploadResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> UploadResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    async fn source_stream(source: UploadSource) -> UploadResult<(ByteStream, Option<u64>)> {
        match source {
            UploadSource::Bytes(bytes) => {
                let total = bytes.len() as u64;
                let pieces: Vec<Result<Bytes, std::io::Error>> = (0..bytes.len())
                    .step_by(PROGRESS_STEP as usize)
                    .map(|start| {
                        let end = (start + PROGRESS_STEP as usize).min(bytes.len());
                        Ok(bytes.slice(start..end))
                    })
                    .collect();
                let stream: ByteStream = Box::pin(futures::stream::iter(pieces));
                Ok((stream, Some(total)))
            }
            UploadSource::Path(path) => {
                let file = fs::File::open(&path).await.map_err(|e| {
                    UploadError::storage_from(format!("failed to open {}", path.display()), e)
                })?;
                let total = file.metadata().await.ok().map(|m| m.len());
                let stream: ByteStream =
                    Box::pin(ReaderStream::with_capacity(file, PROGRESS_STEP as usize));
                Ok((stream, total))
            }
            UploadSource::Stream { stream, size } => Ok((stream, size)),
        }
    }

    async fn write_atomic(
        target: &Path,
        mut stream: ByteStream,
        total: Option<u64>,
        on_progress: Option<&ProgressFn>,
    ) -> std::io::Result<u64> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload");
        let temp_path = target.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            let mut written = 0u64;
            let mut next_report = PROGRESS_STEP;

            while let Some(piece) = stream.next().await {
                let piece = piece?;
                file.write_all(&piece).await?;
                written += piece.len() as u64;

                if written >= next_report {
                    if let Some(report) = on_progress {
                        report(TransferProgress::new(written, total.unwrap_or(written).max(written)));
                    }
                    next_report = (written / PROGRESS_STEP + 1) * PROGRESS_STEP;
                }
            }

            file.sync_all().await?;
            fs::rename(&temp_path, target).await?;
            Ok::<u64, std::io::Error>(written)
        }
        .await;

        match written {
            Ok(written) => {
                if let Some(report) = on_progress {
                    report(TransferProgress::new(written, written));
                }
                Ok(written)
            }
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl StorageDriver for LocalStorageDriver {
    fn name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn ensure_dir(&self, dir: &str) -> UploadResult<()> {
        let path = self.resolve(dir)?;
        fs::create_dir_all(&path).await?;
        Ok(())
    }

    #[instrument(skip(self, source, on_progress), fields(backend = "local"))]
    async fn upload_file(
        &self,
        source: UploadSource,
        path: &str,
        on_progress: Option<&ProgressFn>,
    ) -> UploadResult<u64> {
        let target = self.resolve(path)?;
        let (stream, total) = Self::source_stream(source).await?;
        Self::write_atomic(&target, stream, total, on_progress)
            .await
            .map_err(|e| UploadError::storage_from(format!("failed to write {path}"), e))
    }

    async fn exists(&self, path: &str) -> UploadResult<bool> {
        let target = self.resolve(path)?;
        Ok(fs::try_exists(&target).await?)
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn rename(&self, from: &str, to: &str) -> UploadResult<()> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&source, &target)
            .await
            .map_err(|e| UploadError::storage_from(format!("failed to rename {from} to {to}"), e))
    }

    async fn delete(&self, path: &str) -> UploadResult<()> {
        let target = self.resolve(path)?;
        match fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, path: &str) -> UploadResult<ByteStream> {
        let target = self.resolve(path)?;
        let file = fs::File::open(&target)
            .await
            .map_err(|e| UploadError::storage_from(format!("failed to open {path}"), e))?;
        Ok(Box::pin(ReaderStream::with_capacity(file, PROGRESS_STEP as usize)))
    }

    async fn remove_dir(&self, dir: &str) -> UploadResult<()> {
        let target = self.resolve(dir)?;
        match fs::remove_dir_all(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
