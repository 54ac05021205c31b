use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::{primitives::ByteStream as AwsByteStream, Client};
use bytes::BytesMut;
use futures::StreamExt;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tokio_util::io::ReaderStream;
use tracing::instrument;

use super::{validate_key, ByteStream, ProgressFn, StorageDriver, UploadSource};
use crate::{TransferProgress, UploadError, UploadResult};

/// Connection settings for an S3-compatible bucket
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint_url: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Key prefix prepended to every path
    pub prefix: Option<String>,
}

/// Storage driver backed by an S3-compatible object store.
///
/// Object stores have no directories, so `ensure_dir` is a no-op and
/// `remove_dir` deletes every object under the prefix. `rename` is a copy
/// followed by a delete; the copy itself is atomic for readers.
#[derive(Clone)]
pub struct S3StorageDriver {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl S3StorageDriver {
    pub async fn new(config: S3Config) -> UploadResult<Self> {
        let credentials = Credentials::new(
            config.access_key_id,
            config.secret_access_key,
            None,
            None,
            "dog-upload",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials);
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let client = Client::from_conf(
            aws_sdk_s3::config::Builder::from(&shared)
                .force_path_style(config.endpoint_url.is_some())
                .build(),
        );

        Ok(Self {
            client,
            bucket: config.bucket,
            prefix: config.prefix.map(|p| p.trim_matches('/').to_string()),
        })
    }

    fn full_key(&self, key: &str) -> UploadResult<String> {
        validate_key(key)?;
        Ok(match &self.prefix {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}/{key}"),
            _ => key.to_string(),
        })
    }

    fn map_err<E>(what: String, err: E) -> UploadError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        UploadError::storage_from(what, err)
    }
}

#[async_trait]
impl StorageDriver for S3StorageDriver {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn ensure_dir(&self, dir: &str) -> UploadResult<()> {
        validate_key(dir)
    }

    #[instrument(skip(self, source, on_progress), fields(backend = "s3"))]
    async fn upload_file(
        &self,
        source: UploadSource,
        path: &str,
        on_progress: Option<&ProgressFn>,
    ) -> UploadResult<u64> {
        let key = self.full_key(path)?;
        let body = match source {
            UploadSource::Bytes(bytes) => bytes,
            UploadSource::Path(local) => bytes::Bytes::from(tokio::fs::read(&local).await?),
            UploadSource::Stream { mut stream, .. } => {
                let mut buf = BytesMut::new();
                while let Some(piece) = stream.next().await {
                    buf.extend_from_slice(&piece?);
                }
                buf.freeze()
            }
        };
        let written = body.len() as u64;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(AwsByteStream::from(body))
            .send()
            .await
            .map_err(|e| Self::map_err(format!("put_object failed for {path}"), e))?;

        if let Some(report) = on_progress {
            report(TransferProgress::new(written, written));
        }
        Ok(written)
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn exists(&self, path: &str) -> UploadResult<bool> {
        let key = self.full_key(path)?;
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                if err.as_service_error().map_or(false, |e| e.is_not_found()) {
                    return Ok(false);
                }
                Err(Self::map_err(format!("head_object failed for {path}"), err))
            }
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn rename(&self, from: &str, to: &str) -> UploadResult<()> {
        let source_key = self.full_key(from)?;
        let target_key = self.full_key(to)?;
        let copy_source = format!(
            "{}/{}",
            self.bucket,
            utf8_percent_encode(&source_key, NON_ALPHANUMERIC)
        );

        self.client
            .copy_object()
            .bucket(&self.bucket)
            .key(&target_key)
            .copy_source(copy_source)
            .send()
            .await
            .map_err(|e| Self::map_err(format!("copy_object failed for {from}"), e))?;

        self.delete(from).await
    }

    async fn delete(&self, path: &str) -> UploadResult<()> {
        let key = self.full_key(path)?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| Self::map_err(format!("delete_object failed for {path}"), e))?;
        Ok(())
    }

    async fn read(&self, path: &str) -> UploadResult<ByteStream> {
        let key = self.full_key(path)?;
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| Self::map_err(format!("get_object failed for {path}"), e))?;

        Ok(Box::pin(ReaderStream::new(output.body.into_async_read())))
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn remove_dir(&self, dir: &str) -> UploadResult<()> {
        let prefix = format!("{}/", self.full_key(dir)?.trim_end_matches('/'));
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&prefix);
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let output = request
                .send()
                .await
                .map_err(|e| Self::map_err(format!("list_objects_v2 failed for {dir}"), e))?;

            for object in output.contents() {
                if let Some(key) = object.key() {
                    self.client
                        .delete_object()
                        .bucket(&self.bucket)
                        .key(key)
                        .send()
                        .await
                        .map_err(|e| Self::map_err(format!("delete_object failed for {key}"), e))?;
                }
            }

            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }
        Ok(())
    }
}
