//! dog-upload-axum: the HTTP surface for `dog-upload`.
//!
//! | Route | Auth | Input |
//! |---|---|---|
//! | `POST /upload/init` | `x-user-id` | `{filename, size, mime?}` |
//! | `POST /upload/chunk?uploadId&index` | `x-user-id` | `application/octet-stream` body |
//! | `GET /upload/status?uploadId` | none | |
//! | `POST /upload/finish` | `x-user-id` | `{uploadId, subdir?, sha256?}` |
//! | `POST /upload/abort?uploadId` | `x-user-id` | |
//! | `GET /health` | none | |
//!
//! Successful replies are `{success: true, data}`; failures are
//! `{success: false, message, kind, className, reason?, retryable}` with the
//! status code of the error kind.

pub mod app;
mod auth;
pub mod config;
mod error;
mod response;
pub mod routes;
mod state;

use dog_upload::{
    FileSessionStore, LocalStorageDriver, MemoryMediaRegistrar, UploadOrchestrator,
};

pub use app::UploadApp;
pub use auth::{AuthUser, USER_ID_HEADER};
pub use config::ServerConfig;
pub use error::{ApiResult, UploadApiError};
pub use response::ApiResponse;
pub use state::UploadAxumState;

/// Wire the engine from `config`: local disk storage, JSON or in-memory
/// sessions, and file serving when the public URL is a local path.
pub async fn build(config: &ServerConfig) -> anyhow::Result<UploadApp> {
    let storage = LocalStorageDriver::new(&config.storage_root).await?;
    let builder = UploadOrchestrator::builder(storage, MemoryMediaRegistrar::new())
        .with_config(config.upload_config());

    let builder = match &config.session_dir {
        Some(dir) => builder.with_sessions(FileSessionStore::new(dir).await?),
        None => builder,
    };

    let app = UploadApp::new(builder.build());
    Ok(match config.file_mount() {
        Some(mount) => app.serve_files(mount, &config.storage_root),
        None => app,
    })
}
