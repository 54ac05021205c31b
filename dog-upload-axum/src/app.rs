use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use dog_upload::UploadOrchestrator;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;

use crate::routes::{health, upload_router};
use crate::UploadAxumState;

/// Slack on top of `chunk_size` for the chunk route's body limit
const CHUNK_BODY_SLACK: usize = 1024;

pub struct UploadApp {
    pub uploads: Arc<UploadOrchestrator>,
    router: Router<()>,
}

impl Clone for UploadApp {
    fn clone(&self) -> Self {
        Self {
            uploads: Arc::clone(&self.uploads),
            router: self.router.clone(),
        }
    }
}

impl UploadApp {
    pub fn new(uploads: UploadOrchestrator) -> Self {
        Self::from_arc(Arc::new(uploads))
    }

    /// Mount `/upload/*` and `/health` for an orchestrator shared elsewhere
    /// (for example with a reaper).
    pub fn from_arc(uploads: Arc<UploadOrchestrator>) -> Self {
        let chunk_limit = usize::try_from(uploads.config().chunk_size)
            .unwrap_or(usize::MAX)
            .saturating_add(CHUNK_BODY_SLACK);
        let state = UploadAxumState::from_arc(Arc::clone(&uploads));

        let router = Router::new()
            .nest("/upload", upload_router(state, chunk_limit))
            .route("/health", get(health));

        Self { uploads, router }
    }

    pub fn use_router(mut self, path: &str, router: Router<()>) -> Self {
        self.router = self.router.nest(path, router);
        self
    }

    /// Serve finished artifacts from a local storage root under `mount`.
    ///
    /// The engine's temp directory and dot-files are never exposed.
    pub fn serve_files(mut self, mount: &str, root: impl AsRef<Path>) -> Self {
        let hidden: Arc<str> = Arc::from(self.uploads.config().temp_dir.trim_matches('/'));
        let files = Router::new()
            .fallback_service(ServeDir::new(root.as_ref()))
            .layer(middleware::from_fn_with_state(hidden, hide_temp_files));
        self.router = self.router.nest(mount, files);
        self
    }

    /// The router with request-id and tracing layers applied
    pub fn into_router(self) -> Router<()> {
        self.router.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "upload server listening");
        axum::serve(listener, self.into_router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn hide_temp_files(State(hidden): State<Arc<str>>, req: Request, next: Next) -> Response {
    let path = req.uri().path().trim_start_matches('/');
    let under_temp = !hidden.is_empty()
        && (path == &*hidden || path.starts_with(&format!("{hidden}/")));
    let dot_segment = path.split('/').any(|seg| seg.starts_with('.'));

    if under_temp || dot_segment {
        return StatusCode::NOT_FOUND.into_response();
    }
    next.run(req).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
