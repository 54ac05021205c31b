use axum::{
    extract::{
        rejection::{BytesRejection, JsonRejection, QueryRejection},
        DefaultBodyLimit, Query, State,
    },
    http::{header::CONTENT_TYPE, HeaderMap},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use dog_upload::{
    AbortReceipt, ChunkReceipt, FinishOptions, FinishReceipt, InitReceipt, UploadId, UploadInit,
    UploadStatusView,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{ApiResponse, ApiResult, AuthUser, UploadApiError, UploadAxumState};

const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadIdQuery {
    pub upload_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkQuery {
    pub upload_id: String,
    pub index: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishBody {
    pub upload_id: String,
    #[serde(default)]
    pub subdir: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
}

/// Routes mounted under `/upload`. The chunk route's body limit is
/// `chunk_body_limit` bytes.
pub fn upload_router(state: UploadAxumState, chunk_body_limit: usize) -> Router<()> {
    Router::new()
        .route("/init", post(init))
        .route(
            "/chunk",
            post(chunk).layer(DefaultBodyLimit::max(chunk_body_limit)),
        )
        .route("/status", get(status))
        .route("/finish", post(finish))
        .route("/abort", post(abort))
        .with_state(state)
}

pub async fn health() -> ApiResponse<Value> {
    ApiResponse::ok(json!({ "status": "ok" }))
}

async fn init(
    State(state): State<UploadAxumState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<UploadInit>, JsonRejection>,
) -> ApiResult<ApiResponse<InitReceipt>> {
    let Json(meta) = payload?;
    let receipt = state.uploads.init(&user_id, meta).await?;
    Ok(ApiResponse::ok(receipt))
}

async fn chunk(
    State(state): State<UploadAxumState>,
    AuthUser(_): AuthUser,
    query: Result<Query<ChunkQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<ApiResponse<ChunkReceipt>> {
    let Query(query) = query?;
    if !is_octet_stream(&headers) {
        return Err(UploadApiError::bad_request(format!(
            "chunk body must be sent as {OCTET_STREAM}"
        )));
    }
    let body = body?;

    let receipt = state
        .uploads
        .write_chunk(&UploadId::from_string(query.upload_id), query.index, body)
        .await?;
    Ok(ApiResponse::ok(receipt))
}

async fn status(
    State(state): State<UploadAxumState>,
    query: Result<Query<UploadIdQuery>, QueryRejection>,
) -> ApiResult<ApiResponse<UploadStatusView>> {
    let Query(query) = query?;
    let view = state
        .uploads
        .get_status(&UploadId::from_string(query.upload_id))
        .await?;
    Ok(ApiResponse::ok(view))
}

async fn finish(
    State(state): State<UploadAxumState>,
    AuthUser(_): AuthUser,
    payload: Result<Json<FinishBody>, JsonRejection>,
) -> ApiResult<ApiResponse<FinishReceipt>> {
    let Json(body) = payload?;
    let options = FinishOptions {
        subdir: body.subdir,
        sha256: body.sha256,
    };
    let receipt = state
        .uploads
        .finish(&UploadId::from_string(body.upload_id), options)
        .await?;
    Ok(ApiResponse::ok(receipt))
}

async fn abort(
    State(state): State<UploadAxumState>,
    AuthUser(_): AuthUser,
    query: Result<Query<UploadIdQuery>, QueryRejection>,
) -> ApiResult<ApiResponse<AbortReceipt>> {
    let Query(query) = query?;
    let receipt = state
        .uploads
        .abort(&UploadId::from_string(query.upload_id))
        .await?;
    Ok(ApiResponse::ok(receipt))
}

fn is_octet_stream(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().eq_ignore_ascii_case(OCTET_STREAM))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(content_type: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        headers
    }

    #[test]
    fn octet_stream_detection() {
        assert!(is_octet_stream(&headers("application/octet-stream")));
        assert!(is_octet_stream(&headers("Application/Octet-Stream; charset=binary")));
        assert!(!is_octet_stream(&headers("application/json")));
        assert!(!is_octet_stream(&headers("multipart/form-data; boundary=x")));
        assert!(!is_octet_stream(&HeaderMap::new()));
    }
}
