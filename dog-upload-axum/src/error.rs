use axum::{
    extract::rejection::{BytesRejection, JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dog_upload::{ErrorKind, UploadError};
use serde::Serialize;

/// Error returned by every upload handler.
///
/// Engine errors keep their kind; transport problems (bad JSON, bad query,
/// missing identity) are folded into the same envelope.
#[derive(Debug)]
pub enum UploadApiError {
    Upload(UploadError),
    NotAuthenticated(String),
}

pub type ApiResult<T> = Result<T, UploadApiError>;

impl UploadApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::Upload(UploadError::validation(message))
    }

    pub fn not_authenticated(message: impl Into<String>) -> Self {
        Self::NotAuthenticated(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Upload(e) => StatusCode::from_u16(e.kind().status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::NotAuthenticated(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<UploadError> for UploadApiError {
    fn from(e: UploadError) -> Self {
        Self::Upload(e)
    }
}

impl From<JsonRejection> for UploadApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!(
            "Failed to parse the request body as JSON: {}",
            rejection.body_text()
        ))
    }
}

impl From<QueryRejection> for UploadApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(format!("Invalid query string: {}", rejection.body_text()))
    }
}

impl From<BytesRejection> for UploadApiError {
    fn from(rejection: BytesRejection) -> Self {
        Self::bad_request(format!("Unreadable chunk body: {}", rejection.body_text()))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorEnvelope {
    success: bool,
    message: String,
    kind: &'static str,
    class_name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
    retryable: bool,
}

impl IntoResponse for UploadApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let envelope = match &self {
            Self::Upload(e) => {
                let kind = e.kind();
                if matches!(kind, ErrorKind::Storage | ErrorKind::Registrar | ErrorKind::Internal) {
                    tracing::error!(error = %e, kind = kind.name(), "upload request failed");
                }
                ErrorEnvelope {
                    success: false,
                    message: e.message(),
                    kind: kind.name(),
                    class_name: kind.class_name(),
                    reason: e.conflict_reason().map(|r| r.as_str()),
                    retryable: e.is_retryable(),
                }
            }
            Self::NotAuthenticated(message) => ErrorEnvelope {
                success: false,
                message: message.clone(),
                kind: "NotAuthenticated",
                class_name: "not-authenticated",
                reason: None,
                retryable: false,
            },
        };
        (status, Json(envelope)).into_response()
    }
}
