//! Caller identity.
//!
//! Authentication happens upstream (gateway or auth middleware), which forwards
//! the resolved user id in `x-user-id`. This crate only checks that one is present.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::UploadApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated user id, rejected with 401 when absent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub String);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = UploadApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| AuthUser(v.to_string()))
            .ok_or_else(|| UploadApiError::not_authenticated("Not authenticated"))
    }
}
