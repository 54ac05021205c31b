use std::fmt;

use thiserror::Error;

/// Result type for upload operations
pub type UploadResult<T> = Result<T, UploadError>;

/// Machine-readable detail carried by [`UploadError::Conflict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictReason {
    /// Another operation holds the session lock.
    LockBusy,
    /// Optimistic retries against the session version were exhausted.
    VersionConflict,
    /// The session state does not allow the requested transition.
    InvalidState,
    /// `finish` was called before every chunk arrived.
    IncompleteChunks,
    /// The assembled artifact did not match the supplied digest.
    ChecksumMismatch,
    /// A session with the same id already exists.
    AlreadyExists,
}

impl ConflictReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictReason::LockBusy => "lock_busy",
            ConflictReason::VersionConflict => "version_conflict",
            ConflictReason::InvalidState => "invalid_state",
            ConflictReason::IncompleteChunks => "incomplete_chunks",
            ConflictReason::ChecksumMismatch => "checksum_mismatch",
            ConflictReason::AlreadyExists => "already_exists",
        }
    }
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable error classes, named the same way DogRS names its HTTP-facing errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation, // 400
    NotFound,   // 404
    Conflict,   // 409
    Storage,    // 500
    Registrar,  // 502
    Internal,   // 500
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Storage => 500,
            ErrorKind::Registrar => 502,
            ErrorKind::Internal => 500,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "Validation",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Storage => "StorageError",
            ErrorKind::Registrar => "RegistrarError",
            ErrorKind::Internal => "Internal",
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Storage => "storage-error",
            ErrorKind::Registrar => "registrar-error",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Errors that can occur during upload operations
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid request: {message}")]
    Validation { message: String },

    #[error("Upload session not found: {upload_id}")]
    NotFound { upload_id: String },

    #[error("Conflict ({reason}): {message}")]
    Conflict {
        reason: ConflictReason,
        message: String,
    },

    #[error("Storage backend error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Media registrar error: {message}")]
    Registrar {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl UploadError {
    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(upload_id: S) -> Self {
        Self::NotFound {
            upload_id: upload_id.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict<S: Into<String>>(reason: ConflictReason, message: S) -> Self {
        Self::Conflict {
            reason,
            message: message.into(),
        }
    }

    /// Create a storage error without an underlying cause
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Create a storage error from any backend error type
    pub fn storage_from<E>(message: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(error)),
        }
    }

    /// Create a registrar error
    pub fn registrar<S: Into<String>>(message: S) -> Self {
        Self::Registrar {
            message: message.into(),
            source: None,
        }
    }

    /// Create a registrar error from any client error type
    pub fn registrar_from<E>(message: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Registrar {
            message: message.into(),
            source: Some(Box::new(error)),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            UploadError::Validation { .. } => ErrorKind::Validation,
            UploadError::NotFound { .. } => ErrorKind::NotFound,
            UploadError::Conflict { .. } => ErrorKind::Conflict,
            UploadError::Storage { .. } => ErrorKind::Storage,
            UploadError::Registrar { .. } => ErrorKind::Registrar,
            UploadError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// The conflict detail, if this is a conflict.
    pub fn conflict_reason(&self) -> Option<ConflictReason> {
        match self {
            UploadError::Conflict { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Conflicts are worth retrying after backoff; everything else needs a
    /// different request or operator attention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, UploadError::Conflict { .. })
    }

    /// Human-readable message without the kind prefix.
    pub fn message(&self) -> String {
        match self {
            UploadError::Validation { message }
            | UploadError::Conflict { message, .. }
            | UploadError::Storage { message, .. }
            | UploadError::Registrar { message, .. }
            | UploadError::Internal { message } => message.clone(),
            UploadError::NotFound { upload_id } => {
                format!("upload session not found: {upload_id}")
            }
        }
    }
}

impl From<std::io::Error> for UploadError {
    fn from(err: std::io::Error) -> Self {
        Self::storage_from(err.to_string(), err)
    }
}

impl From<serde_json::Error> for UploadError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("serialization error: {err}"))
    }
}
