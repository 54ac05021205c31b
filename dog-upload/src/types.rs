use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an upload session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(pub String);

impl UploadId {
    /// Generate a new random upload ID
    pub fn new() -> Self {
        Self(format!("upl_{}", Uuid::new_v4().simple()))
    }

    /// Create from existing string
    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Non-empty, at most 128 chars of `[A-Za-z0-9_-]`; safe as a path segment.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= 128
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UploadId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Lifecycle state of an upload session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadState {
    Initialized,
    Receiving,
    Finalizing,
    Completed,
    Aborted,
    Expired,
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Expired)
    }

    pub fn accepts_chunks(&self) -> bool {
        matches!(self, Self::Initialized | Self::Receiving)
    }

    /// Whether `self -> next` is a legal move.
    ///
    /// States only advance, with two exceptions: `Finalizing -> Receiving` when
    /// assembly or registration fails, and `Aborted`/`Expired` from any
    /// non-terminal state.
    pub fn can_transition_to(&self, next: UploadState) -> bool {
        use UploadState::*;
        match (self, next) {
            (Initialized, Receiving) => true,
            (Receiving, Receiving) => true,
            (Receiving, Finalizing) => true,
            (Finalizing, Finalizing) => true,
            (Finalizing, Completed) => true,
            (Finalizing, Receiving) => true,
            (from, Aborted | Expired) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "INITIALIZED",
            Self::Receiving => "RECEIVING",
            Self::Finalizing => "FINALIZING",
            Self::Completed => "COMPLETED",
            Self::Aborted => "ABORTED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for UploadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The aggregate root: one upload attempt and its progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub upload_id: UploadId,
    pub user_id: String,
    pub filename: String,
    pub mime: Option<String>,
    pub size: u64,
    pub chunk_size: u64,
    pub total_chunks: u32,
    pub received_bytes: u64,
    pub received_indexes: BTreeSet<u32>,
    pub state: UploadState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub version: u64,
    /// Permanent path picked by the first `finish` attempt. Retries publish
    /// here, and abort or expiry delete it while the upload is unfinished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<FinishReceipt>,
}

impl UploadSession {
    /// Build a fresh `INITIALIZED` session. The store assigns `version` and
    /// `expires_at` on create.
    pub fn new(
        upload_id: UploadId,
        user_id: String,
        filename: String,
        mime: Option<String>,
        size: u64,
        chunk_size: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            upload_id,
            user_id,
            filename,
            mime,
            size,
            chunk_size,
            total_chunks: total_chunks(size, chunk_size),
            received_bytes: 0,
            received_indexes: BTreeSet::new(),
            state: UploadState::Initialized,
            created_at,
            expires_at: created_at,
            version: 0,
            final_path: None,
            result: None,
        }
    }

    /// Expected length of chunk `index`, or `None` when out of range.
    /// The final chunk carries the remainder.
    pub fn expected_chunk_len(&self, index: u32) -> Option<u64> {
        if index >= self.total_chunks {
            return None;
        }
        let start = u64::from(index) * self.chunk_size;
        Some(self.chunk_size.min(self.size - start))
    }

    /// Distinct bytes represented by a set of chunk indexes.
    pub fn bytes_for(&self, indexes: &BTreeSet<u32>) -> u64 {
        indexes
            .iter()
            .filter_map(|i| self.expected_chunk_len(*i))
            .sum()
    }

    pub fn is_complete(&self) -> bool {
        self.received_indexes.len() as u64 == u64::from(self.total_chunks)
    }

    /// First few missing indexes, for error messages.
    pub fn missing_indexes(&self, limit: usize) -> Vec<u32> {
        (0..self.total_chunks)
            .filter(|i| !self.received_indexes.contains(i))
            .take(limit)
            .collect()
    }

    pub fn percent(&self) -> u8 {
        percent(self.received_indexes.len(), self.total_chunks)
    }

    /// Lazy expiry: past `expires_at` and not yet completed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at && self.state != UploadState::Completed
    }
}

/// `ceil(size / chunk_size)`.
pub fn total_chunks(size: u64, chunk_size: u64) -> u32 {
    if chunk_size == 0 {
        return 0;
    }
    let chunks = size.div_ceil(chunk_size);
    u32::try_from(chunks).unwrap_or(u32::MAX)
}

/// `round(received / total * 100)`.
pub fn percent(received: usize, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let ratio = received as f64 / f64::from(total);
    (ratio * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Typed merge applied by a [`crate::SessionStore`] inside its compare-and-swap.
///
/// Fields merge explicitly: `received_indexes` by set union, `received_bytes`
/// by `max`, everything else last-write-wins when present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    pub received_indexes: BTreeSet<u32>,
    pub received_bytes: Option<u64>,
    pub state: Option<UploadState>,
    pub expires_at: Option<DateTime<Utc>>,
    pub final_path: Option<String>,
    pub result: Option<FinishReceipt>,
}

impl SessionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.received_indexes.insert(index);
        self
    }

    pub fn with_received_bytes(mut self, bytes: u64) -> Self {
        self.received_bytes = Some(bytes);
        self
    }

    pub fn with_state(mut self, state: UploadState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn with_final_path<S: Into<String>>(mut self, path: S) -> Self {
        self.final_path = Some(path.into());
        self
    }

    pub fn with_result(mut self, result: FinishReceipt) -> Self {
        self.result = Some(result);
        self
    }

    /// Apply to a stored record and bump its version. Store implementations
    /// call this only after the version check succeeded.
    pub fn merge_into(self, session: &mut UploadSession) {
        let total = session.total_chunks;
        session
            .received_indexes
            .extend(self.received_indexes.into_iter().filter(|i| *i < total));
        if let Some(bytes) = self.received_bytes {
            session.received_bytes = session.received_bytes.max(bytes).min(session.size);
        }
        if let Some(state) = self.state {
            session.state = state;
        }
        if let Some(at) = self.expires_at {
            session.expires_at = at;
        }
        if let Some(path) = self.final_path {
            session.final_path = Some(path);
        }
        if let Some(result) = self.result {
            session.result = Some(result);
        }
        session.version += 1;
    }
}

/// Client-supplied metadata for `init`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadInit {
    pub filename: String,
    pub size: u64,
    #[serde(default)]
    pub mime: Option<String>,
}

impl UploadInit {
    pub fn new<S: Into<String>>(filename: S, size: u64) -> Self {
        Self {
            filename: filename.into(),
            size,
            mime: None,
        }
    }

    pub fn with_mime<S: Into<String>>(mut self, mime: S) -> Self {
        self.mime = Some(mime.into());
        self
    }
}

/// Options for `finish`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishOptions {
    pub subdir: Option<String>,
    pub sha256: Option<String>,
}

impl FinishOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subdir<S: Into<String>>(mut self, subdir: S) -> Self {
        self.subdir = Some(subdir.into());
        self
    }

    pub fn with_sha256<S: Into<String>>(mut self, digest: S) -> Self {
        self.sha256 = Some(digest.into());
        self
    }
}

/// Returned by `init`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitReceipt {
    pub upload_id: UploadId,
    pub chunk_size: u64,
    pub total_chunks: u32,
    pub expires_at: DateTime<Utc>,
}

/// Returned by `write_chunk`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkReceipt {
    pub received_bytes: u64,
    pub percent: u8,
    pub received_index: u32,
}

/// Returned by `get_status`: the full snapshot plus computed progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatusView {
    #[serde(flatten)]
    pub session: UploadSession,
    pub percent: u8,
}

impl From<UploadSession> for UploadStatusView {
    fn from(session: UploadSession) -> Self {
        let percent = session.percent();
        Self { session, percent }
    }
}

/// Returned by `finish`, and cached on the completed session for replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishReceipt {
    pub url: String,
    pub path: String,
    pub id: String,
    pub mime: Option<String>,
    pub size: u64,
}

/// Returned by `abort`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortReceipt {
    pub aborted: bool,
    pub upload_id: UploadId,
}

/// Progress of a single storage transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub sent_bytes: u64,
    pub total_bytes: u64,
    pub percent: u8,
}

impl TransferProgress {
    pub fn new(sent_bytes: u64, total_bytes: u64) -> Self {
        let percent = if total_bytes == 0 {
            100
        } else {
            ((sent_bytes as f64 / total_bytes as f64) * 100.0)
                .round()
                .clamp(0.0, 100.0) as u8
        };
        Self {
            sent_bytes,
            total_bytes,
            percent,
        }
    }
}
