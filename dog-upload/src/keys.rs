use chrono::Datelike;

use crate::{UploadError, UploadId, UploadResult, UploadSession};

const MAX_FILENAME_LEN: usize = 255;

/// Where an upload's artifacts live inside the storage driver
pub trait KeyStrategy: Send + Sync {
    /// Directory holding every temporary artifact of one session
    fn session_dir(&self, upload_id: &UploadId) -> String;

    /// Path of one chunk artifact
    fn chunk_key(&self, upload_id: &UploadId, index: u32) -> String;

    /// Temporary path the chunks are concatenated into during `finish`
    fn assembly_key(&self, upload_id: &UploadId) -> String;

    /// Permanent path of the finished file. Computed on the first `finish`
    /// attempt and recorded on the session; retries reuse the recorded path.
    fn final_key(&self, subdir: &str, session: &UploadSession) -> String;
}

/// `<temp_dir>/<id>/<index:06>.part` for chunks and
/// `<subdir>/<YYYY>/<MM>/<id>-<filename>` for finished files
#[derive(Debug, Clone)]
pub struct DefaultKeyStrategy {
    temp_dir: String,
}

impl DefaultKeyStrategy {
    pub fn new<S: Into<String>>(temp_dir: S) -> Self {
        Self {
            temp_dir: temp_dir.into().trim_matches('/').to_string(),
        }
    }
}

impl KeyStrategy for DefaultKeyStrategy {
    fn session_dir(&self, upload_id: &UploadId) -> String {
        format!("{}/{}", self.temp_dir, upload_id)
    }

    fn chunk_key(&self, upload_id: &UploadId, index: u32) -> String {
        format!("{}/{:06}.part", self.session_dir(upload_id), index)
    }

    fn assembly_key(&self, upload_id: &UploadId) -> String {
        format!("{}/assembled.tmp", self.session_dir(upload_id))
    }

    fn final_key(&self, subdir: &str, session: &UploadSession) -> String {
        let filename = sanitize_filename(&session.filename).unwrap_or_else(|| "file".to_string());
        format!(
            "{}/{:04}/{:02}/{}-{}",
            subdir.trim_matches('/'),
            session.created_at.year(),
            session.created_at.month(),
            session.upload_id,
            filename
        )
    }
}

/// Reduce a client-supplied filename to a safe single path segment.
///
/// Directory components are dropped, only ASCII alphanumerics, `.`, `-` and
/// `_` survive, dot runs collapse to one dot and leading dots are removed.
/// Returns `None` when nothing usable is left.
pub fn sanitize_filename(filename: &str) -> Option<String> {
    let base = filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or("")
        .trim();

    let mut out = String::with_capacity(base.len());
    for c in base.chars() {
        if !(c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_') {
            continue;
        }
        if c == '.' && (out.is_empty() || out.ends_with('.')) {
            continue;
        }
        out.push(c);
        if out.len() == MAX_FILENAME_LEN {
            break;
        }
    }

    let out = out.trim_end_matches('.').to_string();
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Check a destination subdir: relative, `/`-separated plain segments, and
/// not inside `reserved` (the temp directory holding session artifacts).
pub fn validate_subdir(subdir: &str, reserved: &str) -> UploadResult<String> {
    let trimmed = subdir.trim().trim_end_matches('/');
    let safe_segment = |s: &str| {
        !s.is_empty()
            && !s.starts_with('.')
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
    };

    if trimmed.is_empty() || !trimmed.split('/').all(safe_segment) {
        return Err(UploadError::validation(format!("invalid subdir: {subdir:?}")));
    }

    let reserved = reserved.trim_matches('/');
    let first = trimmed.split('/').next().unwrap_or("");
    if !reserved.is_empty() && reserved.split('/').next() == Some(first) {
        return Err(UploadError::validation(format!(
            "subdir {subdir:?} is reserved for in-progress uploads"
        )));
    }
    Ok(trimmed.to_string())
}
