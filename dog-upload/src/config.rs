use std::time::Duration;

/// Configuration for the upload engine
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Server-side chunk size (bytes). Every chunk except the last has exactly this length.
    pub chunk_size: u64,

    /// Absolute max size allowed for a single upload (safety guard)
    pub max_upload_bytes: u64,

    /// Upper bound on chunks per session to protect memory/state
    pub max_chunks: u32,

    /// Inactivity window before a session is considered expired
    pub session_ttl: Duration,

    /// How long a completed session is kept around so `finish` can be replayed
    pub completed_retention: Duration,

    /// Lease granted to the per-session lock
    pub lock_lease: Duration,

    /// Attempts for each optimistic read-modify-write before surfacing a conflict
    pub cas_retries: u32,

    /// Storage directory holding chunk artifacts, one sub-directory per session
    pub temp_dir: String,

    /// Destination directory used when `finish` gets no subdir
    pub default_subdir: String,

    /// Prefix joined with the final path to build the public URL
    pub public_base_url: String,

    /// Accepted mime types; empty means any well-formed type
    pub allowed_mime_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: 5 * 1024 * 1024,                 // 5MB
            max_upload_bytes: 5 * 1024 * 1024 * 1024,    // 5GB
            max_chunks: 10_000,
            session_ttl: Duration::from_secs(24 * 60 * 60),
            completed_retention: Duration::from_secs(60 * 60),
            lock_lease: Duration::from_secs(30),
            cas_retries: 3,
            temp_dir: "__uploads".to_string(),
            default_subdir: "uploads".to_string(),
            public_base_url: "/files".to_string(),
            allowed_mime_types: Vec::new(),
        }
    }
}

impl UploadConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set chunk size
    pub fn with_chunk_size(mut self, bytes: u64) -> Self {
        self.chunk_size = bytes;
        self
    }

    /// Set max upload size
    pub fn with_max_upload_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    /// Set max chunks per session
    pub fn with_max_chunks(mut self, max: u32) -> Self {
        self.max_chunks = max;
        self
    }

    /// Set session TTL
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Set how long completed sessions are retained
    pub fn with_completed_retention(mut self, retention: Duration) -> Self {
        self.completed_retention = retention;
        self
    }

    /// Set lock lease
    pub fn with_lock_lease(mut self, lease: Duration) -> Self {
        self.lock_lease = lease;
        self
    }

    /// Set CAS attempts
    pub fn with_cas_retries(mut self, attempts: u32) -> Self {
        self.cas_retries = attempts.max(1);
        self
    }

    /// Set the temp directory for chunk artifacts
    pub fn with_temp_dir<S: Into<String>>(mut self, dir: S) -> Self {
        self.temp_dir = dir.into();
        self
    }

    /// Set the default destination subdir
    pub fn with_default_subdir<S: Into<String>>(mut self, dir: S) -> Self {
        self.default_subdir = dir.into();
        self
    }

    /// Set the public URL prefix
    pub fn with_public_base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.public_base_url = url.into();
        self
    }

    /// Allow a mime type (call repeatedly to allow several)
    pub fn allow_mime_type<S: Into<String>>(mut self, mime: S) -> Self {
        self.allowed_mime_types.push(mime.into().to_ascii_lowercase());
        self
    }

    /// Build the public URL for a stored path
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.public_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_url_joins_without_double_slashes() {
        let config = UploadConfig::new().with_public_base_url("https://cdn.example.com/files/");
        assert_eq!(
            config.public_url("/uploads/2026/01/a.zip"),
            "https://cdn.example.com/files/uploads/2026/01/a.zip"
        );
    }

    #[test]
    fn cas_retries_never_drop_to_zero() {
        assert_eq!(UploadConfig::new().with_cas_retries(0).cas_retries, 1);
    }
}
