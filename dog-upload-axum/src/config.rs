use std::path::PathBuf;
use std::time::Duration;

use dog_upload::UploadConfig;

struct ServerDefaults;

impl ServerDefaults {
    const HOST: &'static str = "127.0.0.1";
    const PORT: u16 = 3030;
    const STORAGE_ROOT: &'static str = "./data/files";
    const PUBLIC_BASE_URL: &'static str = "/files";
    const REAPER_INTERVAL_SECS: u64 = 60;
}

/// Server settings read from `UPLOAD_*` environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Root of the local storage driver
    pub storage_root: PathBuf,
    /// When set, sessions are persisted as JSON documents here
    pub session_dir: Option<PathBuf>,
    pub public_base_url: String,
    pub chunk_size: u64,
    pub max_upload_bytes: u64,
    pub session_ttl: Duration,
    pub reaper_interval: Duration,
    pub allowed_mime_types: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Absent or unparsable values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let engine = UploadConfig::default();
        let parsed = |key: &str, default: u64| -> u64 {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            host: text("UPLOAD_HTTP_HOST").unwrap_or_else(|| ServerDefaults::HOST.to_string()),
            port: lookup("UPLOAD_HTTP_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(ServerDefaults::PORT),
            storage_root: text("UPLOAD_STORAGE_ROOT")
                .unwrap_or_else(|| ServerDefaults::STORAGE_ROOT.to_string())
                .into(),
            session_dir: text("UPLOAD_SESSION_DIR").map(PathBuf::from),
            public_base_url: text("UPLOAD_PUBLIC_BASE_URL")
                .unwrap_or_else(|| ServerDefaults::PUBLIC_BASE_URL.to_string()),
            chunk_size: parsed("UPLOAD_CHUNK_SIZE", engine.chunk_size).max(1),
            max_upload_bytes: parsed("UPLOAD_MAX_BYTES", engine.max_upload_bytes),
            session_ttl: Duration::from_secs(parsed(
                "UPLOAD_SESSION_TTL_SECS",
                engine.session_ttl.as_secs(),
            )),
            reaper_interval: Duration::from_secs(
                parsed("UPLOAD_REAPER_INTERVAL_SECS", ServerDefaults::REAPER_INTERVAL_SECS).max(1),
            ),
            allowed_mime_types: text("UPLOAD_ALLOWED_MIME")
                .map(|v| {
                    v.split(',')
                        .map(|m| m.trim().to_ascii_lowercase())
                        .filter(|m| !m.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Engine configuration derived from these settings
    pub fn upload_config(&self) -> UploadConfig {
        self.allowed_mime_types.iter().fold(
            UploadConfig::new()
                .with_chunk_size(self.chunk_size)
                .with_max_upload_bytes(self.max_upload_bytes)
                .with_session_ttl(self.session_ttl)
                .with_public_base_url(self.public_base_url.clone()),
            |config, mime| config.allow_mime_type(mime.clone()),
        )
    }

    /// Mount point for serving finished files, when the public URL is a local path
    pub fn file_mount(&self) -> Option<&str> {
        let base = self.public_base_url.trim_end_matches('/');
        (base.starts_with('/') && base.len() > 1).then_some(base)
    }
}
