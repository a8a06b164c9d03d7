use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use crate::error::{Result, ShortgenError};
use crate::upload::ErrorKind;

/// Resumable upload chunks must be a multiple of this many bytes (except the last one).
pub const CHUNK_GRANULARITY: u64 = 256 * 1024;

/// Access tokens live about an hour; a margin beyond a day is a typo.
pub const MAX_REFRESH_MARGIN_SECS: i64 = 24 * 60 * 60;

fn default_error_reasons() -> BTreeMap<String, ErrorKind> {
    [
        ("quotaExceeded", ErrorKind::QuotaExceeded),
        ("dailyLimitExceeded", ErrorKind::QuotaExceeded),
        ("uploadLimitExceeded", ErrorKind::QuotaExceeded),
        ("rateLimitExceeded", ErrorKind::Transport),
        ("userRateLimitExceeded", ErrorKind::Transport),
        ("backendError", ErrorKind::Transport),
        ("forbidden", ErrorKind::Auth),
        ("insufficientPermissions", ErrorKind::Auth),
        ("authError", ErrorKind::Auth),
        ("invalidTitle", ErrorKind::Session),
        ("invalidDescription", ErrorKind::Session),
        ("invalidCategoryId", ErrorKind::Session),
    ]
    .into_iter()
    .map(|(reason, kind)| (reason.to_string(), kind))
    .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Length of the clip taken from the end of the source, in seconds
    pub duration_secs: u32,
    /// Output frame width
    pub width: u32,
    /// Output frame height
    pub height: u32,
    /// Gaussian blur sigma for the background layer
    pub blur_sigma: u32,
    /// Additional encoding options appended before the output path
    /// Common options: ["-preset", "medium", "-crf", "23"]
    pub encode_options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Base URL for resumable media uploads
    pub upload_base_url: String,
    /// Base URL for public watch links
    pub watch_url_base: String,
    /// Bytes sent per chunk; must be a multiple of 256 KiB
    pub chunk_size: u64,
    /// Upper bound for a single request round-trip, in seconds
    pub request_timeout_secs: u64,
    /// Backoff policy for retryable failures of a single request
    pub retry: RetryConfig,
    /// Full-session retries the orchestrator may attempt after a retryable failure
    pub session_retries: u32,
    /// Category used when none is given
    pub default_category: String,
    /// Tags used when none are given
    pub default_tags: Vec<String>,
    /// API error reason code -> error classification
    pub error_reasons: BTreeMap<String, ErrorKind>,
    /// Draw a progress bar while uploading
    pub show_progress: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries allowed for one request before giving up
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Cap for any single delay, in milliseconds
    pub max_delay_ms: u64,
    /// Random spread applied to each delay, as a fraction (0.3 = ±30%)
    pub jitter: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth client descriptor downloaded from the Google Cloud Console
    pub credentials_path: PathBuf,
    /// Where the token is persisted; defaults to `token.json` next to the descriptor
    pub token_store_path: Option<PathBuf>,
    /// Refresh the access token when it expires within this many seconds
    pub refresh_margin_secs: i64,
    /// Whether a browser consent flow may be started
    pub interactive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Units available per quota day
    pub daily_cap: u64,
    /// Offset from UTC, in hours, at which the quota day rolls over
    pub reset_utc_offset_hours: i32,
    /// Optional file used to share the ledger between runs
    pub ledger_path: Option<PathBuf>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            duration_secs: 30,
            width: 1080,
            height: 1920,
            blur_sigma: 20,
            encode_options: vec![
                "-preset".to_string(), "medium".to_string(),
                "-crf".to_string(), "23".to_string(),
            ],
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            upload_base_url: "https://www.googleapis.com/upload/youtube/v3".to_string(),
            watch_url_base: "https://www.youtube.com/shorts".to_string(),
            chunk_size: 4 * CHUNK_GRANULARITY,
            request_timeout_secs: 120,
            retry: RetryConfig::default(),
            session_retries: 1,
            default_category: "22".to_string(),
            default_tags: vec!["Shorts".to_string(), "YouTube Shorts".to_string()],
            error_reasons: default_error_reasons(),
            show_progress: true,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 32_000,
            jitter: 0.3,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from("client_secrets.json"),
            token_store_path: None,
            refresh_margin_secs: 60,
            interactive: true,
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_cap: 10_000,
            reset_utc_offset_hours: -8,
            ledger_path: Some(PathBuf::from(".shortgen").join("quota.json")),
        }
    }
}

impl AuthConfig {
    /// Resolve the token store location.
    pub fn token_store_path(&self) -> PathBuf {
        match &self.token_store_path {
            Some(path) => path.clone(),
            None => self
                .credentials_path
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join("token.json"),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ShortgenError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ShortgenError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ShortgenError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ShortgenError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Reject values the upload protocol or the quota model cannot work with.
    pub fn validate(&self) -> Result<()> {
        let chunk = self.upload.chunk_size;
        if chunk == 0 || chunk % CHUNK_GRANULARITY != 0 {
            return Err(ShortgenError::Config(format!(
                "upload.chunk_size must be a positive multiple of {} bytes, got {}",
                CHUNK_GRANULARITY, chunk
            )));
        }
        if self.upload.request_timeout_secs == 0 {
            return Err(ShortgenError::Config(
                "upload.request_timeout_secs must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.upload.retry.jitter) {
            return Err(ShortgenError::Config(format!(
                "upload.retry.jitter must be in [0, 1), got {}",
                self.upload.retry.jitter
            )));
        }
        if self.quota.daily_cap == 0 {
            return Err(ShortgenError::Config("quota.daily_cap must be positive".to_string()));
        }
        if !(-12..=14).contains(&self.quota.reset_utc_offset_hours) {
            return Err(ShortgenError::Config(format!(
                "quota.reset_utc_offset_hours out of range: {}",
                self.quota.reset_utc_offset_hours
            )));
        }
        if !(0..=MAX_REFRESH_MARGIN_SECS).contains(&self.auth.refresh_margin_secs) {
            return Err(ShortgenError::Config(format!(
                "auth.refresh_margin_secs must be between 0 and {}, got {}",
                MAX_REFRESH_MARGIN_SECS, self.auth.refresh_margin_secs
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[upload]
chunk_size = 1048576

[upload.error_reasons]
rateLimitExceeded = "quota_exceeded"

[quota]
daily_cap = 5000
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.upload.chunk_size, 1_048_576);
        assert_eq!(config.quota.daily_cap, 5000);
        assert_eq!(config.media.binary_path, "ffmpeg");
        assert_eq!(
            config.upload.error_reasons.get("rateLimitExceeded"),
            Some(&ErrorKind::QuotaExceeded)
        );
    }

    #[test]
    fn test_chunk_size_must_be_aligned() {
        let mut config = Config::default();
        config.upload.chunk_size = 1_000_000;
        assert!(matches!(config.validate(), Err(ShortgenError::Config(_))));
    }

    #[test]
    fn test_refresh_margin_is_bounded() {
        let mut config = Config::default();
        config.auth.refresh_margin_secs = i64::MAX;
        assert!(matches!(config.validate(), Err(ShortgenError::Config(_))));
        config.auth.refresh_margin_secs = -1;
        assert!(matches!(config.validate(), Err(ShortgenError::Config(_))));
        config.auth.refresh_margin_secs = MAX_REFRESH_MARGIN_SECS;
        config.validate().unwrap();
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.quota.daily_cap = 1234;
        config.save_to_file(&path).unwrap();

        let reloaded = Config::from_file(&path).unwrap();
        assert_eq!(reloaded.quota.daily_cap, 1234);
        assert_eq!(reloaded.upload.default_tags, config.upload.default_tags);
    }

    #[test]
    fn test_token_store_defaults_next_to_descriptor() {
        let auth = AuthConfig {
            credentials_path: PathBuf::from("/etc/shortgen/client_secrets.json"),
            ..AuthConfig::default()
        };
        assert_eq!(auth.token_store_path(), PathBuf::from("/etc/shortgen/token.json"));
    }
}
