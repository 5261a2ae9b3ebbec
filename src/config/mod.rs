use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the conversion service
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// CloudConvert API key. Requests fail with an auth error when unset.
    pub api_key: Option<String>,

    /// CloudConvert API base URL (default: "https://api.cloudconvert.com/v2")
    pub api_base_url: String,

    /// Root directory for incoming uploads (default: "./uploads")
    pub uploads_dir: PathBuf,

    /// Root directory for per-request output staging (default: "./output")
    pub output_dir: PathBuf,

    /// Maximum request body size in bytes (default: 256 MB)
    pub max_file_size: usize,

    /// Delay before each job status poll in milliseconds (default: 2000)
    pub poll_interval_ms: u64,

    /// Maximum number of job status polls (default: 60)
    pub max_poll_attempts: u32,

    /// Target format used when the client sends none (default: "pdf")
    pub default_format: String,

    /// Scratch entries older than this are swept by the background worker (default: 24)
    pub staging_cleanup_age_hours: u64,

    /// Allowed CORS origins (comma separated). Empty allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: "https://api.cloudconvert.com/v2".to_string(),
            uploads_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("output"),
            max_file_size: 256 * 1024 * 1024, // 256 MB
            poll_interval_ms: 2000,
            max_poll_attempts: 60,
            default_format: "pdf".to_string(),
            staging_cleanup_age_hours: 24,
            allowed_origins: Vec::new(),
        }
    }
}

impl ConverterConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            api_key: env::var("CLOUDCONVERT_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty()),

            api_base_url: env::var("CLOUDCONVERT_API_URL").unwrap_or(default.api_base_url),

            uploads_dir: env::var("UPLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.uploads_dir),

            output_dir: env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.output_dir),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            poll_interval_ms: env::var("POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.poll_interval_ms),

            max_poll_attempts: env::var("MAX_POLL_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_poll_attempts),

            default_format: env::var("DEFAULT_FORMAT")
                .map(|v| v.trim().to_lowercase())
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(default.default_format),

            staging_cleanup_age_hours: env::var("STAGING_CLEANUP_AGE_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.staging_cleanup_age_hours),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(default.allowed_origins),
        }
    }

    /// Config for local runs and tests: scratch roots under the given directory,
    /// fast polling.
    pub fn development(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            api_key: Some("dev-key".to_string()),
            uploads_dir: root.join("uploads"),
            output_dir: root.join("output"),
            poll_interval_ms: 10,
            ..Self::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn staging_max_age(&self) -> Duration {
        Duration::from_secs(self.staging_cleanup_age_hours * 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConverterConfig::default();
        assert_eq!(config.max_file_size, 256 * 1024 * 1024);
        assert_eq!(config.max_poll_attempts, 60);
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.default_format, "pdf");
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_development_config() {
        let config = ConverterConfig::development("/tmp/fcb");
        assert_eq!(config.uploads_dir, PathBuf::from("/tmp/fcb/uploads"));
        assert_eq!(config.output_dir, PathBuf::from("/tmp/fcb/output"));
        assert!(config.api_key.is_some());
        assert_eq!(config.max_poll_attempts, 60);
    }

    #[test]
    fn test_staging_max_age() {
        let config = ConverterConfig {
            staging_cleanup_age_hours: 2,
            ..ConverterConfig::default()
        };
        assert_eq!(config.staging_max_age(), Duration::from_secs(7200));
    }
}
