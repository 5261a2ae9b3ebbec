use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Shown to the user when the provider account has run out of conversion credits
pub const QUOTA_EXHAUSTED_MESSAGE: &str =
    "Out of CloudConvert credits. Check your account at cloudconvert.com/dashboard";

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Credential missing or refused
    #[error("{0}")]
    Auth(String),

    /// Remote account has no conversion credits left
    #[error("{0}")]
    Quota(String),

    /// Job rejected, upload/download failed, or the job ended in error
    #[error("{0}")]
    Job(String),

    #[error("Conversion did not finish after {attempts} status checks")]
    Timeout { attempts: u32 },
}

impl ProviderError {
    /// Classify a rejected job creation by the provider's message.
    pub fn from_rejection(message: Option<String>) -> Self {
        let message = message.unwrap_or_else(|| "Job creation failed".to_string());
        if message.to_lowercase().contains("credits") {
            Self::Quota(QUOTA_EXHAUSTED_MESSAGE.to_string())
        } else {
            Self::Job(message)
        }
    }
}

/// How long to wait for a remote job to reach a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay before each status check
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 60,
        }
    }
}

#[async_trait]
pub trait ConversionProvider: Send + Sync {
    /// Provider identifier (e.g., "cloudconvert")
    fn provider_id(&self) -> &'static str;

    /// Convert one local file and return the converted bytes
    async fn convert(&self, file_path: &Path, target_format: &str) -> Result<Bytes, ProviderError>;
}

pub mod cloudconvert;
pub mod types;
