use super::types::{ApiEnvelope, Job, JobState, UploadForm};
use super::{ConversionProvider, PollPolicy, ProviderError};
use crate::config::ConverterConfig;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response, StatusCode};
use serde_json::{Value, json};
use std::path::Path;
use tokio_util::io::ReaderStream;

/// CloudConvert v2 client: create job, upload, poll, download.
///
/// Each call to [`ConversionProvider::convert`] runs one three-task job
/// (`import/upload` → `convert` → `export/url`) and throws it away afterwards.
pub struct CloudConvertProvider {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    poll: PollPolicy,
}

impl CloudConvertProvider {
    pub fn new(base_url: &str, api_key: Option<String>, poll: PollPolicy) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            poll,
        }
    }

    pub fn from_config(config: &ConverterConfig) -> Self {
        Self::new(
            &config.api_base_url,
            config.api_key.clone(),
            PollPolicy {
                interval: config.poll_interval(),
                max_attempts: config.max_poll_attempts,
            },
        )
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Auth("CloudConvert API key is not configured".to_string()))
    }

    async fn create_job(&self, api_key: &str, target_format: &str) -> Result<Job, ProviderError> {
        let body = json!({
            "tasks": {
                "upload": { "operation": "import/upload" },
                "convert": {
                    "operation": "convert",
                    "input": ["upload"],
                    "output_format": target_format
                },
                "export": { "operation": "export/url", "input": ["convert"] }
            }
        });

        let response = self
            .http
            .post(format!("{}/jobs", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Job(format!("Job creation request failed: {}", e)))?;
        check_auth(&response)?;

        let envelope: ApiEnvelope<Job> = response
            .json()
            .await
            .map_err(|e| ProviderError::Job(format!("Invalid job creation response: {}", e)))?;

        match envelope.data {
            Some(job) => Ok(job),
            None => {
                tracing::warn!(
                    "CloudConvert rejected job creation: code={:?} message={:?}",
                    envelope.code,
                    envelope.message
                );
                Err(ProviderError::from_rejection(envelope.message))
            }
        }
    }

    async fn upload_source(&self, form: &UploadForm, file_path: &Path) -> Result<(), ProviderError> {
        let file = tokio::fs::File::open(file_path)
            .await
            .map_err(|e| ProviderError::Job(format!("Failed to open source file: {}", e)))?;
        let length = file
            .metadata()
            .await
            .map_err(|e| ProviderError::Job(format!("Failed to read source file: {}", e)))?
            .len();

        let file_name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        let mut multipart = Form::new();
        for (key, value) in &form.parameters {
            multipart = multipart.text(key.clone(), form_value(value));
        }
        let part = Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), length)
            .file_name(file_name)
            .mime_str(mime::APPLICATION_OCTET_STREAM.as_ref())
            .map_err(|e| ProviderError::Job(format!("Upload failed: {}", e)))?;
        multipart = multipart.part("file", part);

        let response = self
            .http
            .post(&form.url)
            .multipart(multipart)
            .send()
            .await
            .map_err(|e| ProviderError::Job(format!("Upload failed: {}", e)))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(ProviderError::Job(format!("Upload failed with status {}", status)));
        }
        Ok(())
    }

    async fn fetch_job(&self, api_key: &str, job_id: &str) -> Result<Job, ProviderError> {
        let response = self
            .http
            .get(format!("{}/jobs/{}", self.base_url, job_id))
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Job(format!("Job status request failed: {}", e)))?;
        check_auth(&response)?;

        let envelope: ApiEnvelope<Job> = response
            .json()
            .await
            .map_err(|e| ProviderError::Job(format!("Invalid job status response: {}", e)))?;

        envelope.data.ok_or_else(|| {
            ProviderError::Job(
                envelope
                    .message
                    .unwrap_or_else(|| "Job status unavailable".to_string()),
            )
        })
    }

    /// Poll until the job is terminal. Returns the export download URL.
    async fn wait_for_completion(&self, api_key: &str, job_id: &str) -> Result<String, ProviderError> {
        for attempt in 1..=self.poll.max_attempts {
            tokio::time::sleep(self.poll.interval).await;

            let job = self.fetch_job(api_key, job_id).await?;
            match JobState::from_job(&job) {
                JobState::Finished { download_url } => {
                    tracing::info!("Job {} finished after {} status checks", job_id, attempt);
                    return Ok(download_url);
                }
                JobState::Error { message } => {
                    tracing::warn!("Job {} failed on status check {}: {}", job_id, attempt, message);
                    return Err(ProviderError::Job(message));
                }
                state => {
                    tracing::debug!("Job {} status check {}: {:?}", job_id, attempt, state);
                }
            }
        }

        Err(ProviderError::Timeout {
            attempts: self.poll.max_attempts,
        })
    }

    async fn download(&self, url: &str) -> Result<Bytes, ProviderError> {
        self.http
            .get(url)
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(|e| ProviderError::Job(format!("Download failed: {}", e)))?
            .bytes()
            .await
            .map_err(|e| ProviderError::Job(format!("Download failed: {}", e)))
    }
}

#[async_trait]
impl ConversionProvider for CloudConvertProvider {
    fn provider_id(&self) -> &'static str {
        "cloudconvert"
    }

    async fn convert(&self, file_path: &Path, target_format: &str) -> Result<Bytes, ProviderError> {
        let api_key = self.api_key()?;

        let job = self.create_job(api_key, target_format).await?;
        tracing::info!("Created CloudConvert job {} (→ {})", job.id, target_format);

        let form = job
            .upload_form()
            .ok_or_else(|| ProviderError::Job("Job has no upload target".to_string()))?;
        self.upload_source(form, file_path).await?;

        let download_url = self.wait_for_completion(api_key, &job.id).await?;
        let bytes = self.download(&download_url).await?;
        tracing::info!("Job {} produced {} bytes", job.id, bytes.len());

        Ok(bytes)
    }
}

fn check_auth(response: &Response) -> Result<(), ProviderError> {
    match response.status() {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ProviderError::Auth(format!(
            "CloudConvert rejected the API key ({})",
            response.status()
        ))),
        _ => Ok(()),
    }
}

/// Form parameters are sent as plain strings; JSON strings lose their quotes.
fn form_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_value() {
        assert_eq!(form_value(&json!("abc")), "abc");
        assert_eq!(form_value(&json!(42)), "42");
        assert_eq!(form_value(&json!(true)), "true");
    }

    #[tokio::test]
    async fn test_missing_api_key_is_auth_error() {
        let provider = CloudConvertProvider::new("http://127.0.0.1:9", None, PollPolicy::default());
        let err = provider
            .convert(Path::new("/nonexistent"), "pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Auth(_)));
    }
}
