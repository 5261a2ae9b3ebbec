use crate::models::ConversionRequest;
use crate::services::conversion_provider::{ConversionProvider, ProviderError};
use crate::services::storage::{StagingArea, StorageError, TransientStorage, UploadedFile};
use crate::utils::validation::output_base_name;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Converts every upload of one request, one remote job at a time.
pub struct BatchConverter {
    storage: Arc<TransientStorage>,
    provider: Arc<dyn ConversionProvider>,
}

impl BatchConverter {
    pub fn new(storage: Arc<TransientStorage>, provider: Arc<dyn ConversionProvider>) -> Self {
        Self { storage, provider }
    }

    pub fn provider_id(&self) -> &'static str {
        self.provider.provider_id()
    }

    /// Convert all files into a fresh staging area keyed by `request_id`.
    ///
    /// The first failure aborts the batch: the staging area and every upload not yet
    /// released are removed before the error is returned. On success every upload has
    /// been released and the staging area holds one entry per input.
    pub async fn convert_batch(
        &self,
        request_id: &str,
        request: ConversionRequest,
    ) -> Result<StagingArea, ConversionError> {
        let (files, format) = request.into_parts();
        let total = files.len();

        let mut staging = match self.storage.create_staging_area(request_id).await {
            Ok(staging) => staging,
            Err(e) => {
                release_all(files).await;
                return Err(e.into());
            }
        };

        let mut pending = files.into_iter();
        let mut index = 0;
        while let Some(file) = pending.next() {
            index += 1;
            tracing::info!(
                "[{}] Converting {}/{}: '{}' → {}",
                request_id,
                index,
                total,
                file.original_name(),
                format
            );

            let outcome = self
                .convert_one(&mut staging, &file, format.as_str())
                .await;
            file.release().await;

            if let Err(e) = outcome {
                tracing::error!("[{}] Batch aborted at file {}/{}: {}", request_id, index, total, e);
                release_all(pending).await;
                staging.discard().await;
                return Err(e);
            }
        }

        let staged_bytes: u64 = staging.entries().iter().map(|e| e.size).sum();
        tracing::info!(
            "[{}] Converted {} file(s) to {} ({} bytes staged)",
            staging.request_id(),
            total,
            format,
            staged_bytes
        );
        Ok(staging)
    }

    async fn convert_one(
        &self,
        staging: &mut StagingArea,
        file: &UploadedFile,
        format: &str,
    ) -> Result<String, ConversionError> {
        let bytes = self.provider.convert(file.path(), format).await?;
        let base_name = output_base_name(file.original_name());
        let stored = self
            .storage
            .write_converted_file(staging, &base_name, format, &bytes)
            .await?;
        Ok(stored)
    }
}

async fn release_all(files: impl IntoIterator<Item = UploadedFile>) {
    for file in files {
        file.release().await;
    }
}
