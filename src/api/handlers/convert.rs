use crate::AppState;
use crate::api::error::AppError;
use crate::models::ConversionRequest;
use crate::services::archive::build_archive;
use crate::services::storage::{StorageError, UploadedFile};
use axum::{
    body::Body,
    extract::{Multipart, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::Response,
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;
use utoipa::ToSchema;

/// Name of the downloaded archive
pub const ARCHIVE_FILENAME: &str = "converted.zip";

/// Multipart body of `POST /convert`
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct ConvertForm {
    /// One or more binary file parts, all named `files`
    files: Vec<String>,
    /// Target format, case-insensitive. Defaults to `pdf`.
    #[schema(example = "pdf")]
    format: Option<String>,
}

#[utoipa::path(
    post,
    path = "/convert",
    request_body(content = ConvertForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "ZIP archive of the converted files", body = Vec<u8>, content_type = "application/zip"),
        (status = 400, description = "No files supplied or invalid format", body = ErrorResponse),
        (status = 413, description = "Request body exceeds the upload limit", body = ErrorResponse),
        (status = 500, description = "Conversion failed", body = ErrorResponse)
    ),
    tag = "convert"
)]
pub async fn convert_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut files: Vec<UploadedFile> = Vec::new();
    let mut format_field: Option<String> = None;

    let parsed: Result<(), AppError> = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(&e))?
        {
            let name = field.name().unwrap_or_default().to_string();

            match name.as_str() {
                "files" => {
                    let original_name = match field.file_name() {
                        // Browsers send an empty part when nothing was picked
                        Some("") => continue,
                        Some(n) => n.to_string(),
                        None => {
                            tracing::debug!("Ignoring 'files' part without a filename");
                            continue;
                        }
                    };
                    let reader = StreamReader::new(field.map_err(std::io::Error::other));
                    let uploaded = state
                        .storage
                        .persist_upload(reader, &original_name)
                        .await
                        .map_err(upload_error)?;
                    files.push(uploaded);
                }
                "format" => {
                    format_field = Some(field.text().await.map_err(|e| multipart_error(&e))?);
                }
                other => {
                    tracing::debug!("Ignoring unexpected form field '{}'", other);
                }
            }
        }
        Ok(())
    }
    .await;

    if let Err(e) = parsed {
        tracing::warn!("Convert request failed while reading upload: {}. Consuming remaining stream...", e);
        while let Ok(Some(mut field)) = multipart.next_field().await {
            while let Ok(Some(_)) = field.chunk().await {}
        }
        release_all(files).await;
        return Err(e);
    }

    let raw_format = format_field
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or(&state.config.default_format);

    // On rejection the uploads are dropped, which deletes them
    let request = ConversionRequest::new(files, raw_format)?;

    let request_id = state.storage.new_request_id();
    tracing::info!(
        "[{}] Converting {} file(s) to {}",
        request_id,
        request.file_count(),
        request.format()
    );

    let staging = state.converter.convert_batch(&request_id, request).await?;

    let archive = build_archive(&staging).await;
    staging.discard().await;
    let archive = archive?;

    tracing::info!(
        "[{}] Sending archive with {} entries ({} bytes)",
        request_id,
        archive.entries().len(),
        archive.size()
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={}", ARCHIVE_FILENAME),
        )
        .header(header::CONTENT_LENGTH, archive.size())
        .body(Body::from_stream(archive.into_stream()))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

fn multipart_error(e: &MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(e.body_text())
    }
}

/// A body error hit while copying a part to disk is a client error, not a storage one.
fn upload_error(e: StorageError) -> AppError {
    let from_body = match &e {
        StorageError::Io { source, .. } => source
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<MultipartError>())
            .map(multipart_error),
    };
    from_body.unwrap_or_else(|| e.into())
}

async fn release_all(files: Vec<UploadedFile>) {
    for file in files {
        file.release().await;
    }
}
