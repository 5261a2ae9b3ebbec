use crate::services::archive::ArchiveError;
use crate::services::converter::ConversionError;
use crate::services::storage::StorageError;
use crate::utils::validation::ValidationError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Conversion(_)
            | AppError::Storage(_)
            | AppError::Archive(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::BadRequest(msg) | AppError::PayloadTooLarge(msg) => msg,
            AppError::Validation(e) => e.to_string(),
            AppError::Conversion(ConversionError::Storage(e)) | AppError::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                "Failed to store files".to_string()
            }
            AppError::Conversion(e) => {
                tracing::error!("Conversion error: {}", e);
                e.to_string()
            }
            AppError::Archive(e) => {
                tracing::error!("Archive error: {}", e);
                "Failed to build archive".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal Server Error".to_string()
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::conversion_provider::ProviderError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::from(ValidationError::NoFiles).status(),
            StatusCode::BAD_REQUEST
        );
        let quota = ConversionError::Provider(ProviderError::from_rejection(Some(
            "no credits left".to_string(),
        )));
        assert_eq!(
            AppError::from(quota).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::PayloadTooLarge("too big".to_string()).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }
}
