use crate::blob_store::BlobStoreError;
use crate::ingest::IngestError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Errors surfaced by the HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No image data found")]
    MissingImage,

    #[error("No image selected")]
    EmptyImage,

    #[error("Invalid base64 image data: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("Image data is not a JPEG")]
    NotJpeg,

    #[error("Malformed upload: {message}")]
    MalformedUpload { status: StatusCode, message: String },

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("No image uploaded yet")]
    NoFrameYet,

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[source] BlobStoreError),
}

impl ApiError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingImage
            | ApiError::EmptyImage
            | ApiError::InvalidBase64(_)
            | ApiError::NotJpeg
            | ApiError::InvalidFilename(_) => StatusCode::BAD_REQUEST,
            ApiError::MalformedUpload { status, .. } => *status,
            ApiError::NoFrameYet | ApiError::ImageNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MissingImage => "MISSING_IMAGE",
            ApiError::EmptyImage => "EMPTY_IMAGE",
            ApiError::InvalidBase64(_) => "INVALID_BASE64",
            ApiError::NotJpeg => "NOT_JPEG",
            ApiError::MalformedUpload { status, .. } if *status == StatusCode::PAYLOAD_TOO_LARGE => {
                "PAYLOAD_TOO_LARGE"
            }
            ApiError::MalformedUpload { .. } => "MALFORMED_UPLOAD",
            ApiError::InvalidFilename(_) => "INVALID_FILENAME",
            ApiError::NoFrameYet => "NO_FRAME_YET",
            ApiError::ImageNotFound(_) => "NOT_FOUND",
            ApiError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Build a malformed-upload error, clamping non-client statuses to 400.
    pub fn malformed(status: StatusCode, message: impl Into<String>) -> Self {
        let status = if status.is_client_error() {
            status
        } else {
            StatusCode::BAD_REQUEST
        };

        ApiError::MalformedUpload {
            status,
            message: message.into(),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::EmptyImage => ApiError::EmptyImage,
            IngestError::NotJpeg => ApiError::NotJpeg,
            IngestError::Storage(e) => ApiError::Storage(e),
        }
    }
}

impl From<BlobStoreError> for ApiError {
    fn from(e: BlobStoreError) -> Self {
        match e {
            BlobStoreError::InvalidFilename(name) => ApiError::InvalidFilename(name),
            BlobStoreError::NotFound(name) => ApiError::ImageNotFound(name),
            e @ BlobStoreError::Io(_) => ApiError::Storage(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal details stay in the logs
        let message = match &self {
            ApiError::Storage(e) => {
                error!(error = %e, "Storage failure");
                "Failed to store or read image".to_string()
            }
            ApiError::NoFrameYet | ApiError::ImageNotFound(_) => self.to_string(),
            other => {
                warn!(code = other.code(), error = %other, "Rejected request");
                other.to_string()
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: message,
                code: self.code().to_string(),
            }),
        )
            .into_response()
    }
}
