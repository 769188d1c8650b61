//! Decoding of inbound frame uploads.
//!
//! A camera may send its frame either as a binary multipart file part or as
//! base64 text in a form field, both named `image`. The encoding is resolved
//! once here into [`ImageUpload`], and both variants yield plain bytes for
//! the shared ingestion path.

use crate::error::ApiError;
use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
    Form,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use std::collections::HashMap;

/// Form field carrying the image in either encoding
pub const IMAGE_FIELD: &str = "image";

/// An upload with its encoding resolved
#[derive(Debug, Clone, PartialEq)]
pub enum ImageUpload {
    /// Multipart file part
    Binary { file_name: String, data: Bytes },
    /// Base64 text, possibly a data URL
    Base64(String),
}

impl ImageUpload {
    /// Label used in logs and metrics
    pub fn encoding(&self) -> &'static str {
        match self {
            ImageUpload::Binary { .. } => "binary",
            ImageUpload::Base64(_) => "base64",
        }
    }

    /// Produce the raw image bytes.
    pub fn into_bytes(self) -> Result<Bytes, ApiError> {
        let data = match self {
            ImageUpload::Binary { data, .. } => data,
            ImageUpload::Base64(text) => Bytes::from(decode_base64_image(&text)?),
        };

        if data.is_empty() {
            return Err(ApiError::EmptyImage);
        }
        Ok(data)
    }

    /// Pick the encoding from whatever `image` fields a request carried.
    ///
    /// A file part takes precedence over a text field.
    pub fn resolve(
        binary: Option<(String, Bytes)>,
        text: Option<String>,
    ) -> Result<Self, ApiError> {
        match (binary, text) {
            (Some((file_name, data)), _) => {
                if file_name.is_empty() || data.is_empty() {
                    return Err(ApiError::EmptyImage);
                }
                Ok(ImageUpload::Binary { file_name, data })
            }
            (None, Some(text)) => Ok(ImageUpload::Base64(text)),
            (None, None) => Err(ApiError::MissingImage),
        }
    }

    async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut binary = None;
        let mut text = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::malformed(e.status(), e.body_text()))?
        {
            if field.name() != Some(IMAGE_FIELD) {
                continue;
            }

            match field.file_name().map(str::to_owned) {
                Some(file_name) => {
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::malformed(e.status(), e.body_text()))?;
                    if binary.is_none() {
                        binary = Some((file_name, data));
                    }
                }
                None => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| ApiError::malformed(e.status(), e.body_text()))?;
                    if text.is_none() {
                        text = Some(value);
                    }
                }
            }
        }

        Self::resolve(binary, text)
    }
}

#[async_trait]
impl<S> FromRequest<S> for ImageUpload
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::malformed(e.status(), e.body_text()))?;
            return Self::from_multipart(multipart).await;
        }

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(mut fields) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| ApiError::malformed(e.status(), e.body_text()))?;
            return Self::resolve(None, fields.remove(IMAGE_FIELD));
        }

        Err(ApiError::MissingImage)
    }
}

/// Decode base64 image text as sent by camera clients.
///
/// Accepts data URLs (`data:image/jpeg;base64,...`), strips line breaks and
/// turns spaces back into `+`, which unencoded form posts lose in transit.
pub fn decode_base64_image(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let payload = text
        .split_once(',')
        .map(|(_, data)| data)
        .unwrap_or(text)
        .trim();

    let normalized: String = payload
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('+'),
            '\r' | '\n' | '\t' => None,
            c => Some(c),
        })
        .collect();

    STANDARD.decode(normalized)
}
