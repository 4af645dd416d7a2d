//! HTTP handlers for the server.
//!
//! Failures are returned as `{"success": false, "error": "..."}` with a
//! status code chosen from the error kind:
//!
//! | Error | Status |
//! |-------|--------|
//! | `Decode`, `InvalidCommand` | 400 |
//! | `EmptyImage`, `EmptyContent` | 422 |
//! | `NotConnected` | 503 |
//! | `PeerSend`, `Transport`, `Cloud` | 502 |
//! | anything else | 500 |

pub mod control;
pub mod preview;
pub mod print;

use axum::{
    Json,
    extract::Multipart,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::RelayError;

/// Error response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        let status = match &err {
            RelayError::Decode(_) | RelayError::InvalidCommand(_) => StatusCode::BAD_REQUEST,
            RelayError::EmptyImage | RelayError::EmptyContent => StatusCode::UNPROCESSABLE_ENTITY,
            RelayError::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::PeerSend(_) | RelayError::Transport(_) | RelayError::Cloud(_) => {
                StatusCode::BAD_GATEWAY
            }
            RelayError::LinkTimeout | RelayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}

/// Image upload fields shared by the print and preview endpoints.
#[derive(Debug, Default)]
pub struct ImageForm {
    pub image: Vec<u8>,
    pub algorithm: Option<String>,
    pub threshold: Option<u8>,
}

impl ImageForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = ImageForm::default();
        let mut found = false;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("Multipart error: {}", e)))?
        {
            let name = field.name().unwrap_or("").to_string();
            match name.as_str() {
                "image" => {
                    let bytes = field.bytes().await.map_err(|e| {
                        ApiError::bad_request(format!("Failed to read image: {}", e))
                    })?;
                    form.image = bytes.to_vec();
                    found = true;
                }
                "algorithm" | "threshold" => {
                    let text = field.text().await.map_err(|e| {
                        ApiError::bad_request(format!("Failed to read {}: {}", name, e))
                    })?;
                    let text = text.trim();
                    if text.is_empty() {
                        continue;
                    }
                    if name == "algorithm" {
                        form.algorithm = Some(text.to_string());
                    } else {
                        form.threshold = Some(text.parse().map_err(|_| {
                            ApiError::bad_request(format!(
                                "threshold must be 0-255, got {:?}",
                                text
                            ))
                        })?);
                    }
                }
                _ => {}
            }
        }

        if !found {
            return Err(ApiError::bad_request("No image field found"));
        }
        Ok(form)
    }
}
