//! Print endpoints. Each returns the job receipt on delivery.

use axum::{
    Json,
    extract::{Multipart, State},
};
use std::sync::Arc;

use crate::relay::JobReceipt;
use crate::router::BridgeMessage;
use crate::text::TextOptions;

use super::super::state::AppState;
use super::{ApiError, ImageForm};

/// POST /api/print/image - multipart `image`, optional `algorithm` and `threshold`.
pub async fn image(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<JobReceipt>, ApiError> {
    let form = ImageForm::read(multipart).await?;
    let receipt = state
        .relay
        .submit_image(form.image, form.algorithm.as_deref(), form.threshold)
        .await?;
    Ok(Json(receipt))
}

/// POST /api/print/text
pub async fn text(
    State(state): State<Arc<AppState>>,
    Json(options): Json<TextOptions>,
) -> Result<Json<JobReceipt>, ApiError> {
    Ok(Json(state.relay.submit_text(options).await?))
}

/// POST /api/bridge - `{ "base64": "...", "type": "image_render" | "text_render" }`
pub async fn bridge(
    State(state): State<Arc<AppState>>,
    Json(message): Json<BridgeMessage>,
) -> Result<Json<JobReceipt>, ApiError> {
    Ok(Json(state.relay.submit_bridge_message(message).await?))
}
