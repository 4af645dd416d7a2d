//! PNG previews. Nothing is printed; `x-rotated` tells the UI whether the
//! image was turned to portrait.

use axum::{
    Json,
    extract::{Multipart, State},
    http::header,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::render::MonochromeBitmap;
use crate::text::TextOptions;

use super::super::state::AppState;
use super::{ApiError, ImageForm};

/// Response header carrying the rotation flag.
pub const ROTATED_HEADER: &str = "x-rotated";

fn png_response(bitmap: &MonochromeBitmap, rotated: bool) -> Result<Response, ApiError> {
    let png = bitmap.to_png()?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/png"),
            (
                header::HeaderName::from_static(ROTATED_HEADER),
                if rotated { "true" } else { "false" },
            ),
        ],
        png,
    )
        .into_response())
}

/// POST /api/preview/image
pub async fn image(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let form = ImageForm::read(multipart).await?;
    let options = state
        .relay
        .raster_options(form.algorithm.as_deref(), form.threshold);
    let raster = state.relay.render_image(form.image, options).await?;
    png_response(&raster.bitmap, raster.rotated)
}

/// POST /api/preview/text
pub async fn text(
    State(state): State<Arc<AppState>>,
    Json(options): Json<TextOptions>,
) -> Result<Response, ApiError> {
    let layout = state.relay.render_text(options).await?;
    png_response(&layout.bitmap, false)
}

/// GET /api/preview/last - bitmap of the most recently submitted job.
pub async fn last(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let preview = state
        .relay
        .last_preview()
        .ok_or_else(|| ApiError::not_found("No job submitted yet"))?;
    png_response(&preview.bitmap, preview.rotated)
}
