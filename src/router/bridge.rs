//! Base64 image payloads from the embedded web layer and the cloud relay.
//!
//! Both carry an encoded image plus a [`RenderKind`] tag. `text_render`
//! payloads are already portrait banners, so auto-rotation is turned off.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use super::job::RenderKind;
use crate::error::{RelayError, Result};
use crate::printer::PrinterConfig;
use crate::render::{RasterOptions, Rasterized, rasterize_bytes};

/// Inbound message from the embedded web layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeMessage {
    pub base64: String,
    #[serde(rename = "type", default)]
    pub kind: RenderKind,
}

/// Decode base64 image data.
///
/// Whitespace is ignored, as is a `data:<mime>;base64,` prefix.
pub fn decode_base64(input: &str) -> Result<Vec<u8>> {
    let body = match input.find(";base64,") {
        Some(pos) if input.starts_with("data:") => &input[pos + ";base64,".len()..],
        _ => input,
    };
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(RelayError::Decode("empty base64 payload".to_string()));
    }
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| RelayError::Decode(format!("invalid base64: {}", e)))
}

/// Rasterize a tagged image payload.
pub fn render_payload(
    base64: &str,
    kind: RenderKind,
    options: &RasterOptions,
    printer: &PrinterConfig,
) -> Result<Rasterized> {
    let bytes = decode_base64(base64)?;
    let options = RasterOptions {
        auto_rotate: options.auto_rotate && kind.auto_rotate(),
        ..*options
    };
    rasterize_bytes(&bytes, &options, printer)
}
