//! # Raster Graphics Command
//!
//! This module implements the raster bit image command accepted by the T02.
//!
//! ## Coordinate System
//!
//! ```text
//! (0,0) ──────────────────────► X (horizontal, 384 dots)
//!   │
//!   │   ████████  ← Each dot is ~0.125mm (203 DPI)
//!   │   ████████
//!   ▼
//!   Y (vertical, paper feed direction)
//! ```
//!
//! ## Bit Packing
//!
//! Graphics data is packed as bytes where each bit represents one dot:
//! - Bit 7 (MSB) = leftmost dot
//! - Bit 0 (LSB) = rightmost dot
//! - 1 = black (print), 0 = white (no print)
//!
//! ```text
//! Byte value 0xF0 = 11110000 = ████░░░░
//! Byte value 0x0F = 00001111 = ░░░░████
//! ```

use super::commands::{GS, u16_from_le, u16_le};

/// Fixed 4-byte raster command prefix: `GS v 0 m` with m = 0 (normal density).
pub const RASTER_PREFIX: [u8; 4] = [GS, b'v', b'0', 0x00];

/// Total header length: prefix + xL xH yL yH.
pub const RASTER_HEADER_LEN: usize = 8;

/// # Print Raster Bit Image (GS v 0 m xL xH yL yH d1...dk)
///
/// ## Protocol Details
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | GS v 0 m xL xH yL yH d1...dk |
/// | Hex     | 1D 76 30 00 xL xH yL yH d1...dk |
///
/// ## Parameters
///
/// - `xL, xH`: Width in bytes, little-endian
/// - `yL, yH`: Height in dots, little-endian
/// - `d1...dk`: Image data, k = width_bytes × height bytes
///
/// ```text
/// width_bytes = xL + (xH × 256)
/// height_dots = yL + (yH × 256)
///
/// Example: 48 bytes wide = [0x30, 0x00]
/// Example: 300 rows high = [0x2C, 0x01]
/// ```
///
/// ## Example
///
/// ```
/// use t02relay::protocol::graphics;
///
/// let data = vec![0xAA; 48 * 100];
/// let cmd = graphics::raster(48, 100, &data);
///
/// assert_eq!(&cmd[0..4], &[0x1D, 0x76, 0x30, 0x00]);
/// assert_eq!(cmd[4], 48);  // xL
/// assert_eq!(cmd[5], 0);   // xH
/// assert_eq!(cmd[6], 100); // yL
/// assert_eq!(cmd[7], 0);   // yH
/// assert_eq!(cmd.len(), 8 + 48 * 100);
/// ```
pub fn raster(width_bytes: u16, height: u16, data: &[u8]) -> Vec<u8> {
    debug_assert!(
        data.len() == width_bytes as usize * height as usize,
        "Raster data length mismatch. Expected {} ({} bytes × {} rows), got {}",
        width_bytes as usize * height as usize,
        width_bytes,
        height,
        data.len()
    );

    let [xl, xh] = u16_le(width_bytes);
    let [yl, yh] = u16_le(height);

    let mut cmd = Vec::with_capacity(RASTER_HEADER_LEN + data.len());
    cmd.extend_from_slice(&RASTER_PREFIX);
    cmd.extend_from_slice(&[xl, xh, yl, yh]);
    cmd.extend_from_slice(data);
    cmd
}

/// Parsed raster command header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterHeader {
    pub width_bytes: u16,
    pub height: u16,
}

/// Parse the header of a raster command.
///
/// Returns `None` if the bytes do not start with the raster prefix or are
/// too short to hold the dimensions.
pub fn parse_raster_header(cmd: &[u8]) -> Option<RasterHeader> {
    if cmd.len() < RASTER_HEADER_LEN || cmd[..4] != RASTER_PREFIX {
        return None;
    }
    Some(RasterHeader {
        width_bytes: u16_from_le([cmd[4], cmd[5]]),
        height: u16_from_le([cmd[6], cmd[7]]),
    })
}

// ============================================================================
// TESTS
// ============================================================================
