//! # Bitmap Encoding
//!
//! Builds the [`Program`] for one job from a [`MonochromeBitmap`].
//!
//! ## Slicing
//!
//! The printer's receive buffer holds a limited number of raster rows, so a
//! tall bitmap is cut by row into slices no taller than `slice_rows`:
//!
//! ```text
//! height 300, slice_rows 128
//!
//! Init │ Raster(0..128) │ Raster(128..256) │ Raster(256..300) │ Feed
//! ```
//!
//! Slicing is the only way a bitmap becomes several `Raster` ops.

use super::ops::{Op, Program};
use crate::error::{RelayError, Result};
use crate::printer::PrinterConfig;
use crate::render::MonochromeBitmap;

impl Program {
    /// Encode a bitmap with the printer's slice height and feed.
    pub fn from_bitmap(bitmap: &MonochromeBitmap, printer: &PrinterConfig) -> Result<Self> {
        Self::from_bitmap_sliced(bitmap, printer.max_slice_rows, printer.feed_lines)
    }

    /// Encode a bitmap as `Init`, raster slices of at most `slice_rows`
    /// rows, and one `Feed { lines: feed_lines }`.
    pub fn from_bitmap_sliced(
        bitmap: &MonochromeBitmap,
        slice_rows: u16,
        feed_lines: u8,
    ) -> Result<Self> {
        if slice_rows == 0 {
            return Err(RelayError::InvalidCommand(
                "slice height must be at least 1 row".to_string(),
            ));
        }
        let width_bytes = u16::try_from(bitmap.width_bytes()).map_err(|_| {
            RelayError::InvalidCommand(format!("bitmap too wide: {} dots", bitmap.width()))
        })?;

        let mut program = Program::with_init();
        let step = slice_rows as usize;
        let mut start = 0;
        while start < bitmap.height() {
            let end = (start + step).min(bitmap.height());
            program.push(Op::Raster {
                width_bytes,
                // end - start <= slice_rows, always fits
                height: (end - start) as u16,
                data: bitmap.rows(start, end).to_vec(),
            });
            start = end;
        }
        program.push(Op::Feed { lines: feed_lines });
        Ok(program)
    }
}

/// Encode with an optional slice height override.
pub fn encode(
    bitmap: &MonochromeBitmap,
    slice_height: Option<u16>,
    printer: &PrinterConfig,
) -> Result<Program> {
    Program::from_bitmap_sliced(
        bitmap,
        slice_height.unwrap_or(printer.max_slice_rows),
        printer.feed_lines,
    )
}
