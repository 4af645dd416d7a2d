//! # Monochrome Bitmap
//!
//! The single in-memory image format shared by the rasterizer, the text
//! layout engine and the protocol encoder.
//!
//! ## Memory Layout
//!
//! Rows are stored top to bottom. Each row occupies `width_bytes` bytes with
//! the leftmost dot in the most significant bit. Padding bits at the end of a
//! row are always 0.
//!
//! ```text
//! width = 12, width_bytes = 2
//!
//! row 0: [1100_1010] [1111_0000]   <- last 4 bits are padding
//! row 1: [0000_0000] [0000_0000]
//! ```

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, Luma};

use super::dither::pack_row;
use crate::error::{RelayError, Result};

/// 1-bit image, 1 = mark (black), 0 = blank (white).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonochromeBitmap {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl MonochromeBitmap {
    /// Create an all-white bitmap.
    ///
    /// Fails with [`RelayError::EmptyImage`] if either dimension is zero.
    pub fn new(width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RelayError::EmptyImage);
        }
        Ok(Self {
            width,
            height,
            data: vec![0; width.div_ceil(8) * height],
        })
    }

    /// Wrap already-packed row data.
    pub fn from_packed(width: usize, height: usize, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RelayError::EmptyImage);
        }
        let expected = width.div_ceil(8) * height;
        if data.len() != expected {
            return Err(RelayError::InvalidCommand(format!(
                "packed data is {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Build from per-pixel booleans in row-major order.
    pub fn from_pixels(width: usize, height: usize, pixels: &[bool]) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RelayError::EmptyImage);
        }
        debug_assert_eq!(pixels.len(), width * height);
        let data = pixels.chunks(width).flat_map(pack_row).collect();
        Self::from_packed(width, height, data)
    }

    /// Rebuild from a decoded gray image; anything darker than mid-gray is a mark.
    pub fn from_gray(gray: &GrayImage) -> Result<Self> {
        let (w, h) = (gray.width() as usize, gray.height() as usize);
        let pixels: Vec<bool> = gray.pixels().map(|p| p.0[0] < 128).collect();
        Self::from_pixels(w, h, &pixels)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Bytes per packed row.
    #[inline]
    pub fn width_bytes(&self) -> usize {
        self.width.div_ceil(8)
    }

    /// All packed rows.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Packed bytes of rows `start..end`.
    pub fn rows(&self, start: usize, end: usize) -> &[u8] {
        let wb = self.width_bytes();
        &self.data[start * wb..end * wb]
    }

    /// Packed bytes of a single row.
    pub fn row(&self, y: usize) -> &[u8] {
        self.rows(y, y + 1)
    }

    /// Read one dot. Out-of-range coordinates read as blank.
    pub fn get(&self, x: usize, y: usize) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let byte = self.data[y * self.width_bytes() + x / 8];
        byte & (0x80 >> (x % 8)) != 0
    }

    /// Set or clear one dot. Out-of-range writes are ignored.
    pub fn set(&mut self, x: usize, y: usize, mark: bool) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = y * self.width_bytes() + x / 8;
        let mask = 0x80 >> (x % 8);
        if mark {
            self.data[idx] |= mask;
        } else {
            self.data[idx] &= !mask;
        }
    }

    /// Number of marked dots.
    pub fn count_marks(&self) -> usize {
        self.data.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Expand to an 8-bit gray image (black = 0, white = 255).
    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            if self.get(x as usize, y as usize) {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    /// Encode as PNG for previews.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(self.to_gray_image())
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|e| RelayError::Decode(format!("PNG encode failed: {}", e)))?;
        Ok(out.into_inner())
    }
}
