//! # Dithering
//!
//! Converts a grayscale buffer (0.0 = black, 255.0 = white) into a 1-bit
//! [`MonochromeBitmap`] for the thermal head.
//!
//! ## Algorithms
//!
//! | Algorithm | Names accepted | Error propagation |
//! |-----------|----------------|-------------------|
//! | Threshold | `threshold`, `none` | none |
//! | Floyd-Steinberg | `floyd-steinberg`, `fs` | 4 neighbours |
//! | Halftone | `halftone`, `bayer` | none |
//!
//! ## Floyd-Steinberg
//!
//! Pixels are visited in row-major order. The quantization error of each pixel
//! is pushed onto the unvisited neighbours:
//!
//! ```text
//!            X    7/16
//!   3/16   5/16   1/16
//! ```
//!
//! Neighbours outside the image are skipped and their share of the error is
//! dropped. Accumulation happens in a separate `f32` buffer; the packed output
//! is written only once per pixel.
//!
//! ## Halftone (4x4 Bayer)
//!
//! ```text
//!     y=0 y=1 y=2 y=3
//! x=0   1  13   4  16
//! x=1   9   5  12   8
//! x=2   3  15   2  14
//! x=3  11   7  10   6
//! ```
//!
//! The matrix is indexed `[x mod 4][y mod 4]`. Each pixel is compared to
//! `threshold + (m / 17 - 0.5) * 255`.
//!
//! ## Usage Example
//!
//! ```
//! use t02relay::render::dither::{self, DitheringAlgorithm};
//!
//! let gray = vec![0.0f32; 16 * 4];
//! let bmp = dither::dither(&gray, 16, 4, DitheringAlgorithm::Threshold, 128).unwrap();
//! assert_eq!(bmp.count_marks(), 64);
//!
//! let row: Vec<bool> = vec![true, true, false, false, true, false, true, false];
//! assert_eq!(dither::pack_row(&row), vec![0b11001010]);
//! ```

use rayon::prelude::*;

use super::bitmap::MonochromeBitmap;
use crate::error::Result;

/// Default binarization threshold.
pub const DEFAULT_THRESHOLD: u8 = 128;

/// 4x4 ordered dither matrix, values 1..=16, indexed `[x % 4][y % 4]`.
pub const BAYER4: [[u8; 4]; 4] = [[1, 9, 3, 11], [13, 5, 15, 7], [4, 12, 2, 10], [16, 8, 14, 6]];

/// Dithering algorithm for binary conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DitheringAlgorithm {
    /// Plain threshold, no dithering
    Threshold,
    /// Error diffusion
    #[default]
    FloydSteinberg,
    /// Ordered 4x4 Bayer
    Halftone,
}

impl DitheringAlgorithm {
    /// Parse a user-facing algorithm name. Unknown names fall back to
    /// Floyd-Steinberg.
    ///
    /// ```
    /// use t02relay::render::dither::DitheringAlgorithm;
    ///
    /// assert_eq!(DitheringAlgorithm::from_name("none"), DitheringAlgorithm::Threshold);
    /// assert_eq!(DitheringAlgorithm::from_name("Bayer"), DitheringAlgorithm::Halftone);
    /// assert_eq!(DitheringAlgorithm::from_name("sepia"), DitheringAlgorithm::FloydSteinberg);
    /// ```
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "threshold" | "none" => Self::Threshold,
            "halftone" | "bayer" | "ordered" => Self::Halftone,
            _ => Self::FloydSteinberg,
        }
    }

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Threshold => "threshold",
            Self::FloydSteinberg => "floyd-steinberg",
            Self::Halftone => "halftone",
        }
    }
}

impl std::fmt::Display for DitheringAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effective halftone threshold at `(x, y)`.
#[inline]
pub fn halftone_threshold(x: usize, y: usize, threshold: u8) -> f32 {
    let m = BAYER4[x % 4][y % 4] as f32;
    threshold as f32 + (m / 17.0 - 0.5) * 255.0
}

/// Pack a row of boolean pixel values into bytes.
///
/// - Bit 7 (MSB) = leftmost pixel
/// - 1 = black (print dot), 0 = white (no dot)
///
/// If the row length is not a multiple of 8, the last byte is padded
/// with zeros (white) on the right.
///
/// ```
/// use t02relay::render::dither::pack_row;
///
/// assert_eq!(pack_row(&[true, true, true, true, false, false, false, false]), vec![0xF0]);
/// assert_eq!(pack_row(&vec![true; 12]), vec![0xFF, 0xF0]);
/// ```
pub fn pack_row(pixels: &[bool]) -> Vec<u8> {
    let num_bytes = pixels.len().div_ceil(8);
    let mut bytes = vec![0u8; num_bytes];

    for (i, &pixel) in pixels.iter().enumerate() {
        if pixel {
            bytes[i / 8] |= 1 << (7 - (i % 8));
        }
    }

    bytes
}

/// Binarize a row-major gray buffer.
///
/// `gray` holds `width * height` values where 0.0 is black and 255.0 white.
pub fn dither(
    gray: &[f32],
    width: usize,
    height: usize,
    algorithm: DitheringAlgorithm,
    threshold: u8,
) -> Result<MonochromeBitmap> {
    debug_assert_eq!(gray.len(), width * height);
    let data = match algorithm {
        DitheringAlgorithm::Threshold => {
            per_pixel(gray, width, |_, _, v| v < threshold as f32)
        }
        DitheringAlgorithm::Halftone => {
            per_pixel(gray, width, |x, y, v| v < halftone_threshold(x, y, threshold))
        }
        DitheringAlgorithm::FloydSteinberg => floyd_steinberg(gray, width, height, threshold),
    };
    MonochromeBitmap::from_packed(width, height, data)
}

/// Point-process algorithms: rows are independent and packed in parallel.
fn per_pixel<F>(gray: &[f32], width: usize, is_black: F) -> Vec<u8>
where
    F: Fn(usize, usize, f32) -> bool + Sync,
{
    if width == 0 {
        return Vec::new();
    }
    gray.par_chunks(width)
        .enumerate()
        .flat_map_iter(|(y, row)| {
            let pixels: Vec<bool> = row
                .iter()
                .enumerate()
                .map(|(x, &v)| is_black(x, y, v))
                .collect();
            pack_row(&pixels)
        })
        .collect()
}

fn floyd_steinberg(gray: &[f32], width: usize, height: usize, threshold: u8) -> Vec<u8> {
    let mut buf = gray.to_vec();
    let t = threshold as f32;
    let mut out = Vec::with_capacity(width.div_ceil(8) * height);
    let mut row_pixels = vec![false; width];

    let spread = |buf: &mut [f32], x: isize, y: usize, err: f32, factor: f32| {
        if x >= 0 && (x as usize) < width && y < height {
            buf[y * width + x as usize] += err * factor;
        }
    };

    for y in 0..height {
        for x in 0..width {
            let old = buf[y * width + x];
            let new = if old < t { 0.0 } else { 255.0 };
            let err = old - new;
            row_pixels[x] = new == 0.0;

            let xi = x as isize;
            spread(&mut buf, xi + 1, y, err, 7.0 / 16.0);
            spread(&mut buf, xi - 1, y + 1, err, 3.0 / 16.0);
            spread(&mut buf, xi, y + 1, err, 5.0 / 16.0);
            spread(&mut buf, xi + 1, y + 1, err, 1.0 / 16.0);
        }
        out.extend(pack_row(&row_pixels));
    }

    out
}

// ============================================================================
// TESTS
// ============================================================================
