//! # Rasterizer
//!
//! Turns an arbitrary source image into a printer-width [`MonochromeBitmap`].
//!
//! ## Pipeline
//!
//! ```text
//! decode ─► flatten alpha onto white ─► rotate 90° CW if landscape
//!        ─► scale to printer width ─► luma ─► dither
//! ```
//!
//! - Luma weights: `0.299 R + 0.587 G + 0.114 B`
//! - Scaled height: `floor(src_height × width / src_width)`
//! - Landscape (`width > height`) sources are rotated so the strip is
//!   always printed portrait; the caller is told via [`Rasterized::rotated`].

use image::{DynamicImage, RgbImage, imageops::FilterType};
use tracing::debug;

use super::bitmap::MonochromeBitmap;
use super::dither::{self, DEFAULT_THRESHOLD, DitheringAlgorithm};
use crate::error::{RelayError, Result};
use crate::printer::PrinterConfig;

/// Per-job rasterization options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterOptions {
    pub algorithm: DitheringAlgorithm,
    pub threshold: u8,
    /// Rotate landscape sources to portrait. Disabled for pre-rendered text.
    pub auto_rotate: bool,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            algorithm: DitheringAlgorithm::default(),
            threshold: DEFAULT_THRESHOLD,
            auto_rotate: true,
        }
    }
}

impl RasterOptions {
    pub fn new(algorithm: DitheringAlgorithm, threshold: u8) -> Self {
        Self {
            algorithm,
            threshold,
            ..Self::default()
        }
    }
}

/// Rasterizer output.
#[derive(Debug, Clone)]
pub struct Rasterized {
    pub bitmap: MonochromeBitmap,
    /// True when the source was landscape and got rotated.
    pub rotated: bool,
}

/// Rasterize an already-decoded image.
pub fn rasterize(
    image: &DynamicImage,
    options: &RasterOptions,
    printer: &PrinterConfig,
) -> Result<Rasterized> {
    if image.width() == 0 || image.height() == 0 {
        return Err(RelayError::EmptyImage);
    }

    let flat = flatten_onto_white(image);
    let rotated = options.auto_rotate && flat.width() > flat.height();
    let oriented = if rotated {
        debug!(
            width = flat.width(),
            height = flat.height(),
            "landscape source, rotating 90°"
        );
        image::imageops::rotate90(&flat)
    } else {
        flat
    };

    let width = printer.width_dots as u32;
    let height = scaled_height(oriented.width(), oriented.height(), width);
    if height == 0 {
        return Err(RelayError::EmptyImage);
    }

    let scaled = if oriented.width() == width && oriented.height() == height {
        oriented
    } else {
        image::imageops::resize(&oriented, width, height, FilterType::Lanczos3)
    };

    let gray = luma(&scaled);
    let bitmap = dither::dither(
        &gray,
        width as usize,
        height as usize,
        options.algorithm,
        options.threshold,
    )?;

    debug!(
        width,
        height,
        algorithm = %options.algorithm,
        threshold = options.threshold,
        rotated,
        "rasterized image"
    );

    Ok(Rasterized { bitmap, rotated })
}

/// Decode encoded image bytes, then rasterize.
pub fn rasterize_bytes(
    bytes: &[u8],
    options: &RasterOptions,
    printer: &PrinterConfig,
) -> Result<Rasterized> {
    let image = decode(bytes)?;
    rasterize(&image, options, printer)
}

/// Decode any format the `image` crate understands (plus HEIC with the
/// `heif` feature).
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(RelayError::Decode("empty input".to_string()));
    }

    #[cfg(feature = "heif")]
    if is_heic(bytes) {
        return decode_heic(bytes);
    }

    image::load_from_memory(bytes).map_err(|e| RelayError::Decode(e.to_string()))
}

/// `floor(src_h × target_w / src_w)`
#[inline]
pub fn scaled_height(src_width: u32, src_height: u32, target_width: u32) -> u32 {
    if src_width == 0 {
        return 0;
    }
    (src_height as u64 * target_width as u64 / src_width as u64) as u32
}

/// Composite onto an opaque white background.
fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as f32 / 255.0;
        let over = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        image::Rgb([over(r), over(g), over(b)])
    })
}

fn luma(rgb: &RgbImage) -> Vec<f32> {
    rgb.pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
        })
        .collect()
}

/// HEIC/HEIF files carry an `ftyp` box with a HEIF brand right after the size.
#[cfg(feature = "heif")]
fn is_heic(data: &[u8]) -> bool {
    if data.len() < 12 || &data[4..8] != b"ftyp" {
        return false;
    }
    matches!(
        &data[8..12],
        b"heic" | b"heix" | b"hevc" | b"hevx" | b"heim" | b"heis" | b"mif1" | b"msf1"
    )
}

#[cfg(feature = "heif")]
fn decode_heic(data: &[u8]) -> Result<DynamicImage> {
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    let lib_heif = LibHeif::new();
    let ctx = HeifContext::read_from_bytes(data)
        .map_err(|e| RelayError::Decode(format!("HEIC read failed: {}", e)))?;
    let handle = ctx
        .primary_image_handle()
        .map_err(|e| RelayError::Decode(format!("HEIC has no primary image: {}", e)))?;
    let decoded = lib_heif
        .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
        .map_err(|e| RelayError::Decode(format!("HEIC decode failed: {}", e)))?;

    let planes = decoded.planes();
    let interleaved = planes
        .interleaved
        .ok_or_else(|| RelayError::Decode("HEIC has no interleaved RGB plane".to_string()))?;

    let (width, height) = (decoded.width(), decoded.height());
    let stride = interleaved.stride;
    let src = interleaved.data;
    let rgb = RgbImage::from_fn(width, height, |x, y| {
        let offset = y as usize * stride + x as usize * 3;
        match src.get(offset..offset + 3) {
            Some(px) => image::Rgb([px[0], px[1], px[2]]),
            None => image::Rgb([255, 255, 255]),
        }
    });
    Ok(DynamicImage::ImageRgb8(rgb))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    fn solid(width: u32, height: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([value])))
    }

    #[test]
    fn test_scaled_height_floors() {
        assert_eq!(scaled_height(384, 100, 384), 100);
        assert_eq!(scaled_height(1000, 333, 384), 127); // 127.87
        assert_eq!(scaled_height(5000, 1, 384), 0);
    }

    #[test]
    fn test_portrait_keeps_orientation() {
        let img = solid(200, 400, 0);
        let out = rasterize(&img, &RasterOptions::default(), &PrinterConfig::T02).unwrap();
        assert!(!out.rotated);
        assert_eq!(out.bitmap.width(), 384);
        assert_eq!(out.bitmap.height(), 768);
    }

    #[test]
    fn test_landscape_rotates() {
        let img = solid(768, 384, 255);
        let opts = RasterOptions::new(DitheringAlgorithm::Threshold, 128);
        let out = rasterize(&img, &opts, &PrinterConfig::T02).unwrap();
        assert!(out.rotated);
        assert_eq!(out.bitmap.width(), 384);
        assert_eq!(out.bitmap.height(), 768);
        assert_eq!(out.bitmap.count_marks(), 0);
    }

    #[test]
    fn test_auto_rotate_disabled() {
        let img = solid(768, 384, 255);
        let opts = RasterOptions {
            auto_rotate: false,
            ..RasterOptions::default()
        };
        let out = rasterize(&img, &opts, &PrinterConfig::T02).unwrap();
        assert!(!out.rotated);
        assert_eq!(out.bitmap.height(), 192);
    }

    #[test]
    fn test_rotation_is_clockwise() {
        // left half black: after a clockwise turn it ends up on top
        let mut img = GrayImage::from_pixel(768, 384, Luma([255]));
        for y in 0..384 {
            for x in 0..384 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        let opts = RasterOptions::new(DitheringAlgorithm::Threshold, 128);
        let out = rasterize(&DynamicImage::ImageLuma8(img), &opts, &PrinterConfig::T02).unwrap();
        assert!(out.bitmap.get(10, 10));
        assert!(!out.bitmap.get(10, 700));
    }

    #[test]
    fn test_transparent_is_white() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(384, 10, Rgba([0, 0, 0, 0])));
        let opts = RasterOptions::new(DitheringAlgorithm::Threshold, 128);
        let out = rasterize(&img, &opts, &PrinterConfig::T02).unwrap();
        assert_eq!(out.bitmap.count_marks(), 0);
    }

    #[test]
    fn test_too_thin_is_empty() {
        let img = solid(5000, 1, 0);
        let opts = RasterOptions {
            auto_rotate: false,
            ..RasterOptions::default()
        };
        let err = rasterize(&img, &opts, &PrinterConfig::T02).unwrap_err();
        assert!(matches!(err, RelayError::EmptyImage));
    }

    #[test]
    fn test_garbage_bytes_fail_decode() {
        let err = rasterize_bytes(b"not an image", &RasterOptions::default(), &PrinterConfig::T02)
            .unwrap_err();
        assert!(matches!(err, RelayError::Decode(_)));
        assert!(matches!(decode(&[]), Err(RelayError::Decode(_))));
    }
}
