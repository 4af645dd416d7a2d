//! # Rendering Module
//!
//! Image to 1-bit conversion for the 384-dot print head.
//!
//! ## Modules
//!
//! - [`bitmap`]: Packed monochrome bitmap shared by every stage
//! - [`dither`]: Threshold, Floyd-Steinberg and 4x4 Bayer binarization
//! - [`rasterize`]: Decode, orient, scale and dither a source image
//!
//! ## Usage Example
//!
//! ```
//! use image::{DynamicImage, GrayImage, Luma};
//! use t02relay::printer::PrinterConfig;
//! use t02relay::render::rasterize::{rasterize, RasterOptions};
//!
//! let photo = DynamicImage::ImageLuma8(GrayImage::from_pixel(768, 384, Luma([40])));
//! let out = rasterize(&photo, &RasterOptions::default(), &PrinterConfig::T02).unwrap();
//!
//! assert!(out.rotated);
//! assert_eq!(out.bitmap.width(), 384);
//! assert_eq!(out.bitmap.height(), 768);
//! ```

pub mod bitmap;
pub mod dither;
pub mod rasterize;

pub use bitmap::MonochromeBitmap;
pub use dither::DitheringAlgorithm;
pub use rasterize::{RasterOptions, Rasterized, rasterize, rasterize_bytes};
