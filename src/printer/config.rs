//! # Printer Configuration
//!
//! This module defines hardware specifications for supported thermal printers.
//!
//! ## Supported Printers
//!
//! | Model | Width (dots) | Resolution | Max slice rows |
//! |-------|--------------|------------|----------------|
//! | Phomemo T02 | 384 | 203 DPI | 128 rows |
//!
//! ## Usage
//!
//! ```
//! use t02relay::printer::PrinterConfig;
//!
//! let config = PrinterConfig::T02;
//! println!("Print width: {} dots ({} bytes)",
//!          config.width_dots,
//!          config.width_bytes);
//! ```

/// # Printer Configuration
///
/// Defines the hardware characteristics of a thermal printer.
///
/// ## Physical Properties
///
/// - **width_dots**: Printable width in dots (pixels). Every bitmap sent to
///   the printer is exactly this wide.
/// - **width_bytes**: Width in bytes (width_dots / 8)
/// - **dpi**: Resolution in dots per inch
///
/// ## Buffer Tuning
///
/// - **max_slice_rows**: Maximum rows carried by one raster command. Taller
///   bitmaps are sliced by row before encoding.
/// - **feed_lines**: Lines fed after the last slice of a job
///
/// ## Calculations
///
/// ```text
/// dots_per_mm = dpi / 25.4
/// width_mm = width_dots / dots_per_mm
///
/// For T02:
///   dots_per_mm = 203 / 25.4 ≈ 8
///   width_mm = 384 / 8 = 48mm
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrinterConfig {
    /// Printer model name
    pub name: &'static str,

    /// Print width in dots (pixels)
    pub width_dots: u16,

    /// Print width in bytes (width_dots / 8)
    pub width_bytes: u16,

    /// Resolution in dots per inch
    pub dpi: u16,

    /// Maximum rows per raster command (receive buffer limit)
    pub max_slice_rows: u16,

    /// Lines fed after the last raster slice of a job
    pub feed_lines: u8,
}

impl PrinterConfig {
    /// # Phomemo T02 Configuration
    ///
    /// 53mm paper pocket printer reachable over Bluetooth.
    ///
    /// ## Specifications
    ///
    /// | Property | Value |
    /// |----------|-------|
    /// | Print width | 48mm (384 dots) |
    /// | Resolution | 203 DPI |
    /// | Interface | Bluetooth |
    /// | Commands | ESC @, GS v 0, ESC d |
    pub const T02: Self = Self {
        name: "Phomemo T02",
        width_dots: 384,
        width_bytes: 48,
        dpi: 203,
        max_slice_rows: 128,
        feed_lines: 1,
    };

    /// Calculate dots per millimeter
    ///
    /// ## Example
    ///
    /// ```
    /// use t02relay::printer::PrinterConfig;
    ///
    /// let config = PrinterConfig::T02;
    /// assert!((config.dots_per_mm() - 8.0).abs() < 0.1);
    /// ```
    #[inline]
    pub fn dots_per_mm(&self) -> f32 {
        self.dpi as f32 / 25.4
    }

    /// Calculate print width in millimeters
    #[inline]
    pub fn width_mm(&self) -> f32 {
        self.width_dots as f32 / self.dots_per_mm()
    }

    /// Convert millimeters to dots
    #[inline]
    pub fn mm_to_dots(&self, mm: f32) -> u16 {
        (mm * self.dots_per_mm()).round() as u16
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self::T02
    }
}
