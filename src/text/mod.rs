//! # Text Layout Engine
//!
//! Typesets a text job into a printer-width [`MonochromeBitmap`].
//!
//! ## Modes
//!
//! | Mode | Layout | Font size | Height |
//! |------|--------|-----------|--------|
//! | `document` | word-wrapped block, optional bold title | 20..=100 | `lines × 1.2·size + 2·padding` |
//! | `banner` | one glyph per block, turned 90° clockwise | 150..=300 | `max(Σ(advance + 10), 200)` |
//!
//! ## Document Geometry
//!
//! ```text
//!  ◄──────────── 384 dots ────────────►
//! ┌────────────────────────────────────┐ ▲ padding (20)
//! │   ┌────────────────────────────┐   │ ▼
//! │   │ Title line (bold)          │   │ ▲ line height (1.2 × size)
//! │   │ Body text wrapped at 344   │   │ ▼
//! │   └────────────────────────────┘   │
//! └────────────────────────────────────┘   padding (20)
//! ```
//!
//! The font size is clamped to the mode's range here, not by callers.
//!
//! ## Example
//!
//! ```
//! use t02relay::printer::PrinterConfig;
//! use t02relay::text::{self, FontBook, TextOptions};
//!
//! let opts = TextOptions::document("Hello world", 48.0);
//! let out = text::layout_text(&opts, &FontBook::builtin(), &PrinterConfig::T02).unwrap();
//!
//! assert_eq!(out.lines, vec!["Hello world"]);
//! assert_eq!(out.bitmap.width(), 384);
//! assert_eq!(out.bitmap.height(), 97); // 1 × 57.6 + 2 × 20
//! ```

pub mod canvas;
pub mod font;
pub mod wrap;

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RelayError, Result};
use crate::printer::PrinterConfig;
use crate::render::MonochromeBitmap;
use canvas::Canvas;
use font::FaceChoice;

pub use font::{Face, FontBook, FontFamily};

/// Layout style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    #[default]
    Document,
    Banner,
}

/// Horizontal alignment of document lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    #[default]
    Center,
    Right,
}

/// Geometry constants of the text layout.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutMetrics {
    pub document_sizes: RangeInclusive<f32>,
    pub banner_sizes: RangeInclusive<f32>,
    /// Left/right/top/bottom margin of document mode
    pub padding: f32,
    /// Line height as a multiple of the font size
    pub line_height_factor: f32,
    /// Extra space after each banner glyph
    pub banner_spacing: f32,
    /// Minimum banner length in dots
    pub banner_min_height: f32,
}

impl Default for LayoutMetrics {
    fn default() -> Self {
        Self {
            document_sizes: 20.0..=100.0,
            banner_sizes: 150.0..=300.0,
            padding: 20.0,
            line_height_factor: 1.2,
            banner_spacing: 10.0,
            banner_min_height: 200.0,
        }
    }
}

impl LayoutMetrics {
    /// Clamp a requested font size into the mode's range.
    pub fn clamp_size(&self, mode: LayoutMode, size: f32) -> f32 {
        let range = match mode {
            LayoutMode::Document => &self.document_sizes,
            LayoutMode::Banner => &self.banner_sizes,
        };
        if size.is_nan() {
            return *range.start();
        }
        size.clamp(*range.start(), *range.end())
    }
}

/// A text job as submitted by the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextOptions {
    pub text: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    #[serde(default)]
    pub font_family: FontFamily,
    #[serde(default)]
    pub align: Alignment,
    #[serde(default)]
    pub mode: LayoutMode,
}

fn default_font_size() -> f32 {
    40.0
}

impl TextOptions {
    pub fn document(text: impl Into<String>, font_size: f32) -> Self {
        Self {
            text: text.into(),
            title: None,
            font_size,
            font_family: FontFamily::default(),
            align: Alignment::default(),
            mode: LayoutMode::Document,
        }
    }

    pub fn banner(text: impl Into<String>, font_size: f32) -> Self {
        Self {
            mode: LayoutMode::Banner,
            ..Self::document(text, font_size)
        }
    }

    fn title_text(&self) -> Option<&str> {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }
}

/// Layout result.
#[derive(Debug, Clone)]
pub struct TextLayout {
    pub bitmap: MonochromeBitmap,
    /// Wrapped lines (document) or the single banner string.
    pub lines: Vec<String>,
    /// Font size after clamping.
    pub font_size: f32,
}

/// Typeset with the default metrics.
pub fn layout_text(
    options: &TextOptions,
    fonts: &FontBook,
    printer: &PrinterConfig,
) -> Result<TextLayout> {
    layout_text_with(options, fonts, printer, &LayoutMetrics::default())
}

/// Typeset with explicit metrics.
pub fn layout_text_with(
    options: &TextOptions,
    fonts: &FontBook,
    printer: &PrinterConfig,
    metrics: &LayoutMetrics,
) -> Result<TextLayout> {
    if options.text.trim().is_empty() && options.title_text().is_none() {
        return Err(RelayError::EmptyContent);
    }

    let size = metrics.clamp_size(options.mode, options.font_size);
    let width = printer.width_dots as usize;

    let layout = match options.mode {
        LayoutMode::Document => layout_document(options, fonts, metrics, width, size)?,
        LayoutMode::Banner => layout_banner(options, fonts, metrics, width, size)?,
    };

    debug!(
        mode = ?options.mode,
        font_size = size,
        lines = layout.lines.len(),
        height = layout.bitmap.height(),
        "laid out text"
    );
    Ok(layout)
}

struct Line {
    text: String,
    face: FaceChoice,
}

fn layout_document(
    options: &TextOptions,
    fonts: &FontBook,
    metrics: &LayoutMetrics,
    width: usize,
    size: f32,
) -> Result<TextLayout> {
    let usable = width as f32 - 2.0 * metrics.padding;
    let mut lines: Vec<Line> = Vec::new();

    if let Some(title) = options.title_text() {
        let face = fonts.face(options.font_family, true);
        let bold_extra = if face.smear { 1.0 } else { 0.0 };
        let measure = |s: &str| face.face.measure(s, size) + bold_extra;
        for text in wrap::wrap_lines(title, usable, measure) {
            lines.push(Line {
                text,
                face: face.clone(),
            });
        }
    }

    if !options.text.trim().is_empty() {
        let face = fonts.face(options.font_family, false);
        for text in wrap::wrap_lines(&options.text, usable, |s| face.face.measure(s, size)) {
            lines.push(Line {
                text,
                face: face.clone(),
            });
        }
    }

    let line_height = size * metrics.line_height_factor;
    let height = (lines.len() as f32 * line_height + 2.0 * metrics.padding) as usize;
    let mut canvas = Canvas::new(width, height);

    for (index, line) in lines.iter().enumerate() {
        let y = metrics.padding + index as f32 * line_height;
        let line_width = line.face.face.measure(&line.text, size);
        let mut x = match options.align {
            Alignment::Left => metrics.padding,
            Alignment::Center => (width as f32 - line_width) / 2.0,
            Alignment::Right => width as f32 - line_width - metrics.padding,
        };
        for ch in line.text.chars() {
            let glyph = line.face.face.glyph(ch, size);
            canvas.draw(&glyph, x.round() as i64, y.round() as i64, line.face.smear);
            x += line.face.face.advance(ch, size);
        }
    }

    Ok(TextLayout {
        bitmap: canvas.into_bitmap()?,
        lines: lines.into_iter().map(|l| l.text).collect(),
        font_size: size,
    })
}

/// Banner string: title then body, line breaks flattened to spaces.
pub fn banner_text(options: &TextOptions) -> String {
    let body = options.text.replace('\n', " ");
    match options.title_text() {
        Some(title) if body.trim().is_empty() => title.replace('\n', " "),
        Some(title) => format!("{} {}", title.replace('\n', " "), body),
        None => body,
    }
}

fn layout_banner(
    options: &TextOptions,
    fonts: &FontBook,
    metrics: &LayoutMetrics,
    width: usize,
    size: f32,
) -> Result<TextLayout> {
    let text = banner_text(options);
    let choice = fonts.face(options.font_family, false);
    let face = &choice.face;

    let footprints: Vec<(char, f32)> = text
        .chars()
        .map(|ch| (ch, face.advance(ch, size) + metrics.banner_spacing))
        .collect();
    let total: f32 = footprints.iter().map(|(_, h)| h).sum();
    let height = total.max(metrics.banner_min_height) as usize;

    let mut canvas = Canvas::new(width, height);
    let center_x = width as f32 / 2.0;
    let mut y = 0.0f32;
    for (ch, footprint) in footprints {
        let glyph = face.glyph(ch, size);
        canvas.draw_rotated_cw(&glyph, center_x, y + footprint / 2.0, false);
        y += footprint;
    }

    Ok(TextLayout {
        bitmap: canvas.into_bitmap()?,
        lines: vec![text],
        font_size: size,
    })
}
