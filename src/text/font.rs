//! # Glyph Faces
//!
//! Text is drawn from one of two kinds of faces:
//!
//! | Face | Source | Bold |
//! |------|--------|------|
//! | [`SpleenFace`] | built-in Spleen 12x24 bitmap, nearest-neighbour scaled | 1-dot smear |
//! | [`TtfFace`] | `*.ttf` from the configured font directory via `ab_glyph` | `*-bold.ttf` |
//!
//! Every glyph is returned as a coverage cell (0.0 = paper, 1.0 = ink) whose
//! width is the glyph advance and whose height is the pixel size, with the
//! top of the em box on row 0.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use serde::{Deserialize, Serialize};
use spleen_font::{FONT_6X12, FONT_12X24, PSF2Font};
use tracing::{debug, info, warn};

use crate::error::{RelayError, Result};

/// Font family selectable per text job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontFamily {
    #[default]
    Sans,
    Serif,
    Mono,
}

impl FontFamily {
    /// Parse a CSS-like family name; unknown names map to sans.
    pub fn from_name(name: &str) -> Self {
        match name.trim().trim_matches('"').to_lowercase().as_str() {
            "serif" => Self::Serif,
            "mono" | "monospace" => Self::Mono,
            _ => Self::Sans,
        }
    }

    fn file_stem(&self) -> &'static str {
        match self {
            Self::Sans => "sans",
            Self::Serif => "serif",
            Self::Mono => "mono",
        }
    }
}

/// Anti-aliased glyph coverage cell.
#[derive(Debug, Clone)]
pub struct Glyph {
    pub width: usize,
    pub height: usize,
    pub coverage: Vec<f32>,
}

impl Glyph {
    fn blank(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            coverage: vec![0.0; width * height],
        }
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.coverage[y * self.width + x]
    }
}

/// A source of glyph metrics and coverage.
pub trait Face: Send + Sync {
    /// Horizontal advance of `ch` at `px` pixels.
    fn advance(&self, ch: char, px: f32) -> f32;

    /// Coverage cell for `ch` at `px` pixels.
    fn glyph(&self, ch: char, px: f32) -> Glyph;

    /// Width of a run of text.
    fn measure(&self, text: &str, px: f32) -> f32 {
        text.chars().map(|ch| self.advance(ch, px)).sum()
    }
}

// ============================================================================
// SPLEEN
// ============================================================================

/// Built-in Spleen bitmap face. Cells keep the 1:2 aspect of the source.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpleenFace;

impl SpleenFace {
    /// Source bitmap for `ch`, largest Spleen size first.
    fn source_bitmap(ch: char) -> Option<(Vec<bool>, usize, usize)> {
        let utf8 = ch.to_string();
        for (data, w, h) in [(FONT_12X24, 12usize, 24usize), (FONT_6X12, 6, 12)] {
            let Ok(mut font) = PSF2Font::new(data) else {
                continue;
            };
            if let Some(rows) = font.glyph_for_utf8(utf8.as_bytes()) {
                let mut bits = vec![false; w * h];
                for (y, row) in rows.enumerate().take(h) {
                    for (x, on) in row.enumerate().take(w) {
                        bits[y * w + x] = on;
                    }
                }
                return Some((bits, w, h));
            }
        }
        None
    }
}

impl Face for SpleenFace {
    fn advance(&self, _ch: char, px: f32) -> f32 {
        px / 2.0
    }

    fn glyph(&self, ch: char, px: f32) -> Glyph {
        let width = (px / 2.0).round().max(1.0) as usize;
        let height = px.round().max(1.0) as usize;
        let mut glyph = Glyph::blank(width, height);

        if ch == ' ' {
            return glyph;
        }

        match Self::source_bitmap(ch) {
            Some((bits, sw, sh)) => {
                for dy in 0..height {
                    for dx in 0..width {
                        let sx = dx * sw / width;
                        let sy = dy * sh / height;
                        if bits[sy * sw + sx] {
                            glyph.coverage[dy * width + dx] = 1.0;
                        }
                    }
                }
            }
            None => draw_box(&mut glyph),
        }

        glyph
    }
}

/// Outline box for characters missing from the bitmap font.
fn draw_box(glyph: &mut Glyph) {
    let (w, h) = (glyph.width, glyph.height);
    for x in 0..w {
        glyph.coverage[x] = 1.0;
        glyph.coverage[(h - 1) * w + x] = 1.0;
    }
    for y in 0..h {
        glyph.coverage[y * w] = 1.0;
        glyph.coverage[y * w + w - 1] = 1.0;
    }
}

// ============================================================================
// TRUETYPE
// ============================================================================

/// TrueType face rendered with `ab_glyph`.
#[derive(Clone)]
pub struct TtfFace {
    font: FontArc,
}

impl std::fmt::Debug for TtfFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtfFace").finish_non_exhaustive()
    }
}

impl TtfFace {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let font = FontArc::try_from_vec(data)
            .map_err(|e| RelayError::Decode(format!("invalid font: {}", e)))?;
        Ok(Self { font })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_bytes(std::fs::read(path)?)
    }
}

impl Face for TtfFace {
    fn advance(&self, ch: char, px: f32) -> f32 {
        let scaled = self.font.as_scaled(PxScale::from(px));
        scaled.h_advance(self.font.glyph_id(ch))
    }

    fn glyph(&self, ch: char, px: f32) -> Glyph {
        let scaled = self.font.as_scaled(PxScale::from(px));
        let id = self.font.glyph_id(ch);
        let width = scaled.h_advance(id).ceil().max(1.0) as usize;
        let height = px.ceil().max(1.0) as usize;
        let mut glyph = Glyph::blank(width, height);

        let positioned = id.with_scale_and_position(px, ab_glyph::point(0.0, scaled.ascent()));
        if let Some(outlined) = self.font.outline_glyph(positioned) {
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let x = gx as i32 + bounds.min.x as i32;
                let y = gy as i32 + bounds.min.y as i32;
                if x >= 0 && (x as usize) < width && y >= 0 && (y as usize) < height {
                    let idx = y as usize * width + x as usize;
                    glyph.coverage[idx] = (glyph.coverage[idx] + coverage).min(1.0);
                }
            });
        }

        glyph
    }
}

// ============================================================================
// FONT BOOK
// ============================================================================

/// A face chosen for one run of text.
#[derive(Clone)]
pub struct FaceChoice {
    pub face: Arc<dyn Face>,
    /// Bold requested but no bold face is available: smear by one dot.
    pub smear: bool,
}

/// Faces by family, with optional bold variants.
#[derive(Clone)]
pub struct FontBook {
    regular: HashMap<FontFamily, Arc<dyn Face>>,
    bold: HashMap<FontFamily, Arc<dyn Face>>,
    fallback: Arc<dyn Face>,
}

impl Default for FontBook {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FontBook {
    /// Spleen for every family.
    pub fn builtin() -> Self {
        Self {
            regular: HashMap::new(),
            bold: HashMap::new(),
            fallback: Arc::new(SpleenFace),
        }
    }

    /// Load `sans.ttf`, `serif.ttf`, `mono.ttf` and their `-bold` variants
    /// from `dir`. Missing files fall back to Spleen; unreadable ones are
    /// skipped with a warning.
    pub fn from_dir(dir: &Path) -> Self {
        let mut book = Self::builtin();
        for family in [FontFamily::Sans, FontFamily::Serif, FontFamily::Mono] {
            let stem = family.file_stem();
            if let Some(face) = load_optional(&dir.join(format!("{}.ttf", stem))) {
                book.regular.insert(family, face);
            }
            if let Some(face) = load_optional(&dir.join(format!("{}-bold.ttf", stem))) {
                book.bold.insert(family, face);
            }
        }
        info!(
            dir = %dir.display(),
            regular = book.regular.len(),
            bold = book.bold.len(),
            "loaded font faces"
        );
        book
    }

    pub fn face(&self, family: FontFamily, bold: bool) -> FaceChoice {
        if bold {
            if let Some(face) = self.bold.get(&family) {
                return FaceChoice {
                    face: face.clone(),
                    smear: false,
                };
            }
        }
        let face = self
            .regular
            .get(&family)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone());
        FaceChoice { face, smear: bold }
    }
}

fn load_optional(path: &Path) -> Option<Arc<dyn Face>> {
    if !path.exists() {
        debug!(path = %path.display(), "font not present");
        return None;
    }
    match TtfFace::from_file(path) {
        Ok(face) => Some(Arc::new(face)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping unreadable font");
            None
        }
    }
}
