//! Coverage canvas for text layout.
//!
//! Glyph cells are accumulated into an `f32` ink buffer and binarized once
//! at the end, so overlapping cells and anti-aliased edges combine before
//! thresholding.

use super::font::Glyph;
use crate::error::Result;
use crate::render::MonochromeBitmap;

/// Ink coverage at or above this value becomes a printed dot.
pub const INK_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct Canvas {
    width: usize,
    height: usize,
    ink: Vec<f32>,
}

impl Canvas {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            ink: vec![0.0; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn add(&mut self, x: i64, y: i64, value: f32) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let idx = y as usize * self.width + x as usize;
        self.ink[idx] = (self.ink[idx] + value).min(1.0);
    }

    /// Draw a glyph cell with its top-left corner at `(x, y)`.
    ///
    /// With `smear`, the cell is drawn again one dot to the right.
    pub fn draw(&mut self, glyph: &Glyph, x: i64, y: i64, smear: bool) {
        for gy in 0..glyph.height {
            for gx in 0..glyph.width {
                let c = glyph.at(gx, gy);
                if c <= 0.0 {
                    continue;
                }
                let (px, py) = (x + gx as i64, y + gy as i64);
                self.add(px, py, c);
                if smear {
                    self.add(px + 1, py, c);
                }
            }
        }
    }

    /// Draw a glyph turned 90° clockwise, centred on `(cx, cy)`.
    ///
    /// The turned cell is `glyph.height` wide and `glyph.width` tall:
    /// `R(x', y') = G(y', glyph.height - 1 - x')`.
    pub fn draw_rotated_cw(&mut self, glyph: &Glyph, cx: f32, cy: f32, smear: bool) {
        let rw = glyph.height;
        let rh = glyph.width;
        let left = (cx - rw as f32 / 2.0).round() as i64;
        let top = (cy - rh as f32 / 2.0).round() as i64;

        for ry in 0..rh {
            for rx in 0..rw {
                let c = glyph.at(ry, glyph.height - 1 - rx);
                if c <= 0.0 {
                    continue;
                }
                let (px, py) = (left + rx as i64, top + ry as i64);
                self.add(px, py, c);
                if smear {
                    // horizontal stroke weight becomes vertical after the turn
                    self.add(px, py + 1, c);
                }
            }
        }
    }

    /// Binarize into a printable bitmap.
    pub fn into_bitmap(self) -> Result<MonochromeBitmap> {
        let pixels: Vec<bool> = self.ink.iter().map(|&c| c >= INK_THRESHOLD).collect();
        MonochromeBitmap::from_pixels(self.width, self.height, &pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar() -> Glyph {
        // 3 wide, 2 tall, only the top row inked
        Glyph {
            width: 3,
            height: 2,
            coverage: vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0],
        }
    }

    #[test]
    fn test_draw_clips() {
        let mut canvas = Canvas::new(4, 4);
        canvas.draw(&bar(), 2, -1, false);
        canvas.draw(&bar(), 2, 3, false);
        let bmp = canvas.into_bitmap().unwrap();
        assert!(bmp.get(2, 3));
        assert!(bmp.get(3, 3));
        assert_eq!(bmp.count_marks(), 2);
    }

    #[test]
    fn test_smear_widens() {
        let mut canvas = Canvas::new(8, 2);
        canvas.draw(&bar(), 0, 0, true);
        let bmp = canvas.into_bitmap().unwrap();
        assert_eq!(bmp.count_marks(), 4);
    }

    #[test]
    fn test_rotation_is_clockwise() {
        // top row of the glyph ends up as the right-hand column
        let mut canvas = Canvas::new(2, 3);
        canvas.draw_rotated_cw(&bar(), 1.0, 1.5, false);
        let bmp = canvas.into_bitmap().unwrap();
        for y in 0..3 {
            assert!(bmp.get(1, y), "right column row {}", y);
            assert!(!bmp.get(0, y), "left column row {}", y);
        }
    }

    #[test]
    fn test_half_coverage_prints() {
        let mut canvas = Canvas::new(1, 1);
        let g = Glyph {
            width: 1,
            height: 1,
            coverage: vec![0.5],
        };
        canvas.draw(&g, 0, 0, false);
        assert_eq!(canvas.into_bitmap().unwrap().count_marks(), 1);
    }
}
