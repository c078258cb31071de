//! Glyph sources for the renderer.
//!
//! A font here is just a set of pre-rasterized coverage masks on a fixed
//! advance. [`BitmapFont`] ships with the crate and covers the glyph ramp;
//! [`TrueTypeFont`] rasterizes any TTF/OTF with `ab_glyph`.

use ab_glyph::{point, Font, FontVec, PxScale};
use log::debug;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Coverage mask for one glyph, `width * height` alpha values, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphMask {
    width: u32,
    height: u32,
    alpha: Vec<u8>,
}

impl GlyphMask {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn alpha(&self, x: u32, y: u32) -> u8 {
        self.alpha[(y * self.width + x) as usize]
    }
}

/// Monospaced glyph source used to draw text onto a canvas.
pub trait GlyphFont: Send + Sync {
    /// Horizontal distance between consecutive glyph origins, in pixels.
    fn advance(&self) -> u32;

    /// Natural line height, in pixels.
    fn line_height(&self) -> u32;

    /// Mask for `ch`, or `None` when the font cannot draw it.
    fn glyph(&self, ch: char) -> Option<&GlyphMask>;
}

const BITMAP_ADVANCE: u32 = 6;
const BITMAP_LINE_HEIGHT: u32 = 11;
const BITMAP_TOP: u32 = 2;

// 5x7 rows, bit 4 is the leftmost pixel
const BITMAP_GLYPHS: [(char, [u8; 7]); 10] = [
    ('@', [0b01110, 0b10001, 0b10111, 0b10101, 0b10111, 0b10000, 0b01111]),
    ('%', [0b11001, 0b11001, 0b00010, 0b00100, 0b01000, 0b10011, 0b10011]),
    ('#', [0b01010, 0b01010, 0b11111, 0b01010, 0b11111, 0b01010, 0b01010]),
    ('*', [0b00000, 0b00100, 0b10101, 0b01110, 0b10101, 0b00100, 0b00000]),
    ('+', [0b00000, 0b00100, 0b00100, 0b11111, 0b00100, 0b00100, 0b00000]),
    ('=', [0b00000, 0b00000, 0b11111, 0b00000, 0b11111, 0b00000, 0b00000]),
    ('-', [0b00000, 0b00000, 0b00000, 0b11111, 0b00000, 0b00000, 0b00000]),
    (':', [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000]),
    ('.', [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b01100]),
    (' ', [0b00000; 7]),
];

/// Built-in 6×11 bitmap font covering the glyph ramp.
#[derive(Debug, Clone)]
pub struct BitmapFont {
    glyphs: HashMap<char, GlyphMask>,
}

impl BitmapFont {
    pub fn new() -> Self {
        let glyphs = BITMAP_GLYPHS
            .iter()
            .map(|(ch, rows)| (*ch, bitmap_mask(rows)))
            .collect();
        Self { glyphs }
    }
}

impl Default for BitmapFont {
    fn default() -> Self {
        Self::new()
    }
}

impl GlyphFont for BitmapFont {
    fn advance(&self) -> u32 {
        BITMAP_ADVANCE
    }

    fn line_height(&self) -> u32 {
        BITMAP_LINE_HEIGHT
    }

    fn glyph(&self, ch: char) -> Option<&GlyphMask> {
        self.glyphs.get(&ch)
    }
}

fn bitmap_mask(rows: &[u8; 7]) -> GlyphMask {
    let mut alpha = vec![0u8; (BITMAP_ADVANCE * BITMAP_LINE_HEIGHT) as usize];
    for (dy, bits) in rows.iter().enumerate() {
        for dx in 0..5u32 {
            if bits & (0b10000 >> dx) != 0 {
                let y = BITMAP_TOP + dy as u32;
                alpha[(y * BITMAP_ADVANCE + dx) as usize] = 255;
            }
        }
    }
    GlyphMask {
        width: BITMAP_ADVANCE,
        height: BITMAP_LINE_HEIGHT,
        alpha,
    }
}

/// TrueType/OpenType font rasterized once into a mask cache.
///
/// Every printable ASCII character is cached up front, so drawing never
/// touches the outline data.
pub struct TrueTypeFont {
    advance: u32,
    line_height: u32,
    glyphs: HashMap<char, GlyphMask>,
}

impl TrueTypeFont {
    /// Load a font file and rasterize it at `size_px` pixels.
    pub fn from_file(path: &Path, size_px: f32) -> Result<Self> {
        let data = fs::read(path)?;
        Self::from_bytes(data, size_px).map_err(|e| match e {
            Error::Font(msg) => Error::Font(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn from_bytes(data: Vec<u8>, size_px: f32) -> Result<Self> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(Error::invalid_config(format!(
                "font size must be positive, got {}",
                size_px
            )));
        }
        let font = FontVec::try_from_vec(data).map_err(|e| Error::Font(e.to_string()))?;
        let scale = PxScale::from(size_px);
        let units = font.height_unscaled();

        let v_advance = font.ascent_unscaled() - font.descent_unscaled() + font.line_gap_unscaled();
        let line_height = ((v_advance * scale.y / units).ceil() as u32).max(1);
        let h_advance = font.h_advance_unscaled(font.glyph_id('M'));
        let advance = ((h_advance * scale.x / units).ceil() as u32).max(1);

        let mut glyphs = HashMap::new();
        let ascent_px = font.ascent_unscaled() * scale.y / units;
        for ch in (32u8..=126).map(char::from) {
            let id = font.glyph_id(ch);
            if id.0 == 0 {
                continue;
            }
            let mut alpha = vec![0u8; (advance * line_height) as usize];
            let glyph = id.with_scale_and_position(scale, point(0.0, ascent_px));
            if let Some(outline) = font.outline_glyph(glyph) {
                let bounds = outline.px_bounds();
                outline.draw(|x, y, v| {
                    let px = x as i32 + bounds.min.x as i32;
                    let py = y as i32 + bounds.min.y as i32;
                    if px >= 0 && py >= 0 && (px as u32) < advance && (py as u32) < line_height {
                        alpha[(py as u32 * advance + px as u32) as usize] = (v * 255.0).round() as u8;
                    }
                });
            }
            glyphs.insert(
                ch,
                GlyphMask {
                    width: advance,
                    height: line_height,
                    alpha,
                },
            );
        }

        debug!(
            "Rasterized {} glyphs at {}px ({}x{} cells)",
            glyphs.len(),
            size_px,
            advance,
            line_height
        );

        Ok(Self {
            advance,
            line_height,
            glyphs,
        })
    }
}

impl GlyphFont for TrueTypeFont {
    fn advance(&self) -> u32 {
        self.advance
    }

    fn line_height(&self) -> u32 {
        self.line_height
    }

    fn glyph(&self, ch: char) -> Option<&GlyphMask> {
        self.glyphs.get(&ch)
    }
}
