//! Draws reduced frames back onto a pixel canvas.

use image::{Rgb, RgbImage};
use log::debug;
use rayon::prelude::*;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::font::{BitmapFont, GlyphFont};
use crate::grid::row_height;
use crate::reducer::{ReducedFrame, ReductionConfig};

/// A rendered frame, ready to be staged for encoding.
pub type RenderedImage = RgbImage;

pub const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
pub const FOREGROUND: Rgb<u8> = Rgb([0, 0, 0]);

/// Rasterizes [`ReducedFrame`]s with a monospaced [`GlyphFont`].
#[derive(Clone)]
pub struct FrameRenderer {
    font: Arc<dyn GlyphFont>,
    background: Rgb<u8>,
    foreground: Rgb<u8>,
}

impl FrameRenderer {
    /// Renderer using the built-in bitmap font.
    pub fn new() -> Self {
        Self::with_font(Arc::new(BitmapFont::new()))
    }

    pub fn with_font(font: Arc<dyn GlyphFont>) -> Self {
        Self {
            font,
            background: BACKGROUND,
            foreground: FOREGROUND,
        }
    }

    pub fn font(&self) -> &dyn GlyphFont {
        self.font.as_ref()
    }

    /// Draw `frame` onto a `width × height` white canvas.
    ///
    /// `config` must be the one the frame was reduced with: row `i` starts at
    /// `floor(i * cell_aspect * width / columns)`, the same offset the
    /// reducer sampled from.
    pub fn render(
        &self,
        frame: &ReducedFrame,
        config: &ReductionConfig,
        width: u32,
        height: u32,
    ) -> Result<RenderedImage> {
        config.validate()?;
        if width == 0 || height == 0 {
            return Err(Error::invalid_config(format!(
                "canvas must have non-zero dimensions, got {}x{}",
                width, height
            )));
        }

        let pitch = row_height(width, config);
        let mut canvas = RgbImage::from_pixel(width, height, self.background);
        for row in 0..frame.rows() {
            let y = row_offset(pitch, row);
            if y >= height {
                break;
            }
            self.draw_line(&mut canvas, frame, row, y);
        }
        debug!(
            "Rendered {}x{} glyphs onto {}x{} canvas",
            frame.columns(),
            frame.rows(),
            width,
            height
        );
        Ok(canvas)
    }

    /// Render a batch of frames in parallel, keeping their order.
    pub fn render_batch(
        &self,
        frames: &[ReducedFrame],
        config: &ReductionConfig,
        width: u32,
        height: u32,
    ) -> Result<Vec<RenderedImage>> {
        frames
            .par_iter()
            .map(|f| self.render(f, config, width, height))
            .collect()
    }

    fn draw_line(&self, canvas: &mut RgbImage, frame: &ReducedFrame, row: u32, top: u32) {
        let advance = self.font.advance();
        for (col, cell) in frame.row(row).enumerate() {
            let left = col as u32 * advance;
            if left >= canvas.width() {
                break;
            }
            let Some(mask) = self.font.glyph(cell.glyph) else {
                continue;
            };
            let color = cell.color.unwrap_or(self.foreground);
            blit(canvas, mask, left, top, color);
        }
    }
}

impl Default for FrameRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Vertical offset of `row` for a given row pitch.
pub fn row_offset(pitch: f64, row: u32) -> u32 {
    (row as f64 * pitch).floor() as u32
}

fn blit(canvas: &mut RgbImage, mask: &crate::font::GlyphMask, left: u32, top: u32, color: Rgb<u8>) {
    let w = mask.width().min(canvas.width() - left);
    let h = mask.height().min(canvas.height().saturating_sub(top));
    for dy in 0..h {
        for dx in 0..w {
            let a = mask.alpha(dx, dy);
            if a == 0 {
                continue;
            }
            let px = canvas.get_pixel_mut(left + dx, top + dy);
            *px = blend(*px, color, a);
        }
    }
}

fn blend(under: Rgb<u8>, over: Rgb<u8>, alpha: u8) -> Rgb<u8> {
    let a = alpha as f32 / 255.0;
    let mix = |u: u8, o: u8| (o as f32 * a + u as f32 * (1.0 - a)).round() as u8;
    Rgb([
        mix(under[0], over[0]),
        mix(under[1], over[1]),
        mix(under[2], over[2]),
    ])
}
