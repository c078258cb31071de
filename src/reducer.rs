//! Frame reduction: raster pixels to a grid of ramp glyphs.

use image::{Rgb, RgbImage};
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::error::{Error, Result};
use crate::grid::{CellBounds, CellGrid};

/// Glyph ramp ordered from darkest-looking to lightest.
pub const GLYPH_RAMP: [char; 10] = ['@', '%', '#', '*', '+', '=', '-', ':', '.', ' '];

/// A decoded video frame. Pixels are stored blue, green, red, the order the
/// decoder emits them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RasterFrame {
    /// Wrap a packed BGR24 buffer.
    pub fn from_bgr(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(Error::invalid_config(format!(
                "BGR buffer for {}x{} frame must be {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self { width, height, data })
    }

    /// Copy an RGB image, reordering channels to BGR.
    pub fn from_rgb_image(img: &RgbImage) -> Self {
        let (width, height) = img.dimensions();
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for px in img.pixels() {
            data.extend_from_slice(&[px[2], px[1], px[0]]);
        }
        Self { width, height, data }
    }

    /// A frame where every pixel has the same `[b, g, r]` value.
    pub fn filled(width: u32, height: u32, bgr: [u8; 3]) -> Self {
        let data = bgr.repeat(width as usize * height as usize);
        Self { width, height, data }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `[b, g, r]` at (`x`, `y`).
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// How a cell's brightness is measured and whether its color is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReductionMode {
    /// Perceptual luma, glyphs only.
    Grayscale,
    /// Plain channel average, glyphs carry the cell's mean color.
    #[default]
    Color,
}

const LUMA_R: f64 = 0.2989;
const LUMA_G: f64 = 0.5870;
const LUMA_B: f64 = 0.1140;

// Absorbs float error at ramp boundaries without moving them
const RAMP_EPSILON: f64 = 1e-9;

impl ReductionMode {
    /// Brightness of a mean cell color on a 0–255 scale.
    ///
    /// The two modes use different formulas on purpose: grayscale weights the
    /// channels (ITU-R 601), color mode averages them evenly. The grayscale
    /// weights sum to 0.9999, so the weighted sum is divided by that total to
    /// let pure white reach 255.
    pub fn luminance(self, mean: MeanColor) -> f64 {
        let l = match self {
            ReductionMode::Grayscale => {
                (LUMA_R * mean.r + LUMA_G * mean.g + LUMA_B * mean.b) / (LUMA_R + LUMA_G + LUMA_B)
            }
            ReductionMode::Color => (mean.r + mean.g + mean.b) / 3.0,
        };
        l.clamp(0.0, 255.0)
    }

    pub fn carries_color(self) -> bool {
        matches!(self, ReductionMode::Color)
    }
}

/// Reduction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReductionConfig {
    /// Glyphs per row
    pub columns: u32,
    /// Cell height as a multiple of cell width
    pub cell_aspect: f64,
    pub mode: ReductionMode,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            columns: 100,
            cell_aspect: 0.5,
            mode: ReductionMode::Color,
        }
    }
}

impl ReductionConfig {
    pub fn new(columns: u32, cell_aspect: f64, mode: ReductionMode) -> Self {
        Self {
            columns,
            cell_aspect,
            mode,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.columns < 1 {
            return Err(Error::invalid_config("columns must be at least 1"));
        }
        if !self.cell_aspect.is_finite() || self.cell_aspect <= 0.0 {
            return Err(Error::invalid_config(format!(
                "cell aspect must be a positive number, got {}",
                self.cell_aspect
            )));
        }
        Ok(())
    }
}

/// Per-channel mean over one cell, in RGB order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeanColor {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl MeanColor {
    fn to_rgb(self) -> Rgb<u8> {
        let round = |v: f64| v.round().clamp(0.0, 255.0) as u8;
        Rgb([round(self.r), round(self.g), round(self.b)])
    }
}

/// One output position: a ramp glyph and, in color mode, its color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphCell {
    pub glyph: char,
    pub color: Option<Rgb<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cells {
    Grayscale(Vec<char>),
    Color(Vec<(char, Rgb<u8>)>),
}

/// Row-major glyph grid produced from one [`RasterFrame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReducedFrame {
    rows: u32,
    columns: u32,
    cells: Cells,
}

impl ReducedFrame {
    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn mode(&self) -> ReductionMode {
        match self.cells {
            Cells::Grayscale(_) => ReductionMode::Grayscale,
            Cells::Color(_) => ReductionMode::Color,
        }
    }

    pub fn cell(&self, row: u32, column: u32) -> Option<GlyphCell> {
        if row >= self.rows || column >= self.columns {
            return None;
        }
        let i = row as usize * self.columns as usize + column as usize;
        Some(self.cell_at(i))
    }

    /// Cells of one row, left to right.
    pub fn row(&self, row: u32) -> impl Iterator<Item = GlyphCell> + '_ {
        let start = row.min(self.rows) as usize * self.columns as usize;
        let end = if row < self.rows { start + self.columns as usize } else { start };
        (start..end).map(move |i| self.cell_at(i))
    }

    /// All cells, row-major.
    pub fn cells(&self) -> impl Iterator<Item = GlyphCell> + '_ {
        (0..self.rows as usize * self.columns as usize).map(move |i| self.cell_at(i))
    }

    fn cell_at(&self, i: usize) -> GlyphCell {
        match &self.cells {
            Cells::Grayscale(glyphs) => GlyphCell {
                glyph: glyphs[i],
                color: None,
            },
            Cells::Color(cells) => GlyphCell {
                glyph: cells[i].0,
                color: Some(cells[i].1),
            },
        }
    }

    /// Glyphs only, one line per row, each line ending in `\n`.
    pub fn to_text(&self) -> String {
        let mut out = String::with_capacity((self.columns as usize + 1) * self.rows as usize);
        for row in 0..self.rows {
            out.extend(self.row(row).map(|c| c.glyph));
            out.push('\n');
        }
        out
    }

    /// Like [`to_text`](Self::to_text), but color cells are prefixed with a
    /// 24-bit foreground escape for terminal display.
    pub fn to_ansi(&self) -> String {
        let mut out = String::new();
        for row in 0..self.rows {
            for cell in self.row(row) {
                if let Some(Rgb([r, g, b])) = cell.color {
                    let _ = write!(out, "\x1b[38;2;{};{};{}m", r, g, b);
                }
                out.push(cell.glyph);
            }
            if self.mode().carries_color() {
                out.push_str("\x1b[0m");
            }
            out.push('\n');
        }
        out
    }
}

/// Ramp index for a luminance value: `floor(L / 255 * 9)`. Darker values map
/// to lower indices.
pub fn glyph_index(luminance: f64) -> usize {
    let last = GLYPH_RAMP.len() - 1;
    let scaled = luminance.clamp(0.0, 255.0) * last as f64 / 255.0;
    ((scaled + RAMP_EPSILON).floor() as usize).min(last)
}

pub fn glyph_for(luminance: f64) -> char {
    GLYPH_RAMP[glyph_index(luminance)]
}

/// Mean color of one cell.
///
/// Averages down each pixel column first, then across the column means.
pub fn cell_mean(frame: &RasterFrame, bounds: CellBounds) -> MeanColor {
    let h = bounds.height() as f64;
    let mut sums = [0.0f64; 3];
    for x in bounds.x1..bounds.x2 {
        let mut col = [0u64; 3];
        for y in bounds.y1..bounds.y2 {
            let px = frame.pixel(x, y);
            col[0] += px[0] as u64;
            col[1] += px[1] as u64;
            col[2] += px[2] as u64;
        }
        for c in 0..3 {
            sums[c] += col[c] as f64 / h;
        }
    }
    let w = bounds.width() as f64;
    MeanColor {
        r: sums[2] / w,
        g: sums[1] / w,
        b: sums[0] / w,
    }
}

/// Maps raster frames to glyph grids. Holds no mutable state, so one reducer
/// can be shared across threads.
#[derive(Debug, Clone)]
pub struct FrameReducer {
    config: ReductionConfig,
}

impl FrameReducer {
    pub fn new(config: ReductionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ReductionConfig {
        &self.config
    }

    pub fn reduce(&self, frame: &RasterFrame) -> Result<ReducedFrame> {
        reduce_frame(frame, &self.config)
    }

    /// Reduce a slice of frames in parallel, keeping their order.
    pub fn reduce_batch(&self, frames: &[RasterFrame]) -> Result<Vec<ReducedFrame>> {
        frames.par_iter().map(|f| self.reduce(f)).collect()
    }
}

/// Reduce one frame.
pub fn reduce_frame(frame: &RasterFrame, config: &ReductionConfig) -> Result<ReducedFrame> {
    let grid = CellGrid::new(frame.width(), frame.height(), config)?;
    debug!(
        "Reducing {}x{} frame to {}x{} cells",
        frame.width(),
        frame.height(),
        grid.columns(),
        grid.rows()
    );

    let count = grid.rows() as usize * grid.columns() as usize;
    let means = (0..grid.rows())
        .flat_map(|row| (0..grid.columns()).map(move |col| (row, col)))
        .map(|(row, col)| cell_mean(frame, grid.cell_bounds(row, col)));

    let mode = config.mode;
    let cells = match mode {
        ReductionMode::Grayscale => {
            let mut glyphs = Vec::with_capacity(count);
            glyphs.extend(means.map(|m| glyph_for(mode.luminance(m))));
            Cells::Grayscale(glyphs)
        }
        ReductionMode::Color => {
            let mut cells = Vec::with_capacity(count);
            cells.extend(means.map(|m| (glyph_for(mode.luminance(m)), m.to_rgb())));
            Cells::Color(cells)
        }
    };

    Ok(ReducedFrame {
        rows: grid.rows(),
        columns: grid.columns(),
        cells,
    })
}
