//! Cell geometry shared by the reducer and the renderer.
//!
//! Both sides must agree on where a row starts, otherwise the rendered text
//! drifts away from the pixels it was sampled from. Everything that depends on
//! `columns` and `cell_aspect` lives here.

use crate::error::{Error, Result};
use crate::reducer::ReductionConfig;

/// Pixel rectangle covered by one cell, half-open on the right and bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellBounds {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl CellBounds {
    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }
}

/// Partition of a `width × height` raster into `rows × columns` cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellGrid {
    width: u32,
    height: u32,
    columns: u32,
    rows: u32,
    cell_width: f64,
    cell_height: f64,
}

impl CellGrid {
    /// Lay out the grid for a raster of the given size.
    ///
    /// Fails with [`Error::InvalidConfig`] when the config is malformed or the
    /// raster has a zero dimension.
    pub fn new(width: u32, height: u32, config: &ReductionConfig) -> Result<Self> {
        config.validate()?;
        if width == 0 || height == 0 {
            return Err(Error::invalid_config(format!(
                "frame must have non-zero dimensions, got {}x{}",
                width, height
            )));
        }

        let cell_width = width as f64 / config.columns as f64;
        let cell_height = row_height(width, config);
        let rows = (height as f64 / cell_height).floor() as u32;

        Ok(Self {
            width,
            height,
            columns: config.columns,
            rows,
            cell_width,
            cell_height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn cell_width(&self) -> f64 {
        self.cell_width
    }

    pub fn cell_height(&self) -> f64 {
        self.cell_height
    }

    /// Top edge of `row` in pixels. Each boundary is truncated on its own,
    /// never accumulated from the previous row.
    pub fn row_offset(&self, row: u32) -> u32 {
        (row as f64 * self.cell_height).floor() as u32
    }

    /// Left edge of `column` in pixels.
    pub fn column_offset(&self, column: u32) -> u32 {
        (column as f64 * self.cell_width).floor() as u32
    }

    /// Pixel bounds of cell (`row`, `column`).
    ///
    /// When a cell is narrower or shorter than one pixel the floor-based
    /// bounds collapse to an empty span; such spans are widened to the single
    /// pixel at their start so every cell has something to average.
    pub fn cell_bounds(&self, row: u32, column: u32) -> CellBounds {
        let (x1, x2) = widen(
            self.column_offset(column),
            self.column_offset(column + 1),
            self.width,
        );
        let (y1, y2) = widen(self.row_offset(row), self.row_offset(row + 1), self.height);
        CellBounds { x1, y1, x2, y2 }
    }
}

/// Height of one text row for a canvas `width` pixels wide.
pub fn row_height(width: u32, config: &ReductionConfig) -> f64 {
    config.cell_aspect * (width as f64 / config.columns as f64)
}

fn widen(start: u32, end: u32, limit: u32) -> (u32, u32) {
    let start = start.min(limit - 1);
    let end = end.min(limit);
    if end <= start {
        (start, start + 1)
    } else {
        (start, end)
    }
}
