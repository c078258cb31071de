//! Decode → sample → reduce → render → stage → encode.

use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::assembler::{CleanupPolicy, SequenceAssembler, StagingDir};
use crate::config::Preset;
use crate::encoder::VideoEncoder;
use crate::error::{Error, Result};
use crate::grid::CellGrid;
use crate::reducer::{FrameReducer, RasterFrame, ReductionConfig, ReductionMode};
use crate::renderer::{FrameRenderer, RenderedImage};
use crate::source::{FrameSource, Sampler, SourceInfo};

/// Represents the current phase of a conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressPhase {
    /// Inspecting the input and starting the decoder
    Probing,
    /// Reducing and rendering sampled frames
    Converting,
    /// Waiting on the external encoder
    Encoding,
    /// Conversion completed successfully
    Complete,
}

/// Progress information for conversion operations
///
/// Passed to the caller's callback so a UI can show what is going on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub phase: ProgressPhase,
    /// Number of items completed in the current phase
    pub completed: usize,
    /// Total number of items in the current phase (0 if unknown)
    pub total: usize,
    /// Percentage complete (0.0 to 100.0)
    pub percentage: f64,
    pub message: String,
}

impl Progress {
    pub fn probing() -> Self {
        Self {
            phase: ProgressPhase::Probing,
            completed: 0,
            total: 0,
            percentage: 0.0,
            message: "Probing video...".to_string(),
        }
    }

    pub fn converting(completed: usize, total: usize) -> Self {
        let percentage = if total > 0 {
            (completed as f64 / total as f64 * 100.0).min(100.0)
        } else {
            0.0
        };
        Self {
            phase: ProgressPhase::Converting,
            completed,
            total,
            percentage,
            message: if total > 0 {
                format!("Converting frame {} of {}", completed, total)
            } else {
                format!("Converted {} frames", completed)
            },
        }
    }

    pub fn encoding(frames: usize) -> Self {
        Self {
            phase: ProgressPhase::Encoding,
            completed: 0,
            total: frames,
            percentage: 0.0,
            message: format!("Encoding {} frames...", frames),
        }
    }

    pub fn complete(frames: usize) -> Self {
        Self {
            phase: ProgressPhase::Complete,
            completed: frames,
            total: frames,
            percentage: 100.0,
            message: format!("Conversion complete: {} frames", frames),
        }
    }
}

const DEFAULT_BATCH_SIZE: usize = 32;

/// Options for one conversion run
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOptions {
    pub reduction: ReductionConfig,
    /// Output frames per second
    pub frame_rate: u32,
    /// Keep every Nth source frame; defaults to `frame_rate`
    pub stride: Option<u32>,
    pub cleanup: CleanupPolicy,
    /// Frames reduced and rendered together in parallel
    pub batch_size: usize,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            reduction: ReductionConfig::default(),
            frame_rate: 5,
            stride: None,
            cleanup: CleanupPolicy::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl ConversionOptions {
    pub fn from_preset(preset: &Preset) -> Self {
        Self {
            reduction: preset.reduction(),
            frame_rate: preset.frame_rate,
            ..Self::default()
        }
    }

    pub fn with_columns(mut self, columns: u32) -> Self {
        self.reduction.columns = columns;
        self
    }

    /// Cell height as a fraction of cell width.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.reduction.cell_aspect = scale;
        self
    }

    pub fn with_mode(mut self, mode: ReductionMode) -> Self {
        self.reduction.mode = mode;
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn with_stride(mut self, stride: u32) -> Self {
        self.stride = Some(stride);
        self
    }

    pub fn with_cleanup(mut self, cleanup: CleanupPolicy) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn stride(&self) -> u32 {
        self.stride.unwrap_or(self.frame_rate)
    }

    pub fn validate(&self) -> Result<()> {
        self.reduction.validate()?;
        if self.frame_rate == 0 {
            return Err(Error::invalid_config("frame rate must be at least 1"));
        }
        if self.stride() == 0 {
            return Err(Error::invalid_config("sampling stride must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(Error::invalid_config("batch size must be at least 1"));
        }
        Ok(())
    }
}

/// What a finished run did.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub version: String,
    pub source: SourceInfo,
    pub frames_decoded: u64,
    pub frames_rendered: usize,
    pub decode_exhausted: bool,
    pub stride: u32,
    pub frame_rate: u32,
    pub columns: u32,
    pub rows: u32,
    pub mode: ReductionMode,
    pub output: PathBuf,
}

/// Run a whole conversion from `source` into `output`.
///
/// Sampled frames are processed in batches: each batch is reduced and
/// rendered in parallel, then staged in source order. A source that ends
/// before its declared length is not an error; whatever was collected is
/// encoded and the report says so.
pub fn run<F>(
    source: &mut dyn FrameSource,
    renderer: &FrameRenderer,
    encoder: &dyn VideoEncoder,
    staging: StagingDir,
    output: &Path,
    options: &ConversionOptions,
    mut on_progress: F,
) -> Result<ConversionReport>
where
    F: FnMut(&Progress),
{
    options.validate()?;
    let info = source.info();
    let stride = options.stride();
    let config = options.reduction;
    let reducer = FrameReducer::new(config)?;

    let expected = info
        .total_frames
        .map(|n| n.div_ceil(stride as u64))
        .unwrap_or(0);
    info!(
        "Converting {}x{} source at {:.2} fps: every {} frame(s), {} expected",
        info.width, info.height, info.fps, stride, expected
    );

    let mut assembler = SequenceAssembler::with_expected_frames(staging, expected);
    let mut sampler = Sampler::new(source, stride)?;
    let mut rows = 0;
    on_progress(&Progress::converting(0, expected as usize));

    loop {
        let batch: Vec<RasterFrame> = sampler
            .by_ref()
            .take(options.batch_size)
            .map(|s| s.map(|s| s.frame))
            .collect::<Result<_>>()?;
        if batch.is_empty() {
            break;
        }
        if let Some(first) = batch.first().filter(|_| assembler.is_empty()) {
            rows = CellGrid::new(first.width(), first.height(), &config)?.rows();
        }

        let images: Vec<RenderedImage> = batch
            .par_iter()
            .map(|frame| {
                let reduced = reducer.reduce(frame)?;
                renderer.render(&reduced, &config, frame.width(), frame.height())
            })
            .collect::<Result<_>>()?;
        assembler.append_batch(&images)?;
        debug!("Batch of {} frames done, {} staged", images.len(), assembler.len());
        on_progress(&Progress::converting(assembler.len(), expected as usize));
    }

    let frames_decoded = sampler.decoded();
    let decode_exhausted = sampler.exhausted().is_some();

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    on_progress(&Progress::encoding(assembler.len()));
    let summary = assembler.encode(encoder, options.frame_rate, output)?;
    on_progress(&Progress::complete(summary.frames));
    info!("Wrote {} frames to {}", summary.frames, summary.output.display());

    Ok(ConversionReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        source: info,
        frames_decoded,
        frames_rendered: summary.frames,
        decode_exhausted,
        stride,
        frame_rate: summary.frame_rate,
        columns: config.columns,
        rows,
        mode: config.mode,
        output: summary.output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride_defaults_to_frame_rate() {
        let opts = ConversionOptions::default().with_frame_rate(7);
        assert_eq!(opts.stride(), 7);
        assert_eq!(opts.with_stride(2).stride(), 2);
    }

    #[test]
    fn test_from_preset() {
        let preset = Preset {
            columns: 64,
            scale: 0.8,
            frame_rate: 3,
            color: false,
        };
        let opts = ConversionOptions::from_preset(&preset);
        assert_eq!(opts.reduction, ReductionConfig::new(64, 0.8, ReductionMode::Grayscale));
        assert_eq!(opts.frame_rate, 3);
        assert_eq!(opts.cleanup, CleanupPolicy::OnSuccess);
    }

    #[test]
    fn test_validate() {
        assert!(ConversionOptions::default().validate().is_ok());
        for bad in [
            ConversionOptions::default().with_frame_rate(0),
            ConversionOptions::default().with_stride(0),
            ConversionOptions::default().with_columns(0),
            ConversionOptions::default().with_scale(-1.0),
            ConversionOptions::default().with_batch_size(0),
        ] {
            assert!(matches!(bad.validate(), Err(Error::InvalidConfig(_))), "{:?}", bad);
        }
    }

    #[test]
    fn test_progress_percentages() {
        assert_eq!(Progress::converting(5, 10).percentage, 50.0);
        assert_eq!(Progress::converting(3, 0).percentage, 0.0);
        assert_eq!(Progress::converting(12, 10).percentage, 100.0);
        assert_eq!(Progress::complete(4).phase, ProgressPhase::Complete);
    }
}
