//! # vidascii - ASCII Art Video Converter Library
//!
//! `vidascii` turns every Nth frame of a video into ASCII art, draws the
//! characters back onto an image, and encodes the results into a new video.
//!
//! ## Features
//!
//! - Grayscale or color-preserving frame reduction
//! - Built-in bitmap font, or any TrueType font
//! - Parallel reduction and rendering
//! - Progress reporting for integration with UI applications
//!
//! Decoding and encoding are done by external `ffmpeg`/`ffprobe` processes.
//!
//! ## Example
//!
//! ```no_run
//! use vidascii::{ConversionOptions, VideoConverter};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let converter = VideoConverter::new();
//! let options = ConversionOptions::default().with_columns(120);
//! converter.convert_video(Path::new("clip.mp4"), Path::new("clip_ascii.mp4"), &options)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Progress Reporting
//!
//! ```no_run
//! use vidascii::{ConversionOptions, ProgressPhase, VideoConverter};
//! use std::path::Path;
//!
//! let converter = VideoConverter::new();
//! converter.convert_video_with_progress(
//!     Path::new("clip.mp4"),
//!     Path::new("out.mp4"),
//!     &ConversionOptions::default(),
//!     |progress| match progress.phase {
//!         ProgressPhase::Converting => println!("{:.1}%", progress.percentage),
//!         _ => println!("{}", progress.message),
//!     },
//! ).unwrap();
//! ```
//!
//! ## Without ffmpeg
//!
//! The stages are usable on their own:
//!
//! ```
//! use vidascii::{reduce_frame, RasterFrame, ReductionConfig, ReductionMode};
//!
//! let frame = RasterFrame::filled(1, 1, [0, 0, 0]);
//! let config = ReductionConfig::new(1, 1.0, ReductionMode::Grayscale);
//! let reduced = reduce_frame(&frame, &config).unwrap();
//! assert_eq!(reduced.to_text(), "@\n");
//! ```

pub mod assembler;
pub mod config;
pub mod encoder;
pub mod error;
pub mod font;
pub mod grid;
pub mod pipeline;
pub mod reducer;
pub mod renderer;
pub mod source;

pub use assembler::{CleanupPolicy, EncodeSummary, SequenceAssembler, StagingDir};
pub use config::{AppConfig, InputPolicy, Preset};
pub use encoder::{ffmpeg_available, EncodeJob, FfmpegEncoder, VideoEncoder};
pub use error::{Error, Result};
pub use font::{BitmapFont, GlyphFont, TrueTypeFont};
pub use grid::{CellBounds, CellGrid};
pub use pipeline::{ConversionOptions, ConversionReport, Progress, ProgressPhase};
pub use reducer::{
    reduce_frame, FrameReducer, GlyphCell, RasterFrame, ReducedFrame, ReductionConfig, ReductionMode,
    GLYPH_RAMP,
};
pub use renderer::{FrameRenderer, RenderedImage};
pub use source::{FfmpegSource, FrameSource, MemorySource, Sampler, SourceInfo};

use log::info;
use std::path::Path;
use std::sync::Arc;

/// Main converter: wires the ffmpeg decoder and encoder to the pipeline.
pub struct VideoConverter {
    config: AppConfig,
    renderer: FrameRenderer,
}

impl VideoConverter {
    /// Create a new converter with default configuration
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            renderer: FrameRenderer::new(),
        }
    }

    /// Create a converter with custom configuration, loading its font if one
    /// is configured.
    pub fn with_config(config: AppConfig) -> Result<Self> {
        let renderer = match &config.font_path {
            Some(path) => {
                info!("Using font {}", path.display());
                FrameRenderer::with_font(Arc::new(TrueTypeFont::from_file(path, config.font_size)?))
            }
            None => FrameRenderer::new(),
        };
        Ok(Self { config, renderer })
    }

    /// Load configuration from a file
    pub fn from_config_file(path: &Path) -> Result<Self> {
        Self::with_config(AppConfig::from_file(path)?)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn renderer(&self) -> &FrameRenderer {
        &self.renderer
    }

    /// Options from the configured default preset.
    pub fn default_options(&self) -> Result<ConversionOptions> {
        Ok(ConversionOptions::from_preset(self.config.active_preset()?).with_cleanup(self.config.cleanup))
    }

    /// Convert `input` into an ASCII-art video at `output`.
    pub fn convert_video(&self, input: &Path, output: &Path, options: &ConversionOptions) -> Result<ConversionReport> {
        self.convert_video_with_progress(input, output, options, |_| {})
    }

    /// Like [`convert_video`](Self::convert_video), reporting progress to
    /// `on_progress`.
    pub fn convert_video_with_progress<F>(
        &self,
        input: &Path,
        output: &Path,
        options: &ConversionOptions,
        mut on_progress: F,
    ) -> Result<ConversionReport>
    where
        F: FnMut(&Progress),
    {
        options.validate()?;
        self.config.input_policy().check(input)?;

        on_progress(&Progress::probing());
        let mut source = FfmpegSource::open_with(&self.config.ffmpeg, &self.config.ffprobe, input)?;
        let encoder = FfmpegEncoder::new().with_binary(self.config.ffmpeg.as_str());
        let staging = StagingDir::new(options.cleanup)?;

        pipeline::run(
            &mut source,
            &self.renderer,
            &encoder,
            staging,
            output,
            options,
            on_progress,
        )
    }

    /// Reduce the first frame of `input`, e.g. to show in a terminal.
    pub fn preview(&self, input: &Path, options: &ConversionOptions) -> Result<Option<ReducedFrame>> {
        options.validate()?;
        self.config.input_policy().check(input)?;
        let mut source = FfmpegSource::open_with(&self.config.ffmpeg, &self.config.ffprobe, input)?;
        match source.next_frame()? {
            Some(frame) => reduce_frame(&frame, &options.reduction).map(Some),
            None => Ok(None),
        }
    }
}

impl Default for VideoConverter {
    fn default() -> Self {
        Self::new()
    }
}
