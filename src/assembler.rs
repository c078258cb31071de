//! Staging rendered frames on disk and handing them to the encoder.

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::encoder::{EncodeJob, VideoEncoder};
use crate::error::{Error, Result};
use crate::renderer::RenderedImage;

const MIN_INDEX_WIDTH: usize = 4;

/// When the staged stills are deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupPolicy {
    /// Only after a successful encode; otherwise left for inspection
    #[default]
    OnSuccess,
    /// Whatever happens
    Always,
    /// Never; the directory outlives the run
    Never,
}

/// Scratch directory owned by exactly one conversion run.
///
/// Removal is decided on drop from the [`CleanupPolicy`] and whether an
/// encode succeeded, so an error after encoding still cleans up.
pub struct StagingDir {
    path: PathBuf,
    dir: Option<TempDir>,
    policy: CleanupPolicy,
    encoded: bool,
}

impl StagingDir {
    /// Fresh directory under the system temp dir.
    pub fn new(policy: CleanupPolicy) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("vidascii-").tempdir()?;
        Ok(Self::from_temp_dir(dir, policy))
    }

    /// Fresh directory under `parent`.
    pub fn new_in(parent: &Path, policy: CleanupPolicy) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("vidascii-")
            .tempdir_in(parent)?;
        Ok(Self::from_temp_dir(dir, policy))
    }

    fn from_temp_dir(dir: TempDir, policy: CleanupPolicy) -> Self {
        debug!("Staging frames in {}", dir.path().display());
        Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
            policy,
            encoded: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> CleanupPolicy {
        self.policy
    }

    /// Staged `.png` files, sorted by name.
    pub fn staged_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.path)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| p.extension().map(|e| e == "png").unwrap_or(false))
            .collect();
        files.sort();
        files
    }

    fn should_remove(&self) -> bool {
        match self.policy {
            CleanupPolicy::Always => true,
            CleanupPolicy::OnSuccess => self.encoded,
            CleanupPolicy::Never => false,
        }
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        if self.should_remove() {
            if let Err(e) = dir.close() {
                warn!("Failed to remove staging dir {}: {}", self.path.display(), e);
            }
        } else {
            let kept = dir.keep();
            if self.encoded || self.policy == CleanupPolicy::Never {
                info!("Staged frames kept in {}", kept.display());
            } else {
                warn!("Staged frames left in {} for inspection", kept.display());
            }
        }
    }
}

/// Result of a successful encode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodeSummary {
    pub frames: usize,
    pub frame_rate: u32,
    pub output: PathBuf,
}

/// Collects rendered frames in temporal order and encodes them once.
///
/// Frames are written as `frame_0000.png`, `frame_0001.png`, … so that
/// filename order is frame order. The caller is responsible for appending in
/// the right order; nothing here reorders.
pub struct SequenceAssembler {
    staging: StagingDir,
    len: usize,
    index_width: usize,
}

impl SequenceAssembler {
    pub fn new(staging: StagingDir) -> Self {
        Self {
            staging,
            len: 0,
            index_width: MIN_INDEX_WIDTH,
        }
    }

    /// Pad indices wide enough for `expected` frames.
    pub fn with_expected_frames(staging: StagingDir, expected: u64) -> Self {
        let digits = expected.saturating_sub(1).max(1).to_string().len();
        Self {
            staging,
            len: 0,
            index_width: digits.max(MIN_INDEX_WIDTH),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn staging(&self) -> &StagingDir {
        &self.staging
    }

    pub fn index_width(&self) -> usize {
        self.index_width
    }

    pub fn frame_path(&self, index: usize) -> PathBuf {
        self.staging
            .path()
            .join(format!("frame_{:0width$}.png", index, width = self.index_width))
    }

    /// Pattern the encoder uses to find the staged frames.
    pub fn input_pattern(&self) -> PathBuf {
        self.staging
            .path()
            .join(format!("frame_%0{}d.png", self.index_width))
    }

    /// Stage the next frame.
    pub fn append(&mut self, image: &RenderedImage) -> Result<PathBuf> {
        let path = self.frame_path(self.len);
        image.save(&path)?;
        self.len += 1;
        Ok(path)
    }

    /// Stage several consecutive frames, writing them in parallel.
    pub fn append_batch(&mut self, images: &[RenderedImage]) -> Result<()> {
        let start = self.len;
        images
            .par_iter()
            .enumerate()
            .try_for_each(|(i, image)| -> Result<()> {
                image.save(self.frame_path(start + i))?;
                Ok(())
            })?;
        self.len += images.len();
        debug!("Staged frames {}..{}", start, self.len);
        Ok(())
    }

    /// Encode everything staged so far into `output`.
    ///
    /// On failure any file at `output` is removed so a broken video is never
    /// left behind; the staged frames stay unless the policy says otherwise.
    pub fn encode(mut self, encoder: &dyn VideoEncoder, frame_rate: u32, output: &Path) -> Result<EncodeSummary> {
        if self.len == 0 {
            return Err(Error::EmptySequence);
        }
        if frame_rate == 0 {
            return Err(Error::invalid_config("output frame rate must be at least 1"));
        }

        let pattern = self.input_pattern();
        let job = EncodeJob {
            input_pattern: &pattern,
            frame_rate,
            output,
            frame_count: self.len,
        };
        info!(
            "Encoding {} frames at {} fps into {}",
            self.len,
            frame_rate,
            output.display()
        );

        match encoder.encode(&job) {
            Ok(()) => {
                self.staging.encoded = true;
                Ok(EncodeSummary {
                    frames: self.len,
                    frame_rate,
                    output: output.to_path_buf(),
                })
            }
            Err(e) => {
                if output.exists() {
                    if let Err(rm) = fs::remove_file(output) {
                        warn!("Could not remove partial output {}: {}", output.display(), rm);
                    }
                }
                Err(e)
            }
        }
    }
}
