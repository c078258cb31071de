//! The external video encoder.

use log::debug;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::{Error, Result};

/// One encoder invocation: a numbered image sequence in, a video file out.
#[derive(Debug, Clone, Copy)]
pub struct EncodeJob<'a> {
    /// printf-style pattern matching the staged images, e.g. `frame_%04d.png`
    pub input_pattern: &'a Path,
    /// Frames per second of the output video
    pub frame_rate: u32,
    /// Destination file, overwritten if present
    pub output: &'a Path,
    pub frame_count: usize,
}

/// Turns a staged image sequence into a video file.
///
/// Implementations must fail with [`Error::EncodingFailed`] rather than
/// report success for a partial or missing output.
pub trait VideoEncoder {
    fn encode(&self, job: &EncodeJob<'_>) -> Result<()>;
}

/// Encodes with an `ffmpeg` subprocess (H.264, yuv420p).
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: String,
    codec: String,
    preset: String,
    pixel_format: String,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            codec: "libx264".to_string(),
            preset: "ultrafast".to_string(),
            pixel_format: "yuv420p".to_string(),
        }
    }
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific ffmpeg executable.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub(crate) fn args(&self, job: &EncodeJob<'_>) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y", "-r"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(job.frame_rate.to_string().into());
        args.push("-i".into());
        args.push(job.input_pattern.into());
        // yuv420p needs even dimensions; pad odd canvases with background
        args.push("-vf".into());
        args.push("pad=ceil(iw/2)*2:ceil(ih/2)*2:color=white".into());
        args.push("-c:v".into());
        args.push(self.codec.as_str().into());
        args.push("-preset".into());
        args.push(self.preset.as_str().into());
        args.push("-pix_fmt".into());
        args.push(self.pixel_format.as_str().into());
        args.push(job.output.into());
        args
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn encode(&self, job: &EncodeJob<'_>) -> Result<()> {
        let args = self.args(job);
        debug!("Running {} {:?}", self.binary, args);

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => Error::EncodingFailed(format!("{} not found on PATH", self.binary)),
                _ => Error::EncodingFailed(format!("running {}: {}", self.binary, e)),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::EncodingFailed(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Whether `binary -version` runs successfully.
pub fn ffmpeg_available(binary: &str) -> bool {
    Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
