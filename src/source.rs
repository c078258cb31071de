//! Decoded frame sources and the every-Nth-frame sampler.
//!
//! [`FfmpegSource`] asks `ffprobe` for stream metadata, then reads packed
//! BGR24 frames from an `ffmpeg` rawvideo pipe.

use log::{debug, info, warn};
use serde::Serialize;
use std::ffi::OsString;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

use crate::error::{Error, Result};
use crate::reducer::RasterFrame;

/// Stream metadata reported by a source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    /// Native frame rate of the source
    pub fps: f64,
    /// Declared number of frames, when the container knows it
    pub total_frames: Option<u64>,
}

/// Anything that yields decoded frames in presentation order.
pub trait FrameSource {
    fn info(&self) -> SourceInfo;

    /// Next frame, or `None` once the stream is over.
    fn next_frame(&mut self) -> Result<Option<RasterFrame>>;
}

/// Frames held in memory. Handy for tests and for callers that decode
/// themselves.
#[derive(Debug)]
pub struct MemorySource {
    info: SourceInfo,
    frames: std::vec::IntoIter<RasterFrame>,
}

impl MemorySource {
    /// `declared` overrides the frame count the source reports; by default it
    /// is the number of frames given.
    pub fn new(frames: Vec<RasterFrame>, fps: f64, declared: Option<u64>) -> Self {
        let (width, height) = frames
            .first()
            .map(|f| (f.width(), f.height()))
            .unwrap_or((0, 0));
        let total_frames = declared.or(Some(frames.len() as u64));
        Self {
            info: SourceInfo {
                width,
                height,
                fps,
                total_frames,
            },
            frames: frames.into_iter(),
        }
    }
}

impl FrameSource for MemorySource {
    fn info(&self) -> SourceInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RasterFrame>> {
        Ok(self.frames.next())
    }
}

/// Query `ffprobe` for the first video stream's size, rate and frame count.
pub fn probe_video(ffprobe: &str, path: &Path) -> Result<SourceInfo> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate,nb_frames,duration",
            "-of",
            "default=noprint_wrappers=1",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| Error::Decode(format!("running {}: {}", ffprobe, e)))?;

    if !output.status.success() {
        return Err(Error::Decode(format!(
            "{} failed on {}: {}",
            ffprobe,
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let info = parse_probe_output(&String::from_utf8_lossy(&output.stdout))
        .ok_or_else(|| Error::Decode(format!("no video stream found in {}", path.display())))?;
    info!(
        "Probed {}: {}x{} @ {:.3} fps, {} frames",
        path.display(),
        info.width,
        info.height,
        info.fps,
        info.total_frames.map_or_else(|| "unknown".to_string(), |n| n.to_string())
    );
    Ok(info)
}

/// Parse `key=value` lines as printed by `ffprobe -of default=noprint_wrappers=1`.
pub(crate) fn parse_probe_output(text: &str) -> Option<SourceInfo> {
    let mut width = 0u32;
    let mut height = 0u32;
    let mut fps = 0.0f64;
    let mut nb_frames = None;
    let mut duration = None;

    for line in text.lines() {
        let Some((key, val)) = line.trim().split_once('=') else {
            continue;
        };
        match key {
            "width" => width = val.parse().unwrap_or(0),
            "height" => height = val.parse().unwrap_or(0),
            "r_frame_rate" => fps = parse_rate(val).unwrap_or(0.0),
            "nb_frames" => nb_frames = val.parse::<u64>().ok().filter(|&n| n > 0),
            "duration" => duration = val.parse::<f64>().ok().filter(|d| *d > 0.0),
            _ => {}
        }
    }

    if width == 0 || height == 0 {
        return None;
    }
    let total_frames = nb_frames.or_else(|| match duration {
        Some(d) if fps > 0.0 => Some((d * fps).round() as u64),
        _ => None,
    });
    Some(SourceInfo {
        width,
        height,
        fps,
        total_frames,
    })
}

// "30000/1001" or "25"
fn parse_rate(val: &str) -> Option<f64> {
    match val.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            (den > 0.0).then(|| num / den)
        }
        None => val.trim().parse().ok(),
    }
}

/// Frames decoded by an `ffmpeg` child process.
pub struct FfmpegSource {
    info: SourceInfo,
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
    frame_len: usize,
    finished: bool,
}

impl FfmpegSource {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with("ffmpeg", "ffprobe", path)
    }

    /// Open `path` using the given tool binaries.
    pub fn open_with(ffmpeg: &str, ffprobe: &str, path: &Path) -> Result<Self> {
        let info = probe_video(ffprobe, path)?;

        let child = Command::new(ffmpeg)
            .args(decode_args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Decode(format!("running {}: {}", ffmpeg, e)))?;
        debug!("Spawned {} decoder for {}", ffmpeg, path.display());

        Self::from_child(info, child)
    }

    /// Wrap a spawned decoder whose stdout carries packed BGR24 frames of `info`'s size.
    fn from_child(info: SourceInfo, mut child: Child) -> Result<Self> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Decode("ffmpeg stdout was not captured".to_string()))?;
        // Drained on its own thread so a chatty decoder can't block on a full pipe
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        Ok(Self {
            info,
            child,
            stdout,
            stderr,
            frame_len: info.width as usize * info.height as usize * 3,
            finished: false,
        })
    }

    /// Reap the decoder once its output ends. A nonzero exit is a decode error.
    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        let status = self.child.wait()?;
        let message = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if status.success() {
            return Ok(());
        }
        Err(Error::Decode(format!("ffmpeg {}: {}", status, message.trim())))
    }
}

/// ffmpeg arguments that decode `path` into packed BGR24 on stdout.
///
/// Autorotation stays off so frames keep the stored size `ffprobe` reports.
pub(crate) fn decode_args(path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-noautorotate", "-i"]
        .iter()
        .map(OsString::from)
        .collect();
    args.push(path.as_os_str().to_owned());
    args.extend(["-f", "rawvideo", "-pix_fmt", "bgr24", "-an", "pipe:1"].iter().map(OsString::from));
    args
}

impl FrameSource for FfmpegSource {
    fn info(&self) -> SourceInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RasterFrame>> {
        if self.finished {
            return Ok(None);
        }
        let mut buf = vec![0u8; self.frame_len];
        if !read_exact_or_eof(&mut self.stdout, &mut buf)? {
            self.finish()?;
            return Ok(None);
        }
        RasterFrame::from_bgr(self.info.width, self.info.height, buf).map(Some)
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Fill `buf` from `reader`. `Ok(false)` when the stream ends first.
pub fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => return Ok(false),
            Ok(n) => total += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

/// A frame picked by the sampler, tagged with its index in the source.
#[derive(Debug)]
pub struct SampledFrame {
    pub index: u64,
    pub frame: RasterFrame,
}

/// Walks a source and yields every `stride`-th frame, starting with frame 0.
///
/// Reading stops at the declared frame count. If the source runs dry before
/// that, sampling ends early and [`exhausted`](Self::exhausted) reports it.
pub struct Sampler<'a, S: FrameSource + ?Sized> {
    source: &'a mut S,
    stride: u64,
    declared: Option<u64>,
    decoded: u64,
    exhausted: Option<Error>,
    done: bool,
}

impl<'a, S: FrameSource + ?Sized> Sampler<'a, S> {
    pub fn new(source: &'a mut S, stride: u32) -> Result<Self> {
        if stride == 0 {
            return Err(Error::invalid_config("sampling stride must be at least 1"));
        }
        let declared = source.info().total_frames;
        Ok(Self {
            source,
            stride: stride as u64,
            declared,
            decoded: 0,
            exhausted: None,
            done: false,
        })
    }

    /// Frames read from the source so far, sampled or not.
    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    /// [`Error::DecodeExhausted`] if the source ended before its declared count.
    pub fn exhausted(&self) -> Option<&Error> {
        self.exhausted.as_ref()
    }
}

impl<S: FrameSource + ?Sized> Iterator for Sampler<'_, S> {
    type Item = Result<SampledFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            if self.declared.is_some_and(|n| self.decoded >= n) {
                self.done = true;
                break;
            }
            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    self.done = true;
                    if let Some(declared) = self.declared {
                        let err = Error::DecodeExhausted {
                            decoded: self.decoded,
                            declared,
                        };
                        warn!("{}", err);
                        self.exhausted = Some(err);
                    }
                    break;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            let index = self.decoded;
            self.decoded += 1;
            if index % self.stride == 0 {
                return Some(Ok(SampledFrame { index, frame }));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: usize) -> Vec<RasterFrame> {
        (0..n).map(|i| RasterFrame::filled(2, 2, [i as u8; 3])).collect()
    }

    #[test]
    fn test_stride_picks_every_nth() {
        let mut source = MemorySource::new(frames(10), 30.0, None);
        let picked: Vec<u64> = Sampler::new(&mut source, 3)
            .unwrap()
            .map(|s| s.unwrap().index)
            .collect();
        assert_eq!(picked, vec![0, 3, 6, 9]);
    }

    #[test]
    fn test_stride_one_keeps_everything() {
        let mut source = MemorySource::new(frames(4), 30.0, None);
        assert_eq!(Sampler::new(&mut source, 1).unwrap().count(), 4);
    }

    #[test]
    fn test_zero_stride_rejected() {
        let mut source = MemorySource::new(frames(1), 30.0, None);
        assert!(matches!(Sampler::new(&mut source, 0), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_early_end_reports_exhaustion() {
        let mut source = MemorySource::new(frames(5), 30.0, Some(8));
        let mut sampler = Sampler::new(&mut source, 2).unwrap();
        let picked: Vec<u64> = sampler.by_ref().map(|s| s.unwrap().index).collect();
        assert_eq!(picked, vec![0, 2, 4]);
        assert_eq!(sampler.decoded(), 5);
        assert!(matches!(
            sampler.exhausted(),
            Some(Error::DecodeExhausted { decoded: 5, declared: 8 })
        ));
    }

    #[test]
    fn test_declared_count_caps_reading() {
        let mut source = MemorySource::new(frames(10), 30.0, Some(4));
        let mut sampler = Sampler::new(&mut source, 1).unwrap();
        assert_eq!(sampler.by_ref().count(), 4);
        assert!(sampler.exhausted().is_none());
    }

    #[test]
    fn test_parse_probe_output() {
        let text = "width=1280\nheight=720\nr_frame_rate=30000/1001\nnb_frames=300\nduration=10.010000\n";
        let info = parse_probe_output(text).unwrap();
        assert_eq!((info.width, info.height), (1280, 720));
        assert!((info.fps - 29.97).abs() < 0.01);
        assert_eq!(info.total_frames, Some(300));
    }

    #[test]
    fn test_parse_probe_falls_back_to_duration() {
        let text = "width=640\nheight=480\nr_frame_rate=25/1\nnb_frames=N/A\nduration=4.0\n";
        let info = parse_probe_output(text).unwrap();
        assert_eq!(info.total_frames, Some(100));
    }

    #[test]
    fn test_parse_probe_without_stream() {
        assert!(parse_probe_output("").is_none());
        assert!(parse_probe_output("width=0\nheight=0\n").is_none());
    }

    #[test]
    fn test_read_exact_or_eof() {
        let mut reader: &[u8] = &[1, 2, 3, 4, 5];
        let mut buf = [0u8; 3];
        assert!(read_exact_or_eof(&mut reader, &mut buf).unwrap());
        assert_eq!(buf, [1, 2, 3]);
        assert!(!read_exact_or_eof(&mut reader, &mut buf).unwrap());
    }

    #[test]
    fn test_decode_args_disable_autorotate() {
        let args = decode_args(Path::new("phone.mov"));
        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert!(pos("-noautorotate") < pos("-i"));
        assert_eq!(args[pos("-i") + 1], OsString::from("phone.mov"));
        assert_eq!(args.last().unwrap(), "pipe:1");
    }

    #[cfg(unix)]
    fn fake_decoder(script: &str) -> FfmpegSource {
        let child = Command::new("sh")
            .args(["-c", script])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let info = SourceInfo {
            width: 1,
            height: 1,
            fps: 30.0,
            total_frames: None,
        };
        FfmpegSource::from_child(info, child).unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn test_decoder_failure_mid_stream_is_an_error() {
        let mut source = fake_decoder("printf abc; echo 'corrupt macroblock' >&2; exit 1");
        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!(frame.pixel(0, 0), [b'a', b'b', b'c']);

        match source.next_frame() {
            Err(Error::Decode(msg)) => assert!(msg.contains("corrupt macroblock"), "{}", msg),
            other => panic!("expected Decode error, got {:?}", other.map(|f| f.is_some())),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_clean_decoder_exit_ends_stream() {
        let mut source = fake_decoder("printf abcdef");
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
        assert!(source.next_frame().unwrap().is_none());
    }
}
