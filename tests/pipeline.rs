use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use image::Rgb;
use tempfile::tempdir;
use vidascii::pipeline::{self, ConversionOptions, Progress, ProgressPhase};
use vidascii::renderer::{BACKGROUND, FOREGROUND};
use vidascii::{
    CleanupPolicy, EncodeJob, Error, FrameRenderer, MemorySource, RasterFrame, ReductionMode, Result, StagingDir,
    VideoEncoder,
};

/// Stands in for ffmpeg: checks the staged sequence and writes a file.
struct RecordingEncoder {
    fail: bool,
    jobs: RefCell<Vec<(u32, usize)>>,
    staged: RefCell<Vec<PathBuf>>,
}

impl RecordingEncoder {
    fn new(fail: bool) -> Self {
        Self {
            fail,
            jobs: RefCell::new(Vec::new()),
            staged: RefCell::new(Vec::new()),
        }
    }
}

impl VideoEncoder for RecordingEncoder {
    fn encode(&self, job: &EncodeJob<'_>) -> Result<()> {
        self.jobs.borrow_mut().push((job.frame_rate, job.frame_count));
        let dir = job.input_pattern.parent().unwrap();
        let mut staged: Vec<PathBuf> = fs::read_dir(dir)?
            .map(|e| e.map(|e| e.path()))
            .collect::<std::io::Result<_>>()?;
        staged.sort();
        *self.staged.borrow_mut() = staged;

        fs::write(job.output, b"video")?;
        if self.fail {
            Err(Error::EncodingFailed("exit status: 1\nUnknown encoder 'libx264'".to_string()))
        } else {
            Ok(())
        }
    }
}

fn black() -> RasterFrame {
    RasterFrame::filled(24, 24, [0, 0, 0])
}

fn white() -> RasterFrame {
    RasterFrame::filled(24, 24, [255, 255, 255])
}

fn options() -> ConversionOptions {
    ConversionOptions::default()
        .with_columns(4)
        .with_scale(1.0)
        .with_mode(ReductionMode::Grayscale)
        .with_frame_rate(3)
        .with_stride(1)
        .with_cleanup(CleanupPolicy::Never)
}

fn run(
    frames: Vec<RasterFrame>,
    declared: Option<u64>,
    encoder: &RecordingEncoder,
    parent: &Path,
    output: &Path,
    opts: &ConversionOptions,
) -> Result<pipeline::ConversionReport> {
    let mut source = MemorySource::new(frames, 30.0, declared);
    let staging = StagingDir::new_in(parent, opts.cleanup)?;
    pipeline::run(
        &mut source,
        &FrameRenderer::new(),
        encoder,
        staging,
        output,
        opts,
        |_| {},
    )
}

#[test]
fn test_frames_staged_in_source_order() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.mp4");
    let encoder = RecordingEncoder::new(false);
    // Small batches force several parallel rounds
    let opts = options().with_batch_size(2);
    let frames = vec![black(), white(), black(), white(), white()];

    let report = run(frames, None, &encoder, dir.path(), &output, &opts).unwrap();
    assert_eq!(report.frames_rendered, 5);
    assert_eq!(*encoder.jobs.borrow(), vec![(3, 5)]);

    let inked: Vec<bool> = encoder
        .staged
        .borrow()
        .iter()
        .map(|p| {
            let img = image::open(p).unwrap().to_rgb8();
            img.pixels().any(|px| *px == FOREGROUND)
        })
        .collect();
    assert_eq!(inked, vec![true, false, true, false, false]);
}

#[test]
fn test_stride_samples_every_nth_frame() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.mp4");
    let encoder = RecordingEncoder::new(false);
    let frames = (0..10).map(|i| if i % 3 == 0 { black() } else { white() }).collect();

    let report = run(frames, None, &encoder, dir.path(), &output, &options().with_stride(3)).unwrap();
    // Frames 0, 3, 6, 9
    assert_eq!(report.frames_rendered, 4);
    assert_eq!(report.frames_decoded, 10);
    assert_eq!(report.stride, 3);
    assert!(!report.decode_exhausted);
    for path in encoder.staged.borrow().iter() {
        let img = image::open(path).unwrap().to_rgb8();
        assert!(img.pixels().any(|px| *px == FOREGROUND));
    }
}

#[test]
fn test_early_end_still_encodes() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.mp4");
    let encoder = RecordingEncoder::new(false);

    let report = run(vec![black(), black()], Some(8), &encoder, dir.path(), &output, &options()).unwrap();
    assert!(report.decode_exhausted);
    assert_eq!(report.frames_decoded, 2);
    assert_eq!(report.frames_rendered, 2);
    assert!(output.exists());
}

#[test]
fn test_declared_count_caps_reading() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.mp4");
    let encoder = RecordingEncoder::new(false);

    let report = run(vec![black(); 6], Some(4), &encoder, dir.path(), &output, &options()).unwrap();
    assert_eq!(report.frames_decoded, 4);
    assert_eq!(report.frames_rendered, 4);
}

#[test]
fn test_empty_source_is_empty_sequence() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.mp4");
    let encoder = RecordingEncoder::new(false);

    let result = run(Vec::new(), None, &encoder, dir.path(), &output, &options());
    assert!(matches!(result, Err(Error::EmptySequence)));
    assert!(encoder.jobs.borrow().is_empty());
    assert!(!output.exists());
}

#[test]
fn test_encoder_failure_leaves_no_output() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.mp4");
    let encoder = RecordingEncoder::new(true);
    let opts = options().with_cleanup(CleanupPolicy::OnSuccess);

    let result = run(vec![black(), white()], None, &encoder, dir.path(), &output, &opts);
    match result {
        Err(Error::EncodingFailed(msg)) => assert!(msg.contains("libx264")),
        other => panic!("expected EncodingFailed, got {:?}", other.map(|r| r.frames_rendered)),
    }
    assert!(!output.exists());

    // Staged images survive for diagnosis
    let staged = encoder.staged.borrow();
    assert_eq!(staged.len(), 2);
    assert!(staged.iter().all(|p| p.exists()));
}

#[test]
fn test_success_removes_staging() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.mp4");
    let encoder = RecordingEncoder::new(false);

    let opts = options().with_cleanup(CleanupPolicy::OnSuccess);

    run(vec![black()], None, &encoder, dir.path(), &output, &opts).unwrap();
    assert!(encoder.staged.borrow().iter().all(|p| !p.exists()));
}

#[test]
fn test_keep_policy_retains_staging() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.mp4");
    let encoder = RecordingEncoder::new(false);
    run(vec![black()], None, &encoder, dir.path(), &output, &options()).unwrap();
    assert!(encoder.staged.borrow().iter().all(|p| p.exists()));
}

#[test]
fn test_invalid_options_rejected_before_work() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.mp4");
    let encoder = RecordingEncoder::new(false);

    let result = run(vec![black()], None, &encoder, dir.path(), &output, &options().with_columns(0));
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
    assert!(encoder.jobs.borrow().is_empty());
}

#[test]
fn test_color_frames_keep_source_colors() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.mp4");
    let encoder = RecordingEncoder::new(false);
    let opts = options().with_mode(ReductionMode::Color);
    // Dark blue, BGR order
    let frame = RasterFrame::filled(24, 24, [90, 0, 0]);

    let report = run(vec![frame], None, &encoder, dir.path(), &output, &opts).unwrap();
    assert_eq!(report.mode, ReductionMode::Color);
    let img = image::open(&encoder.staged.borrow()[0]).unwrap().to_rgb8();
    assert!(img.pixels().any(|px| *px == Rgb([0, 0, 90])));
    assert!(img.pixels().all(|px| *px != FOREGROUND));
    assert!(img.pixels().any(|px| *px == BACKGROUND));
}

#[test]
fn test_report_geometry() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.mp4");
    let encoder = RecordingEncoder::new(false);
    // 200 wide, 100 tall, 100 columns at 0.5 -> 1px cells, 100 rows
    let frame = RasterFrame::filled(200, 100, [128, 128, 128]);
    let opts = options().with_columns(100).with_scale(0.5);

    let report = run(vec![frame], None, &encoder, dir.path(), &output, &opts).unwrap();
    assert_eq!((report.columns, report.rows), (100, 100));
    assert_eq!((report.source.width, report.source.height), (200, 100));
}

#[test]
fn test_progress_phases_in_order() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.mp4");
    let encoder = RecordingEncoder::new(false);
    let mut source = MemorySource::new(vec![black(); 3], 30.0, None);
    let staging = StagingDir::new_in(dir.path(), CleanupPolicy::Always).unwrap();
    let mut seen: Vec<Progress> = Vec::new();

    pipeline::run(
        &mut source,
        &FrameRenderer::new(),
        &encoder,
        staging,
        &output,
        &options().with_batch_size(2),
        |p| seen.push(p.clone()),
    )
    .unwrap();

    let phases: Vec<ProgressPhase> = seen.iter().map(|p| p.phase.clone()).collect();
    assert_eq!(
        phases,
        vec![
            ProgressPhase::Converting,
            ProgressPhase::Converting,
            ProgressPhase::Converting,
            ProgressPhase::Encoding,
            ProgressPhase::Complete,
        ]
    );
    assert_eq!(seen[2].completed, 3);
    assert_eq!(seen[2].total, 3);
}
