use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use dialoguer::{theme::ColorfulTheme, Confirm, FuzzySelect, Input};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vidascii::{
    ffmpeg_available, AppConfig, CleanupPolicy, ConversionOptions, Progress, ProgressPhase, ReductionMode,
    VideoConverter,
};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(version, about = "Convert a video into an ASCII-art video.")]
struct Args {
    /// Input video file (mp4, mov or avi)
    input: Option<PathBuf>,

    /// Output video file [default: <input>_ascii.mp4]
    output: Option<PathBuf>,

    /// Characters per row
    #[arg(long)]
    columns: Option<u32>,

    /// Cell height as a fraction of cell width
    #[arg(long)]
    scale: Option<f64>,

    /// Draw black glyphs instead of the source colors
    #[arg(long, default_value_t = false)]
    mono: bool,

    /// Output frames per second; every Nth source frame is kept unless --stride is set
    #[arg(long)]
    frame_rate: Option<u32>,

    /// Keep every Nth source frame
    #[arg(long)]
    stride: Option<u32>,

    /// Use the small quality preset
    #[arg(long, short, default_value_t = false, conflicts_with = "large")]
    small: bool,

    /// Use the large quality preset
    #[arg(long, short, default_value_t = false, conflicts_with = "small")]
    large: bool,

    /// TrueType/OpenType font to draw with instead of the built-in one
    #[arg(long)]
    font: Option<PathBuf>,

    /// Font size in pixels, with --font
    #[arg(long)]
    font_size: Option<f32>,

    /// Keep the staged frame images after encoding
    #[arg(long, default_value_t = false, conflicts_with = "always_clean")]
    keep_staged: bool,

    /// Remove staged frame images even when encoding fails
    #[arg(long, default_value_t = false)]
    always_clean: bool,

    /// Config file (TOML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the first frame as ASCII before converting
    #[arg(long, default_value_t = false)]
    preview: bool,

    /// Prompt for the conversion settings
    #[arg(long, short, default_value_t = false)]
    interactive: bool,

    /// Print the conversion report as JSON
    #[arg(long, default_value_t = false)]
    log_details: bool,

    /// Enable debug logging
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

fn main() -> Result<()> {
    let mut args = Args::parse();
    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if args.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let mut cfg = match &args.config {
        Some(path) => AppConfig::from_file(path).with_context(|| format!("loading config {}", path.display()))?,
        None => AppConfig::load().context("loading config")?,
    };
    if let Some(font) = args.font.take() {
        cfg.font_path = Some(font);
    }
    if let Some(size) = args.font_size {
        cfg.font_size = size;
    }
    if args.keep_staged {
        cfg.cleanup = CleanupPolicy::Never;
    } else if args.always_clean {
        cfg.cleanup = CleanupPolicy::Always;
    }

    // --- Input ---
    let input = match args.input.take() {
        Some(p) => p,
        None => pick_input(&cfg)?,
    };
    if !input.exists() {
        bail!("Input file {} does not exist", input.display());
    }
    cfg.input_policy().check(&input)?;

    let output = args.output.take().unwrap_or_else(|| default_output(&input));

    // --- Settings ---
    let preset_name = if args.small {
        "small"
    } else if args.large {
        "large"
    } else {
        cfg.default_preset.as_str()
    };
    let preset = cfg.preset(preset_name)?.clone();

    if args.interactive {
        prompt_settings(&mut args, preset.columns, preset.scale, preset.frame_rate, preset.color)?;
    }

    let mut options = ConversionOptions::from_preset(&preset).with_cleanup(cfg.cleanup);
    if let Some(columns) = args.columns {
        options = options.with_columns(columns);
    }
    if let Some(scale) = args.scale {
        options = options.with_scale(scale);
    }
    if args.mono {
        options = options.with_mode(ReductionMode::Grayscale);
    }
    if let Some(frame_rate) = args.frame_rate {
        options = options.with_frame_rate(frame_rate);
    }
    if let Some(stride) = args.stride {
        options = options.with_stride(stride);
    }
    options.validate()?;
    debug!("Options: {:?}", options);

    if !ffmpeg_available(&cfg.ffmpeg) {
        bail!(
            "{} is not available. Install ffmpeg and make sure it is on your PATH.",
            cfg.ffmpeg
        );
    }

    if output.exists()
        && args.interactive
        && !Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("{} already exists. Overwrite?", output.display()))
            .default(false)
            .interact()?
    {
        println!("Operation cancelled.");
        return Ok(());
    }

    // --- Execution ---
    let converter = VideoConverter::with_config(cfg)?;

    if args.preview {
        match converter.preview(&input, &options)? {
            Some(frame) => print!("{}", frame.to_ansi()),
            None => println!("(no frames to preview)"),
        }
    }

    info!("Converting {} -> {}", input.display(), output.display());
    let bar_style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)",
    )?
    .progress_chars("#>-");
    let mut bar: Option<ProgressBar> = None;

    let report = converter.convert_video_with_progress(&input, &output, &options, |progress: &Progress| {
        match progress.phase {
            ProgressPhase::Probing => {}
            ProgressPhase::Converting => {
                let pb = bar.get_or_insert_with(|| {
                    let pb = ProgressBar::new(progress.total as u64);
                    pb.set_style(bar_style.clone());
                    pb
                });
                if progress.total as u64 > pb.length().unwrap_or(0) {
                    pb.set_length(progress.total as u64);
                }
                pb.set_position(progress.completed as u64);
            }
            ProgressPhase::Encoding => {
                if let Some(pb) = bar.take() {
                    pb.finish_and_clear();
                }
                let spinner = ProgressBar::new_spinner();
                spinner.set_message(progress.message.clone());
                spinner.enable_steady_tick(Duration::from_millis(100));
                bar = Some(spinner);
            }
            ProgressPhase::Complete => {
                if let Some(pb) = bar.take() {
                    pb.finish_and_clear();
                }
            }
        }
    });
    if let Some(pb) = bar.take() {
        pb.abandon();
    }
    let report = report.with_context(|| format!("converting {}", input.display()))?;

    if report.decode_exhausted {
        println!(
            "Note: the video ended early ({} frames decoded); the output holds what was read.",
            report.frames_decoded
        );
    }
    println!(
        "\nASCII video written to {} ({} frames at {} fps)",
        report.output.display(),
        report.frames_rendered,
        report.frame_rate
    );

    if args.log_details {
        println!("\n--- Conversion Details ---");
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}

/// `<stem>_ascii.mp4` in the working directory.
fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("vidascii_output");
    PathBuf::from(format!("{}_ascii.mp4", stem))
}

fn pick_input(cfg: &AppConfig) -> Result<PathBuf> {
    let files = find_media_files(&cfg.allowed_extensions);
    if files.is_empty() {
        return Err(anyhow!("No input given and no video files found in current directory."));
    }
    let selection = FuzzySelect::with_theme(&ColorfulTheme::default())
        .with_prompt("Choose an input file")
        .default(0)
        .items(&files)
        .interact()?;
    Ok(PathBuf::from(&files[selection]))
}

fn find_media_files(extensions: &[String]) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(".")
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path().is_file()
                && e.path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| extensions.iter().any(|a| a.eq_ignore_ascii_case(ext)))
        })
        .filter_map(|e| e.path().to_str().map(str::to_string))
        .collect();
    files.sort();
    files
}

fn prompt_settings(args: &mut Args, columns: u32, scale: f64, frame_rate: u32, color: bool) -> Result<()> {
    let theme = ColorfulTheme::default();
    if args.columns.is_none() {
        args.columns = Some(
            Input::with_theme(&theme)
                .with_prompt("Columns (50-200)")
                .default(columns)
                .validate_with(|v: &u32| if (50..=200).contains(v) { Ok(()) } else { Err("must be between 50 and 200") })
                .interact()?,
        );
    }
    if args.scale.is_none() {
        args.scale = Some(
            Input::with_theme(&theme)
                .with_prompt("Scale (0.1-1.0)")
                .default(scale)
                .validate_with(|v: &f64| if (0.1..=1.0).contains(v) { Ok(()) } else { Err("must be between 0.1 and 1.0") })
                .interact()?,
        );
    }
    if !args.mono {
        args.mono = !Confirm::with_theme(&theme)
            .with_prompt("Keep colors?")
            .default(color)
            .interact()?;
    }
    if args.frame_rate.is_none() {
        args.frame_rate = Some(
            Input::with_theme(&theme)
                .with_prompt("Frame rate (1-30)")
                .default(frame_rate)
                .validate_with(|v: &u32| if (1..=30).contains(v) { Ok(()) } else { Err("must be between 1 and 30") })
                .interact()?,
        );
    }
    Ok(())
}
