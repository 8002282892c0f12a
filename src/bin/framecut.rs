use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use framecut::{
    CaptureOpts, DirRegistry, FfmpegBackend, FrameCapturer, GridSlicer, OutputFormat, SliceOpts,
    VideoSource, compute_layout,
};
use serde_json::json;

#[derive(Parser, Debug)]
#[command(name = "framecut", version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the grid chosen for a cell count as JSON.
    Layout(LayoutArgs),
    /// Cut an image into grid cells written to a directory.
    Slice(SliceArgs),
    /// Capture still frames from a video (requires the `media-ffmpeg` feature).
    Frames(FramesArgs),
}

#[derive(Parser, Debug)]
struct LayoutArgs {
    /// Number of cells requested.
    #[arg(long, allow_hyphen_values = true)]
    count: f64,

    /// Lower column bound.
    #[arg(long, default_value_t = framecut::DEFAULT_MIN_COLS)]
    min_cols: u32,

    /// Upper column bound.
    #[arg(long, default_value_t = framecut::DEFAULT_MAX_COLS)]
    max_cols: u32,
}

#[derive(Parser, Debug)]
struct SliceArgs {
    /// Source image: http(s) URL, file path, file:// URL or data: URL.
    #[arg(long)]
    src: String,

    /// Number of cells to emit.
    #[arg(long)]
    count: u32,

    /// Output directory.
    #[arg(long)]
    out: PathBuf,

    /// JSON file with slice options; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format (png, jpeg, webp or a MIME type).
    #[arg(long)]
    format: Option<OutputFormat>,

    /// Lossy quality in [0, 1].
    #[arg(long)]
    quality: Option<f32>,

    /// Maximum source size in bytes.
    #[arg(long)]
    max_bytes: Option<u64>,

    /// Lower column bound.
    #[arg(long)]
    min_cols: Option<u32>,

    /// Upper column bound.
    #[arg(long)]
    max_cols: Option<u32>,
}

#[derive(Parser, Debug)]
struct FramesArgs {
    /// Video path or http(s) URL.
    #[arg(long)]
    video: String,

    /// Comma-separated capture times in seconds.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
    times: Vec<f64>,

    /// Output directory.
    #[arg(long)]
    out: PathBuf,

    /// JSON file with capture options; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format (png, jpeg, webp or a MIME type).
    #[arg(long)]
    format: Option<OutputFormat>,

    /// Lossy quality in [0, 1].
    #[arg(long)]
    quality: Option<f32>,

    /// Per-timestamp seek budget in milliseconds.
    #[arg(long)]
    seek_timeout_ms: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Command::Layout(args) => cmd_layout(args),
        Command::Slice(args) => cmd_slice(args),
        Command::Frames(args) => cmd_frames(args),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn read_config<T: serde::de::DeserializeOwned + Default>(
    path: Option<&PathBuf>,
) -> anyhow::Result<T> {
    let Some(path) = path else {
        return Ok(T::default());
    };
    let f = std::fs::File::open(path)
        .with_context(|| format!("open config '{}'", path.display()))?;
    let opts = serde_json::from_reader(std::io::BufReader::new(f))
        .with_context(|| format!("parse config '{}'", path.display()))?;
    Ok(opts)
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize manifest")?;
    println!("{text}");
    Ok(())
}

fn warn_unused_quality(format: OutputFormat, quality: Option<f32>) {
    if quality.is_some() && !format.is_lossy() {
        tracing::warn!(%format, "quality has no effect on a lossless format");
    }
}

fn cmd_layout(args: LayoutArgs) -> anyhow::Result<()> {
    let layout = compute_layout(args.count, args.min_cols, args.max_cols);
    print_json(&serde_json::to_value(layout).context("serialize layout")?)
}

fn cmd_slice(args: SliceArgs) -> anyhow::Result<()> {
    let mut opts: SliceOpts = read_config(args.config.as_ref())?;
    if let Some(format) = args.format {
        opts.format = format;
    }
    if args.quality.is_some() {
        opts.quality = args.quality;
    }
    if let Some(max_bytes) = args.max_bytes {
        opts.max_source_bytes = max_bytes;
    }
    if let Some(min_cols) = args.min_cols {
        opts.min_cols = min_cols;
    }
    if let Some(max_cols) = args.max_cols {
        opts.max_cols = max_cols;
    }
    opts.validate()?;

    warn_unused_quality(opts.format, opts.quality);

    let registry = Arc::new(DirRegistry::create(&args.out)?);
    let slicer = GridSlicer::with_default_fetcher(registry.clone())?;
    let out = slicer.slice(&args.src, args.count, &opts)?;

    let cells: Vec<_> = out
        .frames
        .iter()
        .map(|f| {
            json!({
                "index": f.index,
                "path": f.handle.as_str(),
                "width": f.width,
                "height": f.height,
                "bytes": f.data.len(),
            })
        })
        .collect();
    print_json(&json!({
        "dir": registry.root(),
        "layout": out.layout,
        "source_width": out.source_width,
        "source_height": out.source_height,
        "format": opts.format,
        "cells": cells,
    }))?;
    eprintln!(
        "wrote {} cells to {}",
        out.frames.len(),
        registry.root().display()
    );
    Ok(())
}

fn cmd_frames(args: FramesArgs) -> anyhow::Result<()> {
    let mut opts: CaptureOpts = read_config(args.config.as_ref())?;
    if let Some(format) = args.format {
        opts.format = format;
    }
    if args.quality.is_some() {
        opts.quality = args.quality;
    }
    if let Some(ms) = args.seek_timeout_ms {
        opts.seek_timeout_ms = ms;
    }
    opts.validate()?;

    warn_unused_quality(opts.format, opts.quality);

    let registry = Arc::new(DirRegistry::create(&args.out)?);
    let capturer = FrameCapturer::new(Arc::new(FfmpegBackend), registry.clone());
    let source = VideoSource::from_arg(&args.video);
    let out = capturer.capture_at_times(&source, &args.times, &opts)?;

    let frames: Vec<_> = out
        .frames
        .iter()
        .map(|f| {
            json!({
                "requested_time": f.requested_time,
                "actual_time": f.actual_time,
                "path": f.handle.as_str(),
                "width": f.width,
                "height": f.height,
                "bytes": f.data.len(),
            })
        })
        .collect();
    print_json(&json!({
        "dir": registry.root(),
        "duration": out.duration,
        "width": out.width,
        "height": out.height,
        "format": opts.format,
        "frames": frames,
    }))?;
    eprintln!(
        "wrote {} frames to {}",
        out.frames.len(),
        registry.root().display()
    );
    Ok(())
}
