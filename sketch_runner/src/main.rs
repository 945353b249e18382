// Command-line runner for the `motion_sketch` engine. Feeds a directory of
// recorded frames (or generated footage) through the sketch, optionally dumping
// PNG snapshots of the rendered output along the way.

use std::path::{Path, PathBuf};

use anyhow::{Context, ensure};
use clap::Parser;
use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedSender;

use motion_sketch::config::VideoConfig;
use motion_sketch::core_modules::frame_differ::Band;
use motion_sketch::render::save_png;
use motion_sketch::{
    AppConfig, AppEvent, RasterSurface, RenderSurface, SketchApp, SnapshotPlan, SourceSpec, spawn_acquisition,
};

#[derive(Parser, Debug)]
#[command(name = "sketch_runner", version, about = "Turns motion in a video into a generative sketch")]
struct Args {
    /// Directory of image frames, played in file name order.
    #[arg(long, conflicts_with = "synthetic")]
    frames_dir: Option<PathBuf>,

    /// Use generated footage instead of recorded frames.
    #[arg(long)]
    synthetic: bool,

    /// JSON configuration file. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop after this many frame ticks.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Target frames per second.
    #[arg(long)]
    fps: Option<f64>,

    /// Output width in pixels.
    #[arg(long)]
    width: Option<u32>,

    /// Output height in pixels.
    #[arg(long)]
    height: Option<u32>,

    /// Sampling grid is `4 * scale` by `3 * scale` pixels.
    #[arg(long)]
    video_scale: Option<u32>,

    /// Band of per-pixel difference treated as motion.
    #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], allow_negative_numbers = true)]
    range: Option<Vec<f32>>,

    /// Directory for PNG snapshots.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Write a snapshot every N drawn frames (requires --out).
    #[arg(long, default_value_t = 30)]
    snapshot_every: u64,

    /// Also write the frame difference image with every snapshot.
    #[arg(long)]
    debug_diff: bool,

    /// Read control keys from stdin: t or an empty line toggles, r re-requests, q quits.
    #[arg(long)]
    interactive: bool,

    /// Log filter, overridden by RUST_LOG.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also write rotating log files into this directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn setup_logging(level: &str, log_dir: Option<&Path>) -> anyhow::Result<LoggerHandle> {
    let logger = Logger::try_with_env_or_str(level).context("invalid log level")?;
    let logger = match log_dir {
        Some(dir) => logger
            .log_to_file(FileSpec::default().directory(dir))
            .duplicate_to_stderr(Duplicate::Info)
            .rotate(
                Criterion::Size(1024 * 1024),
                Naming::Timestamps,
                Cleanup::KeepLogFiles(5),
            ),
        None => logger.log_to_stderr(),
    };
    logger.start().context("logger initialization failed")
}

fn load_config(args: &Args) -> anyhow::Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AppConfig::default(),
    };

    if let Some(scale) = args.video_scale {
        config.video = VideoConfig::from_scale(scale);
    }
    if let Some(width) = args.width {
        config.render.width = width;
    }
    if let Some(height) = args.height {
        config.render.height = height;
    }
    if let Some(fps) = args.fps {
        ensure!(fps > 0.0, "--fps must be positive, got {fps}");
        config.frame_interval_ms = (1000.0 / fps).round().max(1.0) as u64;
    }
    if let Some(range) = &args.range {
        config.sketch.range = Band::new(range[0], range[1]);
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn source_spec(args: &Args) -> SourceSpec {
    match &args.frames_dir {
        Some(dir) => SourceSpec::Directory(dir.clone()),
        None => {
            if !args.synthetic {
                log::info!("no --frames-dir given, using synthetic footage");
            }
            SourceSpec::Synthetic {
                width: 320,
                height: 240,
            }
        }
    }
}

fn spawn_controls(events: UnboundedSender<AppEvent>, spec: SourceSpec) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let event = match line.trim() {
                "" | "t" => AppEvent::TogglePlayback,
                "r" => {
                    spawn_acquisition(events.clone(), spec.clone(), None);
                    continue;
                }
                "q" => AppEvent::Quit,
                other => {
                    log::warn!("unknown command '{other}' (t: toggle, r: re-request, q: quit)");
                    continue;
                }
            };
            if events.send(event).is_err() {
                break;
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Argument Parsing & Setup ---
    let args = Args::parse();
    let _logger = setup_logging(&args.log_level, args.log_dir.as_deref())?;
    let config = load_config(&args)?;
    let spec = source_spec(&args);

    // --- 2. Application Context ---
    let surface = RasterSurface::new(config.render);
    let mut app = SketchApp::new(config, surface).context("failed to build sketch")?;
    if let Some(max_frames) = args.max_frames {
        app = app.with_max_frames(max_frames);
    }
    if let Some(out) = &args.out {
        std::fs::create_dir_all(out).with_context(|| format!("failed to create {}", out.display()))?;
        app = app.with_snapshots(SnapshotPlan {
            dir: out.clone(),
            every: args.snapshot_every,
            debug_diff: args.debug_diff,
        });
    }

    // --- 3. Video Acquisition ---
    let done = app.request(spec.clone());
    tokio::spawn(async move {
        match done.await {
            Ok(Ok(())) => log::info!("streaming"),
            Ok(Err(_)) => log::warn!("running without video; press r to retry"),
            Err(_) => log::debug!("acquisition outcome was dropped"),
        }
    });

    // --- 4. Controls ---
    if args.interactive {
        spawn_controls(app.events_sender(), spec);
    }
    let quit = app.events_sender();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = quit.send(AppEvent::Quit);
        }
    });

    // --- 5. Main Loop ---
    let summary = app.run().await.context("sketch run failed")?;

    // --- 6. Final Output ---
    if let Some(out) = &args.out {
        if let Some(image) = app.surface().snapshot() {
            save_png(out.join("final.png"), image).context("failed to write final snapshot")?;
        }
    }
    log::info!(
        "{} frames drawn, {} ticks skipped, {} nodes sampled, peak {} live nodes, {} triangles",
        summary.frames,
        summary.skipped,
        summary.nodes_sampled,
        summary.peak_live_nodes,
        summary.primitives
    );
    Ok(())
}
