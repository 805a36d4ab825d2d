//! Gaze monitor: replay recorded sessions through the gaze or check pipeline.

use anyhow::{bail, Context, Result};
use clap::Parser;
use gaze_monitor::{
    app::{Mode, MonitorApp},
    config::{Config, EXAMPLE_CONFIG},
    frame::{Frame, FrameSource},
    landmarks::{LandmarkDetector, LandmarkSet},
    overlay::RgbaCanvas,
    recording::{ImageSequenceSource, LandmarkRecording},
    utils::image_conversion::encode_png,
    verification::StaticOracle,
};
use log::info;
use std::{path::PathBuf, sync::Arc, time::Duration};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Pipeline to run (gaze, check)
    #[arg(short, long, default_value = "gaze")]
    mode: String,

    /// Directory of image frames, replayed in file-name order
    #[arg(short, long)]
    frames: Option<PathBuf>,

    /// Landmark recording (JSON Lines); also drives timing when no frames are given
    #[arg(short, long)]
    landmarks: Option<PathBuf>,

    /// Frame rate used to timestamp image frames
    #[arg(long, default_value = "30")]
    fps: f64,

    /// Start attention tracking on the first frame
    #[arg(short, long)]
    track: bool,

    /// Show the foreground mask instead of the camera image in check mode
    #[arg(long)]
    show_mask: bool,

    /// Answer the oracle's document question with yes
    #[arg(long)]
    oracle_holding: bool,

    /// Content the oracle extracts from a held-up document
    #[arg(long, default_value = "")]
    oracle_content: String,

    /// Write the final overlay as PNG
    #[arg(long)]
    overlay_out: Option<PathBuf>,

    /// Write the session report as JSON instead of printing it
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write an example configuration file and exit
    #[arg(long)]
    write_config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<PathBuf>,
}

/// Detector for image-only replays
struct NoLandmarks;

impl LandmarkDetector for NoLandmarks {
    fn detect(&mut self, _frame: &Frame) -> gaze_monitor::Result<Vec<LandmarkSet>> {
        Ok(Vec::new())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    info!("Gaze Monitor");

    if let Some(path) = &args.write_config {
        std::fs::write(path, EXAMPLE_CONFIG).with_context(|| format!("writing {}", path.display()))?;
        info!("Example configuration written to {}", path.display());
        return Ok(());
    }

    // Load configuration if provided
    let mut config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {}", config_path.display());
        match Config::from_file(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                log::warn!("Failed to load config file: {e}. Using defaults.");
                Config::default()
            }
        }
    } else {
        Config::default()
    };
    config.display.show_mask |= args.show_mask;

    let mode = match args.mode.as_str() {
        "gaze" => Mode::Gaze,
        "check" => Mode::Check,
        other => bail!("Unknown mode '{other}' (expected gaze or check)"),
    };

    let (frames, landmarks): (Box<dyn FrameSource>, Box<dyn LandmarkDetector>) =
        match (&args.frames, &args.landmarks) {
            (Some(dir), Some(recording)) => {
                let (_, detector) = LandmarkRecording::from_file(recording)?.into_sources();
                (Box::new(ImageSequenceSource::from_dir(dir, args.fps)?), Box::new(detector))
            }
            (Some(dir), None) => (Box::new(ImageSequenceSource::from_dir(dir, args.fps)?), Box::new(NoLandmarks)),
            (None, Some(recording)) => {
                let (frames, detector) = LandmarkRecording::from_file(recording)?.into_sources();
                (Box::new(frames), Box::new(detector))
            }
            (None, None) => bail!("Nothing to replay: pass --frames and/or --landmarks"),
        };

    let oracle = Arc::new(StaticOracle::new(args.oracle_holding, args.oracle_content.clone()));
    let timeout = Duration::from_millis(config.verification.timeout_ms);
    let mut app = MonitorApp::new(config, frames, landmarks, RgbaCanvas::new(1, 1), oracle)?;
    app.set_mode(mode)?;
    if args.track && mode == Mode::Gaze {
        app.start_tracking_at_next_frame()?;
    }

    let summary = app.run()?;
    if app.verification_pending() {
        info!("Waiting for the last verification to finish");
        app.wait_for_verification(timeout);
    }

    if let Some(path) = &args.overlay_out {
        let png = encode_png(&app.surface().to_frame(0)?)?;
        std::fs::write(path, png).with_context(|| format!("writing {}", path.display()))?;
    }

    let report = serde_json::json!({
        "mode": mode,
        "summary": summary,
        "tracking_log": app.tracking_log(),
        "events": app.events().all(),
    });
    let text = serde_json::to_string_pretty(&report)?;
    match &args.output {
        Some(path) => std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?,
        None => println!("{text}"),
    }

    Ok(())
}
