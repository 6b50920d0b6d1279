//! motion_watch - occupancy detector for a camera or video file
//!
//! This binary:
//! 1. Loads configuration (file + environment), then applies command-line overrides
//! 2. Opens the video file, or the camera when no file is given
//! 3. Runs the capture thread and detection loop until the stream ends or Ctrl-C
//! 4. Prints every Occupied/Unoccupied transition with its stream position

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::io;

use motion_watch::{
    ingest, DetectionSession, JsonLinesSink, MotionConfig, OverflowPolicy, StatusSink, TextSink,
    TransitionRule,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    /// `<ms> : <State>` lines
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Overflow {
    Block,
    DropOldest,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Rule {
    LargestRegion,
    PerContour,
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the video file (or a stub:// scene). Uses the camera when omitted.
    #[arg(value_name = "VIDEO")]
    video: Option<String>,
    /// Minimum contour area (pixels^2) that counts as motion.
    #[arg(short = 'a', long)]
    min_area: Option<u32>,
    /// Start time in seconds.
    #[arg(short = 's', long, value_name = "SEC")]
    start: Option<u64>,
    /// Camera device path or index (overrides MOTION_WATCH_DEVICE).
    #[arg(long)]
    device: Option<String>,
    /// Working width frames are resized to.
    #[arg(long)]
    width: Option<u32>,
    /// Frame queue capacity.
    #[arg(long)]
    queue_size: Option<usize>,
    /// What to do when the frame queue is full.
    #[arg(long, value_enum)]
    overflow: Option<Overflow>,
    /// How contours drive the occupancy state.
    #[arg(long, value_enum)]
    rule: Option<Rule>,
    /// Output format for status transitions.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

impl Args {
    fn apply(&self, cfg: &mut MotionConfig) {
        if let Some(video) = &self.video {
            cfg.source.video = Some(video.clone());
        }
        if let Some(device) = &self.device {
            cfg.source.device = device.clone();
        }
        if let Some(start) = self.start {
            cfg.source.start_secs = start;
        }
        if let Some(min_area) = self.min_area {
            cfg.detector.min_area = min_area;
        }
        if let Some(width) = self.width {
            cfg.detector.frame_width = width;
        }
        if let Some(capacity) = self.queue_size {
            cfg.queue.capacity = capacity;
        }
        if let Some(overflow) = self.overflow {
            cfg.queue.overflow = match overflow {
                Overflow::Block => OverflowPolicy::Block,
                Overflow::DropOldest => OverflowPolicy::DropOldest,
            };
        }
        if let Some(rule) = self.rule {
            cfg.detector.transition_rule = match rule {
                Rule::LargestRegion => TransitionRule::LargestRegion,
                Rule::PerContour => TransitionRule::PerContour,
            };
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = MotionConfig::load()?;
    args.apply(&mut cfg);
    cfg.validate()?;

    // Fails before any thread starts when the file or camera cannot be opened.
    let source = ingest::open(&cfg.source)?;

    let session = DetectionSession::new(&cfg);
    let stop = session.stop_handle();
    ctrlc::set_handler(move || {
        log::info!("stop requested, shutting down...");
        stop.stop();
    })?;

    let stdout = io::stdout();
    let mut sink: Box<dyn StatusSink> = match args.format {
        OutputFormat::Text => Box::new(TextSink::new(stdout.lock())),
        OutputFormat::Json => Box::new(JsonLinesSink::new(stdout.lock())),
    };

    let summary = session.run(source, &mut *sink)?;
    if summary.frames_dropped > 0 {
        log::warn!(
            "{} frames dropped by the full queue",
            summary.frames_dropped
        );
    }
    log::info!(
        "done: {} frames ({} skipped), {} transitions, capture ended {:?}",
        summary.frames_processed,
        summary.frames_skipped,
        summary.events_emitted,
        summary.capture.end
    );
    Ok(())
}
