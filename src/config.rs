use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

use crate::detect::TransitionRule;
use crate::queue::{OverflowPolicy, DEFAULT_QUEUE_CAPACITY};

const DEFAULT_DEVICE: &str = "/dev/video0";
const DEFAULT_WARMUP_MS: u64 = 250;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_MIN_AREA: u32 = 300;
const DEFAULT_FRAME_WIDTH: u32 = 480;
const DEFAULT_BLUR_KERNEL: u32 = 21;
const DEFAULT_DELTA_THRESHOLD: u8 = 25;
const DEFAULT_DILATE_ITERATIONS: u32 = 2;
/// Largest start offset that still fits a microsecond seek target.
pub const MAX_START_SECS: u64 = i64::MAX as u64 / 1_000_000;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MotionConfigFile {
    source: Option<SourceConfigFile>,
    detector: Option<DetectorConfigFile>,
    queue: Option<QueueConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SourceConfigFile {
    video: Option<String>,
    device: Option<String>,
    start_secs: Option<u64>,
    warmup_ms: Option<u64>,
    camera_width: Option<u32>,
    camera_height: Option<u32>,
    camera_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    min_area: Option<u32>,
    frame_width: Option<u32>,
    blur_kernel: Option<u32>,
    delta_threshold: Option<u8>,
    dilate_iterations: Option<u32>,
    transition_rule: Option<TransitionRule>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct QueueConfigFile {
    capacity: Option<usize>,
    overflow: Option<OverflowPolicy>,
}

/// Complete runtime configuration: file, then environment, then command line.
#[derive(Debug, Clone, Default)]
pub struct MotionConfig {
    pub source: SourceSettings,
    pub detector: DetectorSettings,
    pub queue: QueueSettings,
}

/// Where frames come from.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// Video file (or `stub://` scene). `None` selects the camera.
    pub video: Option<String>,
    /// Camera device used when no video is given.
    pub device: String,
    /// Seek offset into the video, in seconds.
    pub start_secs: u64,
    /// Camera settle time after connecting.
    pub warmup_ms: u64,
    pub camera_width: u32,
    pub camera_height: u32,
    pub camera_fps: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            video: None,
            device: DEFAULT_DEVICE.to_string(),
            start_secs: 0,
            warmup_ms: DEFAULT_WARMUP_MS,
            camera_width: DEFAULT_CAMERA_WIDTH,
            camera_height: DEFAULT_CAMERA_HEIGHT,
            camera_fps: DEFAULT_CAMERA_FPS,
        }
    }
}

/// Frame differencing parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    /// Smallest contour area (pixels^2) that counts as motion.
    pub min_area: u32,
    /// Working width frames are resized to before differencing.
    pub frame_width: u32,
    /// Gaussian kernel size (odd).
    pub blur_kernel: u32,
    /// Intensity difference above which a pixel counts as changed.
    pub delta_threshold: u8,
    /// 3x3 dilation passes applied to the threshold mask.
    pub dilate_iterations: u32,
    pub transition_rule: TransitionRule,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            min_area: DEFAULT_MIN_AREA,
            frame_width: DEFAULT_FRAME_WIDTH,
            blur_kernel: DEFAULT_BLUR_KERNEL,
            delta_threshold: DEFAULT_DELTA_THRESHOLD,
            dilate_iterations: DEFAULT_DILATE_ITERATIONS,
            transition_rule: TransitionRule::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            overflow: OverflowPolicy::Block,
        }
    }
}

impl MotionConfig {
    /// Load from the file named by `MOTION_WATCH_CONFIG` (if set), apply `MOTION_WATCH_*`
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("MOTION_WATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => read_config_file(Path::new(path))?,
            _ => MotionConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MotionConfigFile) -> Self {
        let source = file.source.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let queue = file.queue.unwrap_or_default();
        let defaults = MotionConfig::default();

        Self {
            source: SourceSettings {
                video: source.video.filter(|v| !v.trim().is_empty()),
                device: source.device.unwrap_or(defaults.source.device),
                start_secs: source.start_secs.unwrap_or(defaults.source.start_secs),
                warmup_ms: source.warmup_ms.unwrap_or(defaults.source.warmup_ms),
                camera_width: source.camera_width.unwrap_or(defaults.source.camera_width),
                camera_height: source.camera_height.unwrap_or(defaults.source.camera_height),
                camera_fps: source.camera_fps.unwrap_or(defaults.source.camera_fps),
            },
            detector: DetectorSettings {
                min_area: detector.min_area.unwrap_or(defaults.detector.min_area),
                frame_width: detector.frame_width.unwrap_or(defaults.detector.frame_width),
                blur_kernel: detector.blur_kernel.unwrap_or(defaults.detector.blur_kernel),
                delta_threshold: detector
                    .delta_threshold
                    .unwrap_or(defaults.detector.delta_threshold),
                dilate_iterations: detector
                    .dilate_iterations
                    .unwrap_or(defaults.detector.dilate_iterations),
                transition_rule: detector
                    .transition_rule
                    .unwrap_or(defaults.detector.transition_rule),
            },
            queue: QueueSettings {
                capacity: queue.capacity.unwrap_or(defaults.queue.capacity),
                overflow: queue.overflow.unwrap_or(defaults.queue.overflow),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(video) = std::env::var("MOTION_WATCH_VIDEO") {
            if !video.trim().is_empty() {
                self.source.video = Some(video);
            }
        }
        if let Ok(device) = std::env::var("MOTION_WATCH_DEVICE") {
            if !device.trim().is_empty() {
                self.source.device = device;
            }
        }
        if let Some(min_area) = parse_env("MOTION_WATCH_MIN_AREA")? {
            self.detector.min_area = min_area;
        }
        if let Some(width) = parse_env("MOTION_WATCH_FRAME_WIDTH")? {
            self.detector.frame_width = width;
        }
        if let Some(capacity) = parse_env("MOTION_WATCH_QUEUE_SIZE")? {
            self.queue.capacity = capacity;
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.detector.frame_width == 0 {
            return Err(anyhow!("detector.frame_width must be greater than zero"));
        }
        if self.detector.blur_kernel == 0 || self.detector.blur_kernel % 2 == 0 {
            return Err(anyhow!(
                "detector.blur_kernel must be a positive odd number, got {}",
                self.detector.blur_kernel
            ));
        }
        if self.queue.capacity == 0 {
            return Err(anyhow!("queue.capacity must be greater than zero"));
        }
        if self.source.start_secs > MAX_START_SECS {
            return Err(anyhow!(
                "source.start_secs must be at most {}, got {}",
                MAX_START_SECS,
                self.source.start_secs
            ));
        }
        if self.source.device.trim().is_empty() {
            return Err(anyhow!("source.device must not be empty"));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a non-negative integer", key)),
        _ => Ok(None),
    }
}

fn read_config_file(path: &Path) -> Result<MotionConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let cfg = MotionConfig::default();
        assert_eq!(cfg.detector.min_area, 300);
        assert_eq!(cfg.detector.frame_width, 480);
        assert_eq!(cfg.detector.blur_kernel, 21);
        assert_eq!(cfg.detector.delta_threshold, 25);
        assert_eq!(cfg.detector.dilate_iterations, 2);
        assert_eq!(cfg.queue.capacity, 128);
        assert_eq!(cfg.source.video, None);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_even_kernel_and_empty_queue() {
        let mut cfg = MotionConfig::default();
        cfg.detector.blur_kernel = 20;
        assert!(cfg.validate().is_err());

        let mut cfg = MotionConfig::default();
        cfg.queue.capacity = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = MotionConfig::default();
        cfg.detector.frame_width = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_bounds_the_start_offset() {
        let mut cfg = MotionConfig::default();
        cfg.source.start_secs = MAX_START_SECS;
        assert!(cfg.validate().is_ok());

        cfg.source.start_secs = u64::MAX;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("start_secs"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let file: MotionConfigFile =
            serde_json::from_str(r#"{"detector": {"min_area": 500}}"#).unwrap();
        let cfg = MotionConfig::from_file(file);
        assert_eq!(cfg.detector.min_area, 500);
        assert_eq!(cfg.detector.frame_width, 480);
        assert_eq!(cfg.queue, QueueSettings::default());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed: Result<MotionConfigFile, _> =
            serde_json::from_str(r#"{"detector": {"min_aera": 500}}"#);
        assert!(parsed.is_err());
    }
}
