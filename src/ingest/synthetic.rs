//! Synthetic (`stub://`) frame source.
//!
//! Scenes:
//! - `static`: uniform mid-gray, never changes.
//! - `square`: black background; a 40x40 white square is in view for frames 20..40 of every
//!   60-frame cycle.
//! - `noise`: mid-gray with low-amplitude pseudo-random sensor noise.
//!
//! Options are given as a query string: `stub://square?frames=120&fps=25&width=640&height=480`.
//! Without `frames` the scene runs until the capture thread is stopped.

use anyhow::{anyhow, Result};

use super::{FrameSource, STUB_PREFIX};
use crate::frame::{Frame, PixelFormat};
use crate::StreamPosition;

const SQUARE_SIDE: u32 = 40;
const SQUARE_CYCLE: u64 = 60;
const SQUARE_VISIBLE: std::ops::Range<u64> = 20..40;
const NOISE_AMPLITUDE: u32 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scene {
    Static,
    Square,
    Noise,
}

impl Scene {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "static" => Ok(Scene::Static),
            "square" => Ok(Scene::Square),
            "noise" => Ok(Scene::Noise),
            other => Err(anyhow!("unknown synthetic scene '{}'", other)),
        }
    }
}

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub scene: Scene,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Total frames before end of stream; `None` runs forever.
    pub frames: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            scene: Scene::Square,
            width: 640,
            height: 480,
            fps: 10,
            frames: None,
        }
    }
}

impl SyntheticConfig {
    /// Parse a `stub://<scene>[?key=value&...]` URL.
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix(STUB_PREFIX)
            .ok_or_else(|| anyhow!("synthetic sources must start with {}", STUB_PREFIX))?;
        let (scene, query) = rest.split_once('?').unwrap_or((rest, ""));

        let mut config = SyntheticConfig {
            scene: Scene::parse(scene)?,
            ..SyntheticConfig::default()
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed synthetic option '{}'", pair))?;
            let parsed: u64 = value
                .parse()
                .map_err(|_| anyhow!("synthetic option '{}' must be an integer", key))?;
            match key {
                "frames" => config.frames = Some(parsed),
                "fps" => config.fps = parsed as u32,
                "width" => config.width = parsed as u32,
                "height" => config.height = parsed as u32,
                other => return Err(anyhow!("unknown synthetic option '{}'", other)),
            }
        }
        if config.fps == 0 {
            return Err(anyhow!("synthetic fps must be >= 1"));
        }
        if config.width < SQUARE_SIDE || config.height < SQUARE_SIDE {
            return Err(anyhow!(
                "synthetic frames must be at least {}x{}",
                SQUARE_SIDE,
                SQUARE_SIDE
            ));
        }
        Ok(config)
    }
}

/// Deterministic generated frames, BGR like a camera.
pub struct SyntheticSource {
    label: String,
    config: SyntheticConfig,
    next_index: u64,
    position: StreamPosition,
    noise_state: u32,
}

impl SyntheticSource {
    pub fn new(label: impl Into<String>, config: SyntheticConfig) -> Self {
        Self {
            label: label.into(),
            config,
            next_index: 0,
            position: StreamPosition::ZERO,
            noise_state: 0x2545_f491,
        }
    }

    /// Open from a `stub://` URL, skipping frames before `start`.
    pub fn open(url: &str, start: StreamPosition) -> Result<Self> {
        let config = SyntheticConfig::from_url(url)?;
        let mut source = Self::new(url, config);
        source.seek(start);
        log::info!("SyntheticSource: connected to {}", url);
        Ok(source)
    }

    fn seek(&mut self, start: StreamPosition) {
        // First frame index whose position is >= start.
        let index = (start.as_millis() as u128 * self.config.fps as u128).div_ceil(1000);
        self.next_index = u64::try_from(index).unwrap_or(u64::MAX);
    }

    fn position_of(&self, index: u64) -> StreamPosition {
        let millis = index as u128 * 1000 / self.config.fps as u128;
        StreamPosition::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    fn render(&mut self, index: u64) -> Vec<u8> {
        let (w, h) = (self.config.width as usize, self.config.height as usize);
        match self.config.scene {
            Scene::Static => vec![128u8; w * h * 3],
            Scene::Square => {
                let mut pixels = vec![0u8; w * h * 3];
                if SQUARE_VISIBLE.contains(&(index % SQUARE_CYCLE)) {
                    let side = SQUARE_SIDE as usize;
                    let (x0, y0) = ((w - side) / 2, (h - side) / 2);
                    for row in y0..y0 + side {
                        let start = (row * w + x0) * 3;
                        pixels[start..start + side * 3].fill(255);
                    }
                }
                pixels
            }
            Scene::Noise => {
                let mut pixels = Vec::with_capacity(w * h * 3);
                for _ in 0..w * h {
                    let jitter = self.next_noise() % (2 * NOISE_AMPLITUDE + 1);
                    let value = (128 + jitter - NOISE_AMPLITUDE) as u8;
                    pixels.extend_from_slice(&[value, value, value]);
                }
                pixels
            }
        }
    }

    // xorshift32
    fn next_noise(&mut self) -> u32 {
        let mut x = self.noise_state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.noise_state = x;
        x
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("{} ({:?}, {} fps)", self.label, self.config.scene, self.config.fps)
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        if self
            .config
            .frames
            .is_some_and(|total| self.next_index >= total)
        {
            return Ok(None);
        }
        let index = self.next_index;
        let pixels = self.render(index);
        let frame = Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            PixelFormat::Bgr24,
        )?;
        self.next_index = self.next_index.saturating_add(1);
        self.position = self.position_of(index);
        Ok(Some(frame))
    }

    fn position(&self) -> StreamPosition {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scene_and_options() -> Result<()> {
        let config = SyntheticConfig::from_url("stub://noise?frames=12&fps=25&width=64&height=48")?;
        assert_eq!(config.scene, Scene::Noise);
        assert_eq!(config.frames, Some(12));
        assert_eq!(config.fps, 25);
        assert_eq!((config.width, config.height), (64, 48));

        assert!(SyntheticConfig::from_url("stub://square?fps=0").is_err());
        assert!(SyntheticConfig::from_url("stub://square?colour=red").is_err());
        assert!(SyntheticConfig::from_url("/dev/video0").is_err());
        Ok(())
    }

    #[test]
    fn ends_after_frame_limit_with_advancing_positions() -> Result<()> {
        let mut source = SyntheticSource::open("stub://static?frames=3&fps=10", StreamPosition::ZERO)?;
        let mut positions = Vec::new();
        while let Some(frame) = source.read()? {
            assert_eq!(frame.format(), PixelFormat::Bgr24);
            positions.push(source.position().as_millis());
        }
        assert_eq!(positions, vec![0, 100, 200]);
        assert!(source.read()?.is_none());
        Ok(())
    }

    #[test]
    fn start_offset_skips_leading_frames() -> Result<()> {
        let mut source =
            SyntheticSource::open("stub://square?frames=100&fps=10", StreamPosition::from_secs(2))?;
        source.read()?.expect("frame after seek");
        assert_eq!(source.position().as_millis(), 2000);
        Ok(())
    }

    #[test]
    fn square_scene_shows_the_square_mid_cycle() -> Result<()> {
        let mut source = SyntheticSource::open("stub://square?width=80&height=60", StreamPosition::ZERO)?;
        let first = source.read()?.expect("frame 0").luma()?;
        assert_eq!(crate::vision::count_nonzero(&first), 0);

        for _ in 1..25 {
            source.read()?;
        }
        let lit = source.read()?.expect("frame 25").luma()?;
        assert_eq!(crate::vision::count_nonzero(&lit), 40 * 40);
        Ok(())
    }

    #[test]
    fn huge_start_offset_does_not_overflow() -> Result<()> {
        let start = StreamPosition::from_secs(u64::MAX / 1000);
        let mut source = SyntheticSource::open("stub://static", start)?;
        source.read()?.expect("frame far into the stream");
        assert!(source.position() >= StreamPosition::from_secs(u64::MAX / 1000 - 1));

        let mut bounded = SyntheticSource::open("stub://static?frames=10", start)?;
        assert!(bounded.read()?.is_none());
        Ok(())
    }
}
