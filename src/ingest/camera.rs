//! Camera frame source.
//!
//! `CameraSource` captures from a local V4L2 device (feature `ingest-v4l2`), or generates a
//! synthetic scene for `stub://` devices. A bare camera index such as `0` maps to
//! `/dev/video0`.
//!
//! Cameras have no stream position of their own; the position reported is the time elapsed
//! since capture started.

use anyhow::{anyhow, Result};
use std::time::Duration;

use super::{FrameSource, SyntheticSource, STUB_PREFIX};
use crate::frame::Frame;
use crate::StreamPosition;
#[cfg(feature = "ingest-v4l2")]
use super::v4l2::DeviceV4l2Source;

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0"), camera index, or `stub://` scene.
    pub device: String,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Requested frame rate; 0 leaves the device default.
    pub target_fps: u32,
    /// Pause after connecting so exposure can settle before the reference frame is taken.
    pub warmup: Duration,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            target_fps: 30,
            warmup: Duration::from_millis(250),
        }
    }
}

/// Camera frame source.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-v4l2")]
    Device(DeviceV4l2Source),
}

impl CameraSource {
    pub fn open(mut config: CameraConfig) -> Result<Self> {
        if config.device.trim().is_empty() {
            return Err(anyhow!("camera device must not be empty"));
        }
        if config.device.starts_with(STUB_PREFIX) {
            return Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticSource::open(
                    &config.device,
                    StreamPosition::ZERO,
                )?),
            });
        }
        config.device = device_path(&config.device);

        #[cfg(feature = "ingest-v4l2")]
        {
            let source = DeviceV4l2Source::open(config.clone())?;
            if !config.warmup.is_zero() {
                std::thread::sleep(config.warmup);
            }
            Ok(Self {
                backend: CameraBackend::Device(source),
            })
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            Err(anyhow!(
                "capturing from {} requires the ingest-v4l2 feature",
                config.device
            ))
        }
    }
}

impl FrameSource for CameraSource {
    fn describe(&self) -> String {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.describe(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.describe(),
        }
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.read(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.read(),
        }
    }

    fn position(&self) -> StreamPosition {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.position(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.position(),
        }
    }

    fn close(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.close(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.close(),
        }
    }
}

/// `"0"` -> `"/dev/video0"`; anything else is taken as a path.
pub fn device_path(device: &str) -> String {
    let trimmed = device.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        format!("/dev/video{}", trimmed)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_index_maps_to_device_node() {
        assert_eq!(device_path("0"), "/dev/video0");
        assert_eq!(device_path(" 2 "), "/dev/video2");
        assert_eq!(device_path("/dev/video1"), "/dev/video1");
    }

    #[test]
    fn stub_camera_produces_frames() -> Result<()> {
        let mut camera = CameraSource::open(CameraConfig {
            device: "stub://noise?width=64&height=48".to_string(),
            ..CameraConfig::default()
        })?;
        let frame = camera.read()?.expect("synthetic frame");
        assert_eq!((frame.width(), frame.height()), (64, 48));
        Ok(())
    }

    #[test]
    fn empty_device_is_rejected() {
        let config = CameraConfig {
            device: " ".to_string(),
            ..CameraConfig::default()
        };
        assert!(CameraSource::open(config).is_err());
    }
}
