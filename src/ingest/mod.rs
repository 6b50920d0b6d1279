//! Frame ingestion sources.
//!
//! This module provides different sources for raw frames:
//! - Local video files (feature: ingest-file-ffmpeg)
//! - USB/V4L2 cameras (feature: ingest-v4l2)
//! - Synthetic `stub://` scenes (demos and tests, no feature needed)
//! - In-memory frame lists (tests)
//!
//! Every source implements `FrameSource`. A source is owned by exactly one thread, the capture
//! thread, for its whole life; the detection loop only ever sees the frames it produced.
//! End of stream is `Ok(None)` from `read`. Failing to open a source is reported by `open`
//! before any thread is started.

pub mod camera;
pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
mod memory;
pub(crate) mod normalize;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub(crate) mod v4l2;

use anyhow::{Context, Result};

use crate::config::SourceSettings;
use crate::frame::Frame;
use crate::StreamPosition;

pub use camera::{CameraConfig, CameraSource};
pub use file::{FileConfig, FileSource};
pub use memory::FrameListSource;
pub use synthetic::{Scene, SyntheticConfig, SyntheticSource};

/// Prefix selecting a synthetic source in place of a file path or device.
pub const STUB_PREFIX: &str = "stub://";

/// A camera or file backend.
pub trait FrameSource {
    /// Short description for logs (path, device, scene).
    fn describe(&self) -> String;

    /// Read the next frame. `Ok(None)` means the stream is exhausted.
    fn read(&mut self) -> Result<Option<Frame>>;

    /// Stream position of the most recently read frame.
    fn position(&self) -> StreamPosition;

    /// Release the backend. Called once by the capture thread when it exits.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        (**self).read()
    }

    fn position(&self) -> StreamPosition {
        (**self).position()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Open the source described by `settings`: the video file when one is given, the camera
/// device otherwise. The start offset is applied before the first frame is returned.
pub fn open(settings: &SourceSettings) -> Result<Box<dyn FrameSource + Send>> {
    let start = StreamPosition::from_secs(settings.start_secs);
    match &settings.video {
        Some(path) => {
            let source = FileSource::open(FileConfig {
                path: path.clone(),
                start,
            })
            .with_context(|| format!("source unavailable: cannot open video '{}'", path))?;
            Ok(Box::new(source))
        }
        None => {
            let source = CameraSource::open(CameraConfig {
                device: settings.device.clone(),
                width: settings.camera_width,
                height: settings.camera_height,
                target_fps: settings.camera_fps,
                warmup: std::time::Duration::from_millis(settings.warmup_ms),
            })
            .with_context(|| {
                format!("source unavailable: cannot open camera '{}'", settings.device)
            })?;
            Ok(Box::new(source))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(video: Option<&str>, device: &str) -> SourceSettings {
        SourceSettings {
            video: video.map(str::to_string),
            device: device.to_string(),
            warmup_ms: 0,
            ..SourceSettings::default()
        }
    }

    #[test]
    fn opens_synthetic_file_and_camera() -> Result<()> {
        let mut file = open(&settings(Some("stub://static?frames=3"), "/dev/video0"))?;
        assert!(file.describe().contains("stub://static"));
        assert!(file.read()?.is_some());

        let mut camera = open(&settings(None, "stub://square"))?;
        assert!(camera.read()?.is_some());
        Ok(())
    }

    #[test]
    fn unknown_scene_is_source_unavailable() {
        let err = open(&settings(Some("stub://nope"), "/dev/video0"))
            .err()
            .expect("unknown scene must fail");
        assert!(err.to_string().contains("source unavailable"));
    }

    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    #[test]
    fn real_files_need_the_ffmpeg_feature() {
        let err = open(&settings(Some("/tmp/clip.mp4"), "/dev/video0"))
            .err()
            .expect("file decode requires ffmpeg");
        assert!(format!("{:#}", err).contains("ingest-file-ffmpeg"));
    }
}
