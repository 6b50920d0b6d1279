//! Local file frame source.
//!
//! `FileSource` reads frames from a local video file. Real files are decoded with FFmpeg
//! (feature `ingest-file-ffmpeg`); `stub://` paths produce a synthetic scene instead so the
//! pipeline can run without any codec installed.
//!
//! The start offset is applied at open time: the first frame returned is the first frame at
//! or after it.

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::{FrameSource, SyntheticSource, STUB_PREFIX};
use crate::frame::Frame;
use crate::StreamPosition;

/// Configuration for a local file source.
#[derive(Clone, Debug, Default)]
pub struct FileConfig {
    /// Local file path, or a `stub://` scene.
    pub path: String,
    /// Seek offset applied before the first frame.
    pub start: StreamPosition,
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn open(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        if config.path.starts_with(STUB_PREFIX) {
            return Ok(Self {
                backend: FileBackend::Synthetic(SyntheticSource::open(
                    &config.path,
                    config.start,
                )?),
            });
        }
        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            Ok(Self {
                backend: FileBackend::Ffmpeg(FfmpegFileSource::open(config)?),
            })
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(anyhow!(
                "decoding '{}' requires the ingest-file-ffmpeg feature",
                config.path
            ))
        }
    }
}

impl FrameSource for FileSource {
    fn describe(&self) -> String {
        match &self.backend {
            FileBackend::Synthetic(source) => source.describe(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.describe(),
        }
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.read(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.read(),
        }
    }

    fn position(&self) -> StreamPosition {
        match &self.backend {
            FileBackend::Synthetic(source) => source.position(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.position(),
        }
    }

    fn close(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.close(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.close(),
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with(STUB_PREFIX) {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_remote_and_empty_paths() {
        for path in ["", "  ", "rtsp://camera/stream", "http://host/clip.mp4"] {
            let config = FileConfig {
                path: path.to_string(),
                ..FileConfig::default()
            };
            assert!(FileSource::open(config).is_err(), "{path:?} must be rejected");
        }
    }

    #[test]
    fn stub_paths_open_synthetic_backend() -> Result<()> {
        let mut source = FileSource::open(FileConfig {
            path: "stub://static?frames=2".to_string(),
            start: StreamPosition::ZERO,
        })?;
        assert!(source.read()?.is_some());
        assert!(source.read()?.is_some());
        assert!(source.read()?.is_none());
        Ok(())
    }
}
