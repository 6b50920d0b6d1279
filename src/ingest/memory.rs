use std::collections::VecDeque;

use anyhow::{anyhow, Result};

use super::FrameSource;
use crate::frame::Frame;
use crate::StreamPosition;

/// Pre-built frames replayed in order, each with an explicit stream position.
///
/// Used to script exact frame sequences in tests and by callers that already hold decoded
/// frames.
pub struct FrameListSource {
    frames: VecDeque<(StreamPosition, Frame)>,
    position: StreamPosition,
    failure: Option<String>,
    frames_read: u64,
}

impl FrameListSource {
    /// Frames spaced `interval_ms` apart, the first at position 0.
    pub fn new(frames: Vec<Frame>, interval_ms: u64) -> Self {
        let timed = frames
            .into_iter()
            .enumerate()
            .map(|(i, f)| (StreamPosition::from_millis(i as u64 * interval_ms), f))
            .collect();
        Self::with_positions(timed)
    }

    pub fn with_positions(frames: Vec<(StreamPosition, Frame)>) -> Self {
        Self {
            frames: frames.into(),
            position: StreamPosition::ZERO,
            failure: None,
            frames_read: 0,
        }
    }

    /// Report a read error instead of end-of-stream once the list is exhausted.
    pub fn fail_when_exhausted(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }
}

impl FrameSource for FrameListSource {
    fn describe(&self) -> String {
        format!("frame list ({} read, {} remaining)", self.frames_read, self.frames.len())
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        match self.frames.pop_front() {
            Some((position, frame)) => {
                self.position = position;
                self.frames_read += 1;
                Ok(Some(frame))
            }
            None => match &self.failure {
                Some(message) => Err(anyhow!("{}", message)),
                None => Ok(None),
            },
        }
    }

    fn position(&self) -> StreamPosition {
        self.position
    }
}
