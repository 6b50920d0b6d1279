//! motion-watch: frame-differencing occupancy detection.
//!
//! A capture thread reads frames from a `FrameSource` into a `BoundedQueue`. The detection loop
//! on the caller's thread takes frames off the queue, compares each one against a fixed
//! reference frame (the first frame of the run) and reports `Occupied`/`Unoccupied`
//! transitions, keyed by stream position, to a `StatusSink`.
//!
//! Pipeline per frame: grayscale -> resize -> Gaussian blur -> absolute difference ->
//! threshold -> dilate -> external contours -> area filter -> state machine.

use serde::Serialize;
use std::fmt;

pub mod capture;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod queue;
pub mod session;
pub mod sink;
pub mod vision;

pub use capture::{spawn_capture, CaptureEnd, CaptureReport};
pub use config::{DetectorSettings, MotionConfig, QueueSettings, SourceSettings};
pub use detect::{MotionDetector, OccupancyTracker, Region, TransitionRule};
pub use frame::{Frame, PixelFormat};
pub use ingest::{FrameListSource, FrameSource, SyntheticSource};
pub use queue::{BoundedQueue, Closed, OverflowPolicy};
pub use session::{DetectionSession, SessionSummary, StopHandle};
pub use sink::{JsonLinesSink, StatusSink, TextSink};

// ----------------------------------------------------------------------------
// Stream position
// ----------------------------------------------------------------------------

/// Position of a frame within its stream, in milliseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct StreamPosition(u64);

impl StreamPosition {
    pub const ZERO: StreamPosition = StreamPosition(0);

    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    pub fn as_millis(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Occupancy
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum OccupancyState {
    #[default]
    Unoccupied,
    Occupied,
}

impl OccupancyState {
    pub fn as_str(self) -> &'static str {
        match self {
            OccupancyState::Unoccupied => "Unoccupied",
            OccupancyState::Occupied => "Occupied",
        }
    }
}

impl fmt::Display for OccupancyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One occupancy transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    /// Stream position (ms) of the frame that caused the transition.
    pub position: StreamPosition,
    /// State entered.
    pub state: OccupancyState,
}

impl StatusEvent {
    pub fn new(position: StreamPosition, state: OccupancyState) -> Self {
        Self { position, state }
    }
}
