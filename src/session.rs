//! One detection run: capture thread + detection loop.
//!
//! `DetectionSession` owns everything a run mutates (reference frame, occupancy state, queue,
//! stop flag). `run` starts the capture thread on the given source, drives the detection loop
//! on the calling thread until the queue reports end-of-stream or a stop is requested, then
//! joins the capture thread.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::capture::{spawn_capture, CaptureReport};
use crate::config::MotionConfig;
use crate::detect::{MotionDetector, OccupancyTracker};
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::queue::BoundedQueue;
use crate::sink::StatusSink;
use crate::{OccupancyState, StatusEvent};

/// Requests a running session to stop. Cheap to clone; safe to call from any thread,
/// including a signal handler thread.
#[derive(Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
    queue: Arc<BoundedQueue<Frame>>,
}

impl StopHandle {
    /// Raise the stop flag and close the queue, waking both threads.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.queue.close();
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug)]
pub struct SessionSummary {
    /// Frames taken off the queue and analyzed (the reference frame included).
    pub frames_processed: u64,
    /// Frames that could not be compared with the reference.
    pub frames_skipped: u64,
    /// Frames evicted by a drop-oldest queue.
    pub frames_dropped: u64,
    pub events_emitted: u64,
    pub final_state: OccupancyState,
    /// True when the run ended on a stop request rather than end of stream.
    pub stopped: bool,
    pub capture: CaptureReport,
}

struct LoopStats {
    frames_processed: u64,
    frames_skipped: u64,
    events_emitted: u64,
    stopped: bool,
}

pub struct DetectionSession {
    detector: MotionDetector,
    tracker: OccupancyTracker,
    queue: Arc<BoundedQueue<Frame>>,
    stop: Arc<AtomicBool>,
}

impl DetectionSession {
    pub fn new(config: &MotionConfig) -> Self {
        let detector = MotionDetector::new(config.detector.clone());
        let tracker = OccupancyTracker::new(
            config.detector.min_area,
            config.detector.transition_rule,
        );
        Self {
            detector,
            tracker,
            queue: Arc::new(BoundedQueue::new(
                config.queue.capacity,
                config.queue.overflow,
            )),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            flag: self.stop.clone(),
            queue: self.queue.clone(),
        }
    }

    pub fn state(&self) -> OccupancyState {
        self.tracker.state()
    }

    /// Run until the source is exhausted or a stop is requested.
    ///
    /// The source moves into the capture thread; this thread never touches it. Status
    /// transitions are passed to `sink` in stream order.
    pub fn run<S, K>(mut self, source: S, sink: &mut K) -> Result<SessionSummary>
    where
        S: FrameSource + Send + 'static,
        K: StatusSink + ?Sized,
    {
        log::info!(
            "session: starting on {} (min_area={}, width={}, queue={} {:?}, rule={:?})",
            source.describe(),
            self.detector.settings().min_area,
            self.detector.settings().frame_width,
            self.queue.capacity(),
            self.queue.policy(),
            self.tracker.rule()
        );

        let capture = spawn_capture(source, self.queue.clone(), self.stop.clone())?;
        let loop_result = self.detection_loop(sink);

        // Release a producer still blocked on a full queue.
        self.stop.store(true, Ordering::SeqCst);
        self.queue.close();
        let capture = capture
            .join()
            .map_err(|_| anyhow!("capture thread panicked"))?;
        let stats = loop_result?;

        let summary = SessionSummary {
            frames_processed: stats.frames_processed,
            frames_skipped: stats.frames_skipped,
            frames_dropped: self.queue.dropped(),
            events_emitted: stats.events_emitted,
            final_state: self.tracker.state(),
            stopped: stats.stopped,
            capture,
        };
        log::info!(
            "session: finished, {} frames processed, {} events, final state {}",
            summary.frames_processed,
            summary.events_emitted,
            summary.final_state
        );
        Ok(summary)
    }

    fn detection_loop<K: StatusSink + ?Sized>(&mut self, sink: &mut K) -> Result<LoopStats> {
        let mut stats = LoopStats {
            frames_processed: 0,
            frames_skipped: 0,
            events_emitted: 0,
            stopped: false,
        };

        while let Some(frame) = self.queue.pop() {
            if self.stop.load(Ordering::SeqCst) {
                stats.stopped = true;
                break;
            }
            stats.frames_processed += 1;
            match self.process_frame(&frame) {
                Ok(events) => {
                    for event in &events {
                        sink.emit(event)?;
                    }
                    stats.events_emitted += events.len() as u64;
                }
                Err(err) => {
                    stats.frames_skipped += 1;
                    log::warn!("skipping frame at {} ms: {:#}", frame.position(), err);
                }
            }
        }
        if self.stop.load(Ordering::SeqCst) {
            stats.stopped = true;
        }

        Ok(stats)
    }

    /// Detection step for one frame: difference, classify, update the state machine.
    /// Returns the transitions the frame caused.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<Vec<StatusEvent>> {
        let Some(analysis) = self.detector.analyze(frame)? else {
            log::info!("reference frame captured at {} ms", frame.position());
            return Ok(Vec::new());
        };
        log::debug!(
            "frame {} ms: {} regions, largest area {:.0}, {} changed pixels",
            frame.position(),
            analysis.regions.len(),
            analysis.largest_area(),
            analysis.changed_pixels
        );

        let events = self.tracker.observe(frame.position(), &analysis.regions);
        for event in &events {
            log::info!("{} : {}", event.position, event.state);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::FrameListSource;
    use crate::StreamPosition;

    fn config() -> MotionConfig {
        let mut config = MotionConfig::default();
        config.detector.frame_width = 120;
        config
    }

    fn black() -> Frame {
        Frame::filled_gray(120, 90, 0).unwrap()
    }

    #[test]
    fn stop_handle_is_shared() {
        let session = DetectionSession::new(&config());
        let handle = session.stop_handle();
        assert!(!handle.is_stopped());
        handle.clone().stop();
        assert!(handle.is_stopped());
    }

    #[test]
    fn process_frame_sets_reference_then_compares() -> Result<()> {
        let mut session = DetectionSession::new(&config());
        assert!(session.process_frame(&black())?.is_empty());
        assert!(session.process_frame(&black())?.is_empty());
        assert_eq!(session.state(), OccupancyState::Unoccupied);
        Ok(())
    }

    #[test]
    fn run_drains_all_frames() -> Result<()> {
        let frames = (0..6).map(|_| black()).collect();
        let mut events: Vec<StatusEvent> = Vec::new();
        let summary =
            DetectionSession::new(&config()).run(FrameListSource::new(frames, 40), &mut events)?;
        assert_eq!(summary.frames_processed, 6);
        assert_eq!(summary.capture.frames_captured, 6);
        assert_eq!(summary.capture.last_position, StreamPosition::from_millis(200));
        assert!(!summary.stopped);
        assert!(events.is_empty());
        Ok(())
    }

    #[test]
    fn mismatched_frames_are_skipped() -> Result<()> {
        let frames = vec![black(), Frame::filled_gray(120, 60, 0)?, black()];
        let mut events: Vec<StatusEvent> = Vec::new();
        let summary =
            DetectionSession::new(&config()).run(FrameListSource::new(frames, 40), &mut events)?;
        assert_eq!(summary.frames_processed, 3);
        assert_eq!(summary.frames_skipped, 1);
        Ok(())
    }
}
