//! Capture thread: the producer side of the frame pipeline.
//!
//! The thread owns the frame source outright. Each iteration it checks the stop flag, reads a
//! frame, stamps it with the source position and pushes it into the queue. Any way out of the
//! loop closes the queue, so the detection loop always sees end-of-stream after the last frame.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::queue::BoundedQueue;
use crate::StreamPosition;

/// Why the capture thread stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureEnd {
    /// The source reported end of stream.
    Exhausted,
    /// The stop flag was raised.
    Stopped,
    /// The queue was closed by the consumer side.
    QueueClosed,
    /// The source failed to produce a frame. Treated as end of stream.
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct CaptureReport {
    pub end: CaptureEnd,
    pub frames_captured: u64,
    /// Last position stamped onto a frame.
    pub last_position: StreamPosition,
}

/// Start the capture thread.
pub fn spawn_capture<S>(
    source: S,
    queue: Arc<BoundedQueue<Frame>>,
    stop: Arc<AtomicBool>,
) -> Result<JoinHandle<CaptureReport>>
where
    S: FrameSource + Send + 'static,
{
    std::thread::Builder::new()
        .name("capture".to_string())
        .spawn(move || run_capture(source, &queue, &stop))
        .context("spawn capture thread")
}

/// The capture loop. Runs on the calling thread; `spawn_capture` is the usual entry point.
pub fn run_capture<S: FrameSource>(
    mut source: S,
    queue: &BoundedQueue<Frame>,
    stop: &AtomicBool,
) -> CaptureReport {
    let description = source.describe();
    let mut frames_captured = 0u64;
    let mut last_position = StreamPosition::ZERO;

    let end = loop {
        if stop.load(Ordering::SeqCst) {
            break CaptureEnd::Stopped;
        }

        let frame = match source.read() {
            Ok(Some(frame)) => frame,
            Ok(None) => break CaptureEnd::Exhausted,
            Err(err) => {
                log::warn!("capture: read from {} failed: {:#}", description, err);
                break CaptureEnd::Failed(format!("{:#}", err));
            }
        };

        let reported = source.position();
        if reported < last_position {
            log::debug!(
                "capture: source position went backwards ({} -> {} ms), holding {}",
                last_position,
                reported,
                last_position
            );
        }
        last_position = last_position.max(reported);
        frames_captured += 1;

        if queue.push(frame.at_position(last_position)).is_err() {
            break CaptureEnd::QueueClosed;
        }
    };

    queue.close();
    if let Err(err) = source.close() {
        log::warn!("capture: closing {} failed: {:#}", description, err);
    }
    log::info!(
        "capture: ended ({:?}) after {} frames from {}",
        end,
        frames_captured,
        description
    );

    CaptureReport {
        end,
        frames_captured,
        last_position,
    }
}
