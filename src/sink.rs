//! Status event sinks.
//!
//! The detection loop hands every occupancy transition to a `StatusSink`, in order.

use anyhow::{Context, Result};
use std::io::Write;

use crate::StatusEvent;

/// Receives occupancy transitions.
pub trait StatusSink {
    fn emit(&mut self, event: &StatusEvent) -> Result<()>;
}

/// Collects events in memory.
impl StatusSink for Vec<StatusEvent> {
    fn emit(&mut self, event: &StatusEvent) -> Result<()> {
        self.push(*event);
        Ok(())
    }
}

impl<S: StatusSink + ?Sized> StatusSink for &mut S {
    fn emit(&mut self, event: &StatusEvent) -> Result<()> {
        (**self).emit(event)
    }
}

/// `<position ms> : <State>` lines.
pub struct TextSink<W: Write> {
    out: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> StatusSink for TextSink<W> {
    fn emit(&mut self, event: &StatusEvent) -> Result<()> {
        writeln!(self.out, "{} : {}", event.position, event.state)
            .and_then(|_| self.out.flush())
            .context("write status event")
    }
}

/// One JSON object per line: `{"position":1200,"state":"Occupied"}`.
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> StatusSink for JsonLinesSink<W> {
    fn emit(&mut self, event: &StatusEvent) -> Result<()> {
        serde_json::to_writer(&mut self.out, event).context("encode status event")?;
        writeln!(self.out)
            .and_then(|_| self.out.flush())
            .context("write status event")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OccupancyState, StreamPosition};

    fn events() -> [StatusEvent; 2] {
        [
            StatusEvent::new(StreamPosition::from_millis(1200), OccupancyState::Occupied),
            StatusEvent::new(StreamPosition::from_millis(4800), OccupancyState::Unoccupied),
        ]
    }

    #[test]
    fn text_sink_writes_position_and_state() -> Result<()> {
        let mut sink = TextSink::new(Vec::new());
        for event in &events() {
            sink.emit(event)?;
        }
        let text = String::from_utf8(sink.into_inner())?;
        assert_eq!(text, "1200 : Occupied\n4800 : Unoccupied\n");
        Ok(())
    }

    #[test]
    fn json_sink_writes_one_object_per_line() -> Result<()> {
        let mut sink = JsonLinesSink::new(Vec::new());
        for event in &events() {
            sink.emit(event)?;
        }
        let text = String::from_utf8(sink.into_inner())?;
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["position"], 4800);
        assert_eq!(lines[1]["state"], "Unoccupied");
        Ok(())
    }

    #[test]
    fn vec_sink_collects_in_order() -> Result<()> {
        let mut collected: Vec<StatusEvent> = Vec::new();
        for event in &events() {
            collected.emit(event)?;
        }
        assert_eq!(collected, events().to_vec());
        Ok(())
    }
}
