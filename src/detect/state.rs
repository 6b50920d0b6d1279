use serde::Deserialize;

use super::Region;
use crate::{OccupancyState, StatusEvent, StreamPosition};

/// How the regions of one frame drive the occupancy state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionRule {
    /// The frame is occupied iff any region reaches the minimum area. A frame without such a
    /// region (including one without any region) settles to `Unoccupied`. At most one event per
    /// frame.
    #[default]
    LargestRegion,
    /// Regions are scanned in order and each one may flip the state: a small region while
    /// occupied clears it, a large region while unoccupied sets it. A frame without regions
    /// never changes the state, and one frame can emit several events.
    PerContour,
}

/// The single occupancy state of a detection run.
#[derive(Debug)]
pub struct OccupancyTracker {
    state: OccupancyState,
    rule: TransitionRule,
    min_area: f64,
    transitions: u64,
}

impl OccupancyTracker {
    pub fn new(min_area: u32, rule: TransitionRule) -> Self {
        Self {
            state: OccupancyState::Unoccupied,
            rule,
            min_area: min_area as f64,
            transitions: 0,
        }
    }

    pub fn state(&self) -> OccupancyState {
        self.state
    }

    pub fn rule(&self) -> TransitionRule {
        self.rule
    }

    /// Number of transitions so far.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Feed one frame's regions. Returns the transitions it caused, in order.
    pub fn observe(&mut self, position: StreamPosition, regions: &[Region]) -> Vec<StatusEvent> {
        let mut events = Vec::new();
        match self.rule {
            TransitionRule::LargestRegion => {
                let occupied = regions.iter().any(|r| r.area >= self.min_area);
                let next = if occupied {
                    OccupancyState::Occupied
                } else {
                    OccupancyState::Unoccupied
                };
                self.enter(next, position, &mut events);
            }
            TransitionRule::PerContour => {
                for region in regions {
                    let next = if region.area >= self.min_area {
                        OccupancyState::Occupied
                    } else {
                        OccupancyState::Unoccupied
                    };
                    self.enter(next, position, &mut events);
                }
            }
        }
        events
    }

    fn enter(
        &mut self,
        next: OccupancyState,
        position: StreamPosition,
        events: &mut Vec<StatusEvent>,
    ) {
        if next != self.state {
            self.state = next;
            self.transitions += 1;
            events.push(StatusEvent::new(position, next));
        }
    }
}
