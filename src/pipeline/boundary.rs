//! Silence-aware chunk boundary planning.
//!
//! A chunk runs for a base duration, then closes at the first quiet moment.
//! If speech continues past the base, the planner waits up to a bounded
//! extension for a pause before cutting mid-speech, so sentence ends line up
//! with chunk ends when the speaker cooperates.

use crate::clock::Clock;
use crate::defaults;
use crate::pipeline::types::BoundaryReason;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlannerState {
    Idle,
    Accumulating { started: Instant },
    AwaitingQuietMoment { extension_started: Instant },
}

pub struct ChunkBoundaryPlanner<C: Clock> {
    base_duration: Duration,
    quiet_threshold_pct: f32,
    max_extension: Duration,
    state: PlannerState,
    clock: C,
}

impl<C: Clock> ChunkBoundaryPlanner<C> {
    pub fn new(clock: C) -> Self {
        Self {
            base_duration: Duration::from_millis(defaults::BASE_CHUNK_MS),
            quiet_threshold_pct: defaults::QUIET_THRESHOLD_PCT,
            max_extension: Duration::from_millis(defaults::MAX_EXTENSION_MS),
            state: PlannerState::Idle,
            clock,
        }
    }

    pub fn with_base_duration(mut self, base: Duration) -> Self {
        self.base_duration = base;
        self
    }

    pub fn with_quiet_threshold(mut self, pct: f32) -> Self {
        self.quiet_threshold_pct = pct;
        self
    }

    pub fn with_max_extension(mut self, extension: Duration) -> Self {
        self.max_extension = extension;
        self
    }

    /// Starts timing a new chunk.
    pub fn begin_chunk(&mut self) {
        self.state = PlannerState::Accumulating {
            started: self.clock.now(),
        };
    }

    /// Consulted once per capture tick with the current loudness percentage.
    /// Returns the boundary reason when the open chunk should close.
    pub fn update(&mut self, level_pct: f32) -> Option<BoundaryReason> {
        let now = self.clock.now();
        let quiet = level_pct < self.quiet_threshold_pct;
        match self.state {
            PlannerState::Idle => None,
            PlannerState::Accumulating { started } => {
                if now.duration_since(started) < self.base_duration {
                    return None;
                }
                if quiet {
                    self.state = PlannerState::Idle;
                    return Some(BoundaryReason::QuietAtBase);
                }
                self.state = PlannerState::AwaitingQuietMoment {
                    extension_started: now,
                };
                None
            }
            PlannerState::AwaitingQuietMoment { extension_started } => {
                if quiet {
                    self.state = PlannerState::Idle;
                    Some(BoundaryReason::QuietDuringExtension)
                } else if now.duration_since(extension_started) >= self.max_extension {
                    self.state = PlannerState::Idle;
                    Some(BoundaryReason::MaxExtension)
                } else {
                    None
                }
            }
        }
    }

    /// Closes the open chunk unconditionally.
    pub fn force_close(&mut self) -> BoundaryReason {
        self.state = PlannerState::Idle;
        BoundaryReason::Forced
    }
}
