//! Hysteresis state machine deciding when the session is localized.
//!
//! ```text
//!              tracking            acc <= low (h, yaw)
//! Pretracking ---------> Localizing -----------------> Localized
//!      ^                  |    ^                          |
//!      |  not tracking    |    |  no pose, or acc > high  |
//!      +------------------+    +--------------------------+
//!
//! Localizing for >= failure_timeout -> Failed
//! unrecoverable earth state         -> Failed (absorbing)
//! ```
//!
//! Separate low/high bounds keep the state from flickering when accuracy
//! hovers near a single threshold.

use std::time::Instant;

use tracing::info;

use crate::config::LocalizationThresholds;

use super::sample::{AccuracySample, LocalizationInput};
use super::state::LocalizationState;

/// Result of feeding one tick into the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub previous: LocalizationState,
    pub current: LocalizationState,
    /// Set exactly once per armed trigger: the caller should resolve anchors
    /// for the catalog now.
    pub resolve_anchors: bool,
}

impl TickOutcome {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

pub struct LocalizationStateMachine {
    state: LocalizationState,
    last_state_entered: Instant,
    thresholds: LocalizationThresholds,
    /// Cleared once resolution has been requested. Regressing out of
    /// `Localized` does not re-arm it.
    resolution_armed: bool,
}

impl LocalizationStateMachine {
    /// Machine in `Pretracking` with resolution armed.
    pub fn new(thresholds: LocalizationThresholds, now: Instant) -> Self {
        Self {
            state: LocalizationState::Pretracking,
            last_state_entered: now,
            thresholds,
            resolution_armed: true,
        }
    }

    /// Current state.
    pub fn state(&self) -> LocalizationState {
        self.state
    }

    /// When the current `Localizing` spell started. Drives the failure timeout.
    pub fn last_state_entered(&self) -> Instant {
        self.last_state_entered
    }

    /// Force the terminal state, e.g. after a session-fatal configuration error.
    pub fn fail(&mut self) {
        self.state = LocalizationState::Failed;
    }

    /// Allow one more resolution request. Used after the catalog is replaced.
    pub fn rearm_resolution(&mut self) {
        self.resolution_armed = true;
    }

    /// Start over from `Pretracking` with resolution armed, e.g. when a
    /// paused session runs again. `Failed` is kept.
    pub fn reset(&mut self, now: Instant) {
        if self.state.is_terminal() {
            return;
        }
        self.state = LocalizationState::Pretracking;
        self.last_state_entered = now;
        self.resolution_armed = true;
    }

    /// Whether the next `Localized` tick will request resolution.
    pub fn resolution_armed(&self) -> bool {
        self.resolution_armed
    }

    /// Feed one tick. Transitions are logged at info level.
    pub fn update(&mut self, input: &LocalizationInput, now: Instant) -> TickOutcome {
        let previous = self.state;
        let next = self.next_state(input, now);

        if next != previous {
            info!(from = %previous, to = %next, "localization state changed");
            if next == LocalizationState::Localized {
                info!("localization complete");
            }
            self.state = next;
        }

        let resolve_anchors = self.state == LocalizationState::Localized && self.resolution_armed;
        if resolve_anchors {
            self.resolution_armed = false;
        }

        TickOutcome {
            previous,
            current: self.state,
            resolve_anchors,
        }
    }

    fn next_state(&mut self, input: &LocalizationInput, now: Instant) -> LocalizationState {
        use LocalizationState::*;

        if self.state.is_terminal() {
            return Failed;
        }
        if input.earth_state.is_unrecoverable() {
            return Failed;
        }
        if !input.tracking {
            return Pretracking;
        }

        match self.state {
            Pretracking => {
                self.last_state_entered = now;
                Localizing
            }
            Localizing => {
                if input.sample.is_some_and(|s| self.meets_low(&s)) {
                    Localized
                } else if now.saturating_duration_since(self.last_state_entered)
                    >= self.thresholds.failure_timeout
                {
                    Failed
                } else {
                    Localizing
                }
            }
            Localized => match input.sample {
                Some(s) if !self.exceeds_high(&s) => Localized,
                _ => {
                    self.last_state_entered = now;
                    Localizing
                }
            },
            Failed => Failed,
        }
    }

    fn meets_low(&self, s: &AccuracySample) -> bool {
        s.horizontal <= self.thresholds.horizontal_low && s.yaw <= self.thresholds.yaw_low
    }

    fn exceeds_high(&self, s: &AccuracySample) -> bool {
        s.horizontal > self.thresholds.horizontal_high || s.yaw > self.thresholds.yaw_high
    }
}
