//! Process-wide fallback mode.
//!
//! While active, translation calls are bypassed and the original text passes
//! through unchanged. Auto-resets on a timer unless re-armed by new failures.

use crate::clock::Clock;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct FallbackMode {
    enabled: bool,
    reason: Option<String>,
    activated_at: Option<Instant>,
    auto_reset_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl FallbackMode {
    pub fn new(auto_reset_timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            enabled: false,
            reason: None,
            activated_at: None,
            auto_reset_timeout,
            clock,
        }
    }

    /// Activates fallback mode.
    ///
    /// Idempotent: while already active the enabled flag and original reason
    /// are untouched, but the auto-reset timer is re-armed. Returns true only
    /// on a fresh activation.
    pub fn activate(&mut self, reason: &str) -> bool {
        let now = self.clock.now();
        if self.enabled {
            self.activated_at = Some(now);
            return false;
        }
        self.enabled = true;
        self.reason = Some(reason.to_string());
        self.activated_at = Some(now);
        tracing::warn!(reason, "fallback mode activated");
        true
    }

    /// Deactivates fallback mode. Returns true if it was active.
    pub fn deactivate(&mut self) -> bool {
        let was_enabled = self.enabled;
        self.enabled = false;
        self.reason = None;
        self.activated_at = None;
        if was_enabled {
            tracing::info!("fallback mode deactivated");
        }
        was_enabled
    }

    /// Whether fallback is currently active, applying the auto-reset timer.
    ///
    /// Returns `(active, just_auto_reset)` so callers can emit a deactivation
    /// notification exactly once.
    pub fn check(&mut self) -> (bool, bool) {
        if !self.enabled {
            return (false, false);
        }
        let expired = self
            .activated_at
            .map(|at| self.clock.now().duration_since(at) >= self.auto_reset_timeout)
            .unwrap_or(false);
        if expired {
            self.deactivate();
            return (false, true);
        }
        (true, false)
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
