//! Per-service circuit breaker.

use crate::clock::Clock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Calls flow through normally.
    Closed,
    /// Calls fail fast without reaching the external service.
    Open,
    /// One trial call is admitted to probe recovery.
    HalfOpen,
}

/// Consecutive-failure circuit breaker with a timed half-open probe.
pub struct CircuitBreaker {
    state: BreakerState,
    failures: u32,
    last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    threshold: u32,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: BreakerState::Closed,
            failures: 0,
            last_failure_at: None,
            opened_at: None,
            trial_in_flight: false,
            threshold: threshold.max(1),
            timeout,
            clock,
        }
    }

    /// Whether a call may proceed right now.
    ///
    /// Moves the breaker to half-open once the open timeout has elapsed;
    /// half-open admits exactly one trial until its outcome is recorded.
    pub fn allow_request(&mut self) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => {
                if self.trial_in_flight {
                    false
                } else {
                    self.trial_in_flight = true;
                    true
                }
            }
            BreakerState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|at| self.clock.now().duration_since(at))
                    .unwrap_or_default();
                if elapsed >= self.timeout {
                    self.state = BreakerState::HalfOpen;
                    self.trial_in_flight = true;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a successful call. Closes the breaker and zeroes failures.
    ///
    /// Returns true if this success closed a non-closed breaker.
    pub fn record_success(&mut self) -> bool {
        let was_broken = self.state != BreakerState::Closed;
        self.state = BreakerState::Closed;
        self.failures = 0;
        self.last_failure_at = None;
        self.opened_at = None;
        self.trial_in_flight = false;
        was_broken
    }

    /// Records a failed call.
    ///
    /// Returns true when this failure (re)opened the breaker.
    pub fn record_failure(&mut self) -> bool {
        let now = self.clock.now();
        self.failures = self.failures.saturating_add(1);
        self.last_failure_at = Some(now);

        match self.state {
            BreakerState::HalfOpen => {
                // Trial failed: reopen and restart the timeout.
                self.state = BreakerState::Open;
                self.opened_at = Some(now);
                self.trial_in_flight = false;
                true
            }
            BreakerState::Closed if self.failures >= self.threshold => {
                self.state = BreakerState::Open;
                self.opened_at = Some(now);
                true
            }
            _ => false,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn last_failure_at(&self) -> Option<Instant> {
        self.last_failure_at
    }

    /// Instant at which the next trial call will be admitted, if open.
    pub fn next_attempt_at(&self) -> Option<Instant> {
        match self.state {
            BreakerState::Open => self.opened_at.map(|at| at + self.timeout),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    fn breaker_with_clock(threshold: u32, timeout_ms: u64) -> (CircuitBreaker, MockClock) {
        let clock = MockClock::new();
        let breaker = CircuitBreaker::new(
            threshold,
            Duration::from_millis(timeout_ms),
            Arc::new(clock.clone()),
        );
        (breaker, clock)
    }

    #[test]
    fn test_starts_closed_and_allows() {
        let (mut breaker, _clock) = breaker_with_clock(5, 30_000);
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.allow_request());
    }

    #[test]
    fn test_opens_after_threshold_consecutive_failures() {
        let (mut breaker, _clock) = breaker_with_clock(5, 30_000);
        for i in 0..4 {
            assert!(!breaker.record_failure(), "failure {} should not open", i);
        }
        assert!(breaker.record_failure(), "5th failure should open");
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow_request(), "open breaker fails fast");
    }

    #[test]
    fn test_success_resets_failure_count() {
        let (mut breaker, _clock) = breaker_with_clock(5, 30_000);
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.failures(), 0);
        // Needs a full threshold run again to open.
        for _ in 0..4 {
            assert!(!breaker.record_failure());
        }
        assert!(breaker.record_failure());
    }

    #[test]
    fn test_half_open_admits_exactly_one_trial() {
        let (mut breaker, clock) = breaker_with_clock(2, 1_000);
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow_request());

        clock.advance(Duration::from_millis(1_000));
        assert!(breaker.allow_request(), "first call after timeout is a trial");
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(
            !breaker.allow_request(),
            "only one trial while its outcome is pending"
        );
    }

    #[test]
    fn test_half_open_success_closes() {
        let (mut breaker, clock) = breaker_with_clock(2, 1_000);
        breaker.record_failure();
        breaker.record_failure();
        clock.advance(Duration::from_millis(1_000));
        assert!(breaker.allow_request());
        assert!(breaker.record_success());
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.failures(), 0);
        assert!(breaker.allow_request());
    }

    #[test]
    fn test_half_open_failure_reopens_and_restarts_timeout() {
        let (mut breaker, clock) = breaker_with_clock(2, 1_000);
        breaker.record_failure();
        breaker.record_failure();
        clock.advance(Duration::from_millis(1_000));
        assert!(breaker.allow_request());
        assert!(breaker.record_failure(), "trial failure reopens");
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow_request());

        // Timeout restarts from the trial failure.
        clock.advance(Duration::from_millis(999));
        assert!(!breaker.allow_request());
        clock.advance(Duration::from_millis(1));
        assert!(breaker.allow_request());
    }

    #[test]
    fn test_next_attempt_at_only_when_open() {
        let (mut breaker, clock) = breaker_with_clock(1, 1_000);
        assert!(breaker.next_attempt_at().is_none());
        breaker.record_failure();
        let next = breaker.next_attempt_at().expect("open breaker has next attempt");
        assert_eq!(next.duration_since(clock.now()), Duration::from_millis(1_000));
    }
}
