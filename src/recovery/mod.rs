//! Error categorization, circuit breaking, retry/backoff and fallback.
//!
//! One [`ErrorHandlingService`] is constructed per pipeline run and injected
//! into the consumer loop and translation workers; there are no module-level
//! singletons.

pub mod breaker;
pub mod fallback;

pub use breaker::{BreakerState, CircuitBreaker};
pub use fallback::FallbackMode;

use crate::clock::Clock;
use crate::defaults;
use crate::pipeline::events::{EventSender, PipelineEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// The two unreliable external services the pipeline depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Transcription,
    Translation,
}

impl ServiceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceKind::Transcription => "transcription",
            ServiceKind::Translation => "translation",
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure taxonomy, derived from error message content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Connection,
    ServiceUnavailable,
    Resource,
    Permission,
    Format,
    Configuration,
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCategory::Connection => "connection",
            ErrorCategory::ServiceUnavailable => "service_unavailable",
            ErrorCategory::Resource => "resource",
            ErrorCategory::Permission => "permission",
            ErrorCategory::Format => "format",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Buckets an error by matching message content.
///
/// Matching order matters: configuration ("model not found") is checked
/// before service_unavailable ("not found") so the more specific bucket wins.
pub fn categorize_error(message: &str) -> ErrorCategory {
    let msg = message.to_lowercase();
    const CONFIGURATION: &[&str] = &["config", "model", "setting", "parameter"];
    const PERMISSION: &[&str] = &[
        "permission",
        "denied",
        "forbidden",
        "unauthorized",
        "401",
        "403",
    ];
    const RESOURCE: &[&str] = &[
        "memory",
        "oom",
        "disk",
        "capacity",
        "resource",
        "too many requests",
        "overload",
        "429",
    ];
    const FORMAT: &[&str] = &[
        "format",
        "malformed",
        "invalid",
        "parse",
        "decode",
        "unsupported",
        "corrupt",
    ];
    const SERVICE_UNAVAILABLE: &[&str] =
        &["unavailable", "not found", "404", "503", "bad gateway", "502"];
    const CONNECTION: &[&str] = &[
        "connection",
        "connect",
        "network",
        "timeout",
        "timed out",
        "unreachable",
        "refused",
        "reset by peer",
        "dns",
    ];

    let matches = |keywords: &[&str]| keywords.iter().any(|k| msg.contains(k));

    if matches(CONFIGURATION) {
        ErrorCategory::Configuration
    } else if matches(PERMISSION) {
        ErrorCategory::Permission
    } else if matches(RESOURCE) {
        ErrorCategory::Resource
    } else if matches(FORMAT) {
        ErrorCategory::Format
    } else if matches(SERVICE_UNAVAILABLE) {
        ErrorCategory::ServiceUnavailable
    } else if matches(CONNECTION) {
        ErrorCategory::Connection
    } else {
        ErrorCategory::Unknown
    }
}

/// What the caller should do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Retry after the given backoff delay.
    Retry { delay: Duration },
    /// Activate fallback mode and degrade gracefully.
    Fallback,
    /// Retry once with lighter-weight parameters.
    ReduceQuality,
    /// Drop the unit and continue; it will not fix itself.
    Skip,
    /// Reset to default settings and retry once.
    Reconfigure,
}

/// Per-service failure accounting.
#[derive(Debug, Clone, Default)]
pub struct ErrorStats {
    pub total: u64,
    /// Failures since the last success.
    pub consecutive: u32,
    pub last_error: Option<String>,
    pub by_category: HashMap<ErrorCategory, u64>,
}

/// Outcome of recording a failure.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryPlan {
    pub category: ErrorCategory,
    pub strategy: RecoveryStrategy,
    /// True when this failure tripped the service's circuit breaker open.
    pub breaker_opened: bool,
}

/// Tunables for the recovery layer, one section of the crate config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecoveryConfig {
    pub breaker_threshold: u32,
    pub breaker_timeout_ms: u64,
    pub fallback_auto_reset_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            breaker_threshold: defaults::BREAKER_THRESHOLD,
            breaker_timeout_ms: defaults::BREAKER_TIMEOUT.as_millis() as u64,
            fallback_auto_reset_ms: defaults::FALLBACK_AUTO_RESET.as_millis() as u64,
            max_retries: defaults::MAX_RETRY_ATTEMPTS,
            retry_base_delay_ms: defaults::RETRY_BASE_DELAY.as_millis() as u64,
            retry_max_delay_ms: defaults::RETRY_MAX_DELAY.as_millis() as u64,
        }
    }
}

struct ServiceState {
    stats: ErrorStats,
    breaker: CircuitBreaker,
}

struct Inner {
    transcription: ServiceState,
    translation: ServiceState,
}

impl Inner {
    fn state_mut(&mut self, service: ServiceKind) -> &mut ServiceState {
        match service {
            ServiceKind::Transcription => &mut self.transcription,
            ServiceKind::Translation => &mut self.translation,
        }
    }
}

/// Categorizes failures, runs per-service circuit breakers and computes
/// retry/backoff/fallback decisions.
pub struct ErrorHandlingService {
    inner: Mutex<Inner>,
    fallback: Mutex<FallbackMode>,
    events: EventSender,
    max_retries: u32,
    retry_base_delay: Duration,
    retry_max_delay: Duration,
}

impl ErrorHandlingService {
    pub fn new(config: &RecoveryConfig, clock: Arc<dyn Clock>, events: EventSender) -> Self {
        let breaker = || {
            CircuitBreaker::new(
                config.breaker_threshold,
                Duration::from_millis(config.breaker_timeout_ms),
                clock.clone(),
            )
        };
        Self {
            inner: Mutex::new(Inner {
                transcription: ServiceState {
                    stats: ErrorStats::default(),
                    breaker: breaker(),
                },
                translation: ServiceState {
                    stats: ErrorStats::default(),
                    breaker: breaker(),
                },
            }),
            fallback: Mutex::new(FallbackMode::new(
                Duration::from_millis(config.fallback_auto_reset_ms),
                clock,
            )),
            events,
            max_retries: config.max_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            retry_max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// Gate before calling an external service: false means fail fast.
    pub fn allow_request(&self, service: ServiceKind) -> bool {
        self.lock_inner().state_mut(service).breaker.allow_request()
    }

    /// Records a success: resets consecutive failures, heals the breaker and,
    /// for translation, deactivates fallback mode.
    pub fn record_success(&self, service: ServiceKind) {
        let reset = {
            let mut inner = self.lock_inner();
            let state = inner.state_mut(service);
            state.stats.consecutive = 0;
            state.breaker.record_success()
        };
        if reset {
            tracing::info!(service = %service, "circuit breaker reset");
            self.events
                .send(PipelineEvent::CircuitBreakerReset { service });
        }
        if service == ServiceKind::Translation && self.lock_fallback().deactivate() {
            self.events.send(PipelineEvent::FallbackModeDeactivated);
        }
    }

    /// Records a failure and returns the recovery plan for it.
    pub fn record_failure(&self, service: ServiceKind, message: &str) -> RecoveryPlan {
        let category = categorize_error(message);
        let (consecutive, breaker_opened) = {
            let mut inner = self.lock_inner();
            let state = inner.state_mut(service);
            state.stats.total += 1;
            state.stats.consecutive = state.stats.consecutive.saturating_add(1);
            state.stats.last_error = Some(message.to_string());
            *state.stats.by_category.entry(category).or_insert(0) += 1;
            (state.stats.consecutive, state.breaker.record_failure())
        };

        if breaker_opened {
            tracing::warn!(service = %service, consecutive, "circuit breaker opened");
            self.events
                .send(PipelineEvent::CircuitBreakerActivated { service });
            self.activate_fallback(&format!("circuit breaker open for {}", service));
        }

        let strategy = self.determine_strategy(category, consecutive);
        if strategy == RecoveryStrategy::Fallback {
            self.activate_fallback(&format!("{} failure: {}", service, category));
        }

        RecoveryPlan {
            category,
            strategy,
            breaker_opened,
        }
    }

    /// Maps (category, consecutive failures) to a recovery strategy.
    fn determine_strategy(&self, category: ErrorCategory, consecutive: u32) -> RecoveryStrategy {
        match category {
            ErrorCategory::Connection => {
                if consecutive < 3 {
                    RecoveryStrategy::Retry {
                        delay: self.backoff_delay(consecutive.saturating_sub(1)),
                    }
                } else {
                    RecoveryStrategy::Fallback
                }
            }
            ErrorCategory::ServiceUnavailable | ErrorCategory::Permission => {
                RecoveryStrategy::Fallback
            }
            // Malformed input will not fix itself.
            ErrorCategory::Format => RecoveryStrategy::Skip,
            ErrorCategory::Resource => RecoveryStrategy::ReduceQuality,
            ErrorCategory::Configuration => RecoveryStrategy::Reconfigure,
            ErrorCategory::Unknown => {
                if consecutive < 2 {
                    RecoveryStrategy::Retry {
                        delay: self.backoff_delay(0),
                    }
                } else {
                    RecoveryStrategy::Fallback
                }
            }
        }
    }

    /// Exponential backoff: base x 2^attempt, capped.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt);
        self.retry_base_delay
            .saturating_mul(multiplier)
            .min(self.retry_max_delay)
    }

    /// Maximum attempts per unit (initial call plus retries).
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether fallback mode is currently active (applies auto-reset).
    pub fn fallback_active(&self) -> bool {
        let (active, just_reset) = self.lock_fallback().check();
        if just_reset {
            self.events.send(PipelineEvent::FallbackModeDeactivated);
        }
        active
    }

    /// Current fallback reason, if active.
    pub fn fallback_reason(&self) -> Option<String> {
        self.lock_fallback().reason().map(str::to_string)
    }

    /// Manually (or on escalation) activate fallback mode.
    pub fn activate_fallback(&self, reason: &str) {
        if self.lock_fallback().activate(reason) {
            self.events.send(PipelineEvent::FallbackModeActivated {
                reason: reason.to_string(),
            });
        }
    }

    /// Manually deactivate fallback mode.
    pub fn deactivate_fallback(&self) {
        if self.lock_fallback().deactivate() {
            self.events.send(PipelineEvent::FallbackModeDeactivated);
        }
    }

    /// Snapshot of a service's failure statistics.
    pub fn stats(&self, service: ServiceKind) -> ErrorStats {
        self.lock_inner().state_mut(service).stats.clone()
    }

    /// Current breaker position for a service.
    pub fn breaker_state(&self, service: ServiceKind) -> BreakerState {
        self.lock_inner().state_mut(service).breaker.state()
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_fallback(&self) -> MutexGuard<'_, FallbackMode> {
        match self.fallback.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    fn service_with_clock() -> (ErrorHandlingService, MockClock) {
        let clock = MockClock::new();
        let service = ErrorHandlingService::new(
            &RecoveryConfig::default(),
            Arc::new(clock.clone()),
            EventSender::disabled(),
        );
        (service, clock)
    }

    // ── categorization ────────────────────────────────────────────────────

    #[test]
    fn test_categorize_connection() {
        assert_eq!(categorize_error("connection refused"), ErrorCategory::Connection);
        assert_eq!(categorize_error("request timed out"), ErrorCategory::Connection);
        assert_eq!(categorize_error("Network unreachable"), ErrorCategory::Connection);
    }

    #[test]
    fn test_categorize_service_unavailable() {
        assert_eq!(
            categorize_error("service unavailable"),
            ErrorCategory::ServiceUnavailable
        );
        assert_eq!(categorize_error("HTTP 404 not found"), ErrorCategory::ServiceUnavailable);
        assert_eq!(categorize_error("503"), ErrorCategory::ServiceUnavailable);
    }

    #[test]
    fn test_categorize_resource() {
        assert_eq!(categorize_error("out of memory"), ErrorCategory::Resource);
        assert_eq!(categorize_error("disk full"), ErrorCategory::Resource);
    }

    #[test]
    fn test_categorize_permission() {
        assert_eq!(categorize_error("permission denied"), ErrorCategory::Permission);
        assert_eq!(categorize_error("403 forbidden"), ErrorCategory::Permission);
    }

    #[test]
    fn test_categorize_format() {
        assert_eq!(categorize_error("malformed audio"), ErrorCategory::Format);
        assert_eq!(categorize_error("invalid input"), ErrorCategory::Format);
    }

    #[test]
    fn test_categorize_configuration_wins_over_not_found() {
        // "model not found" must bucket as configuration, not
        // service_unavailable, despite containing "not found".
        assert_eq!(categorize_error("model not found"), ErrorCategory::Configuration);
    }

    #[test]
    fn test_categorize_unknown() {
        assert_eq!(categorize_error("something odd happened"), ErrorCategory::Unknown);
    }

    // ── strategy selection ────────────────────────────────────────────────

    #[test]
    fn test_connection_retries_then_falls_back() {
        let (service, _clock) = service_with_clock();
        let p1 = service.record_failure(ServiceKind::Translation, "connection refused");
        assert!(matches!(p1.strategy, RecoveryStrategy::Retry { .. }));
        let p2 = service.record_failure(ServiceKind::Translation, "connection refused");
        assert!(matches!(p2.strategy, RecoveryStrategy::Retry { .. }));
        let p3 = service.record_failure(ServiceKind::Translation, "connection refused");
        assert_eq!(p3.strategy, RecoveryStrategy::Fallback);
    }

    #[test]
    fn test_service_unavailable_falls_back_immediately() {
        let (service, _clock) = service_with_clock();
        let plan = service.record_failure(ServiceKind::Translation, "service unavailable");
        assert_eq!(plan.strategy, RecoveryStrategy::Fallback);
        assert!(service.fallback_active());
    }

    #[test]
    fn test_format_always_skips() {
        let (service, _clock) = service_with_clock();
        for _ in 0..4 {
            let plan = service.record_failure(ServiceKind::Transcription, "malformed chunk");
            assert_eq!(plan.strategy, RecoveryStrategy::Skip);
        }
    }

    #[test]
    fn test_resource_reduces_quality() {
        let (service, _clock) = service_with_clock();
        let plan = service.record_failure(ServiceKind::Transcription, "out of memory");
        assert_eq!(plan.strategy, RecoveryStrategy::ReduceQuality);
    }

    #[test]
    fn test_configuration_reconfigures() {
        let (service, _clock) = service_with_clock();
        let plan = service.record_failure(ServiceKind::Transcription, "bad model path");
        assert_eq!(plan.strategy, RecoveryStrategy::Reconfigure);
    }

    #[test]
    fn test_unknown_retries_once_then_falls_back() {
        let (service, _clock) = service_with_clock();
        let p1 = service.record_failure(ServiceKind::Translation, "weird");
        assert!(matches!(p1.strategy, RecoveryStrategy::Retry { .. }));
        let p2 = service.record_failure(ServiceKind::Translation, "weird");
        assert_eq!(p2.strategy, RecoveryStrategy::Fallback);
    }

    // ── backoff ───────────────────────────────────────────────────────────

    #[test]
    fn test_backoff_schedule() {
        let (service, _clock) = service_with_clock();
        assert_eq!(service.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(service.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(service.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(service.backoff_delay(3), Duration::from_secs(8));
        // Capped at 10s.
        assert_eq!(service.backoff_delay(4), Duration::from_secs(10));
        assert_eq!(service.backoff_delay(10), Duration::from_secs(10));
    }

    // ── stats and breaker integration ─────────────────────────────────────

    #[test]
    fn test_stats_track_totals_and_consecutive() {
        let (service, _clock) = service_with_clock();
        service.record_failure(ServiceKind::Translation, "connection refused");
        service.record_failure(ServiceKind::Translation, "weird");
        let stats = service.stats(ServiceKind::Translation);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.consecutive, 2);
        assert_eq!(stats.last_error.as_deref(), Some("weird"));
        assert_eq!(stats.by_category[&ErrorCategory::Connection], 1);
        assert_eq!(stats.by_category[&ErrorCategory::Unknown], 1);

        service.record_success(ServiceKind::Translation);
        let stats = service.stats(ServiceKind::Translation);
        assert_eq!(stats.consecutive, 0, "consecutive resets on success");
        assert_eq!(stats.total, 2, "total is cumulative");
    }

    #[test]
    fn test_services_tracked_independently() {
        let (service, _clock) = service_with_clock();
        service.record_failure(ServiceKind::Transcription, "malformed");
        assert_eq!(service.stats(ServiceKind::Transcription).total, 1);
        assert_eq!(service.stats(ServiceKind::Translation).total, 0);
    }

    #[test]
    fn test_breaker_opens_after_threshold_and_activates_fallback() {
        let (service, _clock) = service_with_clock();
        let mut opened = false;
        for _ in 0..5 {
            opened = service
                .record_failure(ServiceKind::Translation, "malformed")
                .breaker_opened;
        }
        assert!(opened, "5th consecutive failure opens the breaker");
        assert_eq!(
            service.breaker_state(ServiceKind::Translation),
            BreakerState::Open
        );
        assert!(!service.allow_request(ServiceKind::Translation));
        assert!(service.fallback_active());
        assert!(
            service
                .fallback_reason()
                .is_some_and(|r| r.contains("circuit breaker")),
            "fallback reason references the breaker"
        );
    }

    #[test]
    fn test_breaker_half_open_trial_after_timeout() {
        let (service, clock) = service_with_clock();
        for _ in 0..5 {
            service.record_failure(ServiceKind::Translation, "malformed");
        }
        assert!(!service.allow_request(ServiceKind::Translation));
        clock.advance(Duration::from_secs(30));
        assert!(service.allow_request(ServiceKind::Translation), "trial call");
        assert!(!service.allow_request(ServiceKind::Translation), "only one");
        service.record_success(ServiceKind::Translation);
        assert_eq!(
            service.breaker_state(ServiceKind::Translation),
            BreakerState::Closed
        );
        assert_eq!(service.stats(ServiceKind::Translation).consecutive, 0);
    }

    #[test]
    fn test_translation_success_deactivates_fallback() {
        let (service, _clock) = service_with_clock();
        service.activate_fallback("manual");
        assert!(service.fallback_active());
        service.record_success(ServiceKind::Translation);
        assert!(!service.fallback_active());
    }

    #[test]
    fn test_fallback_auto_reset_via_service() {
        let (service, clock) = service_with_clock();
        service.activate_fallback("escalation");
        clock.advance(Duration::from_secs(60));
        assert!(!service.fallback_active());
    }

    #[test]
    fn test_events_emitted_for_breaker_and_fallback() {
        let (tx, rx) = crossbeam_channel::bounded(32);
        let clock = MockClock::new();
        let service = ErrorHandlingService::new(
            &RecoveryConfig::default(),
            Arc::new(clock.clone()),
            EventSender::new(tx),
        );
        for _ in 0..5 {
            service.record_failure(ServiceKind::Translation, "malformed");
        }
        let events: Vec<PipelineEvent> = rx.try_iter().collect();
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::CircuitBreakerActivated {
                service: ServiceKind::Translation
            }
        )));
        assert!(
            events
                .iter()
                .any(|e| matches!(e, PipelineEvent::FallbackModeActivated { .. }))
        );
    }
}
