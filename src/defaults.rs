//! Default configuration constants for translive.
//!
//! Shared constants used across configuration types to ensure consistency
//! and eliminate duplication.

use std::time::Duration;

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and provides a good balance
/// between quality and computational efficiency for voice applications.
pub const SAMPLE_RATE: u32 = 16000;

/// Interval between audio source polls in milliseconds (~60Hz).
pub const CAPTURE_POLL_INTERVAL_MS: u64 = 16;

/// Base chunk duration in milliseconds.
///
/// Once a chunk has accumulated this much audio the boundary planner starts
/// looking for a quiet moment to cut at.
pub const BASE_CHUNK_MS: u64 = 5000;

/// Loudness percentage below which the stream counts as quiet.
pub const QUIET_THRESHOLD_PCT: f32 = 15.0;

/// Maximum chunk extension past the base duration in milliseconds.
///
/// Caps worst-case chunk length at `BASE_CHUNK_MS + MAX_EXTENSION_MS` even
/// when the speaker never pauses.
pub const MAX_EXTENSION_MS: u64 = 2000;

/// Minimum audio a partial chunk must hold to be flushed on shutdown (ms).
///
/// Shorter tails are ambient noise, not speech worth transcribing.
pub const MIN_CHUNK_MS: u64 = 300;

/// RMS level treated as 100% loudness by the level monitor.
///
/// Typical speech peaks well below digital full scale; 0.30 RMS maps normal
/// speaking volume into the upper half of the 0-100 range.
pub const LEVEL_FULL_SCALE_RMS: f32 = 0.30;

/// Smoothing factor for the level monitor (weight of the newest reading).
pub const LEVEL_SMOOTHING: f32 = 0.5;

/// Consecutive audio read failures before capture is abandoned.
pub const MAX_CONSECUTIVE_READ_ERRORS: u32 = 10;

/// Capacity of the chunk queue between producer and consumer.
pub const CHUNK_QUEUE_CAPACITY: usize = 16;

/// Base delay for exponential retry backoff.
pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on a single retry backoff delay.
pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(10);

/// Maximum attempts per unit (initial call plus retries).
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Consecutive failures before a circuit breaker opens.
pub const BREAKER_THRESHOLD: u32 = 5;

/// How long an open breaker stays open before admitting a trial call.
pub const BREAKER_TIMEOUT: Duration = Duration::from_secs(30);

/// How long fallback mode stays active before auto-resetting.
pub const FALLBACK_AUTO_RESET: Duration = Duration::from_secs(60);

/// Timeout for a single translation call (interactive use).
pub const TRANSLATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for a single transcription call.
pub const TRANSCRIPTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Number of translation worker threads.
pub const TRANSLATION_WORKERS: usize = 2;

/// Capacity of the translation job channel.
///
/// Bounds in-flight translation fan-out under bursty speech.
pub const TRANSLATION_JOB_BUFFER: usize = 32;

/// How many previously completed source sentences ride along as context.
pub const CONTEXT_WINDOW: usize = 3;

/// Most recent sessions kept in the session index.
pub const SESSION_INDEX_MAX: usize = 100;

/// Placeholder written when translation exhausts all retries.
pub const TRANSLATION_UNAVAILABLE: &str = "[Translation unavailable]";

/// Default source language ("auto" lets the speech backend detect it).
pub const DEFAULT_SOURCE_LANGUAGE: &str = "auto";

/// Default translation target language.
pub const DEFAULT_TARGET_LANGUAGE: &str = "en";

/// Default transcription model name.
pub const DEFAULT_MODEL: &str = "base";
