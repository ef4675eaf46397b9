//! Session data model: segments, their status state machine, per-session
//! statistics and the shared in-run log.

pub mod export;
pub mod store;

pub use export::{render_srt, render_text, ExportLanguage};
pub use store::{ListOptions, SessionSort, SessionStore, SessionSummary, StoreConfig};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Lifecycle of a single transcribed segment.
///
/// `Translating` is the only non-terminal state. A segment never moves
/// backwards; illegal transitions are rejected by [`SessionLog::patch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    /// Transcribed, translation not yet dispatched.
    Transcribed,
    /// Translation request in flight.
    Translating,
    /// Translation completed.
    Translated,
    /// Translation skipped (fallback mode or open breaker at dispatch).
    Bypassed,
    /// Translation failed but degraded gracefully to the source text.
    Fallback,
    /// Translation failed terminally.
    Error,
}

impl SegmentStatus {
    /// Whether moving from `self` to `next` is a legal forward transition.
    pub fn can_transition(self, next: SegmentStatus) -> bool {
        use SegmentStatus::*;
        matches!(
            (self, next),
            (Transcribed, Translating)
                | (Transcribed, Bypassed)
                | (Translating, Translated)
                | (Translating, Bypassed)
                | (Translating, Fallback)
                | (Translating, Error)
        )
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, SegmentStatus::Transcribed | SegmentStatus::Translating)
    }
}

/// One sentence of transcribed (and possibly translated) speech.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub id: Uuid,
    /// Source-language text. Immutable after creation.
    pub text: String,
    pub translated_text: Option<String>,
    /// Offsets from session start, apportioned within the owning chunk.
    pub start_ms: u64,
    pub end_ms: u64,
    pub source_language: String,
    pub target_language: String,
    pub detected_language: Option<String>,
    pub confidence: f32,
    pub status: SegmentStatus,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bypass_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription_latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation_latency_ms: Option<u64>,
}

impl Segment {
    pub fn new(text: impl Into<String>, start_ms: u64, end_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            translated_text: None,
            start_ms,
            end_ms,
            source_language: crate::defaults::DEFAULT_SOURCE_LANGUAGE.to_string(),
            target_language: crate::defaults::DEFAULT_TARGET_LANGUAGE.to_string(),
            detected_language: None,
            confidence: 1.0,
            status: SegmentStatus::Transcribed,
            model: crate::defaults::DEFAULT_MODEL.to_string(),
            bypass_reason: None,
            error: None,
            transcription_latency_ms: None,
            translation_latency_ms: None,
        }
    }

    /// Text shown in the target-language column of exports.
    pub fn display_translation(&self) -> &str {
        self.translated_text.as_deref().unwrap_or(&self.text)
    }
}

/// Aggregate counters computed when a session is finalized.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionStats {
    pub chunk_count: u64,
    pub segment_count: u64,
    pub error_count: u64,
    /// error_count / segment_count, 0.0 for empty sessions.
    pub error_rate: f64,
    pub avg_transcription_latency_ms: Option<u64>,
    pub avg_translation_latency_ms: Option<u64>,
    pub bypassed_count: u64,
}

impl SessionStats {
    /// Recomputes segment-derived counters; `chunk_count` is owned by the
    /// producer and left untouched.
    pub fn recompute(&mut self, segments: &[Segment]) {
        self.segment_count = segments.len() as u64;
        self.error_count = segments
            .iter()
            .filter(|s| s.status == SegmentStatus::Error)
            .count() as u64;
        self.bypassed_count = segments
            .iter()
            .filter(|s| matches!(s.status, SegmentStatus::Bypassed | SegmentStatus::Fallback))
            .count() as u64;
        self.error_rate = if self.segment_count == 0 {
            0.0
        } else {
            self.error_count as f64 / self.segment_count as f64
        };
        self.avg_transcription_latency_ms =
            average(segments.iter().filter_map(|s| s.transcription_latency_ms));
        self.avg_translation_latency_ms =
            average(segments.iter().filter_map(|s| s.translation_latency_ms));
    }
}

fn average(values: impl Iterator<Item = u64>) -> Option<u64> {
    let (sum, count) = values.fold((0u64, 0u64), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count)
}

/// A complete session as persisted to `session.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub session_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub source_language: String,
    pub target_language: String,
    pub segments: Vec<Segment>,
    pub stats: SessionStats,
}

impl Session {
    pub fn new(source_language: impl Into<String>, target_language: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            start_time: Utc::now(),
            end_time: None,
            source_language: source_language.into(),
            target_language: target_language.into(),
            segments: Vec::new(),
            stats: SessionStats::default(),
        }
    }

    /// Stamps the end time and recomputes stats from the segment list.
    pub fn finalize(&mut self) {
        self.end_time = Some(Utc::now());
        let segments = std::mem::take(&mut self.segments);
        self.stats.recompute(&segments);
        self.segments = segments;
    }

    pub fn duration_secs(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_seconds())
    }
}

/// Shared accumulator for the live run.
///
/// The consumer appends segments in arrival order; translation workers patch
/// them by id afterwards, so positions stay stable under concurrent updates.
#[derive(Clone)]
pub struct SessionLog {
    inner: Arc<Mutex<Session>>,
}

impl SessionLog {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.lock().session_id
    }

    pub fn append(&self, segment: Segment) {
        self.lock().segments.push(segment);
    }

    pub fn chunk_processed(&self) {
        self.lock().stats.chunk_count += 1;
    }

    /// Applies `patch` to the segment with the given id.
    ///
    /// The patch may set any field except `text` and may only move `status`
    /// forward; a backwards status edit is dropped and the previous state
    /// kept. Returns false when the id is unknown.
    pub fn patch(&self, id: Uuid, patch: impl FnOnce(&mut Segment)) -> bool {
        let mut session = self.lock();
        let Some(segment) = session.segments.iter_mut().find(|s| s.id == id) else {
            return false;
        };
        let before_status = segment.status;
        let before_text = segment.text.clone();
        patch(segment);
        segment.text = before_text;
        if segment.status != before_status && !before_status.can_transition(segment.status) {
            tracing::warn!(
                segment_id = %id,
                from = ?before_status,
                to = ?segment.status,
                "ignoring backwards segment status transition"
            );
            segment.status = before_status;
        }
        true
    }

    pub fn segment_count(&self) -> usize {
        self.lock().segments.len()
    }

    /// Clones the current session state, finalized with end time and stats.
    pub fn finalize(&self) -> Session {
        let mut session = self.lock().clone();
        session.finalize();
        session
    }

    /// Snapshot without finalizing.
    pub fn snapshot(&self) -> Session {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
