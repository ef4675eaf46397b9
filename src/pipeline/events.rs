//! Typed events published by the pipeline for UI or test subscribers.

use crate::recovery::{ErrorCategory, ServiceKind};
use crate::session::SegmentStatus;
use serde::{Deserialize, Serialize};

/// Events emitted while a session runs.
///
/// Delivered best-effort over a bounded channel; a slow or absent subscriber
/// never blocks the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    SessionStarted {
        session_id: String,
        source_language: String,
        target_language: String,
    },
    TranscriptionUpdate {
        segment_id: String,
        text: String,
        detected_language: Option<String>,
        confidence: f32,
    },
    TranslationUpdate {
        segment_id: String,
        status: SegmentStatus,
        translated_text: Option<String>,
    },
    SessionCompleted {
        session_id: String,
        segment_count: usize,
        error_count: u64,
    },
    FallbackModeActivated {
        reason: String,
    },
    FallbackModeDeactivated,
    ErrorNotification {
        service: ServiceKind,
        category: ErrorCategory,
        message: String,
    },
    CaptureFailed {
        message: String,
    },
    CircuitBreakerActivated {
        service: ServiceKind,
    },
    CircuitBreakerReset {
        service: ServiceKind,
    },
}

/// Non-blocking event publisher shared across pipeline threads.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Option<crossbeam_channel::Sender<PipelineEvent>>,
}

impl EventSender {
    /// A sender that drops every event (no subscriber).
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn new(tx: crossbeam_channel::Sender<PipelineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Publish an event. Never blocks; a full or closed channel drops it.
    pub fn send(&self, event: PipelineEvent) {
        if let Some(ref tx) = self.tx
            && tx.try_send(event).is_err()
        {
            // Subscriber full or gone - events are best effort.
        }
    }
}
