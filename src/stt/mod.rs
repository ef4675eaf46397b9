//! Speech-to-text seam.
//!
//! The speech backend is an external collaborator behind the [`Transcriber`]
//! trait; the pipeline only orchestrates around it.

use crate::defaults;
use crate::error::{Result, TransliveError};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Options carried on every transcription call.
///
/// The backend must honor `timeout`; a call exceeding it counts as a failure
/// for error-handling purposes.
#[derive(Debug, Clone)]
pub struct TranscribeOptions {
    pub model: String,
    pub language: String,
    pub threads: Option<usize>,
    pub timeout: Duration,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            model: defaults::DEFAULT_MODEL.to_string(),
            language: defaults::DEFAULT_SOURCE_LANGUAGE.to_string(),
            threads: None,
            timeout: defaults::TRANSCRIPTION_TIMEOUT,
        }
    }
}

/// Result of a successful transcription call.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionResult {
    pub text: String,
    /// Language the backend detected, if it reports one.
    pub language: Option<String>,
    pub confidence: f32,
}

/// Trait for speech-to-text transcription.
///
/// This trait allows swapping implementations (real backend vs mock).
pub trait Transcriber: Send + Sync {
    /// Transcribe 16-bit PCM audio to text.
    fn transcribe(&self, audio: &[i16], options: &TranscribeOptions)
    -> Result<TranscriptionResult>;

    /// Get the name of the loaded model.
    fn model_name(&self) -> &str;

    /// Check if the transcriber is ready.
    fn is_ready(&self) -> bool {
        true
    }
}

/// Implement Transcriber for Arc<T> to allow sharing across threads.
impl<T: Transcriber + ?Sized> Transcriber for std::sync::Arc<T> {
    fn transcribe(
        &self,
        audio: &[i16],
        options: &TranscribeOptions,
    ) -> Result<TranscriptionResult> {
        (**self).transcribe(audio, options)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}

/// One scripted outcome for `MockTranscriber` (text or error message).
pub type MockOutcome = std::result::Result<String, String>;

/// Mock transcriber for testing.
pub struct MockTranscriber {
    model_name: String,
    response: String,
    confidence: f32,
    language: Option<String>,
    should_fail: bool,
    error_message: String,
    script: Mutex<VecDeque<MockOutcome>>,
    calls: AtomicUsize,
    seen_lengths: Mutex<Vec<usize>>,
}

impl MockTranscriber {
    /// Create a new mock transcriber with default settings.
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            response: "mock transcription".to_string(),
            confidence: 0.9,
            language: None,
            should_fail: false,
            error_message: "mock transcription failure".to_string(),
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            seen_lengths: Mutex::new(Vec::new()),
        }
    }

    /// Configure the mock to return a specific response.
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Configure the reported confidence.
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Configure the reported detected language.
    pub fn with_language(mut self, language: &str) -> Self {
        self.language = Some(language.to_string());
        self
    }

    /// Configure the mock to fail on every call.
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Configure the failure message.
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Script per-call outcomes consumed in order; falls back to the default
    /// response once exhausted.
    pub fn with_script(self, outcomes: Vec<MockOutcome>) -> Self {
        {
            let mut script = lock(&self.script);
            script.extend(outcomes);
        }
        self
    }

    /// Number of transcribe calls observed.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Sample counts of the audio passed to each call, in call order.
    pub fn seen_lengths(&self) -> Vec<usize> {
        lock(&self.seen_lengths).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(
        &self,
        audio: &[i16],
        _options: &TranscribeOptions,
    ) -> Result<TranscriptionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.seen_lengths).push(audio.len());

        if let Some(outcome) = lock(&self.script).pop_front() {
            return match outcome {
                Ok(text) => Ok(TranscriptionResult {
                    text,
                    language: self.language.clone(),
                    confidence: self.confidence,
                }),
                Err(message) => Err(TransliveError::Transcription { message }),
            };
        }

        if self.should_fail {
            Err(TransliveError::Transcription {
                message: self.error_message.clone(),
            })
        } else {
            Ok(TranscriptionResult {
                text: self.response.clone(),
                language: self.language.clone(),
                confidence: self.confidence,
            })
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        !self.should_fail
    }
}
