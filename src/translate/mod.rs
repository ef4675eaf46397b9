//! Translation seam.
//!
//! The translation backend is an external collaborator behind the
//! [`Translator`] trait; the pipeline orchestrates retries, fallback and
//! bypass around it.

use crate::defaults;
use crate::error::{Result, TransliveError};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Options carried on every translation call.
#[derive(Debug, Clone)]
pub struct TranslateOptions {
    /// Backend model override, if any.
    pub model: Option<String>,
    /// Previously completed source sentences, oldest first.
    pub context: Vec<String>,
    /// The backend must honor this; a call exceeding it counts as a failure.
    pub timeout: Duration,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            model: None,
            context: Vec::new(),
            timeout: defaults::TRANSLATION_TIMEOUT,
        }
    }
}

/// Result of a successful translation call.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationResult {
    pub translated_text: String,
    /// How the translation was produced (backend-defined, e.g. "llm").
    pub method: String,
    pub from_cache: bool,
    pub confidence: f32,
}

/// Trait for sentence translation.
pub trait Translator: Send + Sync {
    /// Translate `text` from `source` to `target` language.
    fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
        options: &TranslateOptions,
    ) -> Result<TranslationResult>;

    /// Get the name of the loaded model.
    fn model_name(&self) -> &str;
}

/// Implement Translator for Arc<T> to allow sharing across workers.
impl<T: Translator + ?Sized> Translator for std::sync::Arc<T> {
    fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
        options: &TranslateOptions,
    ) -> Result<TranslationResult> {
        (**self).translate(text, source, target, options)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Mock translator for testing.
pub struct MockTranslator {
    model_name: String,
    fail_all: bool,
    fail_texts: Vec<String>,
    error_message: String,
    confidence: f32,
    calls: AtomicUsize,
    seen_texts: Mutex<Vec<String>>,
}

impl MockTranslator {
    /// Create a new mock translator; translates by tagging the target language.
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            fail_all: false,
            fail_texts: Vec::new(),
            error_message: "mock translation failure".to_string(),
            confidence: 0.9,
            calls: AtomicUsize::new(0),
            seen_texts: Mutex::new(Vec::new()),
        }
    }

    /// Configure the mock to fail on every call.
    pub fn with_failure(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Configure the mock to fail only for specific input texts.
    pub fn with_failing_texts(mut self, texts: Vec<&str>) -> Self {
        self.fail_texts = texts.into_iter().map(str::to_string).collect();
        self
    }

    /// Configure the failure message.
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Number of translate calls observed.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Inputs passed to each call, in call order.
    pub fn seen_texts(&self) -> Vec<String> {
        match self.seen_texts.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Translator for MockTranslator {
    fn translate(
        &self,
        text: &str,
        _source: &str,
        target: &str,
        _options: &TranslateOptions,
    ) -> Result<TranslationResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.seen_texts.lock() {
            Ok(mut guard) => guard.push(text.to_string()),
            Err(poisoned) => poisoned.into_inner().push(text.to_string()),
        }

        if self.fail_all || self.fail_texts.iter().any(|t| t == text) {
            return Err(TransliveError::Translation {
                message: self.error_message.clone(),
            });
        }

        Ok(TranslationResult {
            translated_text: format!("[{}] {}", target, text),
            method: "mock".to_string(),
            from_cache: false,
            confidence: self.confidence,
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
