//! Bounded fan-out of translation work.
//!
//! The consumer stays strictly FIFO over chunks; translation latency is hidden
//! behind a small pool of worker threads that patch segments by id when they
//! finish, so completion order never reorders the transcript.

use crate::config::TranslationConfig;
use crate::defaults;
use crate::pipeline::events::{EventSender, PipelineEvent};
use crate::recovery::{ErrorHandlingService, RecoveryStrategy, ServiceKind};
use crate::session::{SegmentStatus, SessionLog};
use crate::translate::{TranslateOptions, Translator};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// One unit of translation work.
#[derive(Debug, Clone)]
pub struct TranslationJob {
    pub segment_id: Uuid,
    pub text: String,
    /// Recent completed source sentences, oldest first.
    pub context: Vec<String>,
}

struct Worker {
    translator: Arc<dyn Translator>,
    errors: Arc<ErrorHandlingService>,
    log: SessionLog,
    events: EventSender,
    source_language: String,
    target_language: String,
    model: Option<String>,
    timeout: Duration,
}

pub struct TranslatorPool {
    tx: Option<Sender<TranslationJob>>,
    handles: Vec<JoinHandle<()>>,
}

/// Sending half of the job channel, held by the consumer.
#[derive(Clone)]
pub struct JobDispatcher {
    tx: Option<Sender<TranslationJob>>,
}

impl JobDispatcher {
    pub fn dispatch(&self, job: TranslationJob) -> bool {
        match &self.tx {
            Some(tx) => tx.send(job).is_ok(),
            None => false,
        }
    }
}

impl TranslatorPool {
    pub fn spawn(
        translator: Arc<dyn Translator>,
        errors: Arc<ErrorHandlingService>,
        log: SessionLog,
        events: EventSender,
        config: &TranslationConfig,
    ) -> Self {
        let (tx, rx) = crossbeam_channel::bounded::<TranslationJob>(config.job_buffer);
        let handles = (0..config.workers.max(1))
            .map(|i| {
                let worker = Worker {
                    translator: translator.clone(),
                    errors: errors.clone(),
                    log: log.clone(),
                    events: events.clone(),
                    source_language: config.source_language.clone(),
                    target_language: config.target_language.clone(),
                    model: config.model.clone(),
                    timeout: Duration::from_millis(config.timeout_ms),
                };
                let rx: Receiver<TranslationJob> = rx.clone();
                std::thread::Builder::new()
                    .name(format!("translator-{i}"))
                    .spawn(move || worker.run(rx))
                    .unwrap_or_else(|e| panic!("failed to spawn translation worker: {e}"))
            })
            .collect();
        Self {
            tx: Some(tx),
            handles,
        }
    }

    /// Enqueue a job, blocking briefly when the buffer is full. Returns false
    /// once the pool has shut down.
    pub fn dispatch(&self, job: TranslationJob) -> bool {
        match &self.tx {
            Some(tx) => tx.send(job).is_ok(),
            None => false,
        }
    }

    /// A cloneable handle the consumer can dispatch through. Workers only
    /// exit once every dispatcher clone has been dropped.
    pub fn dispatcher(&self) -> JobDispatcher {
        JobDispatcher {
            tx: self.tx.clone(),
        }
    }

    /// Closes the job channel and joins the workers; in-flight jobs settle.
    pub fn shutdown(mut self) {
        self.tx.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!("translation worker panicked");
            }
        }
    }
}

impl Worker {
    fn run(&self, rx: Receiver<TranslationJob>) {
        while let Ok(job) = rx.recv() {
            self.process(job);
        }
    }

    fn process(&self, job: TranslationJob) {
        let max_attempts = self.errors.max_retries().max(1);
        let mut options = TranslateOptions {
            model: self.model.clone(),
            context: job.context.clone(),
            timeout: self.timeout,
        };
        let started = Instant::now();

        for attempt in 1..=max_attempts {
            // Fallback and breaker state may have changed since dispatch, or
            // another worker may have tripped them while this one slept on a
            // retry delay. Gate every attempt, not just the first.
            if self.errors.fallback_active() {
                let reason = self
                    .errors
                    .fallback_reason()
                    .unwrap_or_else(|| "fallback mode active".to_string());
                self.finish_bypassed(&job, &reason);
                return;
            }
            if !self.errors.allow_request(ServiceKind::Translation) {
                self.finish_bypassed(&job, "translation circuit breaker open");
                return;
            }

            match self.translator.translate(
                &job.text,
                &self.source_language,
                &self.target_language,
                &options,
            ) {
                Ok(result) => {
                    self.errors.record_success(ServiceKind::Translation);
                    let latency = started.elapsed().as_millis() as u64;
                    let model = self.translator.model_name().to_string();
                    self.patch(&job, SegmentStatus::Translated, |segment| {
                        segment.translated_text = Some(result.translated_text.clone());
                        segment.translation_latency_ms = Some(latency);
                        segment.confidence = result.confidence;
                        segment.model = model;
                    });
                    return;
                }
                Err(err) => {
                    let message = err.to_string();
                    let plan = self.errors.record_failure(ServiceKind::Translation, &message);
                    tracing::warn!(
                        segment_id = %job.segment_id,
                        attempt,
                        category = %plan.category,
                        "translation attempt failed"
                    );
                    self.events.send(PipelineEvent::ErrorNotification {
                        service: ServiceKind::Translation,
                        category: plan.category,
                        message: message.clone(),
                    });

                    if plan.breaker_opened {
                        self.finish_bypassed(&job, "translation circuit breaker open");
                        return;
                    }
                    match plan.strategy {
                        RecoveryStrategy::Retry { delay } if attempt < max_attempts => {
                            std::thread::sleep(delay);
                        }
                        RecoveryStrategy::ReduceQuality if attempt < max_attempts => {
                            // Lighter request: drop the context window.
                            options.context.clear();
                        }
                        RecoveryStrategy::Reconfigure if attempt < max_attempts => {
                            options.model = None;
                        }
                        RecoveryStrategy::Fallback => {
                            self.finish_fallback(&job, &message);
                            return;
                        }
                        // Skip, or retries exhausted.
                        _ => {
                            self.finish_error(&job, &message);
                            return;
                        }
                    }
                }
            }
        }
        self.finish_error(&job, "translation retries exhausted");
    }

    /// Terminal `Bypassed`: fallback or breaker short-circuited the call.
    fn finish_bypassed(&self, job: &TranslationJob, reason: &str) {
        self.patch(job, SegmentStatus::Bypassed, |segment| {
            segment.translated_text = Some(segment.text.clone());
            segment.bypass_reason = Some(reason.to_string());
        });
    }

    /// Terminal `Fallback`: retries gave up, the source text stands in.
    fn finish_fallback(&self, job: &TranslationJob, message: &str) {
        self.patch(job, SegmentStatus::Fallback, |segment| {
            segment.translated_text = Some(segment.text.clone());
            segment.error = Some(message.to_string());
        });
    }

    /// Terminal `Error`: the segment surfaces the placeholder text.
    fn finish_error(&self, job: &TranslationJob, message: &str) {
        self.patch(job, SegmentStatus::Error, |segment| {
            segment.translated_text = Some(defaults::TRANSLATION_UNAVAILABLE.to_string());
            segment.error = Some(message.to_string());
        });
    }

    fn patch(
        &self,
        job: &TranslationJob,
        status: SegmentStatus,
        apply: impl FnOnce(&mut crate::session::Segment),
    ) {
        let mut translated_text = None;
        self.log.patch(job.segment_id, |segment| {
            segment.status = status;
            apply(segment);
            translated_text = segment.translated_text.clone();
        });
        self.events.send(PipelineEvent::TranslationUpdate {
            segment_id: job.segment_id.to_string(),
            status,
            translated_text,
        });
    }
}
