//! Transcription-side pipeline stage.
//!
//! A single thread drains the chunk queue in strict FIFO order: each chunk is
//! transcribed, segmented into sentences and turned into segments before the
//! next chunk is touched. Translation is handed to the worker pool so slow
//! translations never stall transcription.

use crate::config::{SttConfig, TranslationConfig};
use crate::pipeline::events::{EventSender, PipelineEvent};
use crate::pipeline::queue::{ChunkReceiver, RecvOutcome};
use crate::pipeline::translator_pool::{JobDispatcher, TranslationJob};
use crate::pipeline::types::Chunk;
use crate::recovery::{ErrorHandlingService, RecoveryStrategy, ServiceKind};
use crate::session::{Segment, SegmentStatus, SessionLog};
use crate::stt::{TranscribeOptions, Transcriber};
use crate::text::{Sentence, SentenceSegmenter};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const IDLE_POLL: Duration = Duration::from_millis(100);

pub struct ChunkConsumer {
    receiver: ChunkReceiver,
    transcriber: Arc<dyn Transcriber>,
    segmenter: Box<dyn SentenceSegmenter>,
    dispatcher: JobDispatcher,
    errors: Arc<ErrorHandlingService>,
    log: SessionLog,
    events: EventSender,
    options: TranscribeOptions,
    source_language: String,
    target_language: String,
    context_window: usize,
    context: VecDeque<String>,
    last_end_ms: u64,
}

impl ChunkConsumer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        receiver: ChunkReceiver,
        transcriber: Arc<dyn Transcriber>,
        segmenter: Box<dyn SentenceSegmenter>,
        dispatcher: JobDispatcher,
        errors: Arc<ErrorHandlingService>,
        log: SessionLog,
        events: EventSender,
        stt: &SttConfig,
        translation: &TranslationConfig,
    ) -> Self {
        let options = TranscribeOptions {
            model: stt.model.clone(),
            language: translation.source_language.clone(),
            threads: Some(stt.threads as usize),
            timeout: Duration::from_millis(stt.timeout_ms),
        };
        Self {
            receiver,
            transcriber,
            segmenter,
            dispatcher,
            errors,
            log,
            events,
            options,
            source_language: translation.source_language.clone(),
            target_language: translation.target_language.clone(),
            context_window: translation.context_window,
            context: VecDeque::new(),
            last_end_ms: 0,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        std::thread::Builder::new()
            .name("chunk-consumer".to_string())
            .spawn(move || self.run())
            .unwrap_or_else(|e| panic!("failed to spawn chunk consumer: {e}"))
    }

    /// Drains the queue until the producer hangs up, then flushes the
    /// segmenter tail. Dropping `self` afterwards releases the dispatcher so
    /// the worker pool can settle.
    pub fn run(mut self) {
        loop {
            match self.receiver.recv_timeout(IDLE_POLL) {
                RecvOutcome::Chunk(chunk) => self.process_chunk(chunk),
                RecvOutcome::Empty => continue,
                RecvOutcome::Disconnected => break,
            }
        }
        if let Some(tail) = self.segmenter.flush() {
            let at = self.last_end_ms;
            self.emit_sentence(tail, at, at);
        }
    }

    /// Fully processes one chunk: transcription with retries, sentence
    /// segmentation and segment creation. The chunk is the unit of failure
    /// containment; if transcription cannot be made to succeed the chunk is
    /// dropped and the session continues.
    pub fn process_chunk(&mut self, chunk: Chunk) {
        let Some((text, detected, confidence, latency_ms)) = self.transcribe(&chunk) else {
            return;
        };
        self.last_end_ms = chunk.end_offset_ms();
        if text.trim().is_empty() {
            return;
        }

        let sentences = self.segmenter.process_text_chunk(&text);
        if sentences.is_empty() {
            return;
        }

        // Apportion the chunk's time range across its sentences by character
        // length so subtitle cues don't fully overlap.
        let total_chars: usize = sentences.iter().map(|s| s.text.chars().count()).sum();
        let mut cursor = chunk.captured_at_offset_ms;
        let count = sentences.len();
        for (i, sentence) in sentences.into_iter().enumerate() {
            let end = if i + 1 == count {
                chunk.end_offset_ms()
            } else {
                let share =
                    chunk.duration_ms * sentence.text.chars().count() as u64 / total_chars.max(1) as u64;
                cursor + share
            };
            let mut sentence = sentence;
            sentence.confidence = confidence;
            let start = cursor;
            cursor = end;
            self.emit_segment(sentence, start, end, detected.clone(), latency_ms);
        }
    }

    /// Transcribes with the recovery policy applied. Returns None when the
    /// chunk is abandoned.
    fn transcribe(&mut self, chunk: &Chunk) -> Option<(String, Option<String>, f32, u64)> {
        let max_attempts = self.errors.max_retries().max(1);
        let mut options = self.options.clone();
        for attempt in 1..=max_attempts {
            if !self.errors.allow_request(ServiceKind::Transcription) {
                tracing::warn!(chunk_id = chunk.id, "transcription breaker open, dropping chunk");
                return None;
            }
            let started = Instant::now();
            match self.transcriber.transcribe(&chunk.samples, &options) {
                Ok(result) => {
                    self.errors.record_success(ServiceKind::Transcription);
                    let latency = started.elapsed().as_millis() as u64;
                    return Some((result.text, result.language, result.confidence, latency));
                }
                Err(err) => {
                    let message = err.to_string();
                    let plan = self
                        .errors
                        .record_failure(ServiceKind::Transcription, &message);
                    tracing::warn!(
                        chunk_id = chunk.id,
                        attempt,
                        category = %plan.category,
                        "transcription attempt failed"
                    );
                    self.events.send(PipelineEvent::ErrorNotification {
                        service: ServiceKind::Transcription,
                        category: plan.category,
                        message,
                    });
                    match plan.strategy {
                        RecoveryStrategy::Retry { delay } if attempt < max_attempts => {
                            std::thread::sleep(delay);
                        }
                        RecoveryStrategy::ReduceQuality if attempt < max_attempts => {
                            options.threads = Some(1);
                        }
                        RecoveryStrategy::Reconfigure if attempt < max_attempts => {
                            options = self.options.clone();
                        }
                        _ => return None,
                    }
                }
            }
        }
        None
    }

    fn emit_sentence(&mut self, sentence: Sentence, start_ms: u64, end_ms: u64) {
        self.emit_segment(sentence, start_ms, end_ms, None, 0);
    }

    fn emit_segment(
        &mut self,
        sentence: Sentence,
        start_ms: u64,
        end_ms: u64,
        detected_language: Option<String>,
        transcription_latency_ms: u64,
    ) {
        let mut segment = Segment::new(sentence.text.clone(), start_ms, end_ms);
        segment.source_language = self.source_language.clone();
        segment.target_language = self.target_language.clone();
        segment.detected_language = detected_language;
        segment.confidence = sentence.confidence;
        segment.model = self.options.model.clone();
        segment.transcription_latency_ms = Some(transcription_latency_ms);
        let segment_id = segment.id;

        self.events.send(PipelineEvent::TranscriptionUpdate {
            segment_id: segment_id.to_string(),
            text: segment.text.clone(),
            detected_language: segment.detected_language.clone(),
            confidence: segment.confidence,
        });

        // When degradation is already in effect there is no point queueing
        // work the pool would bypass anyway.
        if self.errors.fallback_active() {
            segment.status = SegmentStatus::Bypassed;
            segment.translated_text = Some(segment.text.clone());
            segment.bypass_reason = self.errors.fallback_reason();
            let translated = segment.translated_text.clone();
            self.log.append(segment);
            self.events.send(PipelineEvent::TranslationUpdate {
                segment_id: segment_id.to_string(),
                status: SegmentStatus::Bypassed,
                translated_text: translated,
            });
        } else {
            segment.status = SegmentStatus::Translating;
            self.log.append(segment);
            let job = TranslationJob {
                segment_id,
                text: sentence.text.clone(),
                context: self.context.iter().cloned().collect(),
            };
            if !self.dispatcher.dispatch(job) {
                tracing::warn!(segment_id = %segment_id, "translation pool gone, bypassing");
                self.log.patch(segment_id, |s| {
                    s.status = SegmentStatus::Bypassed;
                    s.translated_text = Some(s.text.clone());
                    s.bypass_reason = Some("translation pool unavailable".to_string());
                });
            }
        }

        self.context.push_back(sentence.text);
        while self.context.len() > self.context_window {
            self.context.pop_front();
        }
    }
}
