//! Wires the capture, transcription and translation stages into a running
//! session and owns its shutdown order.

use crate::audio::AudioSource;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::pipeline::consumer::ChunkConsumer;
use crate::pipeline::events::{EventSender, PipelineEvent};
use crate::pipeline::producer::ChunkProducer;
use crate::pipeline::queue::ChunkQueue;
use crate::pipeline::translator_pool::TranslatorPool;
use crate::recovery::ErrorHandlingService;
use crate::session::{Session, SessionLog, SessionStore};
use crate::stt::Transcriber;
use crate::text::PunctuationSegmenter;
use crate::translate::Translator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use uuid::Uuid;

/// Builder for a live transcription/translation session.
pub struct Pipeline {
    config: Config,
    clock: Arc<dyn Clock>,
    events: EventSender,
    store: Option<SessionStore>,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        let store = SessionStore::new(&config.session);
        Self {
            config,
            clock: Arc::new(SystemClock),
            events: EventSender::disabled(),
            store: Some(store),
        }
    }

    /// Subscribe a UI or test harness to pipeline events.
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Run without writing anything to disk on stop.
    pub fn without_persistence(mut self) -> Self {
        self.store = None;
        self
    }

    /// Starts all pipeline threads and returns the controlling handle.
    pub fn start(
        self,
        source: Box<dyn AudioSource>,
        transcriber: Arc<dyn Transcriber>,
        translator: Arc<dyn Translator>,
    ) -> Result<PipelineHandle> {
        self.config
            .validate()
            .map_err(|e| crate::error::TransliveError::ConfigInvalidValue {
                key: "config".to_string(),
                message: e.to_string(),
            })?;

        let session = Session::new(
            self.config.translation.source_language.clone(),
            self.config.translation.target_language.clone(),
        );
        let session_id = session.session_id;
        let log = SessionLog::new(session);

        tracing::info!(
            session_id = %session_id,
            source = %self.config.translation.source_language,
            target = %self.config.translation.target_language,
            "session starting"
        );
        self.events.send(PipelineEvent::SessionStarted {
            session_id: session_id.to_string(),
            source_language: self.config.translation.source_language.clone(),
            target_language: self.config.translation.target_language.clone(),
        });

        let running = Arc::new(AtomicBool::new(true));
        let errors = Arc::new(ErrorHandlingService::new(
            &self.config.recovery,
            self.clock.clone(),
            self.events.clone(),
        ));

        let (chunk_tx, chunk_rx) = ChunkQueue::bounded(self.config.queue.capacity);

        let pool = TranslatorPool::spawn(
            translator,
            errors.clone(),
            log.clone(),
            self.events.clone(),
            &self.config.translation,
        );

        let consumer = ChunkConsumer::new(
            chunk_rx,
            transcriber,
            Box::new(PunctuationSegmenter::new()),
            pool.dispatcher(),
            errors,
            log.clone(),
            self.events.clone(),
            &self.config.stt,
            &self.config.translation,
        );
        let consumer_thread = consumer.spawn();

        let recording = self
            .config
            .session
            .write_recording
            .then(|| Arc::new(Mutex::new(Vec::new())));
        let mut producer = ChunkProducer::new(
            source,
            chunk_tx,
            running.clone(),
            log.clone(),
            self.events.clone(),
            self.clock.clone(),
            &self.config.audio,
            &self.config.chunking,
        );
        if let Some(buffer) = &recording {
            producer = producer.with_recording_buffer(buffer.clone());
        }
        let producer_thread = producer.spawn();

        Ok(PipelineHandle {
            running,
            producer_thread: Some(producer_thread),
            consumer_thread: Some(consumer_thread),
            pool: Some(pool),
            log,
            events: self.events,
            store: self.store,
            recording,
        })
    }
}

/// Handle to a running session.
///
/// Shutdown order matters: the producer exits first and drops the chunk
/// queue, the consumer drains what remains and drops its job dispatcher,
/// then the worker pool settles in-flight translations. Only after all
/// threads are done is the session finalized and persisted.
pub struct PipelineHandle {
    running: Arc<AtomicBool>,
    producer_thread: Option<JoinHandle<()>>,
    consumer_thread: Option<JoinHandle<()>>,
    pool: Option<TranslatorPool>,
    log: SessionLog,
    events: EventSender,
    store: Option<SessionStore>,
    recording: Option<Arc<Mutex<Vec<i16>>>>,
}

impl PipelineHandle {
    pub fn session_id(&self) -> Uuid {
        self.log.session_id()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Live segment count, for progress display.
    pub fn segment_count(&self) -> usize {
        self.log.segment_count()
    }

    /// Stops the pipeline, drains in-flight work and returns the finalized
    /// (and, if a store is configured, persisted) session.
    pub fn stop(mut self) -> Result<Session> {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.producer_thread.take()
            && handle.join().is_err()
        {
            tracing::error!("chunk producer panicked");
        }
        if let Some(handle) = self.consumer_thread.take()
            && handle.join().is_err()
        {
            tracing::error!("chunk consumer panicked");
        }
        if let Some(pool) = self.pool.take() {
            pool.shutdown();
        }

        let session = self.log.finalize();
        self.events.send(PipelineEvent::SessionCompleted {
            session_id: session.session_id.to_string(),
            segment_count: session.segments.len(),
            error_count: session.stats.error_count,
        });
        tracing::info!(
            session_id = %session.session_id,
            segments = session.segments.len(),
            errors = session.stats.error_count,
            "session completed"
        );

        if let Some(store) = &self.store {
            let samples = self.recording.as_ref().map(|buffer| {
                match buffer.lock() {
                    Ok(guard) => guard.clone(),
                    Err(poisoned) => poisoned.into_inner().clone(),
                }
            });
            store.save_session(&session, samples.as_deref())?;
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{FramePhase, MockAudioSource};
    use crate::config::{AudioConfig, ChunkingConfig};
    use crate::stt::MockTranscriber;
    use crate::translate::MockTranslator;
    use std::time::Duration;

    fn fast_config() -> Config {
        Config {
            audio: AudioConfig {
                poll_interval_ms: 0,
                ..AudioConfig::default()
            },
            chunking: ChunkingConfig {
                min_chunk_ms: 100,
                ..ChunkingConfig::default()
            },
            ..Config::default()
        }
    }

    // 20 reads x 800 samples = 1s of audio, flushed as one forced chunk when
    // the finite source runs dry.
    fn one_second_source() -> MockAudioSource {
        MockAudioSource::new().with_frame_sequence(vec![FramePhase {
            samples: vec![2000; 800],
            count: 20,
        }])
    }

    fn wait_for_segments(handle: &PipelineHandle, want: usize) {
        for _ in 0..200 {
            if handle.segment_count() >= want {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_end_to_end_session_on_mocks() {
        let (event_tx, event_rx) = crossbeam_channel::bounded(64);
        let pipeline = Pipeline::new(fast_config())
            .without_persistence()
            .with_events(EventSender::new(event_tx));
        let transcriber = Arc::new(
            MockTranscriber::new("base")
                .with_response("Hola mundo.")
                .with_language("es"),
        );
        let handle = pipeline
            .start(
                Box::new(one_second_source()),
                transcriber,
                Arc::new(MockTranslator::new("m")),
            )
            .unwrap();

        wait_for_segments(&handle, 1);
        let session = handle.stop().unwrap();

        assert_eq!(session.segments.len(), 1);
        assert_eq!(session.segments[0].text, "Hola mundo.");
        assert_eq!(
            session.segments[0].translated_text.as_deref(),
            Some("[en] Hola mundo.")
        );
        assert!(session.end_time.is_some());
        assert_eq!(session.stats.segment_count, 1);
        assert_eq!(session.stats.chunk_count, 1);

        let events: Vec<PipelineEvent> = event_rx.try_iter().collect();
        assert!(matches!(events.first(), Some(PipelineEvent::SessionStarted { .. })));
        assert!(matches!(events.last(), Some(PipelineEvent::SessionCompleted { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::TranscriptionUpdate { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::TranslationUpdate { .. })));
    }

    #[test]
    fn test_stop_persists_session() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pipeline = Pipeline::new(fast_config())
            .with_store(SessionStore::with_root(tmp.path()));
        let handle = pipeline
            .start(
                Box::new(one_second_source()),
                Arc::new(MockTranscriber::new("base").with_response("Hola.")),
                Arc::new(MockTranslator::new("m")),
            )
            .unwrap();
        wait_for_segments(&handle, 1);
        let session = handle.stop().unwrap();

        let store = SessionStore::with_root(tmp.path());
        let loaded = store.load_session(session.session_id).unwrap();
        assert_eq!(loaded, session);
    }

    #[test]
    fn test_invalid_config_rejected_at_start() {
        let mut config = fast_config();
        config.queue.capacity = 0;
        let result = Pipeline::new(config).without_persistence().start(
            Box::new(one_second_source()),
            Arc::new(MockTranscriber::new("base")),
            Arc::new(MockTranslator::new("m")),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_stop_without_audio_yields_empty_session() {
        let pipeline = Pipeline::new(fast_config()).without_persistence();
        let handle = pipeline
            .start(
                Box::new(MockAudioSource::new()),
                Arc::new(MockTranscriber::new("base")),
                Arc::new(MockTranslator::new("m")),
            )
            .unwrap();
        let session = handle.stop().unwrap();
        assert!(session.segments.is_empty());
        assert_eq!(session.stats.error_rate, 0.0);
    }
}
