//! Capture-side pipeline stage.
//!
//! Polls the audio source, feeds the level monitor, accumulates samples and
//! emits chunks at the boundaries the planner picks. Runs on its own thread;
//! the bounded queue provides backpressure against a slow consumer.

use crate::audio::{AudioLevelMonitor, AudioSource};
use crate::clock::Clock;
use crate::config::{AudioConfig, ChunkingConfig};
use crate::pipeline::boundary::ChunkBoundaryPlanner;
use crate::pipeline::events::{EventSender, PipelineEvent};
use crate::pipeline::queue::{ChunkSender, SendOutcome};
use crate::pipeline::types::{BoundaryReason, Chunk};
use crate::session::SessionLog;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

pub struct ChunkProducer {
    source: Box<dyn AudioSource>,
    monitor: AudioLevelMonitor,
    planner: ChunkBoundaryPlanner<Arc<dyn Clock>>,
    sender: ChunkSender,
    running: Arc<AtomicBool>,
    log: SessionLog,
    events: EventSender,
    recording: Option<Arc<Mutex<Vec<i16>>>>,
    sample_rate: u32,
    poll_interval: Duration,
    min_chunk_ms: u64,
    max_consecutive_read_errors: u32,
    buffer: Vec<i16>,
    next_id: u64,
    emitted_samples: u64,
}

impl ChunkProducer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Box<dyn AudioSource>,
        sender: ChunkSender,
        running: Arc<AtomicBool>,
        log: SessionLog,
        events: EventSender,
        clock: Arc<dyn Clock>,
        audio: &AudioConfig,
        chunking: &ChunkingConfig,
    ) -> Self {
        let monitor = AudioLevelMonitor::new()
            .with_full_scale_rms(audio.level_full_scale_rms)
            .with_smoothing(audio.level_smoothing);
        let planner = ChunkBoundaryPlanner::new(clock)
            .with_base_duration(Duration::from_millis(chunking.base_chunk_ms))
            .with_quiet_threshold(chunking.quiet_threshold_pct)
            .with_max_extension(Duration::from_millis(chunking.max_extension_ms));
        Self {
            source,
            monitor,
            planner,
            sender,
            running,
            log,
            events,
            recording: None,
            sample_rate: audio.sample_rate,
            poll_interval: Duration::from_millis(audio.poll_interval_ms),
            min_chunk_ms: chunking.min_chunk_ms,
            max_consecutive_read_errors: audio.max_consecutive_read_errors,
            buffer: Vec::new(),
            next_id: 0,
            emitted_samples: 0,
        }
    }

    /// Also copy captured samples into `buffer` for the session recording.
    pub fn with_recording_buffer(mut self, buffer: Arc<Mutex<Vec<i16>>>) -> Self {
        self.recording = Some(buffer);
        self
    }

    pub fn spawn(self) -> JoinHandle<()> {
        std::thread::spawn(move || self.run())
    }

    /// Capture loop. Returns when the running flag drops, the source is
    /// exhausted, the consumer disconnects, or capture fails repeatedly.
    pub fn run(mut self) {
        if let Err(err) = self.source.start() {
            tracing::error!(error = %err, "audio source failed to start");
            self.events.send(PipelineEvent::CaptureFailed {
                message: err.to_string(),
            });
            return;
        }

        self.planner.begin_chunk();
        let mut consecutive_errors = 0u32;

        while self.running.load(Ordering::SeqCst) {
            match self.source.read_samples() {
                Ok(samples) => {
                    consecutive_errors = 0;
                    if samples.is_empty() && self.source.is_finite() {
                        // Finite sources signal end-of-stream with an empty read.
                        break;
                    }
                    self.ingest(&samples);
                    if let Some(reason) = self.planner.update(self.monitor.current_level()) {
                        if !self.emit_chunk(reason) {
                            self.stop_source();
                            return;
                        }
                        self.planner.begin_chunk();
                    }
                }
                Err(err) => {
                    consecutive_errors += 1;
                    tracing::warn!(
                        error = %err,
                        consecutive = consecutive_errors,
                        "audio read failed"
                    );
                    if consecutive_errors >= self.max_consecutive_read_errors {
                        tracing::error!("audio capture abandoned after repeated read failures");
                        self.events.send(PipelineEvent::CaptureFailed {
                            message: err.to_string(),
                        });
                        break;
                    }
                }
            }
            if !self.poll_interval.is_zero() {
                std::thread::sleep(self.poll_interval);
            }
        }

        self.flush_partial();
        self.stop_source();
    }

    fn ingest(&mut self, samples: &[i16]) {
        self.monitor.record(samples);
        if samples.is_empty() {
            return;
        }
        if let Some(recording) = &self.recording {
            let mut guard = match recording.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.extend_from_slice(samples);
        }
        self.buffer.extend_from_slice(samples);
    }

    /// Hands the accumulated buffer to the consumer. Returns false when the
    /// pipeline is shutting down or the consumer is gone.
    fn emit_chunk(&mut self, boundary: BoundaryReason) -> bool {
        if self.buffer.is_empty() {
            return true;
        }
        let samples = std::mem::take(&mut self.buffer);
        let duration_ms = samples_to_ms(samples.len() as u64, self.sample_rate);
        let chunk = Chunk {
            id: self.next_id,
            captured_at_offset_ms: samples_to_ms(self.emitted_samples, self.sample_rate),
            duration_ms,
            boundary,
            samples,
        };
        self.emitted_samples += chunk.samples.len() as u64;
        self.next_id += 1;
        tracing::debug!(
            chunk_id = chunk.id,
            duration_ms,
            boundary = ?boundary,
            "chunk closed"
        );
        self.log.chunk_processed();
        match self.sender.send_blocking(chunk, &self.running) {
            SendOutcome::Sent => true,
            SendOutcome::Stopped => false,
            SendOutcome::Disconnected => {
                tracing::debug!("chunk consumer disconnected, stopping capture");
                false
            }
        }
    }

    /// Flushes the open partial chunk at shutdown if it holds enough audio
    /// to be worth transcribing.
    fn flush_partial(&mut self) {
        let duration_ms = samples_to_ms(self.buffer.len() as u64, self.sample_rate);
        if duration_ms >= self.min_chunk_ms {
            let reason = self.planner.force_close();
            self.emit_chunk(reason);
        } else if !self.buffer.is_empty() {
            tracing::debug!(duration_ms, "discarding short partial chunk");
            self.buffer.clear();
        }
    }

    fn stop_source(&mut self) {
        if let Err(err) = self.source.stop() {
            tracing::warn!(error = %err, "audio source failed to stop");
        }
    }
}

fn samples_to_ms(samples: u64, sample_rate: u32) -> u64 {
    samples * 1000 / sample_rate as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{FramePhase, MockAudioSource};
    use crate::clock::MockClock;
    use crate::pipeline::queue::{ChunkQueue, RecvOutcome};
    use crate::session::Session;

    fn test_audio_config() -> AudioConfig {
        AudioConfig {
            poll_interval_ms: 0,
            ..AudioConfig::default()
        }
    }

    fn drain(rx: &crate::pipeline::queue::ChunkReceiver) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        while let RecvOutcome::Chunk(c) = rx.recv_timeout(Duration::from_millis(10)) {
            chunks.push(c);
        }
        chunks
    }

    #[test]
    fn test_exhausted_source_flushes_forced_chunk() {
        let (tx, rx) = ChunkQueue::bounded(8);
        let source = MockAudioSource::new().with_frame_sequence(vec![FramePhase {
            samples: vec![1000; 800],
            count: 40,
        }]);
        let producer = ChunkProducer::new(
            Box::new(source),
            tx,
            Arc::new(AtomicBool::new(true)),
            SessionLog::new(Session::new("auto", "en")),
            EventSender::disabled(),
            Arc::new(MockClock::new()) as Arc<dyn Clock>,
            &test_audio_config(),
            &ChunkingConfig::default(),
        );
        // Mock clock never advances, so the only boundary is the final flush.
        producer.run();

        let chunks = drain(&rx);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, 0);
        assert_eq!(chunks[0].boundary, BoundaryReason::Forced);
        assert_eq!(chunks[0].samples.len(), 800 * 40);
        // 32000 samples at 16kHz is 2 seconds.
        assert_eq!(chunks[0].duration_ms, 2000);
        assert_eq!(chunks[0].captured_at_offset_ms, 0);
    }

    #[test]
    fn test_short_tail_discarded() {
        let (tx, rx) = ChunkQueue::bounded(8);
        // 4 reads x 800 samples = 200ms, below the 300ms minimum.
        let source = MockAudioSource::new().with_frame_sequence(vec![FramePhase {
            samples: vec![1000; 800],
            count: 4,
        }]);
        let producer = ChunkProducer::new(
            Box::new(source),
            tx,
            Arc::new(AtomicBool::new(true)),
            SessionLog::new(Session::new("auto", "en")),
            EventSender::disabled(),
            Arc::new(MockClock::new()) as Arc<dyn Clock>,
            &test_audio_config(),
            &ChunkingConfig::default(),
        );
        producer.run();
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn test_boundary_splits_audio_without_loss() {
        let (tx, rx) = ChunkQueue::bounded(8);
        let clock = MockClock::new();
        // Loud speech then silence; each read carries 100ms of audio and the
        // clock is advanced 100ms per read by the scripted source wrapper.
        struct SteppingSource {
            inner: MockAudioSource,
            clock: MockClock,
        }
        impl AudioSource for SteppingSource {
            fn start(&mut self) -> crate::error::Result<()> {
                self.inner.start()
            }
            fn stop(&mut self) -> crate::error::Result<()> {
                self.inner.stop()
            }
            fn read_samples(&mut self) -> crate::error::Result<Vec<i16>> {
                self.clock.advance(Duration::from_millis(100));
                self.inner.read_samples()
            }
            fn is_finite(&self) -> bool {
                self.inner.is_finite()
            }
        }

        // 52 loud reads (5.2s) then 10 quiet reads (1s): the planner passes
        // its 5s base mid-speech, extends, and cuts at the first quiet read.
        let inner = MockAudioSource::new().with_frame_sequence(vec![
            FramePhase {
                samples: vec![8000; 1600],
                count: 52,
            },
            FramePhase {
                samples: vec![0; 1600],
                count: 10,
            },
        ]);
        let source = SteppingSource {
            inner,
            clock: clock.clone(),
        };
        let producer = ChunkProducer::new(
            Box::new(source),
            tx,
            Arc::new(AtomicBool::new(true)),
            SessionLog::new(Session::new("auto", "en")),
            EventSender::disabled(),
            Arc::new(clock) as Arc<dyn Clock>,
            &test_audio_config(),
            &ChunkingConfig::default(),
        );
        producer.run();

        let chunks = drain(&rx);
        assert!(chunks.len() >= 2, "expected boundary chunk plus tail");
        assert_eq!(chunks[0].boundary, BoundaryReason::QuietDuringExtension);
        let total: usize = chunks.iter().map(|c| c.samples.len()).sum();
        assert_eq!(total, 62 * 1600, "no audio lost across boundaries");
        // Offsets chain without gaps.
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end_offset_ms(), pair[1].captured_at_offset_ms);
            assert_eq!(pair[0].id + 1, pair[1].id);
        }
    }

    #[test]
    fn test_repeated_read_errors_abort_capture() {
        let (tx, rx) = ChunkQueue::bounded(8);
        let (event_tx, event_rx) = crossbeam_channel::bounded(8);
        let source = MockAudioSource::new()
            .with_read_failure()
            .with_error_message("device unplugged")
            .as_live_source();
        let producer = ChunkProducer::new(
            Box::new(source),
            tx,
            Arc::new(AtomicBool::new(true)),
            SessionLog::new(Session::new("auto", "en")),
            EventSender::new(event_tx),
            Arc::new(MockClock::new()) as Arc<dyn Clock>,
            &test_audio_config(),
            &ChunkingConfig::default(),
        );
        producer.run();

        assert!(drain(&rx).is_empty());
        let events: Vec<_> = event_rx.try_iter().collect();
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::CaptureFailed { message } if message.contains("device unplugged")
        )));
    }

    #[test]
    fn test_start_failure_emits_event() {
        let (tx, _rx) = ChunkQueue::bounded(8);
        let (event_tx, event_rx) = crossbeam_channel::bounded(8);
        let source = MockAudioSource::new().with_start_failure();
        let producer = ChunkProducer::new(
            Box::new(source),
            tx,
            Arc::new(AtomicBool::new(true)),
            SessionLog::new(Session::new("auto", "en")),
            EventSender::new(event_tx),
            Arc::new(MockClock::new()) as Arc<dyn Clock>,
            &test_audio_config(),
            &ChunkingConfig::default(),
        );
        producer.run();
        assert!(matches!(
            event_rx.try_recv(),
            Ok(PipelineEvent::CaptureFailed { .. })
        ));
    }

    #[test]
    fn test_chunk_count_recorded_on_log() {
        let (tx, rx) = ChunkQueue::bounded(8);
        let log = SessionLog::new(Session::new("auto", "en"));
        let source = MockAudioSource::new().with_frame_sequence(vec![FramePhase {
            samples: vec![1000; 800],
            count: 40,
        }]);
        let producer = ChunkProducer::new(
            Box::new(source),
            tx,
            Arc::new(AtomicBool::new(true)),
            log.clone(),
            EventSender::disabled(),
            Arc::new(MockClock::new()) as Arc<dyn Clock>,
            &test_audio_config(),
            &ChunkingConfig::default(),
        );
        producer.run();
        drain(&rx);
        assert_eq!(log.snapshot().stats.chunk_count, 1);
    }

    #[test]
    fn test_recording_buffer_collects_everything() {
        let (tx, rx) = ChunkQueue::bounded(8);
        let recording = Arc::new(Mutex::new(Vec::new()));
        let source = MockAudioSource::new().with_frame_sequence(vec![FramePhase {
            samples: vec![42; 800],
            count: 4,
        }]);
        let producer = ChunkProducer::new(
            Box::new(source),
            tx,
            Arc::new(AtomicBool::new(true)),
            SessionLog::new(Session::new("auto", "en")),
            EventSender::disabled(),
            Arc::new(MockClock::new()) as Arc<dyn Clock>,
            &test_audio_config(),
            &ChunkingConfig::default(),
        )
        .with_recording_buffer(recording.clone());
        producer.run();
        drain(&rx);
        // The recording keeps even audio discarded as a short tail.
        assert_eq!(recording.lock().unwrap().len(), 3200);
    }
}
