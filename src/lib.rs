//! translive - real-time transcription and translation sessions
//!
//! Captures live audio, cuts it into silence-aligned chunks, transcribes and
//! translates them with graceful degradation, and persists each session with
//! transcript and subtitle exports.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod clock;
pub mod config;
pub mod defaults;
pub mod error;
pub mod pipeline;
pub mod recovery;
pub mod session;
pub mod stt;
pub mod text;
pub mod translate;

// Core traits (source → process → sink)
pub use audio::AudioSource;
pub use stt::Transcriber;
pub use text::SentenceSegmenter;
pub use translate::Translator;

// Pipeline
pub use pipeline::{EventSender, Pipeline, PipelineEvent, PipelineHandle};

// Sessions
pub use session::{ListOptions, Segment, SegmentStatus, Session, SessionStore};

// Error handling
pub use error::{Result, TransliveError};

// Config
pub use config::Config;

// Time abstraction
pub use clock::{Clock, SystemClock};
