//! Real-time transcription/translation pipeline.
//!
//! A producer thread captures audio and cuts it into silence-aligned chunks,
//! a single consumer transcribes and segments them in strict FIFO order, and
//! a small worker pool translates segments out of band. Stages are connected
//! by bounded crossbeam channels for backpressure.

pub mod boundary;
pub mod consumer;
pub mod events;
pub mod orchestrator;
pub mod producer;
pub mod queue;
pub mod translator_pool;
pub mod types;

pub use boundary::ChunkBoundaryPlanner;
pub use consumer::ChunkConsumer;
pub use events::{EventSender, PipelineEvent};
pub use orchestrator::{Pipeline, PipelineHandle};
pub use producer::ChunkProducer;
pub use queue::{ChunkQueue, ChunkReceiver, ChunkSender, RecvOutcome, SendOutcome};
pub use translator_pool::{JobDispatcher, TranslationJob, TranslatorPool};
pub use types::{BoundaryReason, Chunk};
