//! Data types flowing between pipeline stages.

use serde::{Deserialize, Serialize};

/// Why a chunk was closed where it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryReason {
    /// Audio was already quiet when the base duration elapsed.
    QuietAtBase,
    /// A quiet moment arrived during the extension window.
    QuietDuringExtension,
    /// The extension window ran out mid-speech.
    MaxExtension,
    /// Closed externally (shutdown, stalled source).
    Forced,
}

/// A bounded run of PCM audio handed from producer to consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Monotonic sequence number, 0-based, assigned by the producer.
    pub id: u64,
    /// Mono 16 kHz signed 16-bit samples.
    pub samples: Vec<i16>,
    /// Offset of the chunk start from session start.
    pub captured_at_offset_ms: u64,
    pub duration_ms: u64,
    pub boundary: BoundaryReason,
}

impl Chunk {
    pub fn end_offset_ms(&self) -> u64 {
        self.captured_at_offset_ms + self.duration_ms
    }
}
