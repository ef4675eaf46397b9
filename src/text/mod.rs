//! Sentence segmentation over incrementally produced transcript text.

use uuid::Uuid;

/// A segmenter-identified unit of transcribed text. Immutable once emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Sentence {
    pub id: Uuid,
    pub text: String,
    pub is_complete: bool,
    pub confidence: f32,
    pub is_fallback: bool,
}

impl Sentence {
    fn complete(text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            text,
            is_complete: true,
            confidence: 1.0,
            is_fallback: false,
        }
    }
}

/// Trait for turning incremental transcript text into completed sentences.
///
/// Implementations must tolerate partial input across repeated calls: text
/// without a sentence terminator is buffered and joined with the next call.
pub trait SentenceSegmenter: Send {
    /// Feed a chunk of transcript text; returns any sentences completed by it.
    fn process_text_chunk(&mut self, text: &str) -> Vec<Sentence>;

    /// Drain buffered text at end of session as a final sentence, if any.
    fn flush(&mut self) -> Option<Sentence>;
}

/// Rule-based segmenter splitting on terminal punctuation.
///
/// Keeps an internal carry-over buffer so a sentence split across two
/// transcription chunks is reassembled before it is emitted.
#[derive(Debug, Default)]
pub struct PunctuationSegmenter {
    buffer: String,
}

impl PunctuationSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_terminal(c: char) -> bool {
        matches!(c, '.' | '!' | '?' | '…' | '。' | '！' | '？')
    }
}

impl SentenceSegmenter for PunctuationSegmenter {
    fn process_text_chunk(&mut self, text: &str) -> Vec<Sentence> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        if !self.buffer.is_empty() && !self.buffer.ends_with(char::is_whitespace) {
            self.buffer.push(' ');
        }
        self.buffer.push_str(trimmed);

        let mut sentences = Vec::new();
        let mut remainder = String::new();
        let mut current = String::new();

        for c in self.buffer.chars() {
            current.push(c);
            if Self::is_terminal(c) {
                let sentence = current.trim();
                if !sentence.is_empty() {
                    sentences.push(Sentence::complete(sentence.to_string()));
                }
                current.clear();
            }
        }
        remainder.push_str(current.trim_start());
        self.buffer = remainder;

        sentences
    }

    fn flush(&mut self) -> Option<Sentence> {
        let tail = std::mem::take(&mut self.buffer);
        let tail = tail.trim();
        if tail.is_empty() {
            None
        } else {
            Some(Sentence::complete(tail.to_string()))
        }
    }
}
