//! Bounded handoff between the chunk producer and consumer.
//!
//! Wraps a bounded crossbeam channel so the producer blocks (with running-flag
//! checks) instead of dropping audio when the consumer falls behind.

use crate::pipeline::types::Chunk;
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const BACKPRESSURE_POLL: Duration = Duration::from_millis(50);

pub struct ChunkQueue;

impl ChunkQueue {
    pub fn bounded(capacity: usize) -> (ChunkSender, ChunkReceiver) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (ChunkSender { tx }, ChunkReceiver { rx })
    }
}

#[derive(Clone)]
pub struct ChunkSender {
    tx: Sender<Chunk>,
}

/// Result of a blocking send attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// The running flag went false while waiting for space.
    Stopped,
    /// The receiver is gone.
    Disconnected,
}

impl ChunkSender {
    /// Blocks until the chunk is enqueued, checking `running` between short
    /// waits so shutdown is never stuck behind a full queue.
    pub fn send_blocking(&self, chunk: Chunk, running: &Arc<AtomicBool>) -> SendOutcome {
        // Fast path first so the common case never logs.
        let mut chunk = match self.tx.try_send(chunk) {
            Ok(()) => return SendOutcome::Sent,
            Err(TrySendError::Disconnected(_)) => return SendOutcome::Disconnected,
            Err(TrySendError::Full(chunk)) => chunk,
        };
        tracing::debug!(chunk_id = chunk.id, "chunk queue full, producer waiting");

        loop {
            if !running.load(Ordering::SeqCst) {
                return SendOutcome::Stopped;
            }
            match self.tx.send_timeout(chunk, BACKPRESSURE_POLL) {
                Ok(()) => return SendOutcome::Sent,
                Err(SendTimeoutError::Timeout(back)) => chunk = back,
                Err(SendTimeoutError::Disconnected(_)) => return SendOutcome::Disconnected,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

pub struct ChunkReceiver {
    rx: Receiver<Chunk>,
}

/// What a timed receive produced.
pub enum RecvOutcome {
    Chunk(Chunk),
    Empty,
    Disconnected,
}

impl ChunkReceiver {
    pub fn recv_timeout(&self, timeout: Duration) -> RecvOutcome {
        match self.rx.recv_timeout(timeout) {
            Ok(chunk) => RecvOutcome::Chunk(chunk),
            Err(RecvTimeoutError::Timeout) => RecvOutcome::Empty,
            Err(RecvTimeoutError::Disconnected) => RecvOutcome::Disconnected,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::BoundaryReason;

    fn chunk(id: u64) -> Chunk {
        Chunk {
            id,
            samples: vec![0; 16],
            captured_at_offset_ms: id * 1000,
            duration_ms: 1000,
            boundary: BoundaryReason::QuietAtBase,
        }
    }

    #[test]
    fn test_fifo_order() {
        let (tx, rx) = ChunkQueue::bounded(4);
        let running = Arc::new(AtomicBool::new(true));
        for id in 0..4 {
            assert_eq!(tx.send_blocking(chunk(id), &running), SendOutcome::Sent);
        }
        for id in 0..4 {
            match rx.recv_timeout(Duration::from_millis(10)) {
                RecvOutcome::Chunk(c) => assert_eq!(c.id, id),
                _ => panic!("expected chunk {id}"),
            }
        }
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(1)),
            RecvOutcome::Empty
        ));
    }

    #[test]
    fn test_send_blocks_until_space() {
        let (tx, rx) = ChunkQueue::bounded(1);
        let running = Arc::new(AtomicBool::new(true));
        assert_eq!(tx.send_blocking(chunk(0), &running), SendOutcome::Sent);

        let tx2 = tx.clone();
        let running2 = running.clone();
        let handle = std::thread::spawn(move || tx2.send_blocking(chunk(1), &running2));

        std::thread::sleep(Duration::from_millis(20));
        match rx.recv_timeout(Duration::from_millis(100)) {
            RecvOutcome::Chunk(c) => assert_eq!(c.id, 0),
            _ => panic!("expected chunk 0"),
        }
        assert_eq!(handle.join().unwrap(), SendOutcome::Sent);
    }

    #[test]
    fn test_send_unblocks_on_stop() {
        let (tx, _rx) = ChunkQueue::bounded(1);
        let running = Arc::new(AtomicBool::new(true));
        assert_eq!(tx.send_blocking(chunk(0), &running), SendOutcome::Sent);

        let running2 = running.clone();
        let handle = std::thread::spawn(move || tx.send_blocking(chunk(1), &running2));
        std::thread::sleep(Duration::from_millis(20));
        running.store(false, Ordering::SeqCst);
        assert_eq!(handle.join().unwrap(), SendOutcome::Stopped);
    }

    #[test]
    fn test_send_detects_disconnect() {
        let (tx, rx) = ChunkQueue::bounded(1);
        let running = Arc::new(AtomicBool::new(true));
        drop(rx);
        assert_eq!(tx.send_blocking(chunk(0), &running), SendOutcome::Disconnected);
    }

    #[test]
    fn test_recv_detects_disconnect() {
        let (tx, rx) = ChunkQueue::bounded(1);
        drop(tx);
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(1)),
            RecvOutcome::Disconnected
        ));
    }
}
