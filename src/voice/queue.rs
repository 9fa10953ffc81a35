//! Capture → controller chunk queue
//!
//! The producer side never blocks. When the controller falls behind, the
//! oldest unread chunks are overwritten so the live pipeline stays current.

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::mpsc;

use super::{AudioChunk, SharedRollingBuffer};
use crate::Error;

/// Create the queue between an audio source and the session controller
///
/// Every chunk pushed into the sink is appended to `rolling` before it is
/// queued, so the pre-roll history stays complete even when the queue drops.
///
/// The queue holds `capacity` rounded up to the next power of two (a
/// capacity of 3 holds 4 chunks) before the oldest are dropped.
#[must_use]
pub fn chunk_channel(
    capacity: usize,
    rolling: SharedRollingBuffer,
) -> (ChunkSink, ChunkReceiver, CaptureErrors) {
    let (tx, rx) = broadcast::channel(capacity.max(1));
    let (err_tx, err_rx) = mpsc::unbounded_channel();

    (
        ChunkSink {
            tx,
            rolling,
            errors: err_tx,
        },
        ChunkReceiver { rx, dropped: 0 },
        CaptureErrors { rx: err_rx },
    )
}

/// Producer handle held by the capture thread
#[derive(Debug, Clone)]
pub struct ChunkSink {
    tx: broadcast::Sender<AudioChunk>,
    rolling: SharedRollingBuffer,
    errors: mpsc::UnboundedSender<Error>,
}

impl ChunkSink {
    /// Record and enqueue a chunk without blocking
    pub fn push(&self, chunk: AudioChunk) {
        self.rolling.append(chunk.clone());
        // No receiver just means the controller has shut down
        let _ = self.tx.send(chunk);
    }

    /// Report a fatal capture error to the controller
    pub fn fail(&self, error: Error) {
        let _ = self.errors.send(error);
    }
}

/// Consumer handle held by the session controller
#[derive(Debug)]
pub struct ChunkReceiver {
    rx: broadcast::Receiver<AudioChunk>,
    dropped: u64,
}

impl ChunkReceiver {
    /// Next chunk, or `None` once every sink is gone and the queue is drained
    pub async fn recv(&mut self) -> Option<AudioChunk> {
        loop {
            match self.rx.recv().await {
                Ok(chunk) => return Some(chunk),
                Err(RecvError::Lagged(n)) => self.note_dropped(n),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next chunk if one is already queued
    pub fn try_recv(&mut self) -> Option<AudioChunk> {
        loop {
            match self.rx.try_recv() {
                Ok(chunk) => return Some(chunk),
                Err(TryRecvError::Lagged(n)) => self.note_dropped(n),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Total chunks dropped because the controller fell behind
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    fn note_dropped(&mut self, n: u64) {
        self.dropped += n;
        tracing::warn!(
            dropped = n,
            total_dropped = self.dropped,
            "recognizer falling behind, dropped oldest audio chunks"
        );
    }
}

/// Fatal errors raised from the capture callback
#[derive(Debug)]
pub struct CaptureErrors {
    rx: mpsc::UnboundedReceiver<Error>,
}

impl CaptureErrors {
    /// Wait for the next capture error; pending forever once the sinks are gone
    pub async fn recv(&mut self) -> Error {
        match self.rx.recv().await {
            Some(error) => error,
            None => std::future::pending().await,
        }
    }
}
