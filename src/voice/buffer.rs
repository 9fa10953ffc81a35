//! Rolling pre-roll buffer
//!
//! Keeps the most recent audio so a session can include the words spoken
//! just before the wake phrase was recognised.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{AudioChunk, AudioFormat, AudioSegment};

/// Fixed-duration FIFO of audio chunks
#[derive(Debug)]
pub struct RollingBuffer {
    chunks: VecDeque<AudioChunk>,
    frames: usize,
    max_frames: usize,
    format: AudioFormat,
}

impl RollingBuffer {
    /// Create a buffer holding at most `duration` of audio in `format`
    #[must_use]
    pub fn new(duration: Duration, format: AudioFormat) -> Self {
        Self {
            chunks: VecDeque::new(),
            frames: 0,
            max_frames: format.frames_in(duration),
            format,
        }
    }

    /// Append a chunk, evicting the oldest chunks until the cap holds
    pub fn append(&mut self, chunk: AudioChunk) {
        if self.max_frames == 0 {
            return;
        }

        self.frames += chunk.frames();
        self.chunks.push_back(chunk);

        while self.frames > self.max_frames {
            let Some(evicted) = self.chunks.pop_front() else {
                break;
            };
            self.frames -= evicted.frames();
        }
    }

    /// Copy of the current contents
    #[must_use]
    pub fn snapshot(&self) -> Vec<AudioChunk> {
        self.chunks.iter().cloned().collect()
    }

    /// Contents up to and including `last`, as one segment
    ///
    /// Chunks appended after `last` are left out. Empty if `last` is no
    /// longer buffered.
    #[must_use]
    pub fn snapshot_through(&self, last: &AudioChunk) -> AudioSegment {
        let Some(end) = self.chunks.iter().rposition(|c| c.is_same_capture(last)) else {
            return AudioSegment::new(self.format);
        };
        let chunks: Vec<AudioChunk> = self.chunks.range(..=end).cloned().collect();
        AudioSegment::from_chunks(&chunks, self.format)
    }

    /// Current contents as one contiguous segment
    #[must_use]
    pub fn snapshot_segment(&self) -> AudioSegment {
        let chunks: Vec<AudioChunk> = self.chunks.iter().cloned().collect();
        AudioSegment::from_chunks(&chunks, self.format)
    }

    /// Drop all history
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.frames = 0;
    }

    /// Buffered frames
    #[must_use]
    pub const fn frames(&self) -> usize {
        self.frames
    }

    /// Buffered duration
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.format.duration_of(self.frames)
    }

    /// Frame cap
    #[must_use]
    pub const fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Number of buffered chunks
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether nothing is buffered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Rolling buffer shared between the capture thread (sole writer) and the
/// session controller (snapshot reader)
#[derive(Debug, Clone)]
pub struct SharedRollingBuffer {
    inner: Arc<Mutex<RollingBuffer>>,
}

impl SharedRollingBuffer {
    /// Create a shared buffer
    #[must_use]
    pub fn new(duration: Duration, format: AudioFormat) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RollingBuffer::new(duration, format))),
        }
    }

    /// Append from the capture side
    pub fn append(&self, chunk: AudioChunk) {
        if let Ok(mut buf) = self.inner.lock() {
            buf.append(chunk);
        }
    }

    /// Snapshot as one segment; empty if the lock is poisoned
    #[must_use]
    pub fn snapshot_segment(&self) -> AudioSegment {
        self.inner
            .lock()
            .map(|buf| buf.snapshot_segment())
            .unwrap_or_default()
    }

    /// Snapshot up to `last`; empty if the lock is poisoned
    #[must_use]
    pub fn snapshot_through(&self, last: &AudioChunk) -> AudioSegment {
        self.inner
            .lock()
            .map(|buf| buf.snapshot_through(last))
            .unwrap_or_default()
    }

    /// Clear history
    pub fn clear(&self) {
        if let Ok(mut buf) = self.inner.lock() {
            buf.clear();
        }
    }

    /// Buffered duration
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.inner
            .lock()
            .map(|buf| buf.duration())
            .unwrap_or_default()
    }
}
