//! # Intake Pipe
//!
//! Bounded FIFO of [`MusicChunk`]s between the decoding worker (producer)
//! and the controller (consumer).
//!
//! ## Design
//!
//! - **Capacity**: fixed number of chunks, set by the controller's config
//! - **Order**: strictly first-in first-out; nothing is merged or reordered
//! - **Full policy**: `push` never overwrites; the producer must wait for a
//!   free slot (see the backpressure wait in the bridge)
//!
//! The pipe has no lock of its own. It lives inside the command channel's
//! state so that waiting for a free slot and waiting for a command share one
//! mutex and condition variable.

use crate::chunk::MusicChunk;
use std::collections::VecDeque;

#[derive(Debug)]
pub struct MusicPipe {
    chunks: VecDeque<MusicChunk>,
    capacity: usize,
}

impl MusicPipe {
    /// Create a pipe holding at most `capacity` chunks (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            chunks: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a chunk.
    ///
    /// Returns the chunk back if the pipe is full.
    pub fn push(&mut self, chunk: MusicChunk) -> Result<(), MusicChunk> {
        if self.is_full() {
            return Err(chunk);
        }
        self.chunks.push_back(chunk);
        Ok(())
    }

    /// Remove the oldest chunk.
    pub fn shift(&mut self) -> Option<MusicChunk> {
        self.chunks.pop_front()
    }

    /// The oldest chunk, without removing it.
    pub fn peek(&self) -> Option<&MusicChunk> {
        self.chunks.front()
    }

    /// Drop every buffered chunk. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.chunks.len();
        self.chunks.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.chunks.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the fill level (0.0 to 1.0).
    pub fn fill_level(&self) -> f32 {
        self.chunks.len() as f32 / self.capacity as f32
    }

    /// Total PCM bytes currently buffered.
    pub fn buffered_bytes(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.data.len()).sum()
    }
}
