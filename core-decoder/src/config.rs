//! # Decoder Configuration
//!
//! Configuration for the decoder controller, its intake pipe and the
//! worker thread it spawns.

use crate::audio::ReplayGainMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Decoder controller configuration.
///
/// Controls intake sizing, buffering before playback, worker polling and
/// acknowledgment timeouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Maximum bytes of PCM per intake chunk.
    ///
    /// A `submit_data` call larger than this is split into several chunks.
    ///
    /// Default: 4096 bytes (~23ms of CD audio).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Intake capacity in chunks.
    ///
    /// When the intake is full, `submit_data` blocks until the controller
    /// consumes a chunk or a command is posted.
    ///
    /// Default: 1024 chunks (4 MiB with the default chunk size).
    #[serde(default = "default_buffer_chunks")]
    pub buffer_chunks: usize,

    /// Fraction of the intake (0.0-1.0) that must be filled before the
    /// controller starts output.
    ///
    /// Default: 0.1 (10%).
    #[serde(default = "default_buffer_before_play")]
    pub buffer_before_play: f32,

    /// Upper bound on a worker's sleep while waiting for an input stream
    /// that cannot signal readiness.
    ///
    /// Default: 50ms.
    #[serde(default = "default_input_poll_interval")]
    pub input_poll_interval: Duration,

    /// How long the controller's convenience operations (`seek`, `stop`)
    /// wait for an acknowledgment.
    ///
    /// Default: `None` (wait until the worker answers or exits).
    #[serde(default)]
    pub ack_timeout: Option<Duration>,

    /// Which replay-gain values are attached to chunks.
    ///
    /// With `Off`, submitted values are tracked but not attached.
    ///
    /// Default: `Auto`.
    #[serde(default)]
    pub replay_gain_mode: ReplayGainMode,

    /// Name of the worker thread.
    ///
    /// Default: `"decoder"`.
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            buffer_chunks: default_buffer_chunks(),
            buffer_before_play: default_buffer_before_play(),
            input_poll_interval: default_input_poll_interval(),
            ack_timeout: None,
            replay_gain_mode: ReplayGainMode::default(),
            thread_name: default_thread_name(),
        }
    }
}

impl DecoderConfig {
    /// Create a configuration optimized for low latency.
    ///
    /// - Small chunks and a small intake (~0.2s of CD audio)
    /// - Start output as soon as anything is buffered
    /// - Tight input polling
    pub fn low_latency() -> Self {
        Self {
            chunk_size: 1024,
            buffer_chunks: 32,
            buffer_before_play: 0.0,
            input_poll_interval: Duration::from_millis(10),
            ack_timeout: Some(Duration::from_secs(2)),
            ..Default::default()
        }
    }

    /// Create a configuration for slow or bursty sources.
    ///
    /// - Large intake (32 MiB)
    /// - Buffer a quarter of it before playing
    pub fn large_buffer() -> Self {
        Self {
            chunk_size: 8192,
            buffer_chunks: 4096,
            buffer_before_play: 0.25,
            ..Default::default()
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_buffer_chunks(mut self, buffer_chunks: usize) -> Self {
        self.buffer_chunks = buffer_chunks;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = Some(timeout);
        self
    }

    pub fn with_replay_gain_mode(mut self, mode: ReplayGainMode) -> Self {
        self.replay_gain_mode = mode;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be > 0".to_string());
        }

        if self.buffer_chunks == 0 {
            return Err("buffer_chunks must be > 0".to_string());
        }

        if !(0.0..=1.0).contains(&self.buffer_before_play) {
            return Err("buffer_before_play must be between 0.0 and 1.0".to_string());
        }

        if self.input_poll_interval.is_zero() {
            return Err("input_poll_interval must be > 0".to_string());
        }

        if self.thread_name.trim().is_empty() {
            return Err("thread_name must not be empty".to_string());
        }

        Ok(())
    }

    /// Intake capacity in bytes.
    pub fn buffer_bytes(&self) -> usize {
        self.chunk_size * self.buffer_chunks
    }

    /// Number of chunks that must be buffered before output starts.
    pub fn min_buffer_chunks(&self) -> usize {
        let wanted = (self.buffer_chunks as f32 * self.buffer_before_play).ceil() as usize;
        wanted.min(self.buffer_chunks)
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_chunk_size() -> usize {
    4096
}

fn default_buffer_chunks() -> usize {
    1024 // 4 MiB
}

fn default_buffer_before_play() -> f32 {
    0.1 // 10%
}

fn default_input_poll_interval() -> Duration {
    Duration::from_millis(50)
}

fn default_thread_name() -> String {
    "decoder".to_string()
}
