//! # Audio Format & Side-Channel Metadata
//!
//! Types describing the decoded PCM a plugin submits, plus the replay-gain
//! and mix-ramp metadata that travels alongside it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Highest sample rate a session may announce.
pub const MAX_SAMPLE_RATE: u32 = 768_000;

/// Highest channel count a session may announce.
pub const MAX_CHANNELS: u8 = 8;

// ============================================================================
// Audio Format Types
// ============================================================================

/// Encoding of one decoded sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Signed 8 bit
    S8,
    /// Signed 16 bit, native endian
    S16,
    /// Signed 24 bit stored in the low bytes of 32 bit words
    S24P32,
    /// Signed 32 bit
    S32,
    /// 32 bit float in the range [-1.0, 1.0]
    Float,
}

impl SampleFormat {
    /// Size of one sample in bytes.
    pub fn sample_size(self) -> usize {
        match self {
            SampleFormat::S8 => 1,
            SampleFormat::S16 => 2,
            SampleFormat::S24P32 | SampleFormat::S32 | SampleFormat::Float => 4,
        }
    }

    /// Significant bits per sample.
    pub fn bits(self) -> u8 {
        match self {
            SampleFormat::S8 => 8,
            SampleFormat::S16 => 16,
            SampleFormat::S24P32 => 24,
            SampleFormat::S32 | SampleFormat::Float => 32,
        }
    }
}

/// Format of the PCM a session submits.
///
/// Announced exactly once per session through `ready()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u8,
    /// Sample encoding
    pub format: SampleFormat,
}

impl AudioFormat {
    /// Create a new audio format descriptor.
    pub fn new(sample_rate: u32, channels: u8, format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            format,
        }
    }

    /// Standard CD quality (44.1 kHz, 16-bit stereo)
    pub fn cd_quality() -> Self {
        Self::new(44100, 2, SampleFormat::S16)
    }

    /// Returns `true` if the rate and channel count are playable.
    pub fn is_valid(&self) -> bool {
        (1..=MAX_SAMPLE_RATE).contains(&self.sample_rate)
            && (1..=MAX_CHANNELS).contains(&self.channels)
    }

    /// Size of one frame (one sample per channel) in bytes.
    pub fn frame_size(&self) -> usize {
        self.format.sample_size() * self.channels as usize
    }

    /// Bytes of PCM per second of audio.
    pub fn time_to_size(&self) -> usize {
        self.frame_size() * self.sample_rate as usize
    }

    /// Playback time of `bytes` of PCM in this format.
    pub fn size_to_time(&self, bytes: usize) -> Duration {
        let per_second = self.time_to_size();
        if per_second == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(bytes as f64 / per_second as f64)
    }

    /// Playback time of `frames` frames.
    pub fn frames_to_duration(&self, frames: u64) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }

    /// Number of whole frames in `duration`.
    pub fn duration_to_frames(&self, duration: Duration) -> u64 {
        (duration.as_secs_f64() * self.sample_rate as f64) as u64
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.sample_rate,
            self.format.bits(),
            self.channels
        )
    }
}

// ============================================================================
// Replay Gain
// ============================================================================

/// Which replay-gain values the output stage should apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayGainMode {
    /// Do not attach replay gain to chunks.
    Off,
    /// Use per-track values.
    Track,
    /// Use per-album values.
    Album,
    /// Album values when defined, track values otherwise.
    #[default]
    Auto,
}

/// Gain (dB) and peak (linear) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplayGainTuple {
    pub gain: f32,
    pub peak: f32,
}

impl ReplayGainTuple {
    /// Marker for "no value" (gain below any realistic setting).
    pub const UNDEFINED: Self = Self {
        gain: -200.0,
        peak: 0.0,
    };

    pub fn new(gain: f32, peak: f32) -> Self {
        Self { gain, peak }
    }

    pub fn is_defined(&self) -> bool {
        self.gain > -100.0
    }
}

impl Default for ReplayGainTuple {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

/// Replay-gain values for the chunks that follow their submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayGainInfo {
    pub track: ReplayGainTuple,
    pub album: ReplayGainTuple,
}

impl ReplayGainInfo {
    pub fn is_defined(&self) -> bool {
        self.track.is_defined() || self.album.is_defined()
    }

    /// The tuple selected by `mode`, if any.
    pub fn tuple(&self, mode: ReplayGainMode) -> Option<ReplayGainTuple> {
        let selected = match mode {
            ReplayGainMode::Off => return None,
            ReplayGainMode::Track => self.track,
            ReplayGainMode::Album => self.album,
            ReplayGainMode::Auto if self.album.is_defined() => self.album,
            ReplayGainMode::Auto => self.track,
        };
        selected.is_defined().then_some(selected)
    }
}

// ============================================================================
// MixRamp
// ============================================================================

/// Volume ramps used to overlap the end of one song with the next.
///
/// Values are kept in their tag form (`"<volume dB> <seconds>;..."`);
/// interpreting them is up to the crossfading stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixRampInfo {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl MixRampInfo {
    pub fn new(start: Option<String>, end: Option<String>) -> Self {
        Self { start, end }
    }

    pub fn is_defined(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }
}
