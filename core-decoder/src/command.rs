//! Transport commands carried from the controller to the decoding worker.

use crate::error::{DecoderError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The command currently pending for the decoding worker.
///
/// At most one command is outstanding per session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecoderCommand {
    /// Nothing pending; keep decoding.
    #[default]
    None,
    /// Stop decoding and unwind.
    Stop,
    /// Reposition the stream to the pending [`SeekTarget`].
    Seek,
}

impl DecoderCommand {
    /// Returns `true` unless this is [`DecoderCommand::None`].
    pub fn is_pending(self) -> bool {
        self != DecoderCommand::None
    }

    /// Turns a `Stop` into [`DecoderError::Stopped`] so plugins can unwind
    /// with `?`; every other command is passed through.
    ///
    /// ```
    /// use core_decoder::DecoderCommand;
    ///
    /// assert_eq!(DecoderCommand::Seek.check_stop().unwrap(), DecoderCommand::Seek);
    /// assert!(DecoderCommand::Stop.check_stop().is_err());
    /// ```
    pub fn check_stop(self) -> Result<Self> {
        match self {
            DecoderCommand::Stop => Err(DecoderError::Stopped),
            other => Ok(other),
        }
    }
}

/// Destination of a pending seek.
///
/// The controller picks one framing; the worker may read it in either unit
/// once the audio format is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeekTarget {
    /// Offset from the start of the song.
    Time(Duration),
    /// Offset in frames at the announced sample rate.
    Frame(u64),
}

impl SeekTarget {
    /// The target as a time offset, converting frames at `sample_rate`.
    pub fn to_time(self, sample_rate: u32) -> Duration {
        match self {
            SeekTarget::Time(time) => time,
            SeekTarget::Frame(_) if sample_rate == 0 => Duration::ZERO,
            SeekTarget::Frame(frame) => {
                Duration::try_from_secs_f64(frame as f64 / sample_rate as f64)
                    .unwrap_or(Duration::MAX)
            }
        }
    }

    /// The target as a frame offset at `sample_rate`.
    pub fn to_frame(self, sample_rate: u32) -> u64 {
        match self {
            SeekTarget::Time(time) => (time.as_secs_f64() * sample_rate as f64) as u64,
            SeekTarget::Frame(frame) => frame,
        }
    }
}

/// Controller-visible outcome of one acknowledged command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandAck {
    /// The worker carried the command out.
    Completed,
    /// The worker could not reposition the stream.
    SeekFailed,
}
