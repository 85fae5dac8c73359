//! # Decoder Error Types
//!
//! Error types for the decoder control core. Cancellation (`Stopped`) is
//! modelled as an error variant so a plugin can unwind any number of nested
//! calls with `?`; it is classified separately from real failures.

use crate::command::DecoderCommand;
use thiserror::Error;

/// Errors that can occur while driving a decoding session.
#[derive(Error, Debug)]
pub enum DecoderError {
    // ========================================================================
    // Protocol Violations
    // ========================================================================
    /// A submission was made before `ready()` announced the audio format.
    #[error("Protocol violation: {0} called before ready()")]
    NotReady(&'static str),

    /// `ready()` was called a second time in one session.
    #[error("Protocol violation: ready() called twice")]
    AlreadyReady,

    /// The announced audio format cannot be played.
    #[error("Invalid audio format: {0}")]
    InvalidAudioFormat(String),

    /// A timestamp override was negative or not finite.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(f64),

    // ========================================================================
    // Command Channel Errors
    // ========================================================================
    /// A command was posted while another one is still unacknowledged.
    #[error("Command {pending:?} is still pending")]
    CommandPending { pending: DecoderCommand },

    /// The command cannot be posted (e.g. `None`, or `Seek` without target).
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Waited for an acknowledgment but nothing was posted.
    #[error("No command pending")]
    NoCommandPending,

    /// No decoding session is running.
    #[error("No active decoder session")]
    NoActiveSession,

    /// A new session was requested while the previous one is still running.
    #[error("Decoder session {0} is still running")]
    SessionActive(String),

    /// The current stream announced itself as not seekable.
    #[error("Seeking not supported")]
    SeekNotSupported,

    /// The controller gave up waiting for an acknowledgment.
    #[error("Timed out waiting for command acknowledgment")]
    AckTimeout,

    /// The controller gave up waiting for the plugin to announce its format.
    #[error("Timed out waiting for the decoder to become ready")]
    ReadyTimeout,

    // ========================================================================
    // Outcomes
    // ========================================================================
    /// A stop command was received; unwinds the plugin.
    #[error("Decoder stopped")]
    Stopped,

    /// A seek command was acknowledged but could not be satisfied.
    #[error("Seek failed")]
    SeekFailed,

    // ========================================================================
    // Input & Decoding Errors
    // ========================================================================
    /// I/O error on the input stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended in the middle of a structure the plugin needed.
    #[error("Unexpected end of stream")]
    UnexpectedEndOfStream,

    /// The plugin failed to decode the stream.
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// No plugin can handle the stream.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    // ========================================================================
    // Infrastructure Errors
    // ========================================================================
    /// Decoder configuration failed validation.
    #[error("Invalid decoder config: {0}")]
    InvalidConfig(String),

    /// The worker thread could not be spawned.
    #[error("Failed to spawn decoder worker: {0}")]
    WorkerSpawn(String),

    /// The worker thread panicked.
    #[error("Decoder worker panicked")]
    WorkerPanicked,

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DecoderError {
    /// Returns `true` if the plugin broke the submission protocol.
    ///
    /// These are programming errors in the plugin and end the session.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            DecoderError::NotReady(_)
                | DecoderError::AlreadyReady
                | DecoderError::InvalidAudioFormat(_)
                | DecoderError::InvalidTimestamp(_)
        )
    }

    /// Returns `true` if this is the stop signal rather than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, DecoderError::Stopped)
    }

    /// Returns `true` if the caller may continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DecoderError::Io(_)
                | DecoderError::SeekFailed
                | DecoderError::SeekNotSupported
                | DecoderError::CommandPending { .. }
                | DecoderError::AckTimeout
                | DecoderError::ReadyTimeout
        )
    }
}

/// Result type for decoder operations.
pub type Result<T> = std::result::Result<T, DecoderError>;
