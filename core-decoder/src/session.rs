//! # Decoding Session
//!
//! One plugin invocation on the worker thread, from `Started` to its
//! terminal state.
//!
//! The session owns the input stream. It is dropped exactly once, before
//! the terminal state is published, whichever way the plugin leaves:
//! normal return, stop, error or panic.

use crate::bridge::DecoderBridge;
use crate::config::DecoderConfig;
use crate::control::DecoderControl;
use crate::command::DecoderCommand;
use crate::error::DecoderError;
use crate::input::InputStream;
use crate::plugin::DecoderPlugin;
use core_runtime::events::DecoderEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn};

/// Portion of a song to decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongRange {
    /// Start position; the plugin is asked to seek here right after `ready()`.
    pub start: Option<Duration>,
    /// End position; decoding stops once the timestamp reaches it.
    pub end: Option<Duration>,
}

impl SongRange {
    pub fn new(start: Option<Duration>, end: Option<Duration>) -> Self {
        Self { start, end }
    }

    /// The whole song.
    pub fn full() -> Self {
        Self::default()
    }

    pub fn is_full(&self) -> bool {
        self.start.map_or(true, |start| start.is_zero()) && self.end.is_none()
    }
}

/// Per-session parameters supplied by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Identifies the song in logs and events; defaults to the input's URI.
    pub uri: Option<String>,
    pub range: SongRange,
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_range(mut self, range: SongRange) -> Self {
        self.range = range;
        self
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The plugin returned after the end of the stream.
    Finished,
    /// The plugin unwound after a stop command.
    Stopped,
    /// The plugin failed; carries the error message.
    Failed(String),
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, SessionOutcome::Failed(_))
    }
}

/// Publishes a `Failed` outcome if the plugin unwinds by panicking, so a
/// controller blocked on the session is always released.
struct ExitGuard<'a> {
    control: &'a DecoderControl,
    armed: bool,
}

impl<'a> ExitGuard<'a> {
    fn new(control: &'a DecoderControl) -> Self {
        Self {
            control,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        error!(session_id = %self.control.session_id(), "Decoder plugin panicked");
        let message = "decoder plugin panicked".to_string();
        self.control.emit(DecoderEvent::Failed {
            session_id: self.control.session_id().to_string(),
            message: message.clone(),
            protocol_violation: false,
        });
        self.control.exit_session(&SessionOutcome::Failed(message));
    }
}

/// Run `plugin` over `input` until it returns, then publish the outcome.
///
/// Called on the worker thread.
pub fn run_session(
    plugin: Arc<dyn DecoderPlugin>,
    input: Box<dyn InputStream>,
    control: Arc<DecoderControl>,
    config: &DecoderConfig,
    options: SessionOptions,
) -> SessionOutcome {
    let span = info_span!(
        "decoder_session",
        session_id = %control.session_id(),
        plugin = plugin.name()
    );
    let _enter = span.enter();

    let mut guard = ExitGuard::new(&control);
    // declared after the guard so a panic drops it first
    let mut input = input;
    let uri = options.uri.unwrap_or_else(|| input.uri().to_string());
    info!(%uri, "Decoder session started");
    control.emit(DecoderEvent::Started {
        session_id: control.session_id().to_string(),
        uri: Some(uri),
    });

    input.set_ready_handler(control.input_waker());

    let mut bridge = DecoderBridge::new(Arc::clone(&control), config, options.range);
    let result = plugin.stream_decode(&mut bridge, input.as_mut());
    drop(input);

    let (outcome, protocol_violation) = classify(&control, &bridge, result);
    match &outcome {
        SessionOutcome::Finished => {
            info!("Decoder session finished");
            control.emit(DecoderEvent::Finished {
                session_id: control.session_id().to_string(),
            });
        }
        SessionOutcome::Stopped => {
            info!("Decoder session stopped");
            control.emit(DecoderEvent::Stopped {
                session_id: control.session_id().to_string(),
            });
        }
        SessionOutcome::Failed(message) => {
            warn!(error = %message, protocol_violation, "Decoder session failed");
            control.emit(DecoderEvent::Failed {
                session_id: control.session_id().to_string(),
                message: message.clone(),
                protocol_violation,
            });
        }
    }

    control.exit_session(&outcome);
    guard.disarm();
    outcome
}

/// Map the plugin's result to an outcome. A protocol violation wins over a
/// plugin that swallowed it; a pending stop wins over whatever the
/// interrupted plugin reported. Stopping at the range end is a normal
/// finish.
fn classify(
    control: &DecoderControl,
    bridge: &DecoderBridge,
    result: crate::error::Result<()>,
) -> (SessionOutcome, bool) {
    if let Some(failure) = bridge.failure() {
        return (SessionOutcome::Failed(failure.to_string()), true);
    }

    let stop_pending = control.command() == DecoderCommand::Stop;
    match result {
        _ if stop_pending => (SessionOutcome::Stopped, false),
        Err(DecoderError::Stopped) if bridge.range_end_reached() => (SessionOutcome::Finished, false),
        Err(DecoderError::Stopped) => (SessionOutcome::Stopped, false),
        Ok(()) if !bridge.is_ready() => (
            SessionOutcome::Failed("decoder plugin returned without announcing a format".to_string()),
            false,
        ),
        Ok(()) => (SessionOutcome::Finished, false),
        Err(err) => {
            let violation = err.is_protocol_violation();
            (SessionOutcome::Failed(err.to_string()), violation)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn song_range_defaults_to_full() {
        assert!(SongRange::full().is_full());
        assert!(SongRange::new(Some(Duration::ZERO), None).is_full());
        assert!(!SongRange::new(Some(Duration::from_secs(1)), None).is_full());
        assert!(!SongRange::new(None, Some(Duration::from_secs(1))).is_full());
    }

    #[test]
    fn options_builder() {
        let options = SessionOptions::new()
            .with_uri("file:///music/a.raw")
            .with_range(SongRange::new(None, Some(Duration::from_secs(10))));
        assert_eq!(options.uri.as_deref(), Some("file:///music/a.raw"));
        assert_eq!(options.range.end, Some(Duration::from_secs(10)));
    }

    #[test]
    fn outcome_success() {
        assert!(SessionOutcome::Finished.is_success());
        assert!(SessionOutcome::Stopped.is_success());
        assert!(!SessionOutcome::Failed("x".into()).is_success());
    }
}
