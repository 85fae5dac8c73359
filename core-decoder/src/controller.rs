//! # Decoder Controller
//!
//! Runs decoding sessions on a dedicated worker thread, one at a time, and
//! exposes the controller half of the Command Channel.
//!
//! ## Usage
//!
//! ```no_run
//! use core_decoder::{DecoderConfig, DecoderController, ReaderInputStream, SessionOptions};
//! use core_decoder::plugins::PcmDecoderPlugin;
//! use std::sync::Arc;
//!
//! # fn main() -> core_decoder::Result<()> {
//! let mut controller = DecoderController::new(DecoderConfig::default())?;
//! let input = ReaderInputStream::open("song.raw")?;
//! controller.start(Arc::new(PcmDecoderPlugin::default()), Box::new(input), SessionOptions::new())?;
//!
//! let ready = controller.wait_ready(None)?;
//! println!("decoding {}", ready.format);
//!
//! while let Some(chunk) = controller.wait_chunk(None) {
//!     // hand chunk.data to the output
//! #   let _ = chunk;
//! }
//! controller.join()?;
//! # Ok(())
//! # }
//! ```

use crate::audio::MixRampInfo;
use crate::chunk::MusicChunk;
use crate::command::{CommandAck, DecoderCommand, SeekTarget};
use crate::config::DecoderConfig;
use crate::control::{DecoderControl, DecoderState, ReadyInfo};
use crate::error::{DecoderError, Result};
use crate::input::InputStream;
use crate::plugin::DecoderPlugin;
use crate::session::{run_session, SessionOptions, SessionOutcome};
use core_runtime::events::EventBus;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct ActiveSession {
    id: Uuid,
    control: Arc<DecoderControl>,
    worker: Option<JoinHandle<SessionOutcome>>,
    outcome: Option<SessionOutcome>,
}

/// Owns the decoding worker and the current session's Command Channel.
pub struct DecoderController {
    config: DecoderConfig,
    events: Option<EventBus>,
    session: Option<ActiveSession>,
}

impl DecoderController {
    /// Create a controller. Fails if `config` does not validate.
    pub fn new(config: DecoderConfig) -> Result<Self> {
        config.validate().map_err(DecoderError::InvalidConfig)?;
        Ok(Self {
            config,
            events: None,
            session: None,
        })
    }

    /// Broadcast session lifecycle events on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Start decoding `input` with `plugin` on a new worker thread.
    ///
    /// A previous session that has ended is reaped first; one that is
    /// still running makes this fail with [`DecoderError::SessionActive`].
    pub fn start(
        &mut self,
        plugin: Arc<dyn DecoderPlugin>,
        input: Box<dyn InputStream>,
        options: SessionOptions,
    ) -> Result<Uuid> {
        if let Some(session) = &self.session {
            if session.control.state().is_running() {
                return Err(DecoderError::SessionActive(session.id.to_string()));
            }
        }
        if let Err(e) = self.join() {
            warn!(error = %e, "Previous decoder session ended abnormally");
        }

        let id = Uuid::new_v4();
        let mut control = DecoderControl::new(id.to_string(), self.config.buffer_chunks);
        if let Some(bus) = &self.events {
            control = control.with_event_bus(bus.clone());
        }
        let control = Arc::new(control);

        let worker = {
            let control = Arc::clone(&control);
            let config = self.config.clone();
            thread::Builder::new()
                .name(self.config.thread_name.clone())
                .spawn(move || run_session(plugin, input, control, &config, options))
                .map_err(|e| DecoderError::WorkerSpawn(e.to_string()))?
        };

        info!(session_id = %id, "Decoder session spawned");
        self.session = Some(ActiveSession {
            id,
            control,
            worker: Some(worker),
            outcome: None,
        });
        Ok(id)
    }

    fn active(&self) -> Result<&ActiveSession> {
        self.session.as_ref().ok_or(DecoderError::NoActiveSession)
    }

    /// Id of the current (or most recent) session.
    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|session| session.id)
    }

    /// Command Channel of the current session, for consumers on other
    /// threads.
    pub fn control(&self) -> Option<Arc<DecoderControl>> {
        self.session
            .as_ref()
            .map(|session| Arc::clone(&session.control))
    }

    pub fn state(&self) -> DecoderState {
        self.session
            .as_ref()
            .map_or(DecoderState::Idle, |session| session.control.state())
    }

    /// Error message that ended the current session, if any.
    pub fn error(&self) -> Option<String> {
        self.session
            .as_ref()
            .and_then(|session| session.control.error())
    }

    /// Wait for the plugin to announce its format.
    pub fn wait_ready(&self, timeout: Option<Duration>) -> Result<ReadyInfo> {
        self.active()?.control.wait_ready(timeout)
    }

    pub fn post_command(&self, command: DecoderCommand, target: Option<SeekTarget>) -> Result<()> {
        self.active()?.control.post_command(command, target)
    }

    pub fn wait_for_ack(&self, timeout: Option<Duration>) -> Result<CommandAck> {
        self.active()?.control.wait_for_ack(timeout)
    }

    /// Seek and wait for the outcome.
    ///
    /// Waits at most `config.ack_timeout`. A seek the plugin could not
    /// satisfy returns [`DecoderError::SeekFailed`].
    pub fn seek(&self, target: SeekTarget) -> Result<()> {
        let control = &self.active()?.control;
        control.post_command(DecoderCommand::Seek, Some(target))?;

        match control.wait_for_ack(self.config.ack_timeout)? {
            CommandAck::Completed => {
                debug!(?target, "Seek acknowledged");
                Ok(())
            }
            CommandAck::SeekFailed => Err(DecoderError::SeekFailed),
        }
    }

    /// Stop the current session and join its worker.
    ///
    /// An outstanding command is waited out first. Returns `None` if no
    /// session was ever started.
    pub fn stop(&mut self) -> Result<Option<SessionOutcome>> {
        let Some(session) = &self.session else {
            return Ok(None);
        };
        let control = Arc::clone(&session.control);

        if Self::request_stop(&control, self.config.ack_timeout)? {
            match control.wait_for_ack(self.config.ack_timeout) {
                Ok(_) | Err(DecoderError::NoCommandPending) => {}
                Err(e) => return Err(e),
            }
        }

        self.join()
    }

    /// Wait out any outstanding command, then post Stop.
    ///
    /// Returns `false` if the session was no longer running.
    fn request_stop(control: &DecoderControl, timeout: Option<Duration>) -> Result<bool> {
        if !control.state().is_running() {
            return Ok(false);
        }
        if control.command().is_pending() {
            match control.wait_for_ack(timeout) {
                Ok(_) | Err(DecoderError::NoCommandPending) => {}
                Err(e) => return Err(e),
            }
        }

        match control.post_command(DecoderCommand::Stop, None) {
            Ok(()) => Ok(true),
            // the session ended on its own in between
            Err(DecoderError::NoActiveSession) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Wait for the worker thread to exit and return the outcome.
    ///
    /// Does not stop the session; use [`DecoderController::stop`] for that.
    pub fn join(&mut self) -> Result<Option<SessionOutcome>> {
        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };

        if let Some(worker) = session.worker.take() {
            let outcome = worker.join().map_err(|_| DecoderError::WorkerPanicked)?;
            debug!(session_id = %session.id, ?outcome, "Decoder worker joined");
            session.outcome = Some(outcome);
        }
        Ok(session.outcome.clone())
    }

    // ------------------------------------------------------------------------
    // Intake
    // ------------------------------------------------------------------------

    pub fn shift_chunk(&self) -> Option<MusicChunk> {
        self.session
            .as_ref()
            .and_then(|session| session.control.shift_chunk())
    }

    /// Take the next chunk, waiting for the worker to produce it.
    ///
    /// Returns `None` once the session has ended and the intake is empty.
    pub fn wait_chunk(&self, timeout: Option<Duration>) -> Option<MusicChunk> {
        self.session
            .as_ref()
            .and_then(|session| session.control.wait_chunk(timeout))
    }

    /// Wait until enough audio is buffered to start output
    /// (`config.min_buffer_chunks()`), or the session ends.
    pub fn wait_buffered(&self, timeout: Option<Duration>) -> bool {
        let min_chunks = self.config.min_buffer_chunks();
        self.session.as_ref().map_or(true, |session| {
            session.control.wait_buffered(min_chunks, timeout)
        })
    }

    pub fn buffered_chunks(&self) -> usize {
        self.session
            .as_ref()
            .map_or(0, |session| session.control.buffered_chunks())
    }

    pub fn mix_ramp(&self) -> MixRampInfo {
        self.session
            .as_ref()
            .map(|session| session.control.mix_ramp())
            .unwrap_or_default()
    }
}

impl Drop for DecoderController {
    fn drop(&mut self) {
        if let Some(control) = self.control() {
            // joining blocks until the worker exits, so the pending
            // command may take as long as it needs
            if let Err(e) = Self::request_stop(&control, None) {
                warn!(error = %e, "Failed to stop decoder session on drop");
            }
        }
        if let Err(e) = self.join() {
            warn!(error = %e, "Decoder worker ended abnormally");
        }
    }
}

impl std::fmt::Debug for DecoderController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderController")
            .field("session_id", &self.session_id())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ReaderInputStream;
    use crate::plugins::PcmDecoderPlugin;
    use std::io::Cursor;

    fn pcm_input(bytes: usize) -> Box<dyn InputStream> {
        Box::new(ReaderInputStream::new("mem://song.raw", Cursor::new(vec![0u8; bytes])).unwrap())
    }

    #[test]
    fn rejects_invalid_config() {
        let config = DecoderConfig::default().with_chunk_size(0);
        assert!(matches!(
            DecoderController::new(config),
            Err(DecoderError::InvalidConfig(_))
        ));
    }

    #[test]
    fn idle_controller() {
        let mut controller = DecoderController::new(DecoderConfig::default()).unwrap();
        assert_eq!(controller.state(), DecoderState::Idle);
        assert!(matches!(
            controller.post_command(DecoderCommand::Stop, None),
            Err(DecoderError::NoActiveSession)
        ));
        assert!(controller.stop().unwrap().is_none());
        assert!(controller.wait_chunk(None).is_none());
    }

    #[test]
    fn runs_session_to_completion() {
        let mut controller = DecoderController::new(DecoderConfig::default()).unwrap();
        controller
            .start(
                Arc::new(PcmDecoderPlugin::default()),
                pcm_input(44100 * 4),
                SessionOptions::new(),
            )
            .unwrap();

        let ready = controller.wait_ready(None).unwrap();
        assert_eq!(ready.format.sample_rate, 44100);

        let mut total = 0;
        while let Some(chunk) = controller.wait_chunk(None) {
            total += chunk.data.len();
        }
        assert_eq!(total, 44100 * 4);
        assert_eq!(controller.join().unwrap(), Some(SessionOutcome::Finished));
        assert_eq!(controller.state(), DecoderState::Finished);
    }

    #[test]
    fn restart_after_finish() {
        let mut controller = DecoderController::new(DecoderConfig::default()).unwrap();
        let plugin: Arc<dyn DecoderPlugin> = Arc::new(PcmDecoderPlugin::default());

        let first = controller
            .start(Arc::clone(&plugin), pcm_input(1024), SessionOptions::new())
            .unwrap();
        controller.join().unwrap();

        let second = controller
            .start(plugin, pcm_input(1024), SessionOptions::new())
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(controller.join().unwrap(), Some(SessionOutcome::Finished));
    }
}
