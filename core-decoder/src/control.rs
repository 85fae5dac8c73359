//! # Command Channel
//!
//! Synchronized state shared by the controller and the one decoding worker
//! of a session.
//!
//! ## Design
//!
//! One `parking_lot::Mutex` guards everything: the pending command and its
//! acknowledgment, the lifecycle state, the announced format and the
//! intake pipe. Two condition variables sit next to it:
//!
//! - `client_cond` wakes the worker (command posted, intake slot freed,
//!   input became available)
//! - `controller_cond` wakes the controller (acknowledgment, chunk pushed,
//!   format announced, session ended)
//!
//! Keeping the intake inside the same lock means a worker waiting for a
//! free slot also sees a posted command without a second wake-up path.
//!
//! Lock order: this mutex first, then any input stream lock.
//!
//! ## Command policy
//!
//! At most one command is outstanding. Posting while another command is
//! still unacknowledged is rejected with [`DecoderError::CommandPending`];
//! the first command stays in place.

use crate::audio::{AudioFormat, MixRampInfo};
use crate::chunk::MusicChunk;
use crate::command::{CommandAck, DecoderCommand, SeekTarget};
use crate::error::{DecoderError, Result};
use crate::input::ReadyHandler;
use crate::pipe::MusicPipe;
use crate::session::SessionOutcome;
use core_runtime::events::{DecoderEvent, EventBus};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// ============================================================================
// Session State
// ============================================================================

/// Lifecycle state of a decoding session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// No session has been started.
    Idle,
    /// Worker running, format not announced yet.
    Starting,
    /// `ready()` was called; the plugin is decoding.
    Active,
    /// The plugin returned normally.
    Finished,
    /// The plugin unwound after a stop command.
    Stopped,
    /// The plugin failed, broke the protocol or panicked.
    Failed,
}

impl DecoderState {
    /// Returns `true` while a worker is running.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Starting | Self::Active)
    }

    /// Returns `true` once the session has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Stopped | Self::Failed)
    }
}

/// What the plugin announced through `ready()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadyInfo {
    pub format: AudioFormat,
    pub seekable: bool,
    pub duration: Option<Duration>,
}

pub(crate) struct ControlState {
    pub(crate) state: DecoderState,
    pub(crate) command: DecoderCommand,
    pub(crate) seek_target: Option<SeekTarget>,
    pub(crate) ack: Option<CommandAck>,
    pub(crate) ready: Option<ReadyInfo>,
    pub(crate) error: Option<String>,
    pub(crate) mix_ramp: MixRampInfo,
    pub(crate) pipe: MusicPipe,
}

// ============================================================================
// Decoder Control
// ============================================================================

/// The Command Channel of one decoding session.
pub struct DecoderControl {
    session_id: String,
    inner: Mutex<ControlState>,
    client_cond: Condvar,
    controller_cond: Condvar,
    events: Option<EventBus>,
}

impl DecoderControl {
    /// Create the channel for a new session with an intake of
    /// `pipe_capacity` chunks.
    pub fn new(session_id: impl Into<String>, pipe_capacity: usize) -> Self {
        Self {
            session_id: session_id.into(),
            inner: Mutex::new(ControlState {
                state: DecoderState::Starting,
                command: DecoderCommand::None,
                seek_target: None,
                ack: None,
                ready: None,
                error: None,
                mix_ramp: MixRampInfo::default(),
                pipe: MusicPipe::new(pipe_capacity),
            }),
            client_cond: Condvar::new(),
            controller_cond: Condvar::new(),
            events: None,
        }
    }

    /// Broadcast lifecycle events for this session on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    // ------------------------------------------------------------------------
    // Controller side
    // ------------------------------------------------------------------------

    /// Post a command for the worker.
    ///
    /// `target` is required for [`DecoderCommand::Seek`] and ignored
    /// otherwise.
    pub fn post_command(&self, command: DecoderCommand, target: Option<SeekTarget>) -> Result<()> {
        let mut inner = self.inner.lock();

        let target = match command {
            DecoderCommand::None => {
                return Err(DecoderError::InvalidCommand(
                    "cannot post DecoderCommand::None".to_string(),
                ))
            }
            DecoderCommand::Seek => Some(target.ok_or_else(|| {
                DecoderError::InvalidCommand("seek requires a target".to_string())
            })?),
            DecoderCommand::Stop => None,
        };

        if !inner.state.is_running() {
            return Err(DecoderError::NoActiveSession);
        }
        if inner.command.is_pending() {
            return Err(DecoderError::CommandPending {
                pending: inner.command,
            });
        }
        if command == DecoderCommand::Seek
            && inner.ready.is_some_and(|ready| !ready.seekable)
        {
            return Err(DecoderError::SeekNotSupported);
        }

        debug!(session_id = %self.session_id, ?command, ?target, "Posting decoder command");
        inner.command = command;
        inner.seek_target = target;
        inner.ack = None;
        self.client_cond.notify_all();
        Ok(())
    }

    /// Wait for the worker to acknowledge the posted command.
    ///
    /// `None` waits without bound. The acknowledgment is consumed.
    pub fn wait_for_ack(&self, timeout: Option<Duration>) -> Result<CommandAck> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = self.inner.lock();

        loop {
            if let Some(ack) = inner.ack.take() {
                return Ok(ack);
            }
            if !inner.command.is_pending() {
                return Err(DecoderError::NoCommandPending);
            }
            if self.wait_controller(&mut inner, deadline) {
                return match inner.ack.take() {
                    Some(ack) => Ok(ack),
                    None => Err(DecoderError::AckTimeout),
                };
            }
        }
    }

    /// Take the acknowledgment if one has arrived, without blocking.
    pub fn try_take_ack(&self) -> Option<CommandAck> {
        self.inner.lock().ack.take()
    }

    /// The command the worker has not acknowledged yet.
    pub fn command(&self) -> DecoderCommand {
        self.inner.lock().command
    }

    pub fn state(&self) -> DecoderState {
        self.inner.lock().state
    }

    /// Message of the error that ended the session, if any.
    pub fn error(&self) -> Option<String> {
        self.inner.lock().error.clone()
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.inner.lock().ready.map(|ready| ready.format)
    }

    pub fn ready_info(&self) -> Option<ReadyInfo> {
        self.inner.lock().ready
    }

    /// Mix-ramp values most recently submitted by the plugin.
    pub fn mix_ramp(&self) -> MixRampInfo {
        self.inner.lock().mix_ramp.clone()
    }

    /// Wait until the plugin has announced its format.
    ///
    /// Fails if the session ends first or `timeout` elapses.
    pub fn wait_ready(&self, timeout: Option<Duration>) -> Result<ReadyInfo> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = self.inner.lock();

        loop {
            if let Some(ready) = inner.ready {
                return Ok(ready);
            }
            match inner.state {
                DecoderState::Stopped => return Err(DecoderError::Stopped),
                DecoderState::Finished | DecoderState::Failed | DecoderState::Idle => {
                    let message = inner
                        .error
                        .clone()
                        .unwrap_or_else(|| "session ended before ready".to_string());
                    return Err(DecoderError::Decoding(message));
                }
                DecoderState::Starting | DecoderState::Active => {}
            }
            if self.wait_controller(&mut inner, deadline) && inner.ready.is_none() {
                return Err(DecoderError::ReadyTimeout);
            }
        }
    }

    /// Take the oldest chunk from the intake.
    pub fn shift_chunk(&self) -> Option<MusicChunk> {
        let chunk = self.inner.lock().pipe.shift();
        if chunk.is_some() {
            self.client_cond.notify_all();
        }
        chunk
    }

    /// Take the oldest chunk, waiting for one to arrive.
    ///
    /// Returns `None` once the session has ended and the intake is drained,
    /// or when `timeout` elapses.
    pub fn wait_chunk(&self, timeout: Option<Duration>) -> Option<MusicChunk> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = self.inner.lock();

        loop {
            if let Some(chunk) = inner.pipe.shift() {
                self.client_cond.notify_all();
                return Some(chunk);
            }
            if !inner.state.is_running() {
                return None;
            }
            if self.wait_controller(&mut inner, deadline) && inner.pipe.is_empty() {
                return None;
            }
        }
    }

    /// Wait until at least `min_chunks` are buffered or the session ends.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub fn wait_buffered(&self, min_chunks: usize, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = self.inner.lock();
        let wanted = min_chunks.min(inner.pipe.capacity());

        loop {
            if inner.pipe.len() >= wanted || !inner.state.is_running() {
                return true;
            }
            if self.wait_controller(&mut inner, deadline) {
                return inner.pipe.len() >= wanted || !inner.state.is_running();
            }
        }
    }

    pub fn buffered_chunks(&self) -> usize {
        self.inner.lock().pipe.len()
    }

    /// Handler that wakes a worker blocked waiting for input.
    ///
    /// Holds only a weak reference, so a stream outliving its session does
    /// not keep the channel alive.
    pub fn input_waker(self: &Arc<Self>) -> ReadyHandler {
        let control = Arc::downgrade(self);
        Arc::new(move || {
            if let Some(control) = control.upgrade() {
                let _inner = control.inner.lock();
                control.client_cond.notify_all();
            }
        })
    }

    // ------------------------------------------------------------------------
    // Worker side
    // ------------------------------------------------------------------------

    pub(crate) fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.inner.lock()
    }

    /// Block the worker until notified or `timeout` elapses.
    pub(crate) fn wait_client(&self, inner: &mut MutexGuard<'_, ControlState>, timeout: Duration) {
        self.client_cond.wait_for(inner, timeout);
    }

    /// Block the worker until notified.
    pub(crate) fn wait_client_notified(&self, inner: &mut MutexGuard<'_, ControlState>) {
        self.client_cond.wait(inner);
    }

    pub(crate) fn notify_controller(&self) {
        self.controller_cond.notify_all();
    }

    /// Record the announced format and enter [`DecoderState::Active`].
    pub(crate) fn mark_ready(&self, ready: ReadyInfo) {
        let mut inner = self.inner.lock();
        inner.ready = Some(ready);
        inner.state = DecoderState::Active;
        self.controller_cond.notify_all();
    }

    /// Clear the pending command and publish `ack`.
    pub(crate) fn finish_command(inner: &mut ControlState, ack: CommandAck) {
        inner.command = DecoderCommand::None;
        inner.seek_target = None;
        inner.ack = Some(ack);
    }

    /// Enter the terminal state matching `outcome` and release anyone
    /// waiting on this session.
    pub(crate) fn exit_session(&self, outcome: &SessionOutcome) {
        let mut inner = self.inner.lock();

        let state = match outcome {
            SessionOutcome::Finished => DecoderState::Finished,
            SessionOutcome::Stopped => DecoderState::Stopped,
            SessionOutcome::Failed(message) => {
                inner.error = Some(message.clone());
                DecoderState::Failed
            }
        };
        inner.state = state;

        let pending = inner.command;
        match pending {
            DecoderCommand::None => {}
            DecoderCommand::Stop => Self::finish_command(&mut inner, CommandAck::Completed),
            DecoderCommand::Seek => Self::finish_command(&mut inner, CommandAck::SeekFailed),
        }

        trace!(session_id = %self.session_id, state = ?inner.state, "Session exited");
        self.controller_cond.notify_all();
        self.client_cond.notify_all();
    }

    pub(crate) fn emit(&self, event: DecoderEvent) {
        if let Some(bus) = &self.events {
            if bus.emit_decoder(event) == 0 {
                trace!("No event subscribers");
            }
        }
    }

    /// Returns `true` if `deadline` passed.
    fn wait_controller(
        &self,
        inner: &mut MutexGuard<'_, ControlState>,
        deadline: Option<Instant>,
    ) -> bool {
        match deadline {
            Some(deadline) => self.controller_cond.wait_until(inner, deadline).timed_out(),
            None => {
                self.controller_cond.wait(inner);
                false
            }
        }
    }
}

impl std::fmt::Debug for DecoderControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("DecoderControl")
            .field("session_id", &self.session_id)
            .field("state", &inner.state)
            .field("command", &inner.command)
            .field("buffered_chunks", &inner.pipe.len())
            .finish()
    }
}
