//! The interface a decoder plugin uses to talk to the controller.

use crate::audio::{AudioFormat, MixRampInfo, ReplayGainInfo};
use crate::command::DecoderCommand;
use crate::error::Result;
use crate::input::InputStream;
use crate::tag::Tag;
use std::time::Duration;

/// Controller-facing capability set handed to a plugin for one session.
///
/// [`crate::bridge::DecoderBridge`] is the production implementation;
/// [`crate::mock::MockDecoderClient`] drives plugins in tests without a
/// controller thread.
///
/// # Protocol
///
/// 1. `ready()` exactly once, announcing the PCM format.
/// 2. A read/decode/submit loop. Submissions before `ready()` fail with
///    [`crate::DecoderError::NotReady`] and end the session.
/// 3. On [`DecoderCommand::Seek`]: query [`DecoderClient::seek_time`] or
///    [`DecoderClient::seek_frame`], reposition, then call
///    [`DecoderClient::command_finished`] or [`DecoderClient::seek_error`].
/// 4. On [`DecoderCommand::Stop`]: return [`crate::DecoderError::Stopped`]
///    (see [`DecoderCommand::check_stop`]) so every frame unwinds.
pub trait DecoderClient: Send {
    /// Announce the decoded format, seekability and total duration.
    fn ready(
        &mut self,
        format: AudioFormat,
        seekable: bool,
        duration: Option<Duration>,
    ) -> Result<()>;

    /// The pending command, [`DecoderCommand::None`] if there is none.
    /// Never blocks.
    fn command(&mut self) -> DecoderCommand;

    /// Acknowledge the pending command after carrying it out.
    fn command_finished(&mut self);

    /// Seek destination as a time offset. `None` if no seek is pending.
    fn seek_time(&mut self) -> Option<Duration>;

    /// Seek destination in frames. `None` if no seek is pending.
    fn seek_frame(&mut self) -> Option<u64>;

    /// Acknowledge a pending seek that could not be carried out.
    fn seek_error(&mut self);

    /// Block until `input` is available or a command that interrupts
    /// reads becomes pending.
    ///
    /// Returns `false` when interrupted.
    fn wait_for_input(&mut self, input: &dyn InputStream) -> bool;

    /// Hand decoded PCM to the controller.
    ///
    /// `kbit_rate` is a hint for display; 0 when unknown. Returns the
    /// pending command so the caller can react without polling.
    fn submit_data(&mut self, data: &[u8], kbit_rate: u16) -> Result<DecoderCommand>;

    /// Hand a metadata snapshot to the controller, in order with the data.
    fn submit_tag(&mut self, tag: Tag) -> Result<DecoderCommand>;

    /// Replace (`Some`) or clear (`None`) the replay-gain values for the
    /// chunks submitted after this call.
    fn submit_replay_gain(&mut self, info: Option<&ReplayGainInfo>) -> Result<()>;

    /// Replace (`Some`) or clear (`None`) the song's mix-ramp values.
    fn submit_mix_ramp(&mut self, info: Option<MixRampInfo>) -> Result<()>;

    /// Override the running timestamp (seconds) used for the next chunk.
    fn submit_timestamp(&mut self, seconds: f64) -> Result<()>;
}
