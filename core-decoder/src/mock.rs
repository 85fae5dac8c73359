//! # Mock Decoder Client
//!
//! A [`DecoderClient`] that records every call and serves scripted
//! commands, for testing plugin logic on a single thread.
//!
//! It enforces the same `ready()` protocol as the production bridge, and
//! the same read interruption rules, but has no intake limit and never
//! blocks on backpressure.
//!
//! ```
//! use core_decoder::mock::MockDecoderClient;
//! use core_decoder::{AudioFormat, DecoderClient, DecoderCommand};
//!
//! let mut client = MockDecoderClient::new();
//! client.ready(AudioFormat::cd_quality(), true, None).unwrap();
//! client.post_after_submissions(1, DecoderCommand::Stop, None);
//!
//! assert_eq!(client.submit_data(&[0; 4], 0).unwrap(), DecoderCommand::Stop);
//! assert_eq!(client.submitted_bytes(), 4);
//! ```

use crate::audio::{AudioFormat, MixRampInfo, ReplayGainInfo};
use crate::client::DecoderClient;
use crate::command::{CommandAck, DecoderCommand, SeekTarget};
use crate::control::ReadyInfo;
use crate::error::{DecoderError, Result};
use crate::input::InputStream;
use crate::tag::Tag;
use std::collections::VecDeque;
use std::time::Duration;

/// Interval between availability checks while waiting for input.
const INPUT_POLL: Duration = Duration::from_millis(1);

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCall {
    Ready {
        format: AudioFormat,
        seekable: bool,
        duration: Option<Duration>,
    },
    CommandFinished,
    SeekError,
    Data {
        data: Vec<u8>,
        kbit_rate: u16,
    },
    Tag(Tag),
    ReplayGain(Option<ReplayGainInfo>),
    MixRamp(Option<MixRampInfo>),
    Timestamp(f64),
}

#[derive(Debug)]
struct ScriptedCommand {
    after_submissions: usize,
    command: DecoderCommand,
    target: Option<SeekTarget>,
}

#[derive(Debug, Default)]
pub struct MockDecoderClient {
    calls: Vec<ClientCall>,
    ready: Option<ReadyInfo>,
    command: DecoderCommand,
    seek_target: Option<SeekTarget>,
    seeking: bool,
    script: VecDeque<ScriptedCommand>,
    data_submissions: usize,
    acks: Vec<CommandAck>,
}

impl MockDecoderClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `command` pending right away.
    pub fn set_command(&mut self, command: DecoderCommand) {
        self.command = command;
        if command != DecoderCommand::Seek {
            self.seek_target = None;
        }
    }

    /// Make a seek to `target` pending right away.
    pub fn set_seek(&mut self, target: SeekTarget) {
        self.command = DecoderCommand::Seek;
        self.seek_target = Some(target);
    }

    /// Make `command` pending once `count` data submissions were recorded.
    ///
    /// Scripted commands fire in the order they were added.
    pub fn post_after_submissions(
        &mut self,
        count: usize,
        command: DecoderCommand,
        target: Option<SeekTarget>,
    ) {
        self.script.push_back(ScriptedCommand {
            after_submissions: count,
            command,
            target,
        });
        self.fire_script();
    }

    pub fn calls(&self) -> &[ClientCall] {
        &self.calls
    }

    pub fn ready_info(&self) -> Option<ReadyInfo> {
        self.ready
    }

    /// Acknowledgments the plugin gave, in order.
    pub fn acks(&self) -> &[CommandAck] {
        &self.acks
    }

    pub fn data_submissions(&self) -> usize {
        self.data_submissions
    }

    /// Data submissions with their bit-rate hints.
    pub fn data_calls(&self) -> Vec<(&[u8], u16)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                ClientCall::Data { data, kbit_rate } => Some((data.as_slice(), *kbit_rate)),
                _ => None,
            })
            .collect()
    }

    /// All submitted PCM, concatenated.
    pub fn submitted_data(&self) -> Vec<u8> {
        self.data_calls()
            .into_iter()
            .flat_map(|(data, _)| data.iter().copied())
            .collect()
    }

    pub fn submitted_bytes(&self) -> usize {
        self.data_calls().iter().map(|(data, _)| data.len()).sum()
    }

    pub fn tags(&self) -> Vec<&Tag> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                ClientCall::Tag(tag) => Some(tag),
                _ => None,
            })
            .collect()
    }

    fn fire_script(&mut self) {
        if self.command.is_pending() {
            return;
        }
        let due = self
            .script
            .front()
            .is_some_and(|next| next.after_submissions <= self.data_submissions);
        if !due {
            return;
        }
        if let Some(next) = self.script.pop_front() {
            self.command = next.command;
            self.seek_target = next.target;
        }
    }

    fn require_ready(&self, operation: &'static str) -> Result<AudioFormat> {
        self.ready
            .map(|ready| ready.format)
            .ok_or(DecoderError::NotReady(operation))
    }

    fn acknowledge(&mut self, ack: CommandAck) {
        self.command = DecoderCommand::None;
        self.seek_target = None;
        self.seeking = false;
        self.acks.push(ack);
        self.fire_script();
    }

    fn is_read_cancelled(&self) -> bool {
        match self.command {
            DecoderCommand::None => false,
            DecoderCommand::Seek if self.ready.is_none() || self.seeking => false,
            _ => true,
        }
    }
}

impl DecoderClient for MockDecoderClient {
    fn ready(
        &mut self,
        format: AudioFormat,
        seekable: bool,
        duration: Option<Duration>,
    ) -> Result<()> {
        if self.ready.is_some() {
            return Err(DecoderError::AlreadyReady);
        }
        if !format.is_valid() {
            return Err(DecoderError::InvalidAudioFormat(format.to_string()));
        }

        self.ready = Some(ReadyInfo {
            format,
            seekable,
            duration,
        });
        self.calls.push(ClientCall::Ready {
            format,
            seekable,
            duration,
        });
        Ok(())
    }

    fn command(&mut self) -> DecoderCommand {
        self.command
    }

    fn command_finished(&mut self) {
        self.calls.push(ClientCall::CommandFinished);
        if self.command.is_pending() {
            self.acknowledge(CommandAck::Completed);
        }
    }

    fn seek_time(&mut self) -> Option<Duration> {
        if self.command != DecoderCommand::Seek {
            return None;
        }
        let rate = self.ready.map_or(0, |ready| ready.format.sample_rate);
        self.seeking = true;
        self.seek_target.map(|target| target.to_time(rate))
    }

    fn seek_frame(&mut self) -> Option<u64> {
        if self.command != DecoderCommand::Seek {
            return None;
        }
        let rate = self.ready.map_or(0, |ready| ready.format.sample_rate);
        self.seeking = true;
        self.seek_target.map(|target| target.to_frame(rate))
    }

    fn seek_error(&mut self) {
        self.calls.push(ClientCall::SeekError);
        if self.command == DecoderCommand::Seek {
            self.acknowledge(CommandAck::SeekFailed);
        }
    }

    fn wait_for_input(&mut self, input: &dyn InputStream) -> bool {
        loop {
            if self.is_read_cancelled() {
                return false;
            }
            if input.is_available() {
                return true;
            }
            std::thread::sleep(INPUT_POLL);
        }
    }

    fn submit_data(&mut self, data: &[u8], kbit_rate: u16) -> Result<DecoderCommand> {
        self.require_ready("submit_data")?;
        if self.command.is_pending() || data.is_empty() {
            return Ok(self.command);
        }

        self.calls.push(ClientCall::Data {
            data: data.to_vec(),
            kbit_rate,
        });
        self.data_submissions += 1;
        self.fire_script();
        Ok(self.command)
    }

    fn submit_tag(&mut self, tag: Tag) -> Result<DecoderCommand> {
        self.require_ready("submit_tag")?;
        if self.command.is_pending() {
            return Ok(self.command);
        }
        self.calls.push(ClientCall::Tag(tag));
        Ok(self.command)
    }

    fn submit_replay_gain(&mut self, info: Option<&ReplayGainInfo>) -> Result<()> {
        self.require_ready("submit_replay_gain")?;
        self.calls.push(ClientCall::ReplayGain(info.copied()));
        Ok(())
    }

    fn submit_mix_ramp(&mut self, info: Option<MixRampInfo>) -> Result<()> {
        self.require_ready("submit_mix_ramp")?;
        self.calls.push(ClientCall::MixRamp(info));
        Ok(())
    }

    fn submit_timestamp(&mut self, seconds: f64) -> Result<()> {
        self.require_ready("submit_timestamp")?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(DecoderError::InvalidTimestamp(seconds));
        }
        self.calls.push(ClientCall::Timestamp(seconds));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_submissions_before_ready() {
        let mut client = MockDecoderClient::new();
        assert!(matches!(
            client.submit_tag(Tag::new()),
            Err(DecoderError::NotReady("submit_tag"))
        ));
        assert!(client.calls().is_empty());

        client.ready(AudioFormat::cd_quality(), false, None).unwrap();
        assert!(matches!(
            client.ready(AudioFormat::cd_quality(), false, None),
            Err(DecoderError::AlreadyReady)
        ));
    }

    #[test]
    fn scripted_seek_round_trip() {
        let mut client = MockDecoderClient::new();
        client.ready(AudioFormat::cd_quality(), true, None).unwrap();
        client.post_after_submissions(
            2,
            DecoderCommand::Seek,
            Some(SeekTarget::Time(Duration::from_secs(1))),
        );

        assert_eq!(client.submit_data(&[0; 4], 0).unwrap(), DecoderCommand::None);
        assert_eq!(client.submit_data(&[0; 4], 0).unwrap(), DecoderCommand::Seek);
        assert_eq!(client.seek_frame(), Some(44100));

        client.command_finished();
        assert_eq!(client.command(), DecoderCommand::None);
        assert_eq!(client.acks(), &[CommandAck::Completed]);
    }

    #[test]
    fn seek_error_records_failure() {
        let mut client = MockDecoderClient::new();
        client.ready(AudioFormat::cd_quality(), true, None).unwrap();
        client.set_seek(SeekTarget::Frame(5));
        client.seek_error();

        assert_eq!(client.command(), DecoderCommand::None);
        assert_eq!(client.acks(), &[CommandAck::SeekFailed]);
    }

    #[test]
    fn records_side_channel_calls() {
        let mut client = MockDecoderClient::new();
        client.ready(AudioFormat::cd_quality(), true, None).unwrap();
        client.submit_replay_gain(None).unwrap();
        client.submit_mix_ramp(None).unwrap();
        client.submit_timestamp(1.5).unwrap();

        assert_eq!(
            &client.calls()[1..],
            &[
                ClientCall::ReplayGain(None),
                ClientCall::MixRamp(None),
                ClientCall::Timestamp(1.5)
            ]
        );
    }
}
