//! # Decoder Bridge
//!
//! The production [`DecoderClient`]: connects a plugin running on the
//! worker thread to the session's [`DecoderControl`].
//!
//! ## Virtual commands
//!
//! The plugin sees a slightly different command than the controller posted:
//!
//! - after a protocol violation it sees `Stop`, so it unwinds
//! - a session started with a range start sees a `Seek` to that position
//!   right after `ready()` (the *initial seek*); the controller never sees
//!   this command and receives no acknowledgment for it
//!
//! ## Read interruption
//!
//! A pending command interrupts reads, except a `Seek` that arrived before
//! `ready()` or while the plugin is already executing a seek (it asked for
//! the target). The plugin needs those reads to initialize or reposition.

use crate::audio::{AudioFormat, MixRampInfo, ReplayGainInfo, ReplayGainMode};
use crate::chunk::MusicChunk;
use crate::client::DecoderClient;
use crate::command::{CommandAck, DecoderCommand};
use crate::config::DecoderConfig;
use crate::control::{ControlState, DecoderControl, ReadyInfo};
use crate::error::{DecoderError, Result};
use crate::input::InputStream;
use crate::session::SongRange;
use crate::tag::Tag;
use bytes::Bytes;
use core_runtime::events::DecoderEvent;
use parking_lot::MutexGuard;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

pub struct DecoderBridge {
    control: Arc<DecoderControl>,
    chunk_size: usize,
    replay_gain_mode: ReplayGainMode,
    poll_interval: Duration,
    range: SongRange,

    format: Option<AudioFormat>,
    seekable: bool,
    /// Song position (seconds) of the next chunk.
    timestamp: f64,

    initial_seek_pending: bool,
    initial_seek_running: bool,
    /// The plugin queried the seek target and is repositioning.
    seeking: bool,

    replay_gain: Option<ReplayGainInfo>,
    replay_gain_serial: u32,
    last_serial: u32,

    failure: Option<String>,
}

impl DecoderBridge {
    pub fn new(control: Arc<DecoderControl>, config: &DecoderConfig, range: SongRange) -> Self {
        let initial_seek_pending = range.start.is_some_and(|start| !start.is_zero());

        Self {
            control,
            chunk_size: config.chunk_size.max(1),
            replay_gain_mode: config.replay_gain_mode,
            poll_interval: config.input_poll_interval,
            range,
            format: None,
            seekable: false,
            timestamp: 0.0,
            initial_seek_pending,
            initial_seek_running: false,
            seeking: false,
            replay_gain: None,
            replay_gain_serial: 0,
            last_serial: 0,
            failure: None,
        }
    }

    /// Message of the protocol violation that ended this session, if any.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn is_ready(&self) -> bool {
        self.format.is_some()
    }

    /// Song position of the next chunk.
    pub fn timestamp(&self) -> Duration {
        seconds_to_duration(self.timestamp)
    }

    fn sample_rate(&self) -> u32 {
        self.format.map_or(0, |format| format.sample_rate)
    }

    fn violation(&mut self, err: DecoderError) -> DecoderError {
        error!(session_id = %self.control.session_id(), error = %err, "Decoder plugin broke the protocol");
        if self.failure.is_none() {
            self.failure = Some(err.to_string());
        }
        err
    }

    fn require_ready(&mut self, operation: &'static str) -> Result<AudioFormat> {
        match self.format {
            Some(format) => Ok(format),
            None => Err(self.violation(DecoderError::NotReady(operation))),
        }
    }

    // ------------------------------------------------------------------------
    // Command evaluation (caller holds the control lock)
    // ------------------------------------------------------------------------

    fn virtual_command(&mut self, inner: &ControlState) -> DecoderCommand {
        if self.failure.is_some() {
            return DecoderCommand::Stop;
        }
        if self.prepare_initial_seek(inner) {
            return DecoderCommand::Seek;
        }
        inner.command
    }

    fn prepare_initial_seek(&mut self, inner: &ControlState) -> bool {
        if self.format.is_none() {
            return false;
        }
        if self.initial_seek_running {
            return true;
        }
        if !self.initial_seek_pending {
            return false;
        }

        self.initial_seek_pending = false;
        if !self.seekable || inner.command.is_pending() {
            // a real command replaces the initial seek
            return false;
        }
        self.initial_seek_running = true;
        true
    }

    fn is_read_cancelled(&self, inner: &ControlState) -> bool {
        if self.failure.is_some() {
            return true;
        }
        match inner.command {
            DecoderCommand::None => false,
            DecoderCommand::Seek
                if self.format.is_none() || self.seeking || self.initial_seek_running =>
            {
                false
            }
            _ => true,
        }
    }

    /// Wait for a free intake slot. Returns `false` if a command became
    /// pending instead.
    fn wait_for_slot(&self, control: &DecoderControl, inner: &mut MutexGuard<'_, ControlState>) -> bool {
        loop {
            if self.failure.is_some() || inner.command.is_pending() {
                return false;
            }
            if !inner.pipe.is_full() {
                return true;
            }
            trace!("Intake full, waiting");
            control.wait_client_notified(inner);
        }
    }

    fn push(&self, control: &DecoderControl, inner: &mut ControlState, chunk: MusicChunk) -> Result<()> {
        inner
            .pipe
            .push(chunk)
            .map_err(|_| DecoderError::Internal("intake full after wait".to_string()))?;
        control.notify_controller();
        Ok(())
    }

    fn chunk_replay_gain(&self) -> (Option<ReplayGainInfo>, u32) {
        match self.replay_gain_mode {
            ReplayGainMode::Off => (None, 0),
            _ => (self.replay_gain, self.replay_gain_serial),
        }
    }

    /// Returns `true` once the timestamp has passed the range end.
    pub fn range_end_reached(&self) -> bool {
        self.range
            .end
            .is_some_and(|end| self.timestamp >= end.as_secs_f64())
    }
}

impl DecoderClient for DecoderBridge {
    fn ready(
        &mut self,
        format: AudioFormat,
        seekable: bool,
        duration: Option<Duration>,
    ) -> Result<()> {
        if self.format.is_some() {
            return Err(self.violation(DecoderError::AlreadyReady));
        }
        if !format.is_valid() {
            return Err(self.violation(DecoderError::InvalidAudioFormat(format.to_string())));
        }

        if self.initial_seek_pending && !seekable {
            warn!(session_id = %self.control.session_id(), "Stream is not seekable, ignoring range start");
        }

        self.format = Some(format);
        self.seekable = seekable;

        info!(
            session_id = %self.control.session_id(),
            %format,
            seekable,
            ?duration,
            "Decoder ready"
        );

        self.control.mark_ready(ReadyInfo {
            format,
            seekable,
            duration,
        });
        self.control.emit(DecoderEvent::Ready {
            session_id: self.control.session_id().to_string(),
            sample_rate: format.sample_rate,
            channels: format.channels,
            seekable,
            duration_ms: duration.map(whole_millis),
        });
        Ok(())
    }

    fn command(&mut self) -> DecoderCommand {
        let control = Arc::clone(&self.control);
        let inner = control.lock();
        self.virtual_command(&inner)
    }

    fn command_finished(&mut self) {
        let control = Arc::clone(&self.control);
        let mut inner = control.lock();

        if self.initial_seek_running {
            self.initial_seek_running = false;
            self.seeking = false;
            self.timestamp = self.range.start.unwrap_or_default().as_secs_f64();
            debug!(position = self.timestamp, "Initial seek completed");
            return;
        }

        let pending = inner.command;
        match pending {
            DecoderCommand::None => {
                debug!("command_finished() without a pending command");
            }
            DecoderCommand::Stop => {
                DecoderControl::finish_command(&mut inner, CommandAck::Completed);
                control.notify_controller();
            }
            DecoderCommand::Seek => {
                let target = inner
                    .seek_target
                    .map(|target| target.to_time(self.sample_rate()))
                    .unwrap_or_default();
                let dropped = inner.pipe.clear();

                self.seeking = false;
                self.timestamp = target.as_secs_f64();
                DecoderControl::finish_command(&mut inner, CommandAck::Completed);
                control.notify_controller();
                drop(inner);

                debug!(?target, dropped, "Seek completed");
                control.emit(DecoderEvent::SeekCompleted {
                    session_id: control.session_id().to_string(),
                    position_ms: whole_millis(target),
                });
            }
        }
    }

    fn seek_time(&mut self) -> Option<Duration> {
        if self.initial_seek_running {
            self.seeking = true;
            return self.range.start;
        }

        let inner = self.control.lock();
        if inner.command != DecoderCommand::Seek {
            return None;
        }
        let target = inner.seek_target?;
        drop(inner);

        self.seeking = true;
        Some(target.to_time(self.sample_rate()))
    }

    fn seek_frame(&mut self) -> Option<u64> {
        let rate = self.sample_rate();
        if self.initial_seek_running {
            self.seeking = true;
            return self.range.start.map(|start| (start.as_secs_f64() * rate as f64) as u64);
        }

        let inner = self.control.lock();
        if inner.command != DecoderCommand::Seek {
            return None;
        }
        let target = inner.seek_target?;
        drop(inner);

        self.seeking = true;
        Some(target.to_frame(rate))
    }

    fn seek_error(&mut self) {
        if self.initial_seek_running {
            self.initial_seek_running = false;
            self.seeking = false;
            warn!(session_id = %self.control.session_id(), "Initial seek failed");
            return;
        }

        let control = Arc::clone(&self.control);
        let mut inner = control.lock();
        if inner.command != DecoderCommand::Seek {
            debug!("seek_error() without a pending seek");
            return;
        }

        self.seeking = false;
        DecoderControl::finish_command(&mut inner, CommandAck::SeekFailed);
        control.notify_controller();
        drop(inner);

        warn!(session_id = %control.session_id(), "Seek failed");
        control.emit(DecoderEvent::SeekFailed {
            session_id: control.session_id().to_string(),
        });
    }

    fn wait_for_input(&mut self, input: &dyn InputStream) -> bool {
        let control = Arc::clone(&self.control);
        let mut inner = control.lock();

        loop {
            if self.is_read_cancelled(&inner) {
                return false;
            }
            if input.is_available() {
                return true;
            }
            control.wait_client(&mut inner, self.poll_interval);
        }
    }

    fn submit_data(&mut self, data: &[u8], kbit_rate: u16) -> Result<DecoderCommand> {
        let format = self.require_ready("submit_data")?;
        let control = Arc::clone(&self.control);
        let mut inner = control.lock();

        let command = self.virtual_command(&inner);
        if command.is_pending() || data.is_empty() {
            return Ok(command);
        }

        let bytes_per_second = format.time_to_size() as f64;
        let (replay_gain, serial) = self.chunk_replay_gain();

        for piece in data.chunks(self.chunk_size) {
            if !self.wait_for_slot(&control, &mut inner) {
                return Ok(self.virtual_command(&inner));
            }

            let chunk = MusicChunk::audio(
                Bytes::copy_from_slice(piece),
                seconds_to_duration(self.timestamp),
                kbit_rate,
            )
            .with_replay_gain(replay_gain, serial);
            self.push(&control, &mut inner, chunk)?;

            self.timestamp += piece.len() as f64 / bytes_per_second;
            if self.range_end_reached() {
                debug!(position = self.timestamp, "End of range reached");
                return Ok(DecoderCommand::Stop);
            }
        }

        Ok(self.virtual_command(&inner))
    }

    fn submit_tag(&mut self, tag: Tag) -> Result<DecoderCommand> {
        self.require_ready("submit_tag")?;
        let control = Arc::clone(&self.control);
        let mut inner = control.lock();

        if !self.wait_for_slot(&control, &mut inner) {
            return Ok(self.virtual_command(&inner));
        }

        trace!(items = tag.items().len(), "Submitting tag");
        let chunk = MusicChunk::tag(tag, seconds_to_duration(self.timestamp));
        self.push(&control, &mut inner, chunk)?;
        Ok(self.virtual_command(&inner))
    }

    fn submit_replay_gain(&mut self, info: Option<&ReplayGainInfo>) -> Result<()> {
        self.require_ready("submit_replay_gain")?;

        match info {
            Some(info) => {
                self.last_serial = self.last_serial.wrapping_add(1).max(1);
                self.replay_gain = Some(*info);
                self.replay_gain_serial = self.last_serial;
                debug!(serial = self.replay_gain_serial, ?info, "Replay gain updated");
            }
            None => {
                self.replay_gain = None;
                self.replay_gain_serial = 0;
            }
        }
        Ok(())
    }

    fn submit_mix_ramp(&mut self, info: Option<MixRampInfo>) -> Result<()> {
        self.require_ready("submit_mix_ramp")?;
        self.control.lock().mix_ramp = info.unwrap_or_default();
        Ok(())
    }

    fn submit_timestamp(&mut self, seconds: f64) -> Result<()> {
        self.require_ready("submit_timestamp")?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(self.violation(DecoderError::InvalidTimestamp(seconds)));
        }
        self.timestamp = seconds;
        Ok(())
    }
}

impl std::fmt::Debug for DecoderBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderBridge")
            .field("session_id", &self.control.session_id())
            .field("format", &self.format)
            .field("timestamp", &self.timestamp)
            .field("failure", &self.failure)
            .finish()
    }
}

fn seconds_to_duration(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds).unwrap_or_default()
}

/// Milliseconds for event payloads, saturating at `u64::MAX`.
fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{ReplayGainTuple, SampleFormat};
    use crate::command::SeekTarget;
    use crate::control::DecoderState;

    fn setup(config: DecoderConfig, range: SongRange) -> (Arc<DecoderControl>, DecoderBridge) {
        let control = Arc::new(DecoderControl::new("bridge-test", config.buffer_chunks));
        let bridge = DecoderBridge::new(Arc::clone(&control), &config, range);
        (control, bridge)
    }

    fn cd() -> AudioFormat {
        AudioFormat::new(44100, 2, SampleFormat::S16)
    }

    #[test]
    fn submissions_before_ready_are_violations() {
        let (control, mut bridge) = setup(DecoderConfig::default(), SongRange::default());

        assert!(matches!(
            bridge.submit_data(&[0; 4], 0),
            Err(DecoderError::NotReady("submit_data"))
        ));
        assert!(bridge.failure().is_some());
        assert_eq!(bridge.command(), DecoderCommand::Stop);
        assert_eq!(control.buffered_chunks(), 0);
    }

    #[test]
    fn ready_twice_is_a_violation() {
        let (control, mut bridge) = setup(DecoderConfig::default(), SongRange::default());
        bridge.ready(cd(), true, None).unwrap();
        assert_eq!(control.state(), DecoderState::Active);

        assert!(matches!(
            bridge.ready(cd(), true, None),
            Err(DecoderError::AlreadyReady)
        ));
    }

    #[test]
    fn invalid_format_is_rejected() {
        let (_control, mut bridge) = setup(DecoderConfig::default(), SongRange::default());
        let err = bridge
            .ready(AudioFormat::new(0, 2, SampleFormat::S16), false, None)
            .unwrap_err();
        assert!(err.is_protocol_violation());
        assert!(!bridge.is_ready());
    }

    #[test]
    fn data_is_split_into_chunks_and_timestamped() {
        let config = DecoderConfig::default().with_chunk_size(4096);
        let (control, mut bridge) = setup(config, SongRange::default());
        bridge.ready(cd(), true, None).unwrap();

        let data = vec![0u8; 10_000];
        assert_eq!(bridge.submit_data(&data, 320).unwrap(), DecoderCommand::None);
        assert_eq!(control.buffered_chunks(), 3);

        let sizes: Vec<usize> = std::iter::from_fn(|| control.shift_chunk())
            .map(|chunk| {
                assert_eq!(chunk.bit_rate, 320);
                chunk.data.len()
            })
            .collect();
        assert_eq!(sizes, vec![4096, 4096, 1808]);
        assert_eq!(bridge.timestamp().as_millis(), 56);
    }

    #[test]
    fn empty_data_returns_command_without_submitting() {
        let (control, mut bridge) = setup(DecoderConfig::default(), SongRange::default());
        bridge.ready(cd(), true, None).unwrap();

        assert_eq!(bridge.submit_data(&[], 0).unwrap(), DecoderCommand::None);
        assert_eq!(control.buffered_chunks(), 0);
    }

    #[test]
    fn pending_stop_short_circuits_submission() {
        let (control, mut bridge) = setup(DecoderConfig::default(), SongRange::default());
        bridge.ready(cd(), true, None).unwrap();
        control.post_command(DecoderCommand::Stop, None).unwrap();

        assert_eq!(bridge.submit_data(&[1; 8], 0).unwrap(), DecoderCommand::Stop);
        assert_eq!(control.buffered_chunks(), 0);
    }

    #[test]
    fn seek_clears_intake_and_resets_timestamp() {
        let (control, mut bridge) = setup(DecoderConfig::default(), SongRange::default());
        bridge.ready(cd(), true, None).unwrap();
        bridge.submit_data(&[0; 4096], 0).unwrap();

        control
            .post_command(DecoderCommand::Seek, Some(SeekTarget::Time(Duration::from_secs(60))))
            .unwrap();
        assert_eq!(bridge.command(), DecoderCommand::Seek);
        assert_eq!(bridge.seek_time(), Some(Duration::from_secs(60)));
        bridge.command_finished();

        assert_eq!(control.try_take_ack(), Some(CommandAck::Completed));
        assert_eq!(control.buffered_chunks(), 0);
        assert_eq!(bridge.command(), DecoderCommand::None);

        bridge.submit_data(&[0; 16], 0).unwrap();
        assert_eq!(control.shift_chunk().unwrap().time, Duration::from_secs(60));
    }

    #[test]
    fn seek_error_acknowledges_failure() {
        let (control, mut bridge) = setup(DecoderConfig::default(), SongRange::default());
        bridge.ready(cd(), true, None).unwrap();
        control
            .post_command(DecoderCommand::Seek, Some(SeekTarget::Frame(44100)))
            .unwrap();

        assert_eq!(bridge.seek_frame(), Some(44100));
        bridge.seek_error();
        assert_eq!(control.try_take_ack(), Some(CommandAck::SeekFailed));
        assert_eq!(bridge.command(), DecoderCommand::None);
    }

    #[test]
    fn initial_seek_is_virtual() {
        let range = SongRange::new(Some(Duration::from_secs(30)), None);
        let (control, mut bridge) = setup(DecoderConfig::default(), range);

        assert_eq!(bridge.command(), DecoderCommand::None);
        bridge.ready(cd(), true, None).unwrap();
        assert_eq!(bridge.command(), DecoderCommand::Seek);
        assert_eq!(control.command(), DecoderCommand::None);

        assert_eq!(bridge.seek_frame(), Some(30 * 44100));
        bridge.command_finished();
        assert_eq!(bridge.command(), DecoderCommand::None);
        assert_eq!(control.try_take_ack(), None);
        assert_eq!(bridge.timestamp(), Duration::from_secs(30));
    }

    #[test]
    fn initial_seek_skipped_when_unseekable() {
        let range = SongRange::new(Some(Duration::from_secs(30)), None);
        let (_control, mut bridge) = setup(DecoderConfig::default(), range);
        bridge.ready(cd(), false, None).unwrap();
        assert_eq!(bridge.command(), DecoderCommand::None);
    }

    #[test]
    fn range_end_stops_decoding() {
        let range = SongRange::new(None, Some(Duration::from_millis(100)));
        let (_control, mut bridge) = setup(DecoderConfig::default(), range);
        bridge.ready(cd(), true, None).unwrap();

        // 50ms of CD audio per call
        assert_eq!(bridge.submit_data(&[0; 8820], 0).unwrap(), DecoderCommand::None);
        assert_eq!(bridge.submit_data(&[0; 8820], 0).unwrap(), DecoderCommand::Stop);
    }

    #[test]
    fn replay_gain_serials() {
        let (control, mut bridge) = setup(DecoderConfig::default(), SongRange::default());
        bridge.ready(cd(), true, None).unwrap();
        let info = ReplayGainInfo {
            track: ReplayGainTuple::new(-3.0, 0.8),
            album: ReplayGainTuple::UNDEFINED,
        };

        bridge.submit_replay_gain(Some(&info)).unwrap();
        bridge.submit_data(&[0; 4], 0).unwrap();
        bridge.submit_replay_gain(Some(&info)).unwrap();
        bridge.submit_data(&[0; 4], 0).unwrap();
        bridge.submit_replay_gain(None).unwrap();
        bridge.submit_replay_gain(None).unwrap();
        bridge.submit_data(&[0; 4], 0).unwrap();

        let first = control.shift_chunk().unwrap();
        let second = control.shift_chunk().unwrap();
        let third = control.shift_chunk().unwrap();
        assert_eq!(first.replay_gain, Some(info));
        assert_ne!(first.replay_gain_serial, 0);
        assert_ne!(second.replay_gain_serial, first.replay_gain_serial);
        assert_eq!(third.replay_gain, None);
        assert_eq!(third.replay_gain_serial, 0);
    }

    #[test]
    fn replay_gain_not_attached_when_off() {
        let config = DecoderConfig::default().with_replay_gain_mode(ReplayGainMode::Off);
        let (control, mut bridge) = setup(config, SongRange::default());
        bridge.ready(cd(), true, None).unwrap();
        bridge
            .submit_replay_gain(Some(&ReplayGainInfo::default()))
            .unwrap();
        bridge.submit_data(&[0; 4], 0).unwrap();

        let chunk = control.shift_chunk().unwrap();
        assert_eq!(chunk.replay_gain, None);
        assert_eq!(chunk.replay_gain_serial, 0);
    }

    #[test]
    fn mix_ramp_and_timestamp() {
        let (control, mut bridge) = setup(DecoderConfig::default(), SongRange::default());
        bridge.ready(cd(), true, None).unwrap();

        let ramp = MixRampInfo::new(Some("0.0 1.0;".into()), None);
        bridge.submit_mix_ramp(Some(ramp.clone())).unwrap();
        assert_eq!(control.mix_ramp(), ramp);
        bridge.submit_mix_ramp(None).unwrap();
        assert!(!control.mix_ramp().is_defined());

        bridge.submit_timestamp(12.5).unwrap();
        bridge.submit_tag(Tag::new()).unwrap();
        assert_eq!(control.shift_chunk().unwrap().time, Duration::from_millis(12_500));

        assert!(matches!(
            bridge.submit_timestamp(f64::NAN),
            Err(DecoderError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn event_millis_saturate() {
        assert_eq!(whole_millis(Duration::from_millis(2500)), 2500);
        assert_eq!(whole_millis(Duration::MAX), u64::MAX);
    }
}
