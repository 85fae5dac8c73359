//! Headerless PCM plugin.
//!
//! The input carries interleaved samples in a format fixed at construction
//! (CD quality by default). Useful as a reference for the plugin protocol
//! and for exercising the decoder core without a codec.

use crate::audio::AudioFormat;
use crate::client::DecoderClient;
use crate::command::DecoderCommand;
use crate::error::{DecoderError, Result};
use crate::input::InputStream;
use crate::plugin::DecoderPlugin;
use crate::stream_access;
use tracing::{debug, warn};

/// Frames read per iteration.
const READ_FRAMES: usize = 1024;

#[derive(Debug, Clone)]
pub struct PcmDecoderPlugin {
    format: AudioFormat,
}

impl PcmDecoderPlugin {
    pub fn new(format: AudioFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    fn kbit_rate(&self) -> u16 {
        let bits = self.format.sample_rate as u64
            * self.format.channels as u64
            * self.format.format.bits() as u64;
        (bits / 1000).min(u16::MAX as u64) as u16
    }

    /// Reposition to the pending seek target, rounded down to a frame.
    fn seek(&self, client: &mut dyn DecoderClient, input: &mut dyn InputStream) {
        let Some(frame) = client.seek_frame() else {
            return;
        };

        if !input.is_seekable() {
            client.seek_error();
            return;
        }

        let Some(offset) = frame.checked_mul(self.format.frame_size() as u64) else {
            warn!(frame, "PCM seek target out of range");
            client.seek_error();
            return;
        };
        match input.seek(offset) {
            Ok(()) => {
                debug!(frame, offset, "PCM seek");
                client.command_finished();
            }
            Err(e) => {
                warn!(frame, error = %e, "PCM seek failed");
                client.seek_error();
            }
        }
    }
}

impl Default for PcmDecoderPlugin {
    fn default() -> Self {
        Self::new(AudioFormat::cd_quality())
    }
}

impl DecoderPlugin for PcmDecoderPlugin {
    fn name(&self) -> &str {
        "pcm"
    }

    fn suffixes(&self) -> &[&str] {
        &["raw", "pcm"]
    }

    fn mime_types(&self) -> &[&str] {
        &["audio/x-raw", "audio/L16"]
    }

    fn stream_decode(
        &self,
        client: &mut dyn DecoderClient,
        input: &mut dyn InputStream,
    ) -> Result<()> {
        let frame_size = self.format.frame_size();
        if frame_size == 0 {
            return Err(DecoderError::UnsupportedFormat(self.format.to_string()));
        }

        let duration = input
            .size()
            .map(|size| self.format.frames_to_duration(size / frame_size as u64));
        client.ready(self.format, input.is_seekable(), duration)?;

        let kbit_rate = self.kbit_rate();
        let mut buffer = vec![0u8; READ_FRAMES * frame_size];
        // bytes of an incomplete frame carried over from the previous read
        let mut partial = 0;

        loop {
            match client.command().check_stop()? {
                DecoderCommand::Seek => {
                    self.seek(client, input);
                    partial = 0;
                    continue;
                }
                DecoderCommand::None | DecoderCommand::Stop => {}
            }

            let n = stream_access::read(client, input, &mut buffer[partial..]);
            if n == 0 {
                if input.is_eof() {
                    return Ok(());
                }
                match client.command() {
                    DecoderCommand::None => {
                        return Err(DecoderError::Decoding(format!(
                            "read from {} failed",
                            input.uri()
                        )))
                    }
                    // handled at the top of the loop
                    DecoderCommand::Stop | DecoderCommand::Seek => continue,
                }
            }

            let available = partial + n;
            let whole = available - available % frame_size;
            if whole > 0 {
                client.submit_data(&buffer[..whole], kbit_rate)?.check_stop()?;
            }
            buffer.copy_within(whole..available, 0);
            partial = available - whole;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SampleFormat;
    use crate::command::SeekTarget;
    use crate::input::ReaderInputStream;
    use crate::mock::{ClientCall, MockDecoderClient};
    use std::io::Cursor;
    use std::time::Duration;

    fn input(bytes: usize) -> ReaderInputStream<Cursor<Vec<u8>>> {
        let data: Vec<u8> = (0..bytes).map(|i| (i % 251) as u8).collect();
        ReaderInputStream::new("mem://pcm.raw", Cursor::new(data)).unwrap()
    }

    #[test]
    fn decodes_whole_stream() {
        let plugin = PcmDecoderPlugin::default();
        let mut client = MockDecoderClient::new();
        let mut input = input(44100 * 4);

        plugin.stream_decode(&mut client, &mut input).unwrap();

        let ready = client.ready_info().unwrap();
        assert!(ready.seekable);
        assert_eq!(ready.duration, Some(Duration::from_secs(1)));
        assert_eq!(client.submitted_bytes(), 44100 * 4);
        assert!(client
            .data_calls()
            .iter()
            .all(|(_, kbit_rate)| *kbit_rate == 1411));
    }

    #[test]
    fn trailing_partial_frame_is_dropped() {
        let plugin = PcmDecoderPlugin::new(AudioFormat::new(8000, 1, SampleFormat::S16));
        let mut client = MockDecoderClient::new();
        let mut input = input(101);

        plugin.stream_decode(&mut client, &mut input).unwrap();
        assert_eq!(client.submitted_bytes(), 100);
    }

    #[test]
    fn stop_unwinds() {
        let plugin = PcmDecoderPlugin::default();
        let mut client = MockDecoderClient::new();
        client.post_after_submissions(1, DecoderCommand::Stop, None);
        let mut input = input(64 * 1024);

        let err = plugin.stream_decode(&mut client, &mut input).unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(client.data_submissions(), 1);
    }

    #[test]
    fn seek_repositions_on_frame_boundary() {
        let plugin = PcmDecoderPlugin::default();
        let mut client = MockDecoderClient::new();
        client.post_after_submissions(1, DecoderCommand::Seek, Some(SeekTarget::Frame(40_000)));
        let mut input = input(44100 * 4);

        plugin.stream_decode(&mut client, &mut input).unwrap();

        assert!(client.calls().contains(&ClientCall::CommandFinished));
        assert_eq!(
            client.submitted_bytes(),
            READ_FRAMES * 4 + (44100 - 40_000) * 4
        );
    }

    #[test]
    fn seek_past_addressable_range_fails() {
        let plugin = PcmDecoderPlugin::default();
        let mut client = MockDecoderClient::new();
        client.post_after_submissions(
            1,
            DecoderCommand::Seek,
            Some(SeekTarget::Frame(u64::MAX / 2)),
        );
        let mut input = input(44100 * 4);

        plugin.stream_decode(&mut client, &mut input).unwrap();

        assert!(client.calls().contains(&ClientCall::SeekError));
        assert!(!client.calls().contains(&ClientCall::CommandFinished));
        assert_eq!(client.submitted_bytes(), 44100 * 4);
    }

    #[test]
    fn seek_on_unseekable_input_fails() {
        let plugin = PcmDecoderPlugin::default();
        let mut client = MockDecoderClient::new();
        let (mut input, feeder) = crate::input::BufferedInputStream::new("http://stream");
        feeder.push(&[0u8; 8192]);
        feeder.finish();
        client.post_after_submissions(1, DecoderCommand::Seek, Some(SeekTarget::Frame(0)));

        plugin.stream_decode(&mut client, &mut input).unwrap();
        assert!(client.calls().contains(&ClientCall::SeekError));
        assert!(!client.ready_info().unwrap().seekable);
    }
}
