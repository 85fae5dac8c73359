//! One unit of decoder output as seen by the controller.

use crate::audio::ReplayGainInfo;
use crate::tag::Tag;
use bytes::Bytes;
use std::time::Duration;

/// An item in the intake pipe.
///
/// Audio chunks carry the PCM of (part of) exactly one `submit_data` call;
/// data from two calls is never merged. A tag submission travels as a chunk
/// with empty `data` so it keeps its position relative to the audio.
#[derive(Debug, Clone, PartialEq)]
pub struct MusicChunk {
    /// Decoded samples in the session's announced format.
    pub data: Bytes,
    /// Song position of the first sample.
    pub time: Duration,
    /// Bit rate hint in kbit/s; 0 when unknown.
    pub bit_rate: u16,
    /// Metadata snapshot to apply at this position.
    pub tag: Option<Tag>,
    /// Replay gain in effect for this chunk.
    pub replay_gain: Option<ReplayGainInfo>,
    /// Changes whenever new replay-gain values were submitted; 0 = none.
    pub replay_gain_serial: u32,
}

impl MusicChunk {
    /// A chunk of PCM.
    pub fn audio(data: Bytes, time: Duration, bit_rate: u16) -> Self {
        Self {
            data,
            time,
            bit_rate,
            tag: None,
            replay_gain: None,
            replay_gain_serial: 0,
        }
    }

    /// A metadata-only chunk.
    pub fn tag(tag: Tag, time: Duration) -> Self {
        Self {
            data: Bytes::new(),
            time,
            bit_rate: 0,
            tag: Some(tag),
            replay_gain: None,
            replay_gain_serial: 0,
        }
    }

    pub fn with_replay_gain(mut self, info: Option<ReplayGainInfo>, serial: u32) -> Self {
        self.replay_gain = info;
        self.replay_gain_serial = serial;
        self
    }

    /// Returns `true` if the chunk carries neither audio nor a tag.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.tag.is_none()
    }

    pub fn is_tag(&self) -> bool {
        self.tag.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::TagType;

    #[test]
    fn audio_and_tag_chunks() {
        let audio = MusicChunk::audio(Bytes::from_static(&[1, 2, 3, 4]), Duration::ZERO, 320);
        assert!(!audio.is_empty());
        assert!(!audio.is_tag());

        let tag = MusicChunk::tag(
            Tag::new().with_item(TagType::Title, "x"),
            Duration::from_secs(1),
        );
        assert!(tag.is_tag());
        assert!(tag.data.is_empty());
        assert!(!tag.is_empty());
    }
}
