//! Plugins shipped with the decoder core.

pub mod pcm;

pub use pcm::PcmDecoderPlugin;
