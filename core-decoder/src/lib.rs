//! # Decoder Control Core
//!
//! Synchronization and data exchange between a decoding worker running a
//! codec plugin and the playback controller that consumes its output.
//!
//! ## Overview
//!
//! This crate handles:
//! - The Command Channel: one pending transport command (stop, seek) and
//!   its acknowledgment ([`control`])
//! - Command-aware stream access, so blocking reads end as soon as a
//!   command is pending ([`stream_access`])
//! - The Submission Pipeline: ordered hand-off of PCM, tags and
//!   side-channel metadata into a bounded intake ([`bridge`], [`pipe`])
//! - The session lifecycle on a dedicated worker thread ([`session`],
//!   [`controller`])
//!
//! Plugins implement [`DecoderPlugin`] and talk to the core only through
//! [`DecoderClient`]. Cancellation is [`DecoderError::Stopped`], returned
//! with `?` from any depth of plugin code.

pub mod audio;
pub mod bridge;
pub mod chunk;
pub mod client;
pub mod command;
pub mod config;
pub mod control;
pub mod controller;
pub mod error;
pub mod input;
pub mod mock;
pub mod pipe;
pub mod plugin;
pub mod plugins;
pub mod session;
pub mod stream_access;
pub mod tag;

pub use audio::{
    AudioFormat, MixRampInfo, ReplayGainInfo, ReplayGainMode, ReplayGainTuple, SampleFormat,
};
pub use bridge::DecoderBridge;
pub use chunk::MusicChunk;
pub use client::DecoderClient;
pub use command::{CommandAck, DecoderCommand, SeekTarget};
pub use config::DecoderConfig;
pub use control::{DecoderControl, DecoderState, ReadyInfo};
pub use controller::DecoderController;
pub use error::{DecoderError, Result};
pub use input::{BufferedInputStream, InputFeeder, InputStream, ReaderInputStream, ReadyHandler};
pub use pipe::MusicPipe;
pub use plugin::{DecoderPlugin, PluginRegistry};
pub use session::{SessionOptions, SessionOutcome, SongRange};
pub use tag::{Tag, TagType};
