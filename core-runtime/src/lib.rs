//! # Core Runtime Module
//!
//! Provides the runtime infrastructure shared by the decoder core:
//! - Logging and tracing infrastructure
//! - Event bus for decoder lifecycle notifications
//!
//! ## Overview
//!
//! This crate holds the utilities every other workspace member depends on.
//! It establishes the logging conventions and the event broadcasting
//! mechanism hosts use to observe decoding sessions without polling.

pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
