//! Workspace facade crate.
//!
//! Exposes the decoder control core and its runtime support through feature
//! flags (`runtime`, `decoder`) so hosts can depend on a single crate without
//! wiring each workspace member individually.

#[cfg(feature = "runtime")]
pub use core_runtime as runtime;

#[cfg(feature = "decoder")]
pub use core_decoder as decoder;
