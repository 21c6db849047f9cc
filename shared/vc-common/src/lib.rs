//! `VoiceChat` Common Library
//!
//! Shared types and protocol requests used by the server core and the
//! control-protocol layer that feeds it.

pub mod protocol;
pub mod types;

pub use types::*;
