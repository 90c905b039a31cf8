//! Core of the chat relay: polling forwarder, text pipeline and persisted state.
//!
//! This crate is platform-agnostic. Telegram lives behind the
//! [`platform::ChatPlatform`] port, implemented in the adapter crate.

pub mod config;
pub mod directory;
pub mod domain;
pub mod errors;
pub mod forward;
pub mod logging;
pub mod platform;
pub mod replacements;
pub mod service;
pub mod session;
pub mod transform;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
