//! # rmpd Common Library
//!
//! Shared code for the rmpd daemon and its tooling:
//! - Configuration loading (TOML file, environment, compiled defaults)
//! - Error types
//! - Go-style duration parsing and formatting used by the wire protocol
//! - Playback event types

pub mod config;
pub mod duration;
pub mod error;
pub mod events;

pub use error::{Error, Result};
