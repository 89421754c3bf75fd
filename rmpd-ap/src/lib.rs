//! # rmpd Audio Player Library (rmpd-ap)
//!
//! Network-controlled audio playback daemon.
//!
//! **Purpose:** Decode local audio files, keep a playback queue with a
//! cursor, and let TCP clients drive it with a line-based text protocol.
//!
//! **Architecture:** symphonia decoding + rubato resampling into one shared
//! output device (cpal or a paced null sink). Each playback queue is owned by
//! a transition loop task; protocol connections talk to it through a
//! cloneable `PlaybackManager` handle.

pub mod audio;
pub mod error;
pub mod playback;
pub mod protocol;

pub use error::{Error, Result};
