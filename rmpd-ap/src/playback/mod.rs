//! Playback manager and queue management

pub mod manager;
pub mod queue;

pub use manager::{PlaybackManager, PlaybackStatus};
pub use queue::{PlaybackQueue, TrackReference, TrackResolver};
