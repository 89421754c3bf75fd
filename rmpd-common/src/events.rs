//! Event types for the rmpd playback event stream

use serde::{Deserialize, Serialize};

/// Playback state as observed from outside the playback manager.
///
/// Derived from the active audio player: `Idle` when there is none, otherwise
/// the player's paused flag decides between `Playing` and `Paused`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
        }
    }
}

/// Playback events broadcast by a playback manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlaybackEvent {
    /// A track became the current track and started (or resumed) output
    TrackStarted {
        track: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The current track reached its natural end
    TrackFinished {
        track: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The cursor moved past the last queued track
    QueueFinished {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Transport state changed
    StateChanged {
        state: PlaybackState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Tracks were appended to the queue
    QueueChanged {
        length: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlaybackEvent {
    /// Get event type as string (for logging and test assertions)
    pub fn event_type(&self) -> &'static str {
        match self {
            PlaybackEvent::TrackStarted { .. } => "TrackStarted",
            PlaybackEvent::TrackFinished { .. } => "TrackFinished",
            PlaybackEvent::QueueFinished { .. } => "QueueFinished",
            PlaybackEvent::StateChanged { .. } => "StateChanged",
            PlaybackEvent::QueueChanged { .. } => "QueueChanged",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_state_display() {
        assert_eq!(PlaybackState::Idle.to_string(), "idle");
        assert_eq!(PlaybackState::Playing.to_string(), "playing");
        assert_eq!(PlaybackState::Paused.to_string(), "paused");
    }

    #[test]
    fn test_event_type_names() {
        let event = PlaybackEvent::QueueFinished {
            timestamp: chrono::Utc::now(),
        };
        assert_eq!(event.event_type(), "QueueFinished");

        let event = PlaybackEvent::TrackStarted {
            track: "a.flac".to_string(),
            timestamp: chrono::Utc::now(),
        };
        assert_eq!(event.event_type(), "TrackStarted");
    }
}
