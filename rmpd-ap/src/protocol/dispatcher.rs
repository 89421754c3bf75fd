//! Command dispatch
//!
//! Maps a tokenized request onto a playback manager operation and renders the
//! reply text. Every reply is a single line. Errors are returned to the
//! caller, which renders them as `error: <message>` lines.

use crate::error::{Error, Result};
use crate::playback::{PlaybackManager, PlaybackStatus};
use rmpd_common::duration::{format_duration, parse_duration};
use tracing::debug;

/// Routes requests from one connection to its playback manager
pub struct CommandDispatcher {
    manager: PlaybackManager,
}

impl CommandDispatcher {
    pub fn new(manager: PlaybackManager) -> Self {
        Self { manager }
    }

    /// Execute one request. `tokens` must not be empty.
    pub async fn dispatch(&self, tokens: &[String]) -> Result<String> {
        let Some((verb, args)) = tokens.split_first() else {
            return Err(Error::ProtocolParseError("empty request".to_string()));
        };
        debug!("Dispatching {} {:?}", verb, args);

        match verb.as_str() {
            "ping" => Ok("pong".to_string()),
            "audio" => self.audio(args).await,
            other => Err(Error::UnknownCommand(other.to_string())),
        }
    }

    async fn audio(&self, args: &[String]) -> Result<String> {
        let Some((subcommand, args)) = args.split_first() else {
            return Err(Error::MissingArgument("audio".to_string()));
        };

        match subcommand.as_str() {
            "add" => {
                if args.is_empty() {
                    return Err(Error::MissingArgument("add".to_string()));
                }
                let added = self.manager.add_tracks(args.to_vec()).await?;
                Ok(format!("added {} to playback queue", added.join(", ")))
            }
            "play" => {
                let track = self.manager.play().await?;
                Ok(format!("Playing: {}", track))
            }
            "pause" => {
                let track = self.manager.pause().await?;
                Ok(format!("Paused: {}", track))
            }
            "seek" => {
                let raw = args
                    .first()
                    .ok_or_else(|| Error::MissingArgument("seek".to_string()))?;
                let offset = parse_duration(raw)
                    .map_err(|e| Error::ProtocolParseError(e.to_string()))?;
                let track = self.manager.seek(offset).await?;
                Ok(format!("Seeked: {} to {}", track, format_duration(offset)))
            }
            // next/prev name the new current track; the transport state is
            // carried over and `audio status` reports it
            "next" => match self.manager.next().await? {
                Some(track) => Ok(format!("Playing: {}", track)),
                None => Ok("Reached end of playback queue".to_string()),
            },
            "prev" => {
                let track = self.manager.previous().await?;
                Ok(format!("Playing: {}", track))
            }
            "stop" => {
                self.manager.stop().await?;
                Ok("Stopped Queue Playback".to_string())
            }
            "status" => Ok(format_status(&self.manager.status().await?)),
            "queue" => Ok(format_queue(&self.manager.status().await?)),
            other => Err(Error::UnknownCommand(format!("audio {}", other))),
        }
    }
}

fn format_status(status: &PlaybackStatus) -> String {
    let current = if status.queue_length == 0 {
        0
    } else {
        (status.cursor + 1).min(status.queue_length)
    };

    format!(
        "state: {}, track: {}, position: {}/{}, queue: {}/{}",
        status.state,
        status.track.as_deref().unwrap_or("none"),
        format_duration(status.position),
        format_duration(status.duration),
        current,
        status.queue_length
    )
}

/// `> a.wav; b.wav`, with the marker on the track under the cursor
fn format_queue(status: &PlaybackStatus) -> String {
    if status.tracks.is_empty() {
        return "queue is empty".to_string();
    }

    status
        .tracks
        .iter()
        .enumerate()
        .map(|(i, name)| {
            if i == status.cursor {
                format!("> {}", name)
            } else {
                name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}
