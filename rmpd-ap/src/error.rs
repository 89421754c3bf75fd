//! Error types for rmpd-ap
//!
//! Every playback failure is a typed value: the playback manager returns it to
//! the command dispatcher, which renders it as an `error: <message>` line.
//! Only `ListenerBindFailure` is fatal, and only at startup.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use rmpd_common::duration::format_duration;

/// Main error type for rmpd-ap
#[derive(Error, Debug)]
pub enum Error {
    /// File extension is not one the decoder handles
    #[error("audio format: {extension} is not supported yet")]
    UnsupportedFormat { extension: String },

    /// File exists but could not be decoded
    #[error("could not decode {}: {reason}", .path.display())]
    DecodeError { path: PathBuf, reason: String },

    /// Track path does not exist
    #[error("file does not exist: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Seek target lies past the end of the track
    #[error(
        "seek out of range: {} exceeds track duration {}",
        seconds(.requested),
        seconds(.duration)
    )]
    SeekOutOfRange {
        requested: Duration,
        duration: Duration,
    },

    /// No track is loaded at the cursor
    #[error("no active audio file in queue")]
    NoActiveTrack,

    #[error("queue is already playing")]
    AlreadyPlaying,

    #[error("queue is already paused")]
    AlreadyPaused,

    /// Cursor cannot move in the requested direction
    #[error("invalid queue pointer move request: {0}")]
    InvalidCursorMove(String),

    /// Some paths passed to AddTracks were rejected; the others were queued
    #[error("could not add: {}", format_rejections(.0))]
    AddTracksFailed(Vec<(String, Error)>),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("{0} command expects at least one argument")]
    MissingArgument(String),

    /// Malformed request line
    #[error("could not parse request: {0}")]
    ProtocolParseError(String),

    /// Control socket could not be bound (fatal at startup)
    #[error("cannot start the server at {address}: {source}")]
    ListenerBindFailure {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Audio output device errors
    #[error("audio output error: {0}")]
    AudioOutput(String),

    /// The playback manager's transition loop is gone
    #[error("playback manager is not running")]
    ManagerClosed,

    /// Configuration errors from rmpd-common
    #[error(transparent)]
    Common(#[from] rmpd_common::Error),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn seconds(duration: &Duration) -> String {
    format_duration(*duration)
}

fn format_rejections(rejections: &[(String, Error)]) -> String {
    rejections
        .iter()
        .map(|(path, err)| format!("{} ({})", path, err))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Stable name of the error kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::UnsupportedFormat { .. } => "UnsupportedFormat",
            Error::DecodeError { .. } => "DecodeError",
            Error::FileNotFound(_) => "FileNotFound",
            Error::SeekOutOfRange { .. } => "SeekOutOfRange",
            Error::NoActiveTrack => "NoActiveTrack",
            Error::AlreadyPlaying => "AlreadyPlaying",
            Error::AlreadyPaused => "AlreadyPaused",
            Error::InvalidCursorMove(_) => "InvalidCursorMove",
            Error::AddTracksFailed(_) => "AddTracksFailed",
            Error::UnknownCommand(_) => "UnknownCommand",
            Error::MissingArgument(_) => "MissingArgument",
            Error::ProtocolParseError(_) => "ProtocolParseError",
            Error::ListenerBindFailure { .. } => "ListenerBindFailure",
            Error::AudioOutput(_) => "AudioOutput",
            Error::ManagerClosed => "ManagerClosed",
            Error::Common(_) => "Common",
            Error::Io(_) => "Io",
        }
    }
}

/// Convenience Result type using rmpd-ap Error
pub type Result<T> = std::result::Result<T, Error>;
