//! Playback queue and cursor
//!
//! The queue only grows. The cursor points at the current track and may sit
//! one past the last track, which means the queue is exhausted.

use crate::audio::check_supported;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A validated, playable file path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackReference {
    path: PathBuf,
}

impl TrackReference {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without directories
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Turns client-supplied paths into track references
#[derive(Debug, Clone, Default)]
pub struct TrackResolver {
    /// Searched in order for relative paths
    scan_dirs: Vec<PathBuf>,
    /// Allowed extensions, lowercase without the dot; empty allows every
    /// supported format
    formats: Vec<String>,
}

impl TrackResolver {
    pub fn new(scan_dirs: Vec<PathBuf>, formats: Vec<String>) -> Self {
        let formats = formats
            .into_iter()
            .map(|f| f.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Self { scan_dirs, formats }
    }

    /// Validate a client-supplied path.
    ///
    /// The extension is checked first. A relative path that does not exist
    /// against the working directory is looked up in each scan directory in
    /// order.
    pub fn resolve(&self, raw: &str) -> Result<TrackReference> {
        let path = PathBuf::from(raw);
        check_supported(&path)?;
        self.check_allowed(&path)?;

        if path.is_file() {
            return Ok(TrackReference { path });
        }

        if path.is_relative() {
            for dir in &self.scan_dirs {
                let candidate = dir.join(&path);
                if candidate.is_file() {
                    debug!("Resolved {} via scan directory {}", raw, dir.display());
                    return Ok(TrackReference { path: candidate });
                }
            }
        }

        Err(Error::FileNotFound(path))
    }

    fn check_allowed(&self, path: &Path) -> Result<()> {
        if self.formats.is_empty() {
            return Ok(());
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        if self.formats.contains(&extension) {
            Ok(())
        } else {
            Err(Error::UnsupportedFormat {
                extension: format!(".{}", extension),
            })
        }
    }
}

/// Ordered tracks plus the cursor
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    tracks: Vec<TrackReference>,
    /// Always within `0..=tracks.len()`
    cursor: usize,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, track: TrackReference) {
        self.tracks.push(track);
    }

    /// Track under the cursor, None when exhausted
    pub fn current(&self) -> Option<&TrackReference> {
        self.tracks.get(self.cursor)
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.tracks.len()
    }

    /// Move to the next track. Moving from the last track exhausts the queue.
    pub fn advance(&mut self) -> Result<()> {
        if self.is_exhausted() {
            return Err(Error::InvalidCursorMove(
                "already at the end of the queue".to_string(),
            ));
        }
        self.cursor += 1;
        Ok(())
    }

    /// Move to the previous track.
    pub fn retreat(&mut self) -> Result<()> {
        if self.cursor == 0 {
            return Err(Error::InvalidCursorMove(
                "already at the start of the queue".to_string(),
            ));
        }
        self.cursor -= 1;
        Ok(())
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[TrackReference] {
        &self.tracks
    }
}
