//! Per-track player
//!
//! An `AudioPlayer` owns one decoded track attached to the shared device as a
//! voice. It starts paused. When the voice plays its last frame the device
//! runs the finish callback given at creation. Seeking or resuming lets it
//! run again for a later arrival at the end; closing the player detaches the
//! voice so the callback never runs.

use crate::audio::decoder::{check_supported, decode_file};
use crate::audio::device::{AudioDevice, VoiceId, CHANNELS};
use crate::audio::resampler::Resampler;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A decoded track ready to play on the shared device
pub struct AudioPlayer {
    path: PathBuf,
    name: String,
    device: Arc<AudioDevice>,
    voice: Option<VoiceId>,
    /// Length in frames at the device rate
    frames: usize,
}

impl AudioPlayer {
    /// Decode `path`, convert it to the device rate and register it with the
    /// device, paused at the start.
    ///
    /// `on_finish` runs on the render thread with the device lock held, each
    /// time running playback reaches the end of the track. It must not block
    /// or call back into the device.
    pub fn create<F>(path: &Path, device: Arc<AudioDevice>, on_finish: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        check_supported(path)?;

        let track = decode_file(path)?;
        let samples = Resampler::resample(
            track.samples,
            track.sample_rate,
            device.sample_rate(),
            CHANNELS as u16,
        )?;

        let frames = samples.len() / CHANNELS;
        if frames == 0 {
            return Err(Error::DecodeError {
                path: path.to_path_buf(),
                reason: "track is empty".to_string(),
            });
        }

        let voice = device.lock().add_voice(samples, Box::new(on_finish));
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        debug!(
            "Created player for {} ({} frames at {}Hz)",
            name,
            frames,
            device.sample_rate()
        );

        Ok(Self {
            path: path.to_path_buf(),
            name,
            device,
            voice: Some(voice),
            frames,
        })
    }

    /// Resume output. No-op (with a warning) if already playing.
    pub fn play(&self) {
        self.set_paused(false);
    }

    /// Halt output, keeping the position. No-op (with a warning) if already paused.
    pub fn pause(&self) {
        self.set_paused(true);
    }

    fn set_paused(&self, paused: bool) {
        let Some(id) = self.voice else {
            warn!("{}: player is closed", self.name);
            return;
        };

        let mut mixer = self.device.lock();
        if let Some(voice) = mixer.voice_mut(id) {
            if voice.paused == paused {
                warn!(
                    "{} is already {}",
                    self.name,
                    if paused { "paused" } else { "playing" }
                );
                return;
            }
            voice.paused = paused;
            if !paused {
                voice.rearm();
            }
        }
    }

    /// Jump to `offset` from the start of the track, truncated to whole
    /// seconds. The playing/paused state is unchanged.
    pub fn seek(&self, offset: Duration) -> Result<()> {
        let offset = Duration::from_secs(offset.as_secs());
        let target = offset
            .as_secs()
            .checked_mul(u64::from(self.device.sample_rate()))
            .and_then(|frame| usize::try_from(frame).ok())
            .filter(|frame| *frame <= self.frames)
            .ok_or_else(|| Error::SeekOutOfRange {
                requested: offset,
                duration: self.duration(),
            })?;

        let Some(id) = self.voice else {
            return Err(Error::NoActiveTrack);
        };

        let mut mixer = self.device.lock();
        if let Some(voice) = mixer.voice_mut(id) {
            voice.frame = target;
            voice.rearm();
        }

        debug!("{}: seeked to {}s", self.name, offset.as_secs());
        Ok(())
    }

    /// Elapsed time, truncated to whole seconds
    pub fn position(&self) -> Duration {
        let frame = self
            .voice
            .and_then(|id| self.device.lock().voice(id).map(|v| v.frame))
            .unwrap_or(0);
        Duration::from_secs((frame / self.device.sample_rate() as usize) as u64)
    }

    /// Total length, truncated to whole seconds
    pub fn duration(&self) -> Duration {
        Duration::from_secs((self.frames / self.device.sample_rate() as usize) as u64)
    }

    /// Whether the track is running and has played its last frame
    pub fn is_finished(&self) -> bool {
        self.voice
            .and_then(|id| {
                self.device
                    .lock()
                    .voice(id)
                    .map(|v| !v.paused && v.at_end())
            })
            .unwrap_or(false)
    }

    pub fn is_paused(&self) -> bool {
        self.voice
            .and_then(|id| self.device.lock().voice(id).map(|v| v.paused))
            .unwrap_or(true)
    }

    /// Stop output and detach from the device. The finish callback is dropped
    /// without running. Idempotent.
    pub fn close(&mut self) {
        if let Some(id) = self.voice.take() {
            let mut mixer = self.device.lock();
            if let Some(voice) = mixer.voice_mut(id) {
                voice.paused = true;
            }
            mixer.remove_voice(id);
            debug!("Closed player for {}", self.name);
        }
    }

    /// File name shown to clients
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        self.close();
    }
}
