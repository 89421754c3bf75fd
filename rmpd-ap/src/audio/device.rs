//! Shared output device and mixer
//!
//! One `AudioDevice` is opened per daemon. Every `AudioPlayer` registers a
//! voice with the device's mixer; the output backend pulls mixed samples from
//! the mixer on its own thread. The mixer mutex is the device lock: every
//! read or write of a voice's position or paused flag happens under it, so
//! the render callback never observes a half-applied seek.

use crate::audio::output::AudioOutput;
use crate::error::Result;
use parking_lot::{Mutex, MutexGuard};
use rmpd_common::config::AudioConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Output channel count of the mixer (interleaved stereo)
pub const CHANNELS: usize = 2;

/// Identifier of a voice registered with the mixer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(u64);

/// Callback fired when a running voice reaches its last frame.
///
/// Fires once per arrival at the end; rearming the voice allows it to fire
/// again. Runs on the render thread with the device lock held.
pub type FinishCallback = Box<dyn FnMut() + Send + 'static>;

/// A decoded track attached to the mixer
pub(crate) struct Voice {
    /// Interleaved stereo samples at the device rate
    samples: Vec<f32>,
    /// Next frame to render
    pub(crate) frame: usize,
    pub(crate) paused: bool,
    on_finish: FinishCallback,
    /// Set once the callback has fired for the current arrival at the end
    finished: bool,
}

impl Voice {
    pub(crate) fn frames(&self) -> usize {
        self.samples.len() / CHANNELS
    }

    pub(crate) fn at_end(&self) -> bool {
        self.frame >= self.frames()
    }

    /// Let the finish callback fire again the next time the voice runs out
    pub(crate) fn rearm(&mut self) {
        self.finished = false;
    }
}

/// Sums all running voices into the output buffer
#[derive(Default)]
pub struct Mixer {
    voices: Vec<(VoiceId, Voice)>,
    next_id: u64,
}

impl Mixer {
    /// Fill `out` (interleaved stereo) with the next block of audio.
    ///
    /// A running voice that reaches its last frame fires its finish callback
    /// once and stays registered, silent, until its owner removes it or
    /// rearms it.
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);

        for (_, voice) in self.voices.iter_mut() {
            if voice.paused {
                continue;
            }

            if !voice.at_end() {
                let available = voice.frames() - voice.frame;
                let frames = available.min(out.len() / CHANNELS);
                let start = voice.frame * CHANNELS;
                let source = &voice.samples[start..start + frames * CHANNELS];

                for (dst, src) in out.iter_mut().zip(source) {
                    *dst += *src;
                }
                voice.frame += frames;
            }

            // Also reached by a running voice seeked to its very end
            if voice.at_end() && !voice.finished {
                voice.finished = true;
                (voice.on_finish)();
            }
        }
    }

    pub(crate) fn add_voice(
        &mut self,
        samples: Vec<f32>,
        on_finish: FinishCallback,
    ) -> VoiceId {
        let id = VoiceId(self.next_id);
        self.next_id += 1;
        self.voices.push((
            id,
            Voice {
                samples,
                frame: 0,
                paused: true,
                on_finish,
                finished: false,
            },
        ));
        id
    }

    /// Detach a voice; its finish callback is dropped without running
    pub(crate) fn remove_voice(&mut self, id: VoiceId) {
        self.voices.retain(|(voice_id, _)| *voice_id != id);
    }

    pub(crate) fn voice(&self, id: VoiceId) -> Option<&Voice> {
        self.voices
            .iter()
            .find(|(voice_id, _)| *voice_id == id)
            .map(|(_, voice)| voice)
    }

    pub(crate) fn voice_mut(&mut self, id: VoiceId) -> Option<&mut Voice> {
        self.voices
            .iter_mut()
            .find(|(voice_id, _)| *voice_id == id)
            .map(|(_, voice)| voice)
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }
}

/// The daemon's single audio output
pub struct AudioDevice {
    mixer: Arc<Mutex<Mixer>>,
    sample_rate: u32,
    /// None for manually driven devices
    output: Option<AudioOutput>,
}

impl AudioDevice {
    /// Open the configured output backend and start pulling from the mixer.
    pub fn open(config: &AudioConfig) -> Result<Arc<Self>> {
        let mixer = Arc::new(Mutex::new(Mixer::default()));
        let output = AudioOutput::start(config, Arc::clone(&mixer))?;
        let sample_rate = output.sample_rate();

        info!(
            "Audio device ready: {} backend at {}Hz",
            output.backend_name(),
            sample_rate
        );

        Ok(Arc::new(Self {
            mixer,
            sample_rate,
            output: Some(output),
        }))
    }

    /// Device with no backend thread; audio only advances through
    /// [`AudioDevice::render`] or [`AudioDevice::advance`].
    pub fn manual(sample_rate: u32) -> Arc<Self> {
        debug!("Creating manually driven audio device at {}Hz", sample_rate);
        Arc::new(Self {
            mixer: Arc::new(Mutex::new(Mixer::default())),
            sample_rate,
            output: None,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Acquire the device lock
    pub fn lock(&self) -> MutexGuard<'_, Mixer> {
        self.mixer.lock()
    }

    /// Render one block into `out`, as the backend callback does
    pub fn render(&self, out: &mut [f32]) {
        self.mixer.lock().render(out);
    }

    /// Render `duration` worth of audio in 10ms blocks and discard it
    pub fn advance(&self, duration: Duration) {
        let total_frames = (duration.as_secs_f64() * self.sample_rate as f64).round() as usize;
        let block_frames = (self.sample_rate as usize / 100).max(1);
        let mut buffer = vec![0.0f32; block_frames * CHANNELS];

        let mut remaining = total_frames;
        while remaining > 0 {
            let frames = remaining.min(block_frames);
            self.render(&mut buffer[..frames * CHANNELS]);
            remaining -= frames;
        }
    }

    pub fn voice_count(&self) -> usize {
        self.mixer.lock().voice_count()
    }

    pub fn backend_name(&self) -> &'static str {
        self.output
            .as_ref()
            .map(AudioOutput::backend_name)
            .unwrap_or("manual")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_callback(counter: &Arc<AtomicUsize>) -> FinishCallback {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_paused_voice_renders_silence() {
        let mut mixer = Mixer::default();
        let fired = Arc::new(AtomicUsize::new(0));
        mixer.add_voice(vec![0.5; 8], counting_callback(&fired));

        let mut out = vec![1.0; 8];
        mixer.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_voices_are_summed() {
        let mut mixer = Mixer::default();
        let fired = Arc::new(AtomicUsize::new(0));
        let a = mixer.add_voice(vec![0.25; 8], counting_callback(&fired));
        let b = mixer.add_voice(vec![0.5; 8], counting_callback(&fired));
        mixer.voice_mut(a).unwrap().paused = false;
        mixer.voice_mut(b).unwrap().paused = false;

        let mut out = vec![0.0; 4];
        mixer.render(&mut out);
        assert_eq!(out, vec![0.75; 4]);
        assert_eq!(mixer.voice(a).unwrap().frame, 2);
    }

    #[test]
    fn test_finish_callback_fires_once() {
        let mut mixer = Mixer::default();
        let fired = Arc::new(AtomicUsize::new(0));
        let id = mixer.add_voice(vec![0.1; 6], counting_callback(&fired));
        mixer.voice_mut(id).unwrap().paused = false;

        let mut out = vec![0.0; 4];
        mixer.render(&mut out);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        mixer.render(&mut out);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(&out[2..], &[0.0, 0.0]);

        mixer.render(&mut out);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(mixer.voice_count(), 1);
    }

    #[test]
    fn test_rearmed_voice_fires_again() {
        let mut mixer = Mixer::default();
        let fired = Arc::new(AtomicUsize::new(0));
        let id = mixer.add_voice(vec![0.1; 4], counting_callback(&fired));
        mixer.voice_mut(id).unwrap().paused = false;

        let mut out = vec![0.0; 4];
        mixer.render(&mut out);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        let voice = mixer.voice_mut(id).unwrap();
        voice.frame = 0;
        voice.rearm();
        mixer.render(&mut out);
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        // Rearmed while paused at the end: fires once it runs again
        let voice = mixer.voice_mut(id).unwrap();
        voice.paused = true;
        voice.rearm();
        mixer.render(&mut out);
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        mixer.voice_mut(id).unwrap().paused = false;
        mixer.render(&mut out);
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_removed_voice_never_fires() {
        let device = AudioDevice::manual(100);
        let fired = Arc::new(AtomicUsize::new(0));
        let id = device.lock().add_voice(vec![0.1; 20], counting_callback(&fired));
        device.lock().voice_mut(id).unwrap().paused = false;

        device.lock().remove_voice(id);
        device.advance(Duration::from_secs(1));

        assert_eq!(device.voice_count(), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_advance_renders_exact_frames() {
        let device = AudioDevice::manual(1000);
        let fired = Arc::new(AtomicUsize::new(0));
        let id = device
            .lock()
            .add_voice(vec![0.0; 2 * 5000], counting_callback(&fired));
        device.lock().voice_mut(id).unwrap().paused = false;

        device.advance(Duration::from_millis(1234));
        assert_eq!(device.lock().voice(id).unwrap().frame, 1234);
        assert_eq!(device.backend_name(), "manual");
    }
}
