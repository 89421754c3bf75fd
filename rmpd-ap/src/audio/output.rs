//! Audio output backends
//!
//! Pulls mixed samples from the device mixer and hands them to the system.
//! Two backends are available:
//! - `cpal`: the system audio device
//! - `null`: a real-time paced sink that discards samples, for headless hosts
//!
//! Each backend runs on its own thread for the life of the `AudioOutput`.
//! The cpal stream is not `Send` on every platform, so it is built, played
//! and dropped on that thread.

use crate::audio::device::{Mixer, CHANNELS};
use crate::audio::resampler::TARGET_SAMPLE_RATE;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Sample, SampleFormat, Stream, StreamConfig};
use parking_lot::Mutex;
use rmpd_common::config::{AudioConfig, OutputKind};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Render block of the null backend
const NULL_BLOCK: Duration = Duration::from_millis(10);

/// Running output backend
pub struct AudioOutput {
    backend: OutputKind,
    sample_rate: u32,
    /// Dropping the sender stops the backend thread
    shutdown_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl AudioOutput {
    /// List available audio output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Start the configured backend, rendering from `mixer`.
    ///
    /// Returns once the backend is running and its sample rate is known.
    pub fn start(config: &AudioConfig, mixer: Arc<Mutex<Mixer>>) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<u32>>();

        let thread = match config.output {
            OutputKind::Cpal => {
                let device_name = config.device.clone();
                let buffer_size = config.buffer_size;
                std::thread::Builder::new()
                    .name("rmpd-cpal".to_string())
                    .spawn(move || {
                        run_cpal(device_name, buffer_size, mixer, ready_tx, shutdown_rx)
                    })?
            }
            OutputKind::Null => std::thread::Builder::new()
                .name("rmpd-null-output".to_string())
                .spawn(move || run_null(mixer, ready_tx, shutdown_rx))?,
        };

        let sample_rate = match ready_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(Error::AudioOutput(
                    "Output thread exited during startup".to_string(),
                ));
            }
        };

        info!("Audio output started ({:?} at {}Hz)", config.output, sample_rate);

        Ok(Self {
            backend: config.output,
            sample_rate,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            OutputKind::Cpal => "cpal",
            OutputKind::Null => "null",
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.shutdown_tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Audio output thread panicked");
            }
        }
        debug!("Audio output stopped");
    }
}

fn run_cpal(
    device_name: Option<String>,
    buffer_size: Option<u32>,
    mixer: Arc<Mutex<Mixer>>,
    ready_tx: mpsc::Sender<Result<u32>>,
    shutdown_rx: mpsc::Receiver<()>,
) {
    let stream = match open_stream(device_name, buffer_size, mixer) {
        Ok((stream, sample_rate)) => {
            let _ = ready_tx.send(Ok(sample_rate));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    // Blocks until the sender is dropped
    let _ = shutdown_rx.recv();
    drop(stream);
}

fn open_stream(
    device_name: Option<String>,
    buffer_size: Option<u32>,
    mixer: Arc<Mutex<Mixer>>,
) -> Result<(Stream, u32)> {
    let device = find_device(device_name.as_deref())?;
    let (mut config, sample_format) = get_best_config(&device)?;

    if let Some(size) = buffer_size {
        config.buffer_size = cpal::BufferSize::Fixed(size);
        debug!("Using requested buffer size: {} frames", size);
    }

    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}, buffer_size={:?}",
        config.sample_rate.0, config.channels, sample_format, config.buffer_size
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer)?,
        other => {
            return Err(Error::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

    Ok((stream, config.sample_rate.0))
}

/// Requested device by name, falling back to the default device.
fn find_device(name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;

        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!("Found requested audio device: {}", name);
            return Ok(device);
        }
        warn!(
            "Requested device '{}' not found, falling back to default device",
            name
        );
    }

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;
    info!(
        "Using default audio device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    Ok(device)
}

/// Prefers 44.1kHz stereo f32, else the device default.
fn get_best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
    let mut supported_configs = device
        .supported_output_configs()
        .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

    let preferred = supported_configs.find(|config| {
        config.channels() == CHANNELS as u16
            && config.min_sample_rate().0 <= TARGET_SAMPLE_RATE
            && config.max_sample_rate().0 >= TARGET_SAMPLE_RATE
            && config.sample_format() == SampleFormat::F32
    });

    if let Some(supported_config) = preferred {
        let sample_format = supported_config.sample_format();
        let config = supported_config
            .with_sample_rate(cpal::SampleRate(TARGET_SAMPLE_RATE))
            .config();
        return Ok((config, sample_format));
    }

    let supported_config = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;

    let sample_format = supported_config.sample_format();
    Ok((supported_config.config(), sample_format))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mixer: Arc<Mutex<Mixer>>,
) -> Result<Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut mixed: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                mixed.resize(frames * CHANNELS, 0.0);
                mixer.lock().render(&mut mixed);

                for (out, stereo) in data.chunks_mut(channels).zip(mixed.chunks_exact(CHANNELS)) {
                    let left = stereo[0].clamp(-1.0, 1.0);
                    let right = stereo[1].clamp(-1.0, 1.0);

                    if channels == 1 {
                        out[0] = T::from_sample((left + right) * 0.5);
                        continue;
                    }
                    for (ch, sample) in out.iter_mut().enumerate() {
                        let value = match ch {
                            0 => left,
                            1 => right,
                            _ => 0.0,
                        };
                        *sample = T::from_sample(value);
                    }
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
}

fn run_null(
    mixer: Arc<Mutex<Mixer>>,
    ready_tx: mpsc::Sender<Result<u32>>,
    shutdown_rx: mpsc::Receiver<()>,
) {
    let sample_rate = TARGET_SAMPLE_RATE;
    let block_frames = (sample_rate as f64 * NULL_BLOCK.as_secs_f64()) as u64;
    let mut buffer = vec![0.0f32; block_frames as usize * CHANNELS];

    let _ = ready_tx.send(Ok(sample_rate));

    let started = Instant::now();
    let mut rendered: u64 = 0;

    loop {
        match shutdown_rx.recv_timeout(NULL_BLOCK) {
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            _ => break,
        }

        // Catch up to wall-clock time so playback position tracks real time
        let due = (started.elapsed().as_secs_f64() * sample_rate as f64) as u64;
        while rendered < due {
            let frames = (due - rendered).min(block_frames);
            mixer.lock().render(&mut buffer[..frames as usize * CHANNELS]);
            rendered += frames;
        }
    }
}
