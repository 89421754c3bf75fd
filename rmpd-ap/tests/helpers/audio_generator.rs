//! Audio test file generation
//!
//! Writes small deterministic WAV files with hound. The sample rate matches
//! the manual test device so no resampling happens and durations are exact.

use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::path::{Path, PathBuf};

/// Sample rate of generated files and of the manual test device
pub const TEST_SAMPLE_RATE: u32 = 8000;

/// Generate a stereo sine wave WAV file
///
/// # Example
/// ```no_run
/// # use std::path::Path;
/// // 2 seconds of 440 Hz at 50% amplitude
/// generate_sine_wav(Path::new("/tmp/a.wav"), 2000, 440.0, 0.5)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn generate_sine_wav<P: AsRef<Path>>(
    path: P,
    duration_ms: u64,
    frequency_hz: f32,
    amplitude: f32,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: 2,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;

    let total_frames = (TEST_SAMPLE_RATE as u64 * duration_ms) / 1000;
    let amplitude_i16 = (amplitude * i16::MAX as f32) as i16;

    for frame_idx in 0..total_frames {
        let t = frame_idx as f32 / TEST_SAMPLE_RATE as f32;
        let sample_i16 = ((2.0 * PI * frequency_hz * t).sin() * amplitude_i16 as f32) as i16;

        writer.write_sample(sample_i16)?;
        writer.write_sample(sample_i16)?;
    }

    writer.finalize()?;
    Ok(())
}

/// Write a `seconds`-long tone named `name` into `dir` and return its path
pub fn track(dir: &Path, name: &str, seconds: u64) -> PathBuf {
    let path = dir.join(name);
    generate_sine_wav(&path, seconds * 1000, 440.0, 0.5).unwrap();
    path
}

/// Write a file with a supported extension that is not audio
pub fn corrupt_track(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"this is not a wave file").unwrap();
    path
}
