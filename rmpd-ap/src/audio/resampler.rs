//! Audio resampling using rubato
//!
//! The output device runs at one fixed rate for the life of the daemon. Every
//! track is converted to that rate once, at decode time, instead of
//! reinitialising the device whenever a track's rate differs.

use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Rate used when the output backend does not dictate one
pub const TARGET_SAMPLE_RATE: u32 = 44100;

/// Audio resampler using rubato for sample rate conversion.
pub struct Resampler;

impl Resampler {
    /// Resample interleaved audio from `input_rate` to `output_rate`.
    ///
    /// Returns the input unchanged when the rates already match.
    pub fn resample(
        input: Vec<f32>,
        input_rate: u32,
        output_rate: u32,
        channels: u16,
    ) -> Result<Vec<f32>> {
        if input_rate == output_rate || input.is_empty() {
            return Ok(input);
        }

        debug!(
            "Resampling from {}Hz to {}Hz ({} channels)",
            input_rate, output_rate, channels
        );

        // rubato expects planar input
        let planar_input = Self::deinterleave(&input, channels);
        let input_frames = planar_input[0].len();

        let mut resampler = FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            input_frames,
            channels as usize,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to create resampler: {}", e)))?;

        let planar_output = resampler
            .process(&planar_input, None)
            .map_err(|e| Error::AudioOutput(format!("Resampling failed: {}", e)))?;

        let output = Self::interleave(planar_output);

        debug!(
            "Resampled {} input frames to {} output frames",
            input_frames,
            output.len() / channels as usize
        );

        Ok(output)
    }

    /// [L, R, L, R, ...] -> [[L, L, ...], [R, R, ...]]
    fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
        let num_channels = channels as usize;
        let num_frames = samples.len() / num_channels;

        let mut planar = vec![Vec::with_capacity(num_frames); num_channels];
        for frame in samples.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                planar[ch].push(sample);
            }
        }

        planar
    }

    /// [[L, L, ...], [R, R, ...]] -> [L, R, L, R, ...]
    fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
        if planar.is_empty() {
            return Vec::new();
        }

        let num_channels = planar.len();
        let num_frames = planar[0].len();
        let mut interleaved = Vec::with_capacity(num_frames * num_channels);

        for frame_idx in 0..num_frames {
            for channel in &planar {
                interleaved.push(channel[frame_idx]);
            }
        }

        interleaved
    }
}
