//! Audio decoder using symphonia
//!
//! Decodes a whole track into interleaved stereo f32 samples. The player keeps
//! the decoded track in memory, so seeking is a frame index change and never
//! touches the compressed stream again.

use crate::error::{Error, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// File extensions (lowercase, without the dot) the decoder accepts
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "ogg"];

/// A fully decoded track
#[derive(Debug, Clone)]
pub struct DecodedTrack {
    /// Interleaved stereo samples: [L, R, L, R, ...]
    pub samples: Vec<f32>,
    /// Source sample rate (before resampling)
    pub sample_rate: u32,
}

impl DecodedTrack {
    /// Number of stereo frames
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }
}

/// Check the file extension against [`SUPPORTED_EXTENSIONS`] (case-insensitive).
pub fn check_supported(path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension {
        Some(ext) if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        Some(ext) => Err(Error::UnsupportedFormat {
            extension: format!(".{}", ext),
        }),
        None => Err(Error::UnsupportedFormat {
            extension: "(none)".to_string(),
        }),
    }
}

/// Decode an entire audio file to interleaved stereo f32 samples.
///
/// Mono sources are duplicated to both channels; sources with more than two
/// channels keep their first two.
///
/// # Errors
/// - `UnsupportedFormat` for unknown extensions
/// - `FileNotFound` if the file does not exist
/// - `DecodeError` if the file cannot be probed or yields no audio
pub fn decode_file(path: &Path) -> Result<DecodedTrack> {
    check_supported(path)?;
    debug!("Decoding entire file: {}", path.display());

    let file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
        _ => decode_error(path, format!("failed to open file: {}", e)),
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Create a hint to help the format registry guess the format
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_error(path, format!("failed to probe format: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| decode_error(path, "no audio track found"))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_error(path, format!("failed to create decoder: {}", e)))?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut channels: Option<usize> = None;
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                debug!("Reached end of file");
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) if interleaved.is_empty() => {
                return Err(decode_error(path, format!("failed to read packet: {}", e)));
            }
            Err(e) => {
                warn!("Error reading packet, truncating {}: {}", path.display(), e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Decode error (skipping packet): {}", e);
                continue;
            }
            Err(e) => return Err(decode_error(path, format!("decode failed: {}", e))),
        };

        let spec = *decoded.spec();
        channels.get_or_insert(spec.channels.count());
        sample_rate.get_or_insert(spec.rate);

        let buf = sample_buf.get_or_insert_with(|| {
            SampleBuffer::<f32>::new(decoded.capacity() as u64, spec)
        });
        if buf.capacity() < decoded.capacity() * spec.channels.count() {
            *buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        }
        buf.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(buf.samples());
    }

    let channels = channels.filter(|&c| c > 0);
    let (channels, sample_rate) = match (channels, sample_rate) {
        (Some(c), Some(r)) if !interleaved.is_empty() => (c, r),
        _ => return Err(decode_error(path, "no audio frames decoded")),
    };

    let samples = to_stereo(interleaved, channels);
    debug!(
        "Decoded {} frames at {}Hz ({} source channels)",
        samples.len() / 2,
        sample_rate,
        channels
    );

    Ok(DecodedTrack {
        samples,
        sample_rate,
    })
}

/// Convert interleaved samples with `channels` channels to interleaved stereo.
fn to_stereo(samples: Vec<f32>, channels: usize) -> Vec<f32> {
    match channels {
        2 => samples,
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        n => samples
            .chunks_exact(n)
            .flat_map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}

fn decode_error(path: &Path, reason: impl Into<String>) -> Error {
    Error::DecodeError {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_wav(path: &Path, channels: u16, sample_rate: u32, frames: u32) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            for ch in 0..channels {
                let value = if ch == 0 { (i % 100) as i16 * 100 } else { -1000 };
                writer.write_sample(value).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_mono_to_stereo() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(to_stereo(samples, 1), vec![0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
    }

    #[test]
    fn test_surround_keeps_front_pair() {
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(to_stereo(samples, 3), vec![1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn test_check_supported_is_case_insensitive() {
        assert!(check_supported(Path::new("a.mp3")).is_ok());
        assert!(check_supported(Path::new("B.FLAC")).is_ok());
        assert!(check_supported(Path::new("music/sample 1.wav")).is_ok());

        match check_supported(Path::new("notes.txt")) {
            Err(Error::UnsupportedFormat { extension }) => assert_eq!(extension, ".txt"),
            other => panic!("expected UnsupportedFormat, got {:?}", other),
        }
        assert!(check_supported(Path::new("README")).is_err());
    }

    #[test]
    fn test_decode_mono_wav() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mono.wav");
        write_wav(&path, 1, 8000, 8000);

        let track = decode_file(&path).unwrap();
        assert_eq!(track.sample_rate, 8000);
        assert_eq!(track.frames(), 8000);
        assert_eq!(track.samples[2], track.samples[3]);
    }

    #[test]
    fn test_decode_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = decode_file(&dir.path().join("missing.flac"));
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    #[test]
    fn test_decode_garbage_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.mp3");
        std::fs::write(&path, b"definitely not an mp3 stream").unwrap();

        let result = decode_file(&path);
        assert!(matches!(result, Err(Error::DecodeError { .. })));
    }
}
