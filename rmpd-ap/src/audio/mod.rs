//! Audio subsystem
//!
//! Decoding (symphonia), sample rate conversion (rubato), the shared output
//! device with its mixer, and the cpal/null output backends.

pub mod decoder;
pub mod device;
pub mod output;
pub mod player;
pub mod resampler;

pub use decoder::{check_supported, decode_file, DecodedTrack, SUPPORTED_EXTENSIONS};
pub use device::{AudioDevice, Mixer, CHANNELS};
pub use output::AudioOutput;
pub use player::AudioPlayer;
pub use resampler::Resampler;
