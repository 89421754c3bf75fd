//! Test helper modules for rmpd-ap integration tests
//!
//! Provides reusable test infrastructure components:
//! - TestServer/TestClient: run the control protocol against a manual device
//! - audio_generator: deterministic WAV fixtures

#![allow(dead_code, unused_imports)]

pub mod audio_generator;
pub mod test_server;

pub use audio_generator::{corrupt_track, generate_sine_wav, track, TEST_SAMPLE_RATE};
pub use test_server::{drain_events, wait_for_event, TestClient, TestServer};
