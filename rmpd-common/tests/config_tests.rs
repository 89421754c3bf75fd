//! Configuration file loading tests
//!
//! Covers:
//! - Missing config files fall back to defaults instead of failing
//! - Malformed config files are reported as errors
//! - Full config files populate every section
//!
//! Tests that touch XDG_CONFIG_HOME are marked #[serial] so they do not race.

use rmpd_common::config::{OutputKind, QueueScope, TomlConfig, DEFAULT_BIND_ADDRESS};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_explicit_missing_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("does-not-exist.toml");

    let config = TomlConfig::load_or_default(Some(&missing)).unwrap();
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn test_full_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
log_level = "rmpd_ap=debug"

[server]
bind_address = "0.0.0.0:6601"
queue_scope = "per-connection"

[audio]
output = "null"
device = "USB DAC"
buffer_size = 1024
scan_directories = ["/srv/music", "/home/user/Music"]
scan_formats = ["flac", "mp3"]
"#,
    )
    .unwrap();

    let config = TomlConfig::load_or_default(Some(&path)).unwrap();
    assert_eq!(config.log_filter(), "rmpd_ap=debug");
    assert_eq!(config.server.bind_address, "0.0.0.0:6601");
    assert_eq!(config.server.queue_scope, QueueScope::PerConnection);
    assert_eq!(config.audio.output, OutputKind::Null);
    assert_eq!(config.audio.device.as_deref(), Some("USB DAC"));
    assert_eq!(config.audio.buffer_size, Some(1024));
    assert_eq!(
        config.audio.scan_directories,
        vec![PathBuf::from("/srv/music"), PathBuf::from("/home/user/Music")]
    );
    assert_eq!(config.audio.scan_formats, vec!["flac", "mp3"]);
}

#[test]
fn test_malformed_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[server\nbind_address = ").unwrap();

    let err = TomlConfig::load_or_default(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("Failed to parse"));
}

#[test]
fn test_unknown_queue_scope_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[server]\nqueue_scope = \"everyone\"\n").unwrap();

    assert!(TomlConfig::load(&path).is_err());
}

#[test]
#[serial]
#[cfg(target_os = "linux")]
fn test_user_config_dir_is_discovered() {
    let dir = TempDir::new().unwrap();
    let rmpd_dir = dir.path().join("rmpd");
    std::fs::create_dir_all(&rmpd_dir).unwrap();
    std::fs::write(
        rmpd_dir.join("config.toml"),
        "[server]\nbind_address = \"127.0.0.1:7700\"\n",
    )
    .unwrap();

    let previous = env::var_os("XDG_CONFIG_HOME");
    env::set_var("XDG_CONFIG_HOME", dir.path());

    let config = TomlConfig::load_or_default(None);

    match previous {
        Some(value) => env::set_var("XDG_CONFIG_HOME", value),
        None => env::remove_var("XDG_CONFIG_HOME"),
    }

    let config = config.unwrap();
    assert_eq!(config.server.bind_address, "127.0.0.1:7700");
    assert_ne!(config.server.bind_address, DEFAULT_BIND_ADDRESS);
}
