//! # Configuration Tests
//!
//! Defaults, JSON deserialization, file loading, and conversion to runtime types.

use farmem_core::bridge::SyncMode;
use farmem_core::common::ConfigError;
use farmem_core::config::*;
use farmem_core::soc::WindowMode;
use pretty_assertions::assert_eq;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!(config.window.base, 0x2_0000_0000);
    assert_eq!(config.window.size, 0x1_0000_0000);
    assert!(!config.window.uses_socket);
    assert_eq!(config.socket.socket_path, None);
    assert!(!config.socket.sync);
    assert_eq!(config.profiler.limit, 20);
    assert!(!config.profiler.inline);
    assert_eq!(config.profiler.mirror_slots, 100);
}

#[test]
fn test_empty_document_uses_defaults() {
    let config: Config = serde_json::from_str("{}").unwrap();
    assert_eq!(config.window.base, WindowConfig::default().base);
    assert_eq!(config.profiler.limit, ProfilerConfig::default().limit);
}

#[test]
fn test_partial_sections_fill_defaults() {
    let config: Config =
        serde_json::from_str(r#"{ "window": { "size": 4096 }, "profiler": { "inline": true } }"#)
            .unwrap();
    assert_eq!(config.window.base, 0x2_0000_0000);
    assert_eq!(config.window.size, 4096);
    assert!(config.profiler.inline);
    assert_eq!(config.profiler.limit, 20);
}

#[test]
fn test_zero_latency_selects_default() {
    let socket = SocketConfig {
        link_latency: 0,
        ..SocketConfig::default()
    };
    assert_eq!(socket.link_latency(), 500_000);

    let socket = SocketConfig {
        link_latency: 42,
        ..SocketConfig::default()
    };
    assert_eq!(socket.link_latency(), 42);
}

#[test]
fn test_bridge_params_from_socket_section() {
    let socket = SocketConfig {
        socket_path: Some(PathBuf::from("/tmp/mem.sock")),
        link_latency: 0,
        sync: true,
        handshake_timeout_ms: Some(250),
        poll_timeout_ms: None,
    };
    let params = socket.bridge_params().unwrap();
    assert_eq!(params.socket_path, PathBuf::from("/tmp/mem.sock"));
    assert_eq!(params.sync_mode, SyncMode::Required);
    assert_eq!(params.link_latency, 500_000);
    assert_eq!(params.handshake_timeout, Some(Duration::from_millis(250)));
    assert_eq!(params.poll_timeout, None);
}

#[test]
fn test_window_mode_requires_socket_path() {
    let mut config = Config::default();
    assert!(matches!(config.window_mode(), Ok(WindowMode::Local)));

    config.window.uses_socket = true;
    assert!(matches!(
        config.window_mode(),
        Err(ConfigError::MissingSocketPath)
    ));

    config.socket.socket_path = Some(PathBuf::from("/tmp/mem.sock"));
    assert!(matches!(config.window_mode(), Ok(WindowMode::Bridged(_))));
}

#[test]
fn test_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"{{ "window": {{ "uses_socket": false, "size": 65536 }}, "profiler": {{ "limit": 5 }} }}"#
    )
    .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.window.size, 65536);
    assert_eq!(config.profiler.limit, 5);
}

#[test]
fn test_from_file_errors() {
    let missing = Config::from_file(std::path::Path::new("/nonexistent/farmem.json"));
    assert!(matches!(missing, Err(ConfigError::Io(_))));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{ not json").unwrap();
    assert!(matches!(
        Config::from_file(file.path()),
        Err(ConfigError::Parse(_))
    ));
}
