//! Configuration for the memory window, its bridge, and the profiler.
//!
//! This module defines the configuration surface consumed from the host. It provides:
//! 1. **Defaults:** Window placement, link latency, and report limits.
//! 2. **Structures:** `WindowConfig`, `SocketConfig`, and `ProfilerConfig` under one `Config`.
//! 3. **Conversion:** Validated runtime types (`WindowMode`, `BridgeParams`) built from the config.
//!
//! Configuration is deserialized from JSON (`farmem --config`) or built with `Config::default()`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::bridge::{BridgeParams, SyncMode};
use crate::common::error::ConfigError;
use crate::soc::memory::WindowMode;

/// Default configuration values.
mod defaults {
    use crate::common::constants;

    /// Window base address (8 GiB).
    pub const WINDOW_BASE: u64 = constants::DEFAULT_WINDOW_BASE;

    /// Window size (4 GiB).
    pub const WINDOW_SIZE: u64 = constants::DEFAULT_WINDOW_SIZE;

    /// Link latency applied to every bridged message.
    pub const LINK_LATENCY: u64 = constants::DEFAULT_LINK_LATENCY;

    /// Rows printed in the profiler report.
    pub const REPORT_LIMIT: usize = constants::DEFAULT_REPORT_LIMIT;

    /// Numbered mirror files tried by the profiler.
    pub const MIRROR_SLOTS: usize = constants::DEFAULT_MIRROR_SLOTS;
}

/// Root configuration.
///
/// # Example
///
/// ```
/// use farmem_core::config::Config;
///
/// let json = r#"{
///     "window": { "base": 8589934592, "size": 4096, "uses_socket": true },
///     "socket": { "socket_path": "/tmp/mem.sock", "sync": true }
/// }"#;
///
/// let config: Config = serde_json::from_str(json).unwrap();
/// assert_eq!(config.window.size, 4096);
/// assert!(config.window.uses_socket);
/// assert_eq!(config.socket.link_latency(), 500_000);
/// assert_eq!(config.profiler.limit, 20);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Memory window placement and mode
    #[serde(default)]
    pub window: WindowConfig,
    /// Bridge socket parameters
    #[serde(default)]
    pub socket: SocketConfig,
    /// Execution profiler settings
    #[serde(default)]
    pub profiler: ProfilerConfig,
}

impl Config {
    /// Reads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// `ConfigError::Io` if the file cannot be read, `ConfigError::Parse` if it is not valid.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Builds the window mode selected by `window.uses_socket`.
    ///
    /// # Errors
    ///
    /// `ConfigError::MissingSocketPath` when bridging is requested without a path.
    pub fn window_mode(&self) -> Result<WindowMode, ConfigError> {
        if self.window.uses_socket {
            Ok(WindowMode::Bridged(self.socket.bridge_params()?))
        } else {
            Ok(WindowMode::Local)
        }
    }
}

/// Memory window device properties.
#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    /// Base address of the window in the physical address space
    #[serde(default = "WindowConfig::default_base")]
    pub base: u64,

    /// Window size in bytes
    #[serde(default = "WindowConfig::default_size")]
    pub size: u64,

    /// Forward accesses to the external memory backend instead of a local buffer
    #[serde(default)]
    pub uses_socket: bool,
}

impl WindowConfig {
    /// Returns the default window base address.
    const fn default_base() -> u64 {
        defaults::WINDOW_BASE
    }

    /// Returns the default window size.
    const fn default_size() -> u64 {
        defaults::WINDOW_SIZE
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            base: defaults::WINDOW_BASE,
            size: defaults::WINDOW_SIZE,
            uses_socket: false,
        }
    }
}

/// Bridge socket parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SocketConfig {
    /// Path of the Unix socket the memory backend listens on
    #[serde(default)]
    pub socket_path: Option<PathBuf>,

    /// Simulated link latency; zero selects the default
    #[serde(default)]
    pub link_latency: u64,

    /// Require logical-time synchronization with the peer
    #[serde(default)]
    pub sync: bool,

    /// Upper bound on the introduction exchange, in milliseconds (unbounded if unset)
    #[serde(default)]
    pub handshake_timeout_ms: Option<u64>,

    /// Upper bound on waiting for a completion, in milliseconds (unbounded if unset)
    #[serde(default)]
    pub poll_timeout_ms: Option<u64>,
}

impl SocketConfig {
    /// Returns the effective link latency (zero maps to the default).
    pub const fn link_latency(&self) -> u64 {
        if self.link_latency == 0 {
            defaults::LINK_LATENCY
        } else {
            self.link_latency
        }
    }

    /// Returns the sync mode selected by `sync`.
    pub const fn sync_mode(&self) -> SyncMode {
        if self.sync {
            SyncMode::Required
        } else {
            SyncMode::Disabled
        }
    }

    /// Builds transport parameters from this section.
    ///
    /// # Errors
    ///
    /// `ConfigError::MissingSocketPath` if no path is set.
    pub fn bridge_params(&self) -> Result<BridgeParams, ConfigError> {
        let path = self
            .socket_path
            .clone()
            .ok_or(ConfigError::MissingSocketPath)?;
        let mut params = BridgeParams::new(path)
            .with_sync_mode(self.sync_mode())
            .with_link_latency(self.link_latency());
        params.handshake_timeout = self.handshake_timeout_ms.map(Duration::from_millis);
        params.poll_timeout = self.poll_timeout_ms.map(Duration::from_millis);
        Ok(params)
    }
}

/// Execution profiler settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfilerConfig {
    /// Maximum rows in the report
    #[serde(default = "ProfilerConfig::default_limit")]
    pub limit: usize,

    /// Count executions through shared counters instead of the locked table
    #[serde(default)]
    pub inline: bool,

    /// Directory for the mirrored totals file (disabled if unset)
    #[serde(default)]
    pub mirror_dir: Option<PathBuf>,

    /// Number of numbered mirror files to try
    #[serde(default = "ProfilerConfig::default_mirror_slots")]
    pub mirror_slots: usize,
}

impl ProfilerConfig {
    /// Returns the default report limit.
    const fn default_limit() -> usize {
        defaults::REPORT_LIMIT
    }

    /// Returns the default number of mirror files.
    const fn default_mirror_slots() -> usize {
        defaults::MIRROR_SLOTS
    }
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            limit: defaults::REPORT_LIMIT,
            inline: false,
            mirror_dir: None,
            mirror_slots: defaults::MIRROR_SLOTS,
        }
    }
}
