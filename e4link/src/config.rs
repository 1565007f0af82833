//! Configuration for the streaming session driver.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use e4link_core::{
    ClientOptions, ConnectionInfo, DEFAULT_PORT, DEFAULT_WRIST_SENSITIVITY, DecodeError,
    MAX_WINDOW_SECS, MIN_WINDOW_SECS, StreamKind, window_period,
};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct E4Config {
    /// Where the bridge listens.
    pub bridge: BridgeConfig,
    /// Which device to attach and how.
    pub device: DeviceConfig,
    /// What the session does once attached.
    pub session: SessionConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Bridge address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
}

/// Device settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device id to attach. Empty means the first one discovered.
    pub id: String,
    /// Trailing zero GSR samples that mark the band off wrist.
    pub wrist_sensitivity: usize,
    /// How long to wait for each acknowledgement.
    pub command_timeout_secs: f64,
    /// Window length in seconds. Zero disables windowing.
    pub window_size_secs: f64,
}

/// Session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long to stream before saving.
    pub duration_secs: f64,
    /// Time given to the bridge to answer `device_list`.
    pub list_settle_ms: u64,
    /// Streams to subscribe, by wire name.
    pub streams: Vec<String>,
    /// Where the readings are written.
    pub output: PathBuf,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            wrist_sensitivity: DEFAULT_WRIST_SENSITIVITY,
            command_timeout_secs: 5.0,
            window_size_secs: 0.0,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_secs: 10.0,
            list_settle_ms: 1000,
            streams: StreamKind::ALL.iter().map(|s| s.as_str().to_string()).collect(),
            output: PathBuf::from("readings.txt"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl E4Config {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo::new(self.bridge.host.clone(), self.bridge.port)
    }

    /// Core options. Zero disables windowing; an out-of-range window
    /// size is reported and also disables it.
    pub fn client_options(&self) -> ClientOptions {
        let secs = self.device.window_size_secs;
        let window_secs = if secs == 0.0 {
            None
        } else if window_period(secs).is_some() {
            Some(secs)
        } else {
            tracing::warn!(
                window_size_secs = secs,
                "window size outside {MIN_WINDOW_SECS}..={MAX_WINDOW_SECS} s, windowing disabled"
            );
            None
        };
        ClientOptions {
            wrist_sensitivity: self.device.wrist_sensitivity,
            window_secs,
        }
    }

    pub fn command_timeout(&self) -> Duration {
        secs(self.device.command_timeout_secs)
    }

    pub fn duration(&self) -> Duration {
        secs(self.session.duration_secs)
    }

    pub fn list_settle(&self) -> Duration {
        Duration::from_millis(self.session.list_settle_ms)
    }

    /// Parse the configured stream names.
    pub fn streams(&self) -> Result<Vec<StreamKind>, DecodeError> {
        self.session.streams.iter().map(|s| s.parse()).collect()
    }
}

/// Negative, NaN and overflowing values collapse to zero.
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

// ── Tests ────────────────────────────────────────────────────────
