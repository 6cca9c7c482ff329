//! Minimal configuration loading for waxworks.
//!
//! Configuration is split into sections:
//!
//! - `[paths]` - where the archive lives on disk.
//! - `[control]` - the control-plane channels the daemon subscribes and
//!   publishes on.
//! - `[tuning]` - duty-cycle batch limits and buffer capacities. These are
//!   operational knobs, not semantic invariants.
//! - `[telemetry]` - log level.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/waxworks/config.toml` (system)
//! 2. `~/.config/waxworks/config.toml` (user)
//! 3. `./waxworks.toml` (local override)
//! 4. Environment variables (`WAXWORKS_*`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! archive_dir = "~/.local/share/waxworks/archive"
//!
//! [control]
//! request_channel = "transport:control"
//! request_stream_id = 10
//! notify_channel = "transport:notify"
//! notify_stream_id = 11
//!
//! [tuning]
//! request_batch_limit = 16
//! image_queue_capacity = 1024
//! ```

pub mod loader;

pub use loader::{discover_config_files, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete waxworks configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WaxConfig {
    pub paths: PathsConfig,
    pub control: ControlConfig,
    pub tuning: TuningConfig,
    pub telemetry: TelemetryConfig,
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root directory for recorded stream data and descriptors.
    pub archive_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            archive_dir: loader::expand_path("~/.local/share/waxworks/archive"),
        }
    }
}

/// Control-plane channel endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Channel the daemon polls for inbound control requests.
    pub request_channel: String,
    pub request_stream_id: i32,
    /// Channel the daemon publishes notifications on.
    pub notify_channel: String,
    pub notify_stream_id: i32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            request_channel: "transport:control".to_string(),
            request_stream_id: 10,
            notify_channel: "transport:notify".to_string(),
            notify_stream_id: 11,
        }
    }
}

/// Duty-cycle and buffer tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Control requests dispatched per conductor cycle.
    pub request_batch_limit: usize,
    /// Capacity of the image-available bridge queue.
    pub image_queue_capacity: usize,
    /// Image fragments an archive session drains per cycle.
    pub archive_fragment_limit: usize,
    /// Bytes a replay session offers per cycle.
    pub replay_chunk_bytes: usize,
    /// Pre-sized recording chunk files.
    pub chunk_bytes: u64,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            request_batch_limit: 16,
            image_queue_capacity: 1024,
            archive_fragment_limit: 16,
            replay_chunk_bytes: 4096,
            chunk_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl WaxConfig {
    /// Load configuration from the standard file locations plus environment
    /// overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _) = loader::load_with_sources(None)?;
        Ok(config)
    }

    /// Load configuration, preferring `path` over the local override file.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let (config, _) = loader::load_with_sources(Some(path))?;
        Ok(config)
    }
}
