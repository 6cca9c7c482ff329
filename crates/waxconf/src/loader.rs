//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, WaxConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order).
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values.
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local). Only returns files
/// that exist. A `cli_path` replaces the local override when given.
pub fn discover_config_files(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/waxworks/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("waxworks/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("waxworks.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load config from the discovered files, layering later files over earlier
/// ones, then apply environment overrides.
pub fn load_with_sources(
    cli_path: Option<&Path>,
) -> Result<(WaxConfig, ConfigSources), ConfigError> {
    let mut sources = ConfigSources::default();
    let mut merged = toml::Table::new();

    for path in discover_config_files(cli_path) {
        let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileRead {
            path: path.clone(),
            source: e,
        })?;
        let table: toml::Table =
            contents
                .parse()
                .map_err(|e: toml::de::Error| ConfigError::Parse {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
        merge_tables(&mut merged, table);
        sources.files.push(path);
    }

    let mut config: WaxConfig =
        toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                path: PathBuf::from("<merged>"),
                message: e.to_string(),
            })?;

    apply_env_overrides(&mut config, &mut sources);

    Ok((config, sources))
}

/// Key-wise merge: values from `overlay` win, nested tables merge recursively.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn apply_env_overrides(config: &mut WaxConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("WAXWORKS_ARCHIVE_DIR") {
        config.paths.archive_dir = expand_path(&v);
        sources.env_overrides.push("WAXWORKS_ARCHIVE_DIR".to_string());
    }
    if let Ok(v) = env::var("WAXWORKS_REQUEST_CHANNEL") {
        config.control.request_channel = v;
        sources
            .env_overrides
            .push("WAXWORKS_REQUEST_CHANNEL".to_string());
    }
    if let Ok(v) = env::var("WAXWORKS_NOTIFY_CHANNEL") {
        config.control.notify_channel = v;
        sources
            .env_overrides
            .push("WAXWORKS_NOTIFY_CHANNEL".to_string());
    }
    if let Ok(v) = env::var("WAXWORKS_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("WAXWORKS_LOG_LEVEL".to_string());
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(base) = directories::BaseDirs::new() {
            return base.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}
