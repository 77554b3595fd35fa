//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, ParamsConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/paramsremote/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("paramsremote/config.toml");
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

    let local = PathBuf::from("paramsremote.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load config from a single TOML file.
pub fn load_from_file(path: &Path) -> Result<ParamsConfig, ConfigError> {
    let table = read_table(path)?;
    from_table(table, path)
}

/// Read a TOML file into a raw table, without applying defaults.
pub fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    contents
        .parse()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Turn a (possibly merged) table into a config, filling in defaults.
pub fn from_table(mut table: toml::Table, path: &Path) -> Result<ParamsConfig, ConfigError> {
    expand_state_dir(&mut table);

    toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Merge `overlay` into `base`; nested tables merge key by key, everything
/// else in `overlay` replaces what `base` had.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
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

fn expand_state_dir(table: &mut toml::Table) {
    let Some(paths) = table.get_mut("paths").and_then(|v| v.as_table_mut()) else {
        return;
    };
    let expanded = paths
        .get("state_dir")
        .and_then(|v| v.as_str())
        .map(|raw| expand_path(raw).to_string_lossy().into_owned());
    if let Some(expanded) = expanded {
        paths.insert("state_dir".to_string(), toml::Value::String(expanded));
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut ParamsConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("PARAMSREMOTE_STATE_DIR") {
        config.infra.paths.state_dir = expand_path(&v);
        sources.env_overrides.push("PARAMSREMOTE_STATE_DIR".to_string());
    }

    if let Ok(v) = env::var("PARAMSREMOTE_DEFAULT_PORT") {
        if let Ok(port) = v.parse() {
            config.infra.client.default_port = port;
            sources.env_overrides.push("PARAMSREMOTE_DEFAULT_PORT".to_string());
        }
    }
    if let Ok(v) = env::var("PARAMSREMOTE_SCHEMA_TIMEOUT_MS") {
        if let Ok(ms) = v.parse() {
            config.infra.client.schema_timeout_ms = ms;
            sources.env_overrides.push("PARAMSREMOTE_SCHEMA_TIMEOUT_MS".to_string());
        }
    }
    if let Ok(v) = env::var("PARAMSREMOTE_SCHEMA_ATTEMPTS") {
        if let Ok(attempts) = v.parse() {
            config.infra.client.schema_attempts = attempts;
            sources.env_overrides.push("PARAMSREMOTE_SCHEMA_ATTEMPTS".to_string());
        }
    }
    if let Ok(v) = env::var("PARAMSREMOTE_ALLOW_DUPLICATES") {
        if let Some(flag) = parse_flag(&v) {
            config.infra.client.allow_duplicates = flag;
            sources.env_overrides.push("PARAMSREMOTE_ALLOW_DUPLICATES".to_string());
        }
    }

    if let Ok(v) = env::var("PARAMSREMOTE_LOG_LEVEL") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("PARAMSREMOTE_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Ok(v) = env::var("RUST_LOG") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            home.join(stripped)
        } else {
            PathBuf::from(path)
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                PathBuf::from(var_value).join(&stripped[slash_pos + 1..])
            } else {
                PathBuf::from(path)
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}
