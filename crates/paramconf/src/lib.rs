//! Configuration loading for paramsremote.
//!
//! Both the protocol crate and the `paramctl` binary read their settings
//! through this crate, so it stays small and free of runtime dependencies.
//!
//! # Configuration Philosophy
//!
//! - **Infrastructure** (`InfraConfig`): where session state lives, how the
//!   clients discover schemas, log filtering. Fixed once the process is up.
//!
//! - **Bootstrap** (`BootstrapConfig`): sessions opened at startup. After
//!   that the client registry is the source of truth.
//!
//! # Usage
//!
//! ```rust,no_run
//! use paramconf::ParamsConfig;
//!
//! let config = ParamsConfig::load().expect("Failed to load config");
//! println!("state dir: {}", config.infra.paths.state_dir.display());
//! println!("schema timeout: {}ms", config.infra.client.schema_timeout_ms);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/paramsremote/config.toml` (system)
//! 2. `~/.config/paramsremote/config.toml` (user)
//! 3. `./paramsremote.toml` (local override, replaced by `--config`)
//! 4. Environment variables (`PARAMSREMOTE_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! state_dir = "~/.local/share/paramsremote"
//!
//! [client]
//! default_port = 8000
//! schema_timeout_ms = 1000
//! schema_attempts = 3
//! allow_duplicates = true
//!
//! [telemetry]
//! log_level = "info"
//!
//! [bootstrap]
//! sessions = ["wsock-127.0.0.1:8081"]
//! ```

pub mod bootstrap;
pub mod infra;
pub mod loader;

pub use bootstrap::BootstrapConfig;
pub use infra::{ClientConfig, InfraConfig, PathsConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete paramsremote configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamsConfig {
    /// Infrastructure - cannot change at runtime.
    #[serde(flatten)]
    pub infra: InfraConfig,

    /// Bootstrap - seeds the client registry.
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl ParamsConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration, letting `config_path` replace `./paramsremote.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report which files and env vars were applied.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in loader::discover_config_files_with_override(config_path) {
            let table = loader::read_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let mut config = loader::from_table(merged, Path::new("<merged>"))?;
        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Per-attempt schema timeout as a `Duration`.
    pub fn schema_timeout(&self) -> Duration {
        Duration::from_millis(self.infra.client.schema_timeout_ms)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Built by hand so the sections come out in a stable, readable order
        let mut output = String::new();

        output.push_str("# paramsremote configuration\n\n");

        output.push_str("[paths]\n");
        output.push_str(&format!(
            "state_dir = \"{}\"\n",
            self.infra.paths.state_dir.display()
        ));

        output.push_str("\n[client]\n");
        output.push_str(&format!(
            "default_port = {}\n",
            self.infra.client.default_port
        ));
        output.push_str(&format!(
            "schema_timeout_ms = {}\n",
            self.infra.client.schema_timeout_ms
        ));
        output.push_str(&format!(
            "schema_attempts = {}\n",
            self.infra.client.schema_attempts
        ));
        output.push_str(&format!(
            "allow_duplicates = {}\n",
            self.infra.client.allow_duplicates
        ));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!(
            "log_level = \"{}\"\n",
            self.infra.telemetry.log_level
        ));

        output.push_str("\n[bootstrap]\n");
        output.push_str("sessions = [\n");
        for id in &self.bootstrap.sessions {
            output.push_str(&format!("    \"{}\",\n", id));
        }
        output.push_str("]\n");

        output
    }
}
