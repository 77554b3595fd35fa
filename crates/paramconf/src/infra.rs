//! Infrastructure configuration - fixed for the lifetime of the process.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Filesystem paths for persisted session state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding `global.json` and the per-session settings files.
    /// Default: ~/.local/share/paramsremote
    #[serde(default = "PathsConfig::default_state_dir")]
    pub state_dir: PathBuf,
}

impl PathsConfig {
    fn default_state_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".local/share/paramsremote"))
            .unwrap_or_else(|| PathBuf::from(".local/share/paramsremote"))
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: Self::default_state_dir(),
        }
    }
}

/// Client behaviour: ports, schema discovery and the registry duplicate policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Port used when a host is given without one.
    /// Default: 8000
    #[serde(default = "ClientConfig::default_port")]
    pub default_port: u16,

    /// How long to wait for a schema before asking again.
    /// Default: 1000
    #[serde(default = "ClientConfig::default_schema_timeout_ms")]
    pub schema_timeout_ms: u64,

    /// Total schema requests per connection, the first one included.
    /// Default: 3
    #[serde(default = "ClientConfig::default_schema_attempts")]
    pub schema_attempts: u32,

    /// Allow several live clients with the same id.
    /// Default: true
    #[serde(default = "ClientConfig::default_allow_duplicates")]
    pub allow_duplicates: bool,
}

impl ClientConfig {
    fn default_port() -> u16 {
        8000
    }

    fn default_schema_timeout_ms() -> u64 {
        1000
    }

    fn default_schema_attempts() -> u32 {
        3
    }

    fn default_allow_duplicates() -> bool {
        true
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_port: Self::default_port(),
            schema_timeout_ms: Self::default_schema_timeout_ms(),
            schema_attempts: Self::default_schema_attempts(),
            allow_duplicates: Self::default_allow_duplicates(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `tracing_subscriber::EnvFilter` directive.
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

/// Everything that cannot change once the process is up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfraConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}
