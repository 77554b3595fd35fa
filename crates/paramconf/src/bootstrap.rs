//! Bootstrap configuration - seeds runtime state, then the registry owns it.

use serde::{Deserialize, Serialize};

/// Sessions to open at startup.
///
/// These are client ids (`wsock-host:port`, `osc-host:port`) connected in
/// addition to whatever the settings store remembers from the last run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub sessions: Vec<String>,
}
