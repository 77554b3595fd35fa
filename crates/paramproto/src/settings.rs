//! Persisted settings: the global session list and per-session preferences.
//!
//! Keys are `global` and `session_settings-{id}`. [`FileSettingsStore`]
//! keeps one JSON document per key in the state directory;
//! [`MemorySettingsStore`] keeps them in a map.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::value::ParamValue;

const GLOBAL_KEY: &str = "global";

/// Storage key for one session's settings.
pub fn session_key(id: &str) -> String {
    format!("session_settings-{}", id)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    /// Ids of the sessions to restore on startup
    #[serde(default)]
    pub client_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_updates: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist_view: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapsed_paths: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_values_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_values: Option<BTreeMap<String, ParamValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Bad settings JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Where the registry keeps its session list and session preferences.
///
/// Setting `None` clears the entry; reading a missing entry yields defaults.
pub trait SettingsStore: Send + Sync {
    fn global_settings(&self) -> Result<GlobalSettings, SettingsError>;

    fn set_global_settings(&self, settings: Option<&GlobalSettings>) -> Result<(), SettingsError>;

    fn session_settings(&self, id: &str) -> Result<SessionSettings, SettingsError>;

    fn set_session_settings(
        &self,
        id: &str,
        settings: Option<&SessionSettings>,
    ) -> Result<(), SettingsError>;
}

/// One `<key>.json` file per entry under a directory.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    dir: PathBuf,
}

impl FileSettingsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`. `:` is not portable in file names.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key.replace(':', "_")))
    }

    fn read<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, SettingsError> {
        let path = self.path_for(key);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(T::default()),
            Err(source) => return Err(SettingsError::Io { path, source }),
        };
        serde_json::from_str(&text).map_err(|source| SettingsError::Json { path, source })
    }

    fn write<T: Serialize>(&self, key: &str, value: Option<&T>) -> Result<(), SettingsError> {
        let path = self.path_for(key);
        let Some(value) = value else {
            return match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(source) => Err(SettingsError::Io { path, source }),
            };
        };

        fs::create_dir_all(&self.dir).map_err(|source| SettingsError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let text = serde_json::to_string_pretty(value).map_err(|source| SettingsError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, text).map_err(|source| SettingsError::Io {
            path: path.clone(),
            source,
        })?;
        debug!("Wrote settings {}", path.display());
        Ok(())
    }
}

impl SettingsStore for FileSettingsStore {
    fn global_settings(&self) -> Result<GlobalSettings, SettingsError> {
        self.read(GLOBAL_KEY)
    }

    fn set_global_settings(&self, settings: Option<&GlobalSettings>) -> Result<(), SettingsError> {
        self.write(GLOBAL_KEY, settings)
    }

    fn session_settings(&self, id: &str) -> Result<SessionSettings, SettingsError> {
        self.read(&session_key(id))
    }

    fn set_session_settings(
        &self,
        id: &str,
        settings: Option<&SessionSettings>,
    ) -> Result<(), SettingsError> {
        self.write(&session_key(id), settings)
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    global: Mutex<Option<GlobalSettings>>,
    sessions: Mutex<HashMap<String, SessionSettings>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn global_settings(&self) -> Result<GlobalSettings, SettingsError> {
        Ok(self.global.lock().clone().unwrap_or_default())
    }

    fn set_global_settings(&self, settings: Option<&GlobalSettings>) -> Result<(), SettingsError> {
        *self.global.lock() = settings.cloned();
        Ok(())
    }

    fn session_settings(&self, id: &str) -> Result<SessionSettings, SettingsError> {
        Ok(self
            .sessions
            .lock()
            .get(&session_key(id))
            .cloned()
            .unwrap_or_default())
    }

    fn set_session_settings(
        &self,
        id: &str,
        settings: Option<&SessionSettings>,
    ) -> Result<(), SettingsError> {
        let mut sessions = self.sessions.lock();
        match settings {
            Some(settings) => {
                sessions.insert(session_key(id), settings.clone());
            }
            None => {
                sessions.remove(&session_key(id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn session_settings_use_camel_case() {
        let settings = SessionSettings {
            live_updates: Some(true),
            restore_values_enabled: Some(false),
            collapsed_paths: Some(vec!["/osc".into()]),
            ..Default::default()
        };
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "liveUpdates": true,
                "restoreValuesEnabled": false,
                "collapsedPaths": ["/osc"],
            })
        );
    }

    #[test]
    fn global_settings_tolerate_missing_ids() {
        let parsed: GlobalSettings = serde_json::from_str("{}").unwrap();
        assert!(parsed.client_ids.is_empty());
    }

    #[test]
    fn memory_store_clears_with_none() {
        let store = MemorySettingsStore::new();
        let settings = SessionSettings {
            style: Some("dark".into()),
            ..Default::default()
        };
        store.set_session_settings("wsock-a:1", Some(&settings)).unwrap();
        assert_eq!(store.session_settings("wsock-a:1").unwrap(), settings);

        store.set_session_settings("wsock-a:1", None).unwrap();
        assert_eq!(store.session_settings("wsock-a:1").unwrap(), SessionSettings::default());
    }

    #[test]
    fn file_names_are_portable() {
        let store = FileSettingsStore::new("/state");
        assert_eq!(
            store.path_for(&session_key("wsock-127.0.0.1:8081")),
            PathBuf::from("/state/session_settings-wsock-127.0.0.1_8081.json")
        );
        assert_eq!(store.path_for("global"), PathBuf::from("/state/global.json"));
    }
}
