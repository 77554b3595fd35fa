//! The set of live clients and their persisted identities.
//!
//! Every connect and disconnect rewrites the persisted id list, so
//! [`ClientRegistry::restore`] can rebuild the same sessions on the next
//! start. Persistence failures are logged; the in-memory set stays
//! authoritative.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::client::{Client, ClientError, ClientId, ConnectionState, TransportKind};
use crate::osc::OscClient;
use crate::retry::RetryConfig;
use crate::settings::{GlobalSettings, SessionSettings, SettingsError, SettingsStore};
use crate::signal::Signal;
use crate::ws::WebsocketsClient;

/// What `connect` does when a client with the same id is already registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Register the new client alongside the old one
    #[default]
    Allow,
    /// Keep the existing client and hand it back
    Reuse,
}

impl DuplicatePolicy {
    pub fn from_allow(allow_duplicates: bool) -> Self {
        if allow_duplicates {
            DuplicatePolicy::Allow
        } else {
            DuplicatePolicy::Reuse
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("No client with id {0}")]
    NotFound(String),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Build a fresh, unconnected client for `id`.
pub fn client_from_id(id: &ClientId, retry: RetryConfig) -> Arc<dyn Client> {
    match id.kind {
        TransportKind::Wsock => Arc::new(WebsocketsClient::from_id(id.clone(), retry)),
        TransportKind::Osc => Arc::new(OscClient::from_id(id.clone())),
    }
}

pub struct ClientRegistry {
    clients: RwLock<Vec<Arc<dyn Client>>>,
    settings: Arc<dyn SettingsStore>,
    policy: DuplicatePolicy,
    retry: RetryConfig,
    connected: Signal<Arc<dyn Client>>,
    disconnected: Signal<String>,
}

impl ClientRegistry {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            clients: RwLock::new(Vec::new()),
            settings,
            policy: DuplicatePolicy::default(),
            retry: RetryConfig::default(),
            connected: Signal::new(),
            disconnected: Signal::new(),
        }
    }

    pub fn with_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Retry behaviour for clients built by [`ClientRegistry::connect_id`]
    /// and [`ClientRegistry::restore`].
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Start `client` and register it.
    ///
    /// Under [`DuplicatePolicy::Reuse`] an already registered client with the
    /// same id is returned instead and `client` is left untouched, unless the
    /// registered one has lost its connection. A client never restarts, so
    /// that one is unregistered and `client` takes its place.
    pub fn connect(&self, client: Arc<dyn Client>) -> Result<Arc<dyn Client>, RegistryError> {
        self.register(client, true)
    }

    /// Build a client for `id` and [`connect`](Self::connect) it.
    pub fn connect_id(&self, id: &ClientId) -> Result<Arc<dyn Client>, RegistryError> {
        self.connect(client_from_id(id, self.retry))
    }

    fn register(
        &self,
        client: Arc<dyn Client>,
        persist: bool,
    ) -> Result<Arc<dyn Client>, RegistryError> {
        let id = client.id().to_string();

        if self.policy == DuplicatePolicy::Reuse {
            match self.get_client(&id) {
                Ok(existing) if existing.state() != ConnectionState::Disconnected => {
                    debug!("{}: Already registered, reusing", id);
                    return Ok(existing);
                }
                Ok(dead) => {
                    debug!("{}: Registered client is disconnected, replacing it", id);
                    self.clients.write().retain(|c| !Arc::ptr_eq(c, &dead));
                    self.disconnected.emit(&id);
                }
                Err(_) => {}
            }
        }

        client.connect()?;
        self.clients.write().push(client.clone());
        info!("{}: Registered ({} clients)", id, self.len());
        if persist {
            self.persist();
        }
        self.connected.emit(&client);
        Ok(client)
    }

    /// Disconnect and unregister. Returns `false` if `id` is unknown.
    pub fn disconnect(&self, id: &str) -> bool {
        let removed = {
            let mut clients = self.clients.write();
            let index = clients.iter().position(|c| c.id().to_string() == id);
            index.map(|index| clients.remove(index))
        };

        let Some(client) = removed else {
            warn!("{}: Not registered, nothing to disconnect", id);
            return false;
        };

        client.disconnect();
        info!("{}: Unregistered ({} clients)", id, self.len());
        self.persist();
        self.disconnected.emit(&id.to_string());
        true
    }

    pub fn get_client(&self, id: &str) -> Result<Arc<dyn Client>, RegistryError> {
        self.clients
            .read()
            .iter()
            .find(|c| c.id().to_string() == id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    pub fn get_clients(&self) -> Vec<Arc<dyn Client>> {
        self.clients.read().clone()
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    /// Ids persisted by earlier runs.
    pub fn persisted_ids(&self) -> Result<Vec<String>, RegistryError> {
        Ok(self.settings.global_settings()?.client_ids)
    }

    /// Reconnect every persisted session. Returns the clients brought back;
    /// ids that do not parse or fail to start are logged and skipped.
    pub fn restore(&self) -> Result<Vec<Arc<dyn Client>>, RegistryError> {
        let ids = self.persisted_ids()?;
        Ok(self.restore_ids(&ids))
    }

    /// Connect each id in `ids`.
    ///
    /// The persisted list is written once at the end. Ids that do not parse
    /// are dropped from it; ids that parse but fail to start stay in it.
    pub fn restore_ids(&self, ids: &[String]) -> Vec<Arc<dyn Client>> {
        let mut restored = Vec::new();
        let mut kept = Vec::new();
        for raw in ids {
            let id = match raw.parse::<ClientId>() {
                Ok(id) => id,
                Err(e) => {
                    warn!("Skipping persisted session: {}", e);
                    continue;
                }
            };
            kept.push(id.to_string());
            match self.register(client_from_id(&id, self.retry), false) {
                Ok(client) => restored.push(client),
                Err(e) => warn!("{}: Restore failed: {}", raw, e),
            }
        }
        info!("Restored {} of {} sessions", restored.len(), ids.len());

        for client in self.clients.read().iter() {
            let id = client.id().to_string();
            if !kept.contains(&id) {
                kept.push(id);
            }
        }
        self.write_ids(kept);
        restored
    }

    /// Drop `id` from the persisted list without touching live clients.
    pub fn forget(&self, id: &str) -> Result<bool, RegistryError> {
        let mut global = self.settings.global_settings()?;
        let before = global.client_ids.len();
        global.client_ids.retain(|existing| existing != id);
        let removed = global.client_ids.len() != before;
        if removed {
            self.settings.set_global_settings(Some(&global))?;
        }
        self.settings.set_session_settings(id, None)?;
        Ok(removed)
    }

    /// Disconnect everything, keeping the persisted ids for the next start.
    pub fn shutdown(&self) {
        let clients: Vec<Arc<dyn Client>> = self.clients.write().drain(..).collect();
        for client in &clients {
            client.disconnect();
            self.disconnected.emit(&client.id().to_string());
        }
        debug!("Shut down {} clients", clients.len());
    }

    pub fn session_settings(&self, id: &str) -> Result<SessionSettings, RegistryError> {
        Ok(self.settings.session_settings(id)?)
    }

    pub fn set_session_settings(
        &self,
        id: &str,
        settings: Option<&SessionSettings>,
    ) -> Result<(), RegistryError> {
        Ok(self.settings.set_session_settings(id, settings)?)
    }

    /// Fires with each newly registered client.
    pub fn connected(&self) -> &Signal<Arc<dyn Client>> {
        &self.connected
    }

    /// Fires with the id of each unregistered client.
    pub fn disconnected(&self) -> &Signal<String> {
        &self.disconnected
    }

    fn persist(&self) {
        let client_ids = self
            .clients
            .read()
            .iter()
            .map(|c| c.id().to_string())
            .collect();
        self.write_ids(client_ids);
    }

    fn write_ids(&self, client_ids: Vec<String>) {
        if let Err(e) = self
            .settings
            .set_global_settings(Some(&GlobalSettings { client_ids }))
        {
            warn!("Failed to persist session ids: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettingsStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry(policy: DuplicatePolicy) -> (ClientRegistry, Arc<MemorySettingsStore>) {
        let store = Arc::new(MemorySettingsStore::new());
        (ClientRegistry::new(store.clone()).with_policy(policy), store)
    }

    #[test]
    fn connect_persists_and_notifies() {
        let (registry, store) = registry(DuplicatePolicy::Allow);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let _sub = registry.connected().subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        registry.connect_id(&ClientId::osc("a", 1)).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(store.global_settings().unwrap().client_ids, vec!["osc-a:1"]);
        assert!(registry.get_client("osc-a:1").is_ok());
    }

    #[test]
    fn unknown_ids() {
        let (registry, _) = registry(DuplicatePolicy::Allow);
        assert!(matches!(
            registry.get_client("osc-nope:1"),
            Err(RegistryError::NotFound(id)) if id == "osc-nope:1"
        ));
        assert!(!registry.disconnect("osc-nope:1"));
    }

    #[test]
    fn duplicate_policy() {
        let (allow, _) = registry(DuplicatePolicy::Allow);
        allow.connect_id(&ClientId::osc("a", 1)).unwrap();
        allow.connect_id(&ClientId::osc("a", 1)).unwrap();
        assert_eq!(allow.len(), 2);

        let (reuse, _) = registry(DuplicatePolicy::Reuse);
        let first = reuse.connect_id(&ClientId::osc("a", 1)).unwrap();
        let second = reuse.connect_id(&ClientId::osc("a", 1)).unwrap();
        assert_eq!(reuse.len(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn reuse_replaces_a_dead_client() {
        let (registry, store) = registry(DuplicatePolicy::Reuse);
        let first = registry.connect_id(&ClientId::osc("a", 1)).unwrap();
        // torn down behind the registry's back
        first.disconnect();

        let second = registry.connect_id(&ClientId::osc("a", 1)).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.state(), ConnectionState::AwaitingSchema);
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.get_client("osc-a:1").unwrap(), &second));
        assert_eq!(store.global_settings().unwrap().client_ids, vec!["osc-a:1"]);
    }

    #[test]
    fn restore_keeps_ids_that_fail_to_start() {
        let (registry, store) = registry(DuplicatePolicy::Allow);
        store
            .set_global_settings(Some(&GlobalSettings {
                client_ids: vec!["osc-a:1".into(), "wsock-h:1".into(), "osc-b:2".into()],
            }))
            .unwrap();

        // no tokio runtime here, so the websocket client cannot start
        let restored = registry.restore().unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(
            store.global_settings().unwrap().client_ids,
            vec!["osc-a:1", "wsock-h:1", "osc-b:2"]
        );
    }

    #[test]
    fn disconnect_unpersists() {
        let (registry, store) = registry(DuplicatePolicy::Allow);
        let client = registry.connect_id(&ClientId::osc("a", 1)).unwrap();
        registry.connect_id(&ClientId::osc("b", 2)).unwrap();

        assert!(registry.disconnect("osc-a:1"));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(store.global_settings().unwrap().client_ids, vec!["osc-b:2"]);
    }

    #[test]
    fn restore_skips_garbage_ids() {
        let (registry, store) = registry(DuplicatePolicy::Allow);
        store
            .set_global_settings(Some(&GlobalSettings {
                client_ids: vec!["osc-a:1".into(), "bogus".into(), "osc-b:2".into()],
            }))
            .unwrap();

        let restored = registry.restore().unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(
            store.global_settings().unwrap().client_ids,
            vec!["osc-a:1", "osc-b:2"]
        );
    }

    #[test]
    fn shutdown_keeps_persisted_ids() {
        let (registry, store) = registry(DuplicatePolicy::Allow);
        let client = registry.connect_id(&ClientId::osc("a", 1)).unwrap();
        registry.shutdown();

        assert!(registry.is_empty());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(store.global_settings().unwrap().client_ids, vec!["osc-a:1"]);
    }

    #[test]
    fn forget_drops_id_and_session_settings() {
        let (registry, store) = registry(DuplicatePolicy::Allow);
        registry.connect_id(&ClientId::osc("a", 1)).unwrap();
        registry
            .set_session_settings(
                "osc-a:1",
                Some(&SessionSettings {
                    live_updates: Some(true),
                    ..Default::default()
                }),
            )
            .unwrap();

        assert!(registry.forget("osc-a:1").unwrap());
        assert!(store.global_settings().unwrap().client_ids.is_empty());
        assert_eq!(
            registry.session_settings("osc-a:1").unwrap(),
            SessionSettings::default()
        );
        assert!(!registry.forget("osc-a:1").unwrap());
    }
}
