//! CLI command implementations

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use paramconf::ParamsConfig;
use paramproto::{
    restore_session_values, save_session_values, Client, ClientId, ClientRegistry,
    ConnectionState, DuplicatePolicy, FileSettingsStore, GetValuesOptions, GlobalSettings,
    ParamValue, RetryConfig, SessionSettings, SettingsError, SettingsStore, TransportKind,
    ValueChange,
};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::render;

/// Shared state for one invocation.
pub struct Ctx {
    pub config: ParamsConfig,
    pub wait: Duration,
    store: Arc<FileSettingsStore>,
}

impl Ctx {
    pub fn new(config: ParamsConfig, wait: Duration) -> Self {
        let store = Arc::new(FileSettingsStore::new(
            config.infra.paths.state_dir.clone(),
        ));
        Self {
            config,
            wait,
            store,
        }
    }

    /// A registry whose connects and disconnects rewrite the remembered list.
    fn persistent_registry(&self) -> ClientRegistry {
        self.registry(self.store.clone())
    }

    /// A registry that reads the remembered list but never rewrites it.
    fn ephemeral_registry(&self) -> ClientRegistry {
        self.registry(Arc::new(ReadOnlySessions(self.store.clone())))
    }

    fn registry(&self, store: Arc<dyn SettingsStore>) -> ClientRegistry {
        ClientRegistry::new(store)
            .with_policy(DuplicatePolicy::from_allow(
                self.config.infra.client.allow_duplicates,
            ))
            .with_retry(RetryConfig::from(&self.config.infra.client))
    }
}

/// Passes session settings through but leaves the remembered id list alone,
/// so one-shot commands do not clobber it.
struct ReadOnlySessions(Arc<FileSettingsStore>);

impl SettingsStore for ReadOnlySessions {
    fn global_settings(&self) -> Result<GlobalSettings, SettingsError> {
        self.0.global_settings()
    }

    fn set_global_settings(&self, _settings: Option<&GlobalSettings>) -> Result<(), SettingsError> {
        debug!("Leaving remembered sessions untouched");
        Ok(())
    }

    fn session_settings(&self, id: &str) -> Result<SessionSettings, SettingsError> {
        self.0.session_settings(id)
    }

    fn set_session_settings(
        &self,
        id: &str,
        settings: Option<&SessionSettings>,
    ) -> Result<(), SettingsError> {
        self.0.set_session_settings(id, settings)
    }
}

fn parse_id(id: &str) -> Result<ClientId> {
    id.parse::<ClientId>()
        .with_context(|| format!("'{}' is not a session id (try wsock-HOST:PORT)", id))
}

/// Connect `id` through `registry` and wait until its schema is in.
async fn open(ctx: &Ctx, registry: &ClientRegistry, id: &ClientId) -> Result<Arc<dyn Client>> {
    if id.kind == TransportKind::Osc {
        bail!("{}: OSC sessions do not carry a schema yet", id);
    }

    let client = registry.connect_id(id)?;
    wait_for_schema(ctx, client.as_ref()).await?;
    Ok(client)
}

async fn wait_for_schema(ctx: &Ctx, client: &dyn Client) -> Result<()> {
    let mut status = client.status();
    let reached = tokio::time::timeout(
        ctx.wait,
        status.wait_for(|s| matches!(s, ConnectionState::Synced | ConnectionState::Disconnected)),
    )
    .await;

    match reached {
        Ok(Ok(state)) if *state == ConnectionState::Synced => Ok(()),
        Ok(_) => bail!("{}: connection failed", client.id()),
        Err(_) => bail!(
            "{}: no schema within {}ms",
            client.id(),
            ctx.wait.as_millis()
        ),
    }
}

/// Disconnect everything and give each reactor a moment to say goodbye.
async fn close(registry: &ClientRegistry) {
    let clients = registry.get_clients();
    let done: Vec<(Arc<Notify>, _)> = clients
        .iter()
        .map(|client| {
            let notify = Arc::new(Notify::new());
            let n = notify.clone();
            let sub = client.input().disconnect.subscribe(move |_| n.notify_one());
            (notify, sub)
        })
        .collect();

    registry.shutdown();

    for (notify, _sub) in &done {
        let _ = tokio::time::timeout(Duration::from_secs(1), notify.notified()).await;
    }
}

/// Print value changes of every registered client until Ctrl-C or until the
/// ones still connected have all gone away.
async fn watch(registry: &ClientRegistry) -> Result<()> {
    let mut subs = Vec::new();
    let mut live = JoinSet::new();

    for client in registry.get_clients() {
        let id = client.id().to_string();
        subs.push(
            client
                .params()
                .value_change()
                .subscribe(move |change: &ValueChange| render::print_change(&id, change)),
        );
        if client.state() != ConnectionState::Disconnected {
            let mut status = client.status();
            live.spawn(async move {
                let _ = status.wait_for(|s| *s == ConnectionState::Disconnected).await;
            });
        }
    }

    if live.is_empty() {
        info!("No live sessions to watch");
        return Ok(());
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
            done = live.join_next() => {
                if done.is_none() {
                    break;
                }
            }
        }
    }
    Ok(())
}

pub async fn connect(
    ctx: &Ctx,
    host: &str,
    port: Option<u16>,
    osc: bool,
    watch_changes: bool,
) -> Result<()> {
    let port = port.unwrap_or(ctx.config.infra.client.default_port);
    let kind = if osc {
        TransportKind::Osc
    } else {
        TransportKind::Wsock
    };
    let id = ClientId::new(kind, host, port);

    let previous = ctx.store.global_settings().unwrap_or_default();
    let registry = ctx.persistent_registry();
    let client = registry.connect_id(&id)?;

    // This process only knows its own client; keep the earlier sessions too
    let mut remembered = previous.client_ids;
    if !remembered.contains(&id.to_string()) {
        remembered.push(id.to_string());
    }
    ctx.store
        .set_global_settings(Some(&GlobalSettings {
            client_ids: remembered,
        }))
        .context("Failed to remember session")?;

    if kind == TransportKind::Wsock {
        if let Err(e) = wait_for_schema(ctx, client.as_ref()).await {
            close(&registry).await;
            return Err(e);
        }
        render::print_params(client.as_ref());
    } else {
        println!("{} (OSC, no schema)", id);
    }

    if watch_changes {
        watch(&registry).await?;
    }
    close(&registry).await;
    Ok(())
}

pub fn sessions(ctx: &Ctx) -> Result<()> {
    let global = ctx
        .store
        .global_settings()
        .context("Failed to read remembered sessions")?;
    if global.client_ids.is_empty() {
        println!("No remembered sessions");
    }
    for id in global.client_ids {
        println!("{}", id);
    }
    Ok(())
}

pub async fn get(ctx: &Ctx, id: &str, images: bool, json: bool) -> Result<()> {
    let id = parse_id(id)?;
    let registry = ctx.ephemeral_registry();
    let result = open(ctx, &registry, &id).await.map(|client| {
        if json {
            let values = client.params().get_values(GetValuesOptions {
                skip_images: !images,
            });
            render::print_values_json(&values)
        } else {
            render::print_values(client.as_ref(), images);
            Ok(())
        }
    });
    close(&registry).await;
    result?
}

pub async fn set(ctx: &Ctx, id: &str, path: &str, raw: &str) -> Result<()> {
    let id = parse_id(id)?;
    let registry = ctx.ephemeral_registry();
    let result = send_one(ctx, &registry, &id, path, |ty| {
        // Unparseable numbers go out as zero rather than NaN
        Ok(ty.coerce_str(raw).or_zero(ty))
    })
    .await;
    close(&registry).await;
    let value = result?;
    println!("{} {} = {}", id, path, value);
    Ok(())
}

pub async fn trigger(ctx: &Ctx, id: &str, path: &str) -> Result<()> {
    let id = parse_id(id)?;
    let registry = ctx.ephemeral_registry();
    let result = send_one(ctx, &registry, &id, path, |ty| {
        if !ty.is_trigger() {
            bail!("{} is a '{}' param, not a trigger", path, ty);
        }
        Ok(ParamValue::Int(0))
    })
    .await;
    close(&registry).await;
    result?;
    println!("{} {} fired", id, path);
    Ok(())
}

async fn send_one<F>(
    ctx: &Ctx,
    registry: &ClientRegistry,
    id: &ClientId,
    path: &str,
    value_for: F,
) -> Result<ParamValue>
where
    F: FnOnce(paramproto::ParamType) -> Result<ParamValue>,
{
    let client = open(ctx, registry, id).await?;
    let param = client
        .params()
        .get(path)
        .ok_or_else(|| anyhow!("{}: no param {}", id, path))?;
    let value = value_for(param.ty())?;
    client.output().send_value(path, &value)?;
    Ok(value)
}

pub fn forget(ctx: &Ctx, id: &str) -> Result<()> {
    let registry = ctx.persistent_registry();
    if registry.forget(id)? {
        println!("Forgot {}", id);
    } else {
        println!("{} was not remembered", id);
    }
    Ok(())
}

pub async fn snapshot(ctx: &Ctx, id: &str) -> Result<()> {
    let parsed = parse_id(id)?;
    let registry = ctx.ephemeral_registry();
    let result = match open(ctx, &registry, &parsed).await {
        Ok(_) => save_session_values(&registry, &parsed.to_string()).map_err(Into::into),
        Err(e) => Err(e),
    };
    close(&registry).await;
    println!("Saved {} values for {}", result?, parsed);
    Ok(())
}

pub async fn restore_values(ctx: &Ctx, id: &str) -> Result<()> {
    let parsed = parse_id(id)?;
    let registry = ctx.ephemeral_registry();
    let result = match open(ctx, &registry, &parsed).await {
        Ok(_) => restore_session_values(&registry, &parsed.to_string()).map_err(Into::into),
        Err(e) => Err(e),
    };
    close(&registry).await;
    let sent = result?;
    if sent == 0 {
        println!("Nothing to restore for {} (is restoreValuesEnabled set?)", parsed);
    } else {
        println!("Sent {} values to {}", sent, parsed);
    }
    Ok(())
}

pub async fn restore(ctx: &Ctx, watch_changes: bool) -> Result<()> {
    let registry = ctx.ephemeral_registry();
    let mut clients = registry.restore()?;
    clients.extend(registry.restore_ids(&ctx.config.bootstrap.sessions));

    if clients.is_empty() {
        println!("No sessions to restore");
        return Ok(());
    }

    for client in &clients {
        if client.id().kind == TransportKind::Osc {
            println!("{} (OSC, no schema)", client.id());
            continue;
        }
        match wait_for_schema(ctx, client.as_ref()).await {
            Ok(()) => println!("{} synced, {} params", client.id(), client.params().len()),
            Err(e) => println!("{}", e),
        }
    }

    if watch_changes {
        watch(&registry).await?;
    }
    close(&registry).await;
    Ok(())
}
