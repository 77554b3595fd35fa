//! paramproto - Remote param sync for paramsremote
//!
//! A remote process exposes a dynamic set of named, typed params. This crate
//! mirrors them locally, keeps them in sync over a small text protocol and
//! remembers which sessions were open.
//!
//! ## Layers
//!
//! - [`value`], [`param`], [`params`]: the typed, observable param model
//! - [`schema`]: diff-based reconciliation of a [`Params`] with a remote schema
//! - [`frame`]: the text frame codec (`GET schema.json`, `POST /path?value=..`)
//! - [`transport`], [`ws`], [`osc`]: the [`Client`] implementations
//! - [`registry`], [`settings`], [`session`]: live sessions and persistence
//!
//! ## Usage
//!
//! ```ignore
//! let store = Arc::new(FileSettingsStore::new(config.infra.paths.state_dir.clone()));
//! let registry = ClientRegistry::new(store).with_retry(RetryConfig::from(&config.infra.client));
//! let client = registry.connect_id(&ClientId::wsock("127.0.0.1", 8000))?;
//!
//! let _sub = client.params().value_change().subscribe(|change| {
//!     println!("{} = {}", change.path, change.value);
//! });
//! client.output().send_value("/osc/freq", &ParamValue::Float(440.0))?;
//! ```
//!
//! Everything runs on the caller's tokio runtime. Each WebSocket client
//! spawns one reactor task that owns its socket.

pub mod client;
pub mod frame;
pub mod osc;
pub mod param;
pub mod params;
pub mod registry;
pub mod retry;
pub mod schema;
pub mod session;
pub mod settings;
pub mod signal;
pub mod transport;
pub mod value;
pub mod ws;

pub use client::{Client, ClientError, ClientId, ConnectionState, TransportKind};
pub use frame::{Frame, FrameError};
pub use osc::{OscClient, OscOutput};
pub use param::{Param, ParamOpts};
pub use params::{GetValuesOptions, Params, ValueChange};
pub use registry::{client_from_id, ClientRegistry, DuplicatePolicy, RegistryError};
pub use retry::{RetryConfig, SchemaRetry};
pub use schema::{ParamDescriptor, Schema, SchemaDiff, SchemaError};
pub use session::{restore_session_values, save_session_values, snapshot_values, SessionError};
pub use settings::{
    FileSettingsStore, GlobalSettings, MemorySettingsStore, SessionSettings, SettingsError,
    SettingsStore,
};
pub use signal::{Signal, Subscription};
pub use transport::{InertOutput, Input, Output, RemoteValue, TransportError};
pub use value::{ParamType, ParamValue};
pub use ws::{WebsocketsClient, WsOutput};
