//! The client contract shared by every transport.
//!
//! A client owns one [`Params`] collection and one transport pair for one
//! remote process. Instances run once: after `disconnect()` (or a dropped
//! socket) a fresh client is built from the same [`ClientId`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::watch;

use crate::params::Params;
use crate::schema::Schema;
use crate::transport::{Input, Output};

/// Connection lifecycle. Only ever moves forward, then ends in `Disconnected`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not started, or finished
    Disconnected = 0,
    /// Socket is being opened
    Connecting = 1,
    /// Socket open, schema requested but not seen yet
    AwaitingSchema = 2,
    /// At least one schema has been applied
    Synced = 3,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::AwaitingSchema => "awaiting-schema",
            ConnectionState::Synced => "synced",
        }
    }

    /// Open from the caller's point of view: values can be sent.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            ConnectionState::AwaitingSchema | ConnectionState::Synced
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which transport a client id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Wsock,
    Osc,
}

impl TransportKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            TransportKind::Wsock => "wsock",
            TransportKind::Osc => "osc",
        }
    }
}

/// Stable client identity, rendered as `{kind}-{host}:{port}`.
///
/// The rendered form is what gets persisted; parsing it back yields an equal
/// id, which is how sessions are restored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId {
    pub kind: TransportKind,
    pub host: String,
    pub port: u16,
}

impl ClientId {
    pub fn new(kind: TransportKind, host: impl Into<String>, port: u16) -> Self {
        Self {
            kind,
            host: host.into(),
            port,
        }
    }

    pub fn wsock(host: impl Into<String>, port: u16) -> Self {
        Self::new(TransportKind::Wsock, host, port)
    }

    pub fn osc(host: impl Into<String>, port: u16) -> Self {
        Self::new(TransportKind::Osc, host, port)
    }

    /// `ws://host:port`
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}:{}", self.kind.prefix(), self.host, self.port)
    }
}

impl FromStr for ClientId {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ClientError::InvalidId(s.to_string());

        let (kind, rest) = if let Some(rest) = s.strip_prefix("wsock-") {
            (TransportKind::Wsock, rest)
        } else if let Some(rest) = s.strip_prefix("osc-") {
            (TransportKind::Osc, rest)
        } else {
            return Err(invalid());
        };

        let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        Ok(Self::new(kind, host, port))
    }
}

/// Errors from the client lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("{0}: client already started, build a new one to reconnect")]
    AlreadyStarted(String),
    #[error("Not a client id: {0:?}")]
    InvalidId(String),
    #[error("No tokio runtime available to run the connection")]
    NoRuntime,
}

/// One logical connection to a remote param server.
pub trait Client: Send + Sync {
    fn id(&self) -> &ClientId;

    /// Start the connection. Returns immediately; progress shows up on
    /// [`Client::status`].
    fn connect(&self) -> Result<(), ClientError>;

    /// Leave: notify the remote if possible, close, go `Disconnected`.
    fn disconnect(&self);

    fn state(&self) -> ConnectionState;

    /// Receiver for state transitions.
    fn status(&self) -> watch::Receiver<ConnectionState>;

    fn params(&self) -> &Arc<Params>;

    fn output(&self) -> Arc<dyn Output>;

    fn input(&self) -> &Input;

    /// Last schema received, kept for replay.
    fn last_schema(&self) -> Option<Schema>;
}

impl fmt::Debug for dyn Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id().to_string())
            .field("state", &self.state())
            .field("params", &self.params().len())
            .finish()
    }
}

/// Publish `state` unless it is already current.
pub(crate) fn set_state(status: &watch::Sender<ConnectionState>, state: ConnectionState) {
    status.send_if_modified(|current| {
        if *current == state {
            false
        } else {
            *current = state;
            true
        }
    });
}
