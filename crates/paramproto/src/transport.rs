//! Transport-facing interfaces of a client.
//!
//! [`Output`] is what callers use to talk to the remote process;
//! [`Input`] is what the transport reports back. Each transport provides its
//! own `Output`; every transport shares the same `Input` event set.

use std::collections::BTreeMap;

use tracing::warn;

use crate::schema::Schema;
use crate::signal::Signal;
use crate::value::ParamValue;

/// Errors surfaced by an [`Output`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("{transport}: {operation} is not implemented")]
    NotImplemented {
        transport: &'static str,
        operation: &'static str,
    },
}

/// Commands a client can send to its remote process.
pub trait Output: Send + Sync {
    /// Ask the remote for its current schema.
    fn request_schema(&self) -> Result<(), TransportError>;

    fn confirm(&self) -> Result<(), TransportError>;

    fn send_value(&self, path: &str, value: &ParamValue) -> Result<(), TransportError>;

    /// Tell the remote we are leaving.
    fn disconnect(&self) -> Result<(), TransportError>;

    /// Send each entry on its own. Not atomic: on error, earlier entries
    /// have already gone out.
    fn send_values(&self, values: &BTreeMap<String, ParamValue>) -> Result<(), TransportError> {
        for (path, value) in values {
            self.send_value(path, value)?;
        }
        Ok(())
    }
}

/// Stand-in used whenever there is no socket. Every call is a logged no-op.
#[derive(Debug, Clone)]
pub struct InertOutput {
    name: String,
}

impl InertOutput {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Output for InertOutput {
    fn request_schema(&self) -> Result<(), TransportError> {
        warn!("{}: not connected, dropping schema request", self.name);
        Ok(())
    }

    fn confirm(&self) -> Result<(), TransportError> {
        warn!("{}: not connected, dropping confirm", self.name);
        Ok(())
    }

    fn send_value(&self, path: &str, _value: &ParamValue) -> Result<(), TransportError> {
        warn!("{}: not connected, dropping value for {}", self.name, path);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// A value reported by the remote, still in wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteValue {
    pub path: String,
    pub raw: String,
}

/// Events a transport reports back to its client.
#[derive(Debug, Default)]
pub struct Input {
    pub value: Signal<RemoteValue>,
    pub schema: Signal<Schema>,
    /// Remote-initiated or error-driven teardown.
    pub disconnect: Signal<()>,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }
}
