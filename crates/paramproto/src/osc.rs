//! OSC client placeholder.
//!
//! Fulfils the [`Client`] contract so OSC sessions can be listed, persisted
//! and restored, but nothing goes over UDP yet: the output reports
//! [`TransportError::NotImplemented`] and no schema ever arrives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::client::{set_state, Client, ClientError, ClientId, ConnectionState};
use crate::params::Params;
use crate::schema::Schema;
use crate::transport::{Input, Output, TransportError};
use crate::value::ParamValue;

/// Output that refuses everything except leaving.
#[derive(Debug, Clone)]
pub struct OscOutput {
    name: String,
}

impl OscOutput {
    fn unsupported(&self, operation: &'static str) -> Result<(), TransportError> {
        debug!("{}: {} over OSC is not supported", self.name, operation);
        Err(TransportError::NotImplemented {
            transport: "osc",
            operation,
        })
    }
}

impl Output for OscOutput {
    fn request_schema(&self) -> Result<(), TransportError> {
        self.unsupported("request_schema")
    }

    fn confirm(&self) -> Result<(), TransportError> {
        self.unsupported("confirm")
    }

    fn send_value(&self, _path: &str, _value: &ParamValue) -> Result<(), TransportError> {
        self.unsupported("send_value")
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

pub struct OscClient {
    id: ClientId,
    params: Arc<Params>,
    input: Input,
    output: Arc<OscOutput>,
    status: watch::Sender<ConnectionState>,
    started: AtomicBool,
    last_schema: Mutex<Option<Schema>>,
}

impl OscClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::from_id(ClientId::osc(host, port))
    }

    /// Counts as connected from construction on.
    pub fn from_id(id: ClientId) -> Self {
        let (status, _) = watch::channel(ConnectionState::AwaitingSchema);
        Self {
            output: Arc::new(OscOutput {
                name: id.to_string(),
            }),
            id,
            params: Arc::new(Params::new()),
            input: Input::new(),
            status,
            started: AtomicBool::new(false),
            last_schema: Mutex::new(None),
        }
    }
}

impl Client for OscClient {
    fn id(&self) -> &ClientId {
        &self.id
    }

    fn connect(&self) -> Result<(), ClientError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ClientError::AlreadyStarted(self.id.to_string()));
        }
        info!("{}: OSC transport is a placeholder, nothing to open", self.id);
        Ok(())
    }

    fn disconnect(&self) {
        if *self.status.borrow() == ConnectionState::Disconnected {
            return;
        }
        set_state(&self.status, ConnectionState::Disconnected);
        self.input.disconnect.emit(&());
    }

    fn state(&self) -> ConnectionState {
        *self.status.borrow()
    }

    fn status(&self) -> watch::Receiver<ConnectionState> {
        self.status.subscribe()
    }

    fn params(&self) -> &Arc<Params> {
        &self.params
    }

    fn output(&self) -> Arc<dyn Output> {
        self.output.clone()
    }

    fn input(&self) -> &Input {
        &self.input
    }

    fn last_schema(&self) -> Option<Schema> {
        self.last_schema.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn connected_until_disconnect() {
        let client = OscClient::new("synth.local", 57120);
        assert_eq!(client.id().to_string(), "osc-synth.local:57120");
        assert_eq!(client.state(), ConnectionState::AwaitingSchema);

        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        let _sub = client.input().disconnect.subscribe(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });

        client.connect().unwrap();
        assert_eq!(client.state(), ConnectionState::AwaitingSchema);

        client.disconnect();
        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn operations_are_not_implemented() {
        let client = OscClient::new("localhost", 9000);
        let out = client.output();
        assert!(matches!(
            out.send_value("/a", &ParamValue::Int(1)),
            Err(TransportError::NotImplemented { operation: "send_value", .. })
        ));
        assert!(out.request_schema().is_err());
        assert!(out.confirm().is_err());
        assert!(out.disconnect().is_ok());
    }

    #[test]
    fn runs_once() {
        let client = OscClient::new("localhost", 9000);
        client.connect().unwrap();
        assert!(matches!(client.connect(), Err(ClientError::AlreadyStarted(_))));
    }
}
