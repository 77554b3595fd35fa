//! WebSocket client.
//!
//! Architecture follows a reactor:
//! - The socket is owned by one background task per client
//! - Output calls become commands on an unbounded channel, so they never block
//! - Inbound frames are handled on the reactor in arrival order
//! - The schema retry timer lives inside the reactor and dies with it
//!
//! `connect()` only spawns the reactor; the remote does not need to be up.
//! A failed open or any later socket error ends in `Disconnected` and fires
//! the input `disconnect` event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, trace, warn};

use crate::client::{set_state, Client, ClientError, ClientId, ConnectionState};
use crate::frame::Frame;
use crate::params::Params;
use crate::retry::{RetryConfig, SchemaRetry};
use crate::schema::Schema;
use crate::signal::Subscription;
use crate::transport::{InertOutput, Input, Output, RemoteValue, TransportError};
use crate::value::ParamValue;

/// Command sent to the reactor task
#[derive(Debug)]
enum ReactorCommand {
    /// Write one frame
    Send(Frame),
    /// Send the disconnect notice and close
    Disconnect,
}

/// Output half of a WebSocket client.
///
/// Holds the reactor's command sender while a reactor is running; without
/// one it behaves as an [`InertOutput`].
pub struct WsOutput {
    name: String,
    cmd_tx: Mutex<Option<mpsc::UnboundedSender<ReactorCommand>>>,
    inert: InertOutput,
}

impl WsOutput {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cmd_tx: Mutex::new(None),
            inert: InertOutput::new(name),
        }
    }

    fn attach(&self, tx: mpsc::UnboundedSender<ReactorCommand>) {
        *self.cmd_tx.lock() = Some(tx);
    }

    /// Drop the sender; once every clone is gone the reactor sees a closed
    /// channel.
    fn detach(&self) -> Option<mpsc::UnboundedSender<ReactorCommand>> {
        self.cmd_tx.lock().take()
    }

    pub fn is_attached(&self) -> bool {
        self.cmd_tx.lock().is_some()
    }

    /// Queue `cmd`. Returns it back if no reactor will take it.
    fn dispatch(&self, cmd: ReactorCommand) -> Result<(), ReactorCommand> {
        match self.cmd_tx.lock().as_ref() {
            Some(tx) => tx.send(cmd).map_err(|e| e.0),
            None => Err(cmd),
        }
    }
}

impl Output for WsOutput {
    fn request_schema(&self) -> Result<(), TransportError> {
        match self.dispatch(ReactorCommand::Send(Frame::SchemaRequest)) {
            Ok(()) => Ok(()),
            Err(_) => self.inert.request_schema(),
        }
    }

    fn confirm(&self) -> Result<(), TransportError> {
        match self.dispatch(ReactorCommand::Send(Frame::Confirm)) {
            Ok(()) => Ok(()),
            Err(_) => self.inert.confirm(),
        }
    }

    fn send_value(&self, path: &str, value: &ParamValue) -> Result<(), TransportError> {
        trace!("{}: send {} = {}", self.name, path, value);
        match self.dispatch(ReactorCommand::Send(Frame::value(path, value))) {
            Ok(()) => Ok(()),
            Err(_) => self.inert.send_value(path, value),
        }
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        match self.dispatch(ReactorCommand::Disconnect) {
            Ok(()) => Ok(()),
            Err(_) => self.inert.disconnect(),
        }
    }
}

/// Everything the reactor needs, moved into its task.
struct Reactor {
    name: String,
    url: String,
    retry: SchemaRetry,
    input: Arc<Input>,
    output: Arc<WsOutput>,
    status: Arc<watch::Sender<ConnectionState>>,
    last_schema: Arc<Mutex<Option<Schema>>>,
}

/// Wait for `deadline`, or forever when there is none.
async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

impl Reactor {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<ReactorCommand>) {
        debug!("{}: Reactor task started, opening {}", self.name, self.url);

        // Phase 1: open the socket, still honouring an early disconnect
        let opening = connect_async(self.url.clone());
        tokio::pin!(opening);
        let ws = loop {
            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => match cmd {
                    Some(ReactorCommand::Send(frame)) => {
                        warn!("{}: not open yet, dropping {} frame", self.name, frame.kind());
                    }
                    Some(ReactorCommand::Disconnect) | None => {
                        info!("{}: Disconnected before the socket opened", self.name);
                        self.teardown();
                        return;
                    }
                },

                result = &mut opening => match result {
                    Ok((ws, _response)) => break ws,
                    Err(e) => {
                        warn!("{}: Failed to connect to {}: {}", self.name, self.url, e);
                        self.teardown();
                        return;
                    }
                },
            }
        };

        info!("{}: Connected to {}", self.name, self.url);
        set_state(&self.status, ConnectionState::AwaitingSchema);
        let (mut sink, mut stream) = ws.split();

        self.retry.record_request(Instant::now());
        if let Err(e) = sink.send(Message::Text(Frame::SchemaRequest.to_text())).await {
            warn!("{}: Initial schema request failed: {}", self.name, e);
            self.teardown();
            return;
        }

        // Phase 2: steady state
        loop {
            tokio::select! {
                // Bias towards caller commands so a disconnect is not starved
                biased;

                cmd = cmd_rx.recv() => match cmd {
                    Some(ReactorCommand::Send(frame)) => {
                        if frame == Frame::SchemaRequest {
                            self.retry.record_request(Instant::now());
                        }
                        trace!("{}: -> {}", self.name, frame.kind());
                        if let Err(e) = sink.send(Message::Text(frame.to_text())).await {
                            warn!("{}: Send failed: {}", self.name, e);
                            break;
                        }
                    }
                    Some(ReactorCommand::Disconnect) => {
                        info!("{}: Disconnecting", self.name);
                        let _ = sink.send(Message::Text(Frame::Disconnect.to_text())).await;
                        let _ = sink.close().await;
                        break;
                    }
                    None => {
                        debug!("{}: Command channel closed, reactor exiting", self.name);
                        let _ = sink.close().await;
                        break;
                    }
                },

                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !self.handle_text(&text) {
                            let _ = sink.close().await;
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!("{}: Closed by remote ({:?})", self.name, frame);
                        break;
                    }
                    Some(Ok(other)) => {
                        trace!("{}: Ignoring non-text message ({} bytes)", self.name, other.len());
                    }
                    Some(Err(e)) => {
                        warn!("{}: Receive error: {}", self.name, e);
                        break;
                    }
                    None => {
                        info!("{}: Socket stream ended", self.name);
                        break;
                    }
                },

                _ = sleep_until_opt(self.retry.deadline()) => {
                    if self.retry.on_timeout() {
                        debug!(
                            "{}: No schema after {:?}, requesting again (attempt {}/{})",
                            self.name,
                            self.retry.config().timeout,
                            self.retry.attempts() + 1,
                            self.retry.config().max_attempts
                        );
                        self.retry.record_request(Instant::now());
                        let request = Message::Text(Frame::SchemaRequest.to_text());
                        if let Err(e) = sink.send(request).await {
                            warn!("{}: Send failed: {}", self.name, e);
                            break;
                        }
                    } else {
                        debug!(
                            "{}: No schema after {} requests, giving up",
                            self.name,
                            self.retry.attempts()
                        );
                    }
                }
            }
        }

        self.teardown();
        debug!("{}: Reactor task exiting", self.name);
    }

    /// Returns `false` once the remote has announced it is going away.
    fn handle_text(&mut self, text: &str) -> bool {
        match Frame::parse(text) {
            Ok(Frame::Schema(schema)) => {
                debug!("{}: <- schema with {} params", self.name, schema.len());
                self.retry.record_schema();
                *self.last_schema.lock() = Some(schema.clone());
                self.input.schema.emit(&schema);
                set_state(&self.status, ConnectionState::Synced);
            }
            Ok(Frame::Value { path, value }) => {
                trace!("{}: <- {} = {}", self.name, path, value);
                self.input.value.emit(&RemoteValue { path, raw: value });
            }
            Ok(Frame::Disconnect) => {
                info!("{}: Remote is disconnecting", self.name);
                return false;
            }
            Ok(other) => {
                debug!("{}: Ignoring inbound {} frame", self.name, other.kind());
            }
            Err(e) => {
                warn!("{}: Dropping malformed frame: {}", self.name, e);
            }
        }
        true
    }

    fn teardown(&self) {
        self.output.detach();
        self.input.disconnect.emit(&());
        set_state(&self.status, ConnectionState::Disconnected);
    }
}

/// Client for a param server speaking the text frame protocol over
/// `ws://host:port`.
pub struct WebsocketsClient {
    id: ClientId,
    name: String,
    retry: RetryConfig,
    params: Arc<Params>,
    input: Arc<Input>,
    output: Arc<WsOutput>,
    status: Arc<watch::Sender<ConnectionState>>,
    last_schema: Arc<Mutex<Option<Schema>>>,
    started: AtomicBool,
    _wiring: Vec<Subscription>,
}

impl WebsocketsClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::from_id(ClientId::wsock(host, port), RetryConfig::default())
    }

    /// Build a client for `id`. The transport kind of `id` is not checked.
    pub fn from_id(id: ClientId, retry: RetryConfig) -> Self {
        let name = id.to_string();
        let params = Arc::new(Params::new());
        let input = Arc::new(Input::new());
        let (status, _) = watch::channel(ConnectionState::Disconnected);

        // Inbound events drive the owned params
        let schema_params = params.clone();
        let on_schema = input.schema.subscribe(move |schema: &Schema| {
            schema.apply_to(&schema_params);
        });

        let value_params = params.clone();
        let value_name = name.clone();
        let on_value = input.value.subscribe(move |remote: &RemoteValue| {
            match value_params.get(&remote.path) {
                Some(param) => {
                    param.set_str(&remote.raw);
                }
                None => warn!(
                    "{}: Value for unknown param {}, dropping",
                    value_name, remote.path
                ),
            }
        });

        Self {
            output: Arc::new(WsOutput::new(&name)),
            id,
            name,
            retry,
            params,
            input,
            status: Arc::new(status),
            last_schema: Arc::new(Mutex::new(None)),
            started: AtomicBool::new(false),
            _wiring: vec![on_schema, on_value],
        }
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }
}

impl Client for WebsocketsClient {
    fn id(&self) -> &ClientId {
        &self.id
    }

    fn connect(&self) -> Result<(), ClientError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ClientError::AlreadyStarted(self.name.clone()));
        }
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(ClientError::NoRuntime);
            }
        };

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        self.output.attach(cmd_tx);
        set_state(&self.status, ConnectionState::Connecting);

        let reactor = Reactor {
            name: self.name.clone(),
            url: self.id.ws_url(),
            retry: SchemaRetry::new(self.retry),
            input: self.input.clone(),
            output: self.output.clone(),
            status: self.status.clone(),
            last_schema: self.last_schema.clone(),
        };
        handle.spawn(reactor.run(cmd_rx));
        Ok(())
    }

    fn disconnect(&self) {
        // Queue the notice, then let go of the channel so the reactor exits
        let _ = self.output.disconnect();
        self.output.detach();
        set_state(&self.status, ConnectionState::Disconnected);
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

impl Drop for WebsocketsClient {
    fn drop(&mut self) {
        self.output.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconnected_client_is_inert() {
        let client = WebsocketsClient::new("127.0.0.1", 8081);
        assert_eq!(client.id().to_string(), "wsock-127.0.0.1:8081");
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.output().send_value("/a", &ParamValue::Int(1)).is_ok());
        assert!(client.last_schema().is_none());
    }

    #[test]
    fn connect_needs_a_runtime() {
        let client = WebsocketsClient::new("127.0.0.1", 1);
        assert_eq!(client.connect(), Err(ClientError::NoRuntime));
    }

    #[test]
    fn inbound_events_drive_params() {
        let client = WebsocketsClient::new("127.0.0.1", 8081);
        let schema = Schema::from_json(r#"[{"path":"/a","type":"i","value":1}]"#).unwrap();
        client.input().schema.emit(&schema);
        client.input().value.emit(&RemoteValue {
            path: "/a".into(),
            raw: "7".into(),
        });
        client.input().value.emit(&RemoteValue {
            path: "/missing".into(),
            raw: "1".into(),
        });

        assert_eq!(client.params().get("/a").unwrap().get_value(), ParamValue::Int(7));
        assert_eq!(client.params().len(), 1);
    }

    #[tokio::test]
    async fn second_connect_is_rejected() {
        let client = WebsocketsClient::new("127.0.0.1", 1);
        client.connect().unwrap();
        assert_eq!(
            client.connect(),
            Err(ClientError::AlreadyStarted("wsock-127.0.0.1:1".into()))
        );
        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }
}
