//! A local param server for integration tests.
//!
//! Accepts any number of WebSocket connections, records every text frame it
//! receives and answers `GET schema.json` with its current schema (or stays
//! silent when it has none).

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use paramproto::Schema;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};

pub const WAIT: Duration = Duration::from_secs(5);

struct Shared {
    schema: Mutex<Option<Schema>>,
    received: Mutex<Vec<String>>,
    peers: Mutex<Vec<mpsc::UnboundedSender<Message>>>,
}

pub struct FakeRemote {
    pub port: u16,
    shared: Arc<Shared>,
    accept_task: JoinHandle<()>,
}

impl FakeRemote {
    pub async fn start(schema: Option<Schema>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let shared = Arc::new(Shared {
            schema: Mutex::new(schema),
            received: Mutex::new(Vec::new()),
            peers: Mutex::new(Vec::new()),
        });

        let accept_shared = shared.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let Ok(ws) = accept_async(tcp).await else {
                    continue;
                };
                tokio::spawn(serve(ws, accept_shared.clone()));
            }
        });

        Self {
            port,
            shared,
            accept_task,
        }
    }

    pub fn with_json(json: &str) -> Schema {
        Schema::from_json(json).expect("test schema")
    }

    pub fn set_schema(&self, schema: Option<Schema>) {
        *self.shared.schema.lock() = schema;
    }

    pub fn received(&self) -> Vec<String> {
        self.shared.received.lock().clone()
    }

    pub fn count(&self, frame: &str) -> usize {
        self.received().iter().filter(|f| *f == frame).count()
    }

    /// Send `text` to every connected client.
    pub fn push(&self, text: &str) {
        self.shared
            .peers
            .lock()
            .retain(|tx| tx.send(Message::Text(text.to_string())).is_ok());
    }

    /// Close every connection from the server side.
    pub fn close_all(&self) {
        for tx in self.shared.peers.lock().drain(..) {
            let _ = tx.send(Message::Close(None));
        }
    }

    /// Poll until `frame` has been received at least once.
    pub async fn wait_for_frame(&self, frame: &str) -> bool {
        let deadline = tokio::time::Instant::now() + WAIT;
        while tokio::time::Instant::now() < deadline {
            if self.count(frame) > 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl Drop for FakeRemote {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    shared: Arc<Shared>,
) {
    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    shared.peers.lock().push(tx);

    loop {
        tokio::select! {
            out = rx.recv() => match out {
                Some(Message::Close(frame)) => {
                    let _ = sink.send(Message::Close(frame)).await;
                    break;
                }
                Some(msg) => {
                    if sink.send(msg).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    shared.received.lock().push(text.clone());
                    if text == "GET schema.json" {
                        let schema = shared.schema.lock().clone();
                        if let Some(schema) = schema {
                            let reply = format!("POST schema.json?schema={}", schema.to_json());
                            if sink.send(Message::Text(reply)).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Wait for a watch channel to reach `state`.
pub async fn wait_state(
    rx: &mut tokio::sync::watch::Receiver<paramproto::ConnectionState>,
    state: paramproto::ConnectionState,
) -> bool {
    matches!(
        tokio::time::timeout(WAIT, rx.wait_for(|s| *s == state)).await,
        Ok(Ok(_))
    )
}
