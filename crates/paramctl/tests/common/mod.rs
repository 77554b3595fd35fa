//! Minimal param server for driving the CLI end to end.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_cmd::Command;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// `paramctl` isolated from the user's config and state.
pub fn paramctl(state_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("paramctl").unwrap();
    cmd.env("PARAMSREMOTE_STATE_DIR", state_dir)
        .env("PARAMSREMOTE_LOG_LEVEL", "warn")
        .env_remove("RUST_LOG")
        .env_remove("PARAMSREMOTE_CONFIG");
    cmd
}

pub struct TestServer {
    pub port: u16,
    received: Arc<Mutex<Vec<String>>>,
    runtime: Runtime,
}

impl TestServer {
    /// Serve `schema_json` to every client on a background runtime.
    pub fn start(schema_json: &str) -> Self {
        let runtime = Runtime::new().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let reply = format!("POST schema.json?schema={}", schema_json);

        let listener = runtime
            .block_on(TcpListener::bind("127.0.0.1:0"))
            .unwrap();
        let port = listener.local_addr().unwrap().port();

        let log = received.clone();
        runtime.spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let log = log.clone();
                let reply = reply.clone();
                tokio::spawn(async move {
                    let Ok(mut ws) = accept_async(tcp).await else {
                        return;
                    };
                    while let Some(Ok(msg)) = ws.next().await {
                        if let Message::Text(text) = msg {
                            log.lock().unwrap().push(text.clone());
                            if text == "GET schema.json"
                                && ws.send(Message::Text(reply.clone())).await.is_err()
                            {
                                return;
                            }
                        }
                    }
                });
            }
        });

        Self {
            port,
            received,
            runtime,
        }
    }

    pub fn id(&self) -> String {
        format!("wsock-127.0.0.1:{}", self.port)
    }

    /// Poll until `frame` shows up.
    pub fn saw(&self, frame: &str) -> bool {
        for _ in 0..200 {
            if self.received.lock().unwrap().iter().any(|f| f == frame) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }
}
