// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! In-process mock relay
//!
//! Speaks just enough NIP-01/NIP-42 for the integration tests: scripted `OK` replies,
//! optional EOSE, canned events streamed on REQ, an optional AUTH challenge, and a kill
//! switch that drops live sockets to exercise reconnection.

#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio_tungstenite::tungstenite::Message;

/// Scripted behavior for one mock relay
#[derive(Debug, Clone)]
pub struct MockRelayConfig {
    /// Replies consumed one per received EVENT frame; when exhausted, `default_ok` applies
    pub ok_script: Vec<(bool, String)>,
    /// The standing reply to EVENT frames
    pub default_ok: (bool, String),
    /// Reply `(true, "duplicate: have it")` to an id seen before (relays dedupe on id)
    pub dedupe: bool,
    /// Answer REQ frames with EOSE after streaming `events_on_req`
    pub send_eose: bool,
    /// Raw event JSON streamed on every REQ, before the EOSE
    pub events_on_req: Vec<Value>,
    /// Send `["AUTH", challenge]` right after the socket opens
    pub auth_challenge: Option<String>,
    /// Keep rejecting EVENT frames with `auth-required:` until an AUTH frame arrives
    pub require_auth: bool,
}

impl Default for MockRelayConfig {
    fn default() -> Self {
        Self {
            ok_script: Vec::new(),
            default_ok: (true, String::new()),
            dedupe: true,
            send_eose: true,
            events_on_req: Vec::new(),
            auth_challenge: None,
            require_auth: false,
        }
    }
}

impl MockRelayConfig {
    pub fn accept_all() -> Self {
        Self::default()
    }

    pub fn reject_all(message: &str) -> Self {
        Self {
            default_ok: (false, message.to_string()),
            ..Self::default()
        }
    }
}

/// One observed REQ
#[derive(Debug, Clone)]
pub struct SeenReq {
    /// Which accepted connection it arrived on (0-based)
    pub connection: usize,
    pub subscription_id: String,
    pub filters: Vec<Value>,
}

#[derive(Debug)]
pub struct MockState {
    config: Mutex<MockRelayConfig>,
    pub reqs: Mutex<Vec<SeenReq>>,
    pub events_received: Mutex<Vec<Value>>,
    pub auth_events_received: Mutex<Vec<Value>>,
    seen_ids: Mutex<HashSet<String>>,
    authed: AtomicBool,
    connections: AtomicUsize,
    kill: broadcast::Sender<()>,
}

pub struct MockRelay {
    addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockRelay {
    pub async fn start(config: MockRelayConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (kill, _) = broadcast::channel(8);
        let state = Arc::new(MockState {
            config: Mutex::new(config),
            reqs: Mutex::new(Vec::new()),
            events_received: Mutex::new(Vec::new()),
            auth_events_received: Mutex::new(Vec::new()),
            seen_ids: Mutex::new(HashSet::new()),
            authed: AtomicBool::new(false),
            connections: AtomicUsize::new(0),
            kill,
        });

        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let conn = accept_state.connections.fetch_add(1, Ordering::SeqCst);
                let state = Arc::clone(&accept_state);
                tokio::spawn(async move {
                    let _ = handle_connection(stream, state, conn).await;
                });
            }
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Drop every live socket; the listener stays up for reconnects
    pub fn drop_connections(&self) {
        let _ = self.state.kill.send(());
    }

    pub fn connection_count(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub async fn received_event_count(&self) -> usize {
        self.state.events_received.lock().await.len()
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<MockState>,
    conn: usize,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut source) = ws.split();
    let mut kill = state.kill.subscribe();

    {
        let config = state.config.lock().await;
        if let Some(challenge) = &config.auth_challenge {
            sink.send(Message::Text(json!(["AUTH", challenge]).to_string()))
                .await?;
        }
    }

    loop {
        tokio::select! {
            _ = kill.recv() => break,
            msg = source.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    _ => break,
                };
                match msg {
                    Message::Text(text) => {
                        let value: Value = match serde_json::from_str(&text) {
                            Ok(value) => value,
                            Err(_) => continue,
                        };
                        handle_frame(&mut sink, &state, conn, value).await?;
                    }
                    Message::Ping(data) => {
                        sink.send(Message::Pong(data)).await?;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

async fn handle_frame<S>(
    sink: &mut S,
    state: &Arc<MockState>,
    conn: usize,
    value: Value,
) -> Result<(), tokio_tungstenite::tungstenite::Error>
where
    S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let Some(frame) = value.as_array() else { return Ok(()) };
    let Some(kind) = frame.first().and_then(Value::as_str) else { return Ok(()) };

    match kind {
        "EVENT" => {
            let Some(event) = frame.get(1) else { return Ok(()) };
            state.events_received.lock().await.push(event.clone());
            let id: String = event
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            let mut config = state.config.lock().await;

            let (accepted, message): (bool, String) =
                if config.require_auth && !state.authed.load(Ordering::SeqCst) {
                    (false, String::from("auth-required: subscribe first"))
                } else if config.dedupe && state.seen_ids.lock().await.contains(&id) {
                    (true, String::from("duplicate: have this event"))
                } else if config.ok_script.is_empty() {
                    config.default_ok.clone()
                } else {
                    config.ok_script.remove(0)
                };

            // only accepted events count as stored for dedup purposes
            if accepted && config.dedupe {
                state.seen_ids.lock().await.insert(id.clone());
            }

            sink.send(Message::Text(json!(["OK", id, accepted, message]).to_string()))
                .await?;
        }
        "REQ" => {
            let Some(subscription_id) = frame.get(1).and_then(Value::as_str) else {
                return Ok(());
            };
            state.reqs.lock().await.push(SeenReq {
                connection: conn,
                subscription_id: subscription_id.to_string(),
                filters: frame[2..].to_vec(),
            });

            let config = state.config.lock().await;
            for event in config.events_on_req.iter() {
                sink.send(Message::Text(
                    json!(["EVENT", subscription_id, event]).to_string(),
                ))
                .await?;
            }
            if config.send_eose {
                sink.send(Message::Text(json!(["EOSE", subscription_id]).to_string()))
                    .await?;
            }
        }
        "AUTH" => {
            let Some(event) = frame.get(1) else { return Ok(()) };
            state.auth_events_received.lock().await.push(event.clone());
            state.authed.store(true, Ordering::SeqCst);
            let id: String = event
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            sink.send(Message::Text(json!(["OK", id, true, ""]).to_string()))
                .await?;
        }
        "CLOSE" => {}
        _ => {}
    }
    Ok(())
}
