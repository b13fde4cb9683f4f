// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! WebSocket transport
//!
//! The relay connection code talks to a [`Transport`], never to a socket library
//! directly. The default implementation dials with `tokio-tungstenite`; tests swap in
//! whatever they need.

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use nostr::RelayUrl;
use tokio_tungstenite::tungstenite::Message;

/// Transport error
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection attempt did not complete within the allowed time
    #[error("connection timeout")]
    Timeout,
    /// Anything the underlying socket reported
    #[error("websocket: {0}")]
    WebSocket(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(e.to_string())
    }
}

/// A frame on the wire, as the connection code sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    /// UTF-8 text frame (every nostr message)
    Text(String),
    /// Binary frame; ignored by the protocol but passed through
    Binary(Vec<u8>),
    /// Ping frame
    Ping(Vec<u8>),
    /// Pong frame
    Pong(Vec<u8>),
    /// Close frame
    Close,
}

impl WsMessage {
    fn into_tungstenite(self) -> Message {
        match self {
            Self::Text(text) => Message::Text(text),
            Self::Binary(data) => Message::Binary(data),
            Self::Ping(data) => Message::Ping(data),
            Self::Pong(data) => Message::Pong(data),
            Self::Close => Message::Close(None),
        }
    }

    fn from_tungstenite(msg: Message) -> Option<Self> {
        match msg {
            Message::Text(text) => Some(Self::Text(text)),
            Message::Binary(data) => Some(Self::Binary(data)),
            Message::Ping(data) => Some(Self::Ping(data)),
            Message::Pong(data) => Some(Self::Pong(data)),
            Message::Close(_) => Some(Self::Close),
            // raw frames never surface outside tungstenite's read loop
            Message::Frame(_) => None,
        }
    }
}

/// Write half of an open connection
pub type BoxSink = Pin<Box<dyn Sink<WsMessage, Error = TransportError> + Send>>;
/// Read half of an open connection
pub type BoxStream = Pin<Box<dyn Stream<Item = Result<WsMessage, TransportError>> + Send>>;

/// Dials a relay and hands back the two halves of the socket
#[async_trait]
pub trait Transport: fmt::Debug + Send + Sync {
    /// Open a connection to `url`, failing after `timeout`
    async fn connect(
        &self,
        url: &RelayUrl,
        timeout: Duration,
    ) -> Result<(BoxSink, BoxStream), TransportError>;
}

/// The default transport: plain `tokio-tungstenite`, TLS handled by the URL scheme
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTransport;

#[async_trait]
impl Transport for DefaultTransport {
    async fn connect(
        &self,
        url: &RelayUrl,
        timeout: Duration,
    ) -> Result<(BoxSink, BoxStream), TransportError> {
        let (socket, _response) =
            tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url.as_str()))
                .await
                .map_err(|_| TransportError::Timeout)??;

        let (sink, stream) = socket.split();

        let sink: BoxSink = Box::pin(
            sink.with(|msg: WsMessage| async move {
                Ok::<Message, tokio_tungstenite::tungstenite::Error>(msg.into_tungstenite())
            })
            .sink_map_err(TransportError::from),
        );

        let stream: BoxStream = Box::pin(stream.filter_map(|item| async move {
            match item {
                Ok(msg) => WsMessage::from_tungstenite(msg).map(Ok),
                Err(e) => Some(Err(TransportError::from(e))),
            }
        }));

        Ok((sink, stream))
    }
}
