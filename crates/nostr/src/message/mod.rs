// Copyright (c) 2021 Paul Miller
// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Client/relay wire messages (NIP-01 envelopes)

use std::fmt;

pub mod client;
pub mod relay;
pub mod subscription;

pub use self::client::ClientMessage;
pub use self::relay::RelayMessage;
pub use self::subscription::SubscriptionId;

/// Error parsing a wire message
#[derive(Debug, PartialEq, Eq)]
pub enum MessageHandleError {
    /// Error serializing or deserializing JSON data
    Json(String),
    /// Message is empty
    EmptyMsg,
    /// Message does not match any known envelope shape
    InvalidMessageFormat,
}

impl std::error::Error for MessageHandleError {}

impl fmt::Display for MessageHandleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(e) => write!(f, "json: {e}"),
            Self::EmptyMsg => f.write_str("empty message"),
            Self::InvalidMessageFormat => f.write_str("invalid message format"),
        }
    }
}

impl From<serde_json::Error> for MessageHandleError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}
