// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Client error

/// Client error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Relay pool error
    #[error(transparent)]
    Pool(#[from] nostr_relay_pool::pool::Error),
    /// Relay error
    #[error(transparent)]
    Relay(#[from] nostr_relay_pool::relay::Error),
    /// Database error
    #[error("database: {0}")]
    Database(#[from] nostr_database::DatabaseError),
    /// No signer is configured
    #[error("signer not configured")]
    SignerNotConfigured,
    /// Signer call failed
    #[error("signer: {0}")]
    Signer(String),
    /// Event construction or signing failed
    #[error("event: {0}")]
    Event(String),
    /// Selection produced no usable relay
    #[error("no relays selected")]
    NoRelays,
}
