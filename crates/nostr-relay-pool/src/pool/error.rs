// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay pool error

use nostr::types::RelayUrlError;

/// Relay pool error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Relay error
    #[error(transparent)]
    Relay(#[from] crate::relay::Error),
    /// URL failed to parse/normalize
    #[error(transparent)]
    RelayUrl(#[from] RelayUrlError),
    /// No relay registered under that URL
    #[error("relay not found in pool")]
    RelayNotFound,
    /// Selection produced no usable relay
    #[error("no relays selected")]
    NoRelays,
    /// Database error
    #[error("database: {0}")]
    Database(#[from] nostr_database::DatabaseError),
    /// No signer is configured on the pool
    #[error("signer not configured")]
    SignerNotConfigured,
    /// Signer call failed
    #[error("signer: {0}")]
    Signer(String),
    /// Operation cancelled by the caller
    #[error("cancelled")]
    Cancelled,
}
