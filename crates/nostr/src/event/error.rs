// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

use std::fmt;

use crate::signer::SignerError;
use crate::util::hex;

/// Event error
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Error serializing or deserializing JSON data
    Json(String),
    /// Signer error
    Signer(String),
    /// Error while building and signing an event
    Builder(String),
    /// Hex decode error
    Hex(hex::Error),
    /// Unknown JSON event key
    UnknownKey(String),
    /// Recomputed id did not match the event's `id` field
    InvalidId,
    /// Signature does not verify against `id` and `pubkey`
    InvalidSignature,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(e) => e.fmt(f),
            Self::Signer(e) => e.fmt(f),
            Self::Builder(e) => e.fmt(f),
            Self::Hex(e) => e.fmt(f),
            Self::UnknownKey(key) => write!(f, "unknown key: {key}"),
            Self::InvalidId => f.write_str("invalid event id"),
            Self::InvalidSignature => f.write_str("invalid signature"),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

impl From<SignerError> for Error {
    fn from(e: SignerError) -> Self {
        Self::Signer(e.to_string())
    }
}

impl From<hex::Error> for Error {
    fn from(e: hex::Error) -> Self {
        Self::Hex(e)
    }
}
