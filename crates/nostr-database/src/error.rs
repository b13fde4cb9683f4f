// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Cache adapter error

use std::io;

/// Database error
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// An I/O error from a persistent backend
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A (de)serialization error
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// The backend doesn't support this operation
    #[error("not supported: {0}")]
    NotSupported(&'static str),
    /// Backend-specific error
    #[error("{0}")]
    Backend(String),
}
