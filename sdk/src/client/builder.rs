// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Client builder

use std::sync::Arc;

use nostr::prelude::IntoNostrSigner;
use nostr::NostrSigner;
use nostr_database::{IntoNostrDatabase, MemoryDatabase, NostrDatabase};

use super::options::Options;
use super::Client;

/// Assembles a [`Client`] from its parts
///
/// Every part has a default: an in-memory database, no signer, default options.
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    pub(super) signer: Option<Arc<dyn NostrSigner>>,
    pub(super) database: Option<Arc<dyn NostrDatabase>>,
    pub(super) opts: Options,
}

impl ClientBuilder {
    /// An empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the signer
    pub fn signer<S>(mut self, signer: S) -> Self
    where
        S: IntoNostrSigner,
    {
        self.signer = Some(signer.into_nostr_signer());
        self
    }

    /// Set the database
    pub fn database<D>(mut self, database: D) -> Self
    where
        D: IntoNostrDatabase,
    {
        self.database = Some(database.into_nostr_database());
        self
    }

    /// Set the options
    pub fn opts(mut self, opts: Options) -> Self {
        self.opts = opts;
        self
    }

    /// Assemble the client
    pub fn build(self) -> Client {
        let database: Arc<dyn NostrDatabase> = self
            .database
            .unwrap_or_else(|| Arc::new(MemoryDatabase::new()));
        Client::from_builder(self.signer, database, self.opts)
    }
}
