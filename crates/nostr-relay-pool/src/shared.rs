// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! State shared by every relay in a pool: database, signer, filtering, verifier

use std::sync::Arc;

use nostr::prelude::IntoNostrSigner;
use nostr::NostrSigner;
use nostr_database::{IntoNostrDatabase, MemoryDatabase, NostrDatabase};
use tokio::sync::RwLock;

use crate::filtering::RelayFiltering;
use crate::verifier::{SignatureVerifier, VerifierOptions};

/// Shared state error
#[derive(Debug, thiserror::Error)]
pub enum SharedStateError {
    /// No signer was configured on the pool
    #[error("signer not configured")]
    SignerNotConfigured,
}

/// Handles shared by the pool and all its relays
#[derive(Debug, Clone)]
pub struct SharedState {
    pub(crate) database: Arc<dyn NostrDatabase>,
    signer: Arc<RwLock<Option<Arc<dyn NostrSigner>>>>,
    pub(crate) filtering: RelayFiltering,
    pub(crate) verifier: SignatureVerifier,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(MemoryDatabase::new(), VerifierOptions::default())
    }
}

impl SharedState {
    /// New shared state over `database`
    pub fn new<D>(database: D, verifier_opts: VerifierOptions) -> Self
    where
        D: IntoNostrDatabase,
    {
        Self::with_parts(database, None, verifier_opts)
    }

    /// New shared state with an optional initial signer
    pub fn with_parts<D>(
        database: D,
        signer: Option<Arc<dyn NostrSigner>>,
        verifier_opts: VerifierOptions,
    ) -> Self
    where
        D: IntoNostrDatabase,
    {
        let filtering = RelayFiltering::new();
        Self {
            database: database.into_nostr_database(),
            signer: Arc::new(RwLock::new(signer)),
            verifier: SignatureVerifier::new(verifier_opts, filtering.clone()),
            filtering,
        }
    }

    /// The configured database
    pub fn database(&self) -> &Arc<dyn NostrDatabase> {
        &self.database
    }

    /// The relay filtering registry
    pub fn filtering(&self) -> &RelayFiltering {
        &self.filtering
    }

    /// The signature verifier
    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    /// Set (or replace) the signer
    pub async fn set_signer<S>(&self, signer: S)
    where
        S: IntoNostrSigner,
    {
        let mut s = self.signer.write().await;
        *s = Some(signer.into_nostr_signer());
    }

    /// Remove the signer
    pub async fn unset_signer(&self) {
        let mut s = self.signer.write().await;
        *s = None;
    }

    /// The configured signer
    pub async fn signer(&self) -> Result<Arc<dyn NostrSigner>, SharedStateError> {
        self.signer
            .read()
            .await
            .clone()
            .ok_or(SharedStateError::SignerNotConfigured)
    }

    /// Whether a signer is configured
    pub async fn has_signer(&self) -> bool {
        self.signer.read().await.is_some()
    }
}
