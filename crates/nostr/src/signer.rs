// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Signer abstraction over however the caller holds its keys

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{Event, PublicKey, UnsignedEvent};

type InnerError = Box<dyn std::error::Error + Send + Sync>;

/// Signer error
#[derive(Debug)]
pub struct SignerError(InnerError);

impl fmt::Display for SignerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SignerError {}

impl SignerError {
    /// Wrap a backend-specific error
    #[inline]
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Box::new(error))
    }
}

#[doc(hidden)]
pub trait IntoNostrSigner {
    fn into_nostr_signer(self) -> Arc<dyn NostrSigner>;
}

impl<T> IntoNostrSigner for T
where
    T: NostrSigner + 'static,
{
    fn into_nostr_signer(self) -> Arc<dyn NostrSigner> {
        Arc::new(self)
    }
}

/// Where a signer's keys actually live
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SignerBackend<'a> {
    /// In-process secret key
    Keys,
    /// Custom backend, named for diagnostics
    Custom(Cow<'a, str>),
}

/// A content-encryption scheme a signer may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EncryptionScheme {
    /// NIP-04: AES-256-CBC, the legacy DM scheme
    Nip04,
    /// NIP-44 v2: ChaCha20-Poly1305 with HMAC key derivation
    Nip44,
}

/// Object-safe signer abstraction: derives a public key, signs events, and (if the
/// crate's `nip04`/`nip44` features are enabled) performs the corresponding key
/// agreement and symmetric encryption for that NIP
#[async_trait]
pub trait NostrSigner: fmt::Debug + Send + Sync {
    /// Which kind of backend this signer is
    fn backend(&self) -> SignerBackend;

    /// Encryption schemes this signer can perform
    ///
    /// Callers must check before asking for an encrypt/decrypt: a remote signer may
    /// support neither.
    fn supported_encryption_schemes(&self) -> Vec<EncryptionScheme>;

    /// Get the signer's public key
    async fn get_public_key(&self) -> Result<PublicKey, SignerError>;

    /// Compute the event id (if unset) and produce a signed [`Event`]
    async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event, SignerError>;

    /// NIP-04 encrypt
    #[cfg(feature = "nip04")]
    async fn nip04_encrypt(
        &self,
        public_key: &PublicKey,
        content: &str,
    ) -> Result<String, SignerError>;

    /// NIP-04 decrypt
    #[cfg(feature = "nip04")]
    async fn nip04_decrypt(
        &self,
        public_key: &PublicKey,
        encrypted_content: &str,
    ) -> Result<String, SignerError>;

    /// NIP-44 encrypt
    #[cfg(feature = "nip44")]
    async fn nip44_encrypt(
        &self,
        public_key: &PublicKey,
        content: &str,
    ) -> Result<String, SignerError>;

    /// NIP-44 decrypt
    #[cfg(feature = "nip44")]
    async fn nip44_decrypt(
        &self,
        public_key: &PublicKey,
        payload: &str,
    ) -> Result<String, SignerError>;
}

#[async_trait]
impl NostrSigner for Arc<dyn NostrSigner> {
    #[inline]
    fn backend(&self) -> SignerBackend {
        self.as_ref().backend()
    }

    #[inline]
    fn supported_encryption_schemes(&self) -> Vec<EncryptionScheme> {
        self.as_ref().supported_encryption_schemes()
    }

    #[inline]
    async fn get_public_key(&self) -> Result<PublicKey, SignerError> {
        self.as_ref().get_public_key().await
    }

    #[inline]
    async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event, SignerError> {
        self.as_ref().sign_event(unsigned).await
    }

    #[inline]
    #[cfg(feature = "nip04")]
    async fn nip04_encrypt(
        &self,
        public_key: &PublicKey,
        content: &str,
    ) -> Result<String, SignerError> {
        self.as_ref().nip04_encrypt(public_key, content).await
    }

    #[inline]
    #[cfg(feature = "nip04")]
    async fn nip04_decrypt(
        &self,
        public_key: &PublicKey,
        encrypted_content: &str,
    ) -> Result<String, SignerError> {
        self.as_ref()
            .nip04_decrypt(public_key, encrypted_content)
            .await
    }

    #[inline]
    #[cfg(feature = "nip44")]
    async fn nip44_encrypt(
        &self,
        public_key: &PublicKey,
        content: &str,
    ) -> Result<String, SignerError> {
        self.as_ref().nip44_encrypt(public_key, content).await
    }

    #[inline]
    #[cfg(feature = "nip44")]
    async fn nip44_decrypt(
        &self,
        public_key: &PublicKey,
        payload: &str,
    ) -> Result<String, SignerError> {
        self.as_ref().nip44_decrypt(public_key, payload).await
    }
}
