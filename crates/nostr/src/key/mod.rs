// Copyright (c) 2021 Paul Miller
// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Keys

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::OnceLock;

use async_trait::async_trait;
use secp256k1::rand::rngs::OsRng;
use secp256k1::rand::{CryptoRng, Rng};
use secp256k1::schnorr::Signature;
use secp256k1::{Keypair, Message, Secp256k1, Signing, XOnlyPublicKey};

pub mod public_key;
pub mod secret_key;

pub use self::public_key::PublicKey;
pub use self::secret_key::SecretKey;
use crate::signer::{NostrSigner, SignerBackend, SignerError};
use crate::util::hex;
use crate::{Event, UnsignedEvent, SECP256K1};

/// Key error
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Invalid secret key
    InvalidSecretKey,
    /// Invalid public key
    InvalidPublicKey,
    /// Hex decode error
    Hex(hex::Error),
    /// Secp256k1 error
    Secp256k1(secp256k1::Error),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSecretKey => write!(f, "invalid secret key"),
            Self::InvalidPublicKey => write!(f, "invalid public key"),
            Self::Hex(e) => write!(f, "hex: {e}"),
            Self::Secp256k1(e) => write!(f, "secp256k1: {e}"),
        }
    }
}

impl From<hex::Error> for Error {
    fn from(e: hex::Error) -> Self {
        Self::Hex(e)
    }
}

impl From<secp256k1::Error> for Error {
    fn from(e: secp256k1::Error) -> Self {
        Self::Secp256k1(e)
    }
}

/// A keypair capable of signing events and performing NIP-04/NIP-44 key agreement locally
#[derive(Clone)]
pub struct Keys {
    /// Public key
    pub public_key: PublicKey,
    secret_key: SecretKey,
    key_pair: OnceLock<Keypair>,
}

impl fmt::Debug for Keys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keys")
            .field("public_key", &self.public_key)
            .finish()
    }
}

impl PartialEq for Keys {
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key
    }
}

impl Eq for Keys {}

impl PartialOrd for Keys {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Keys {
    fn cmp(&self, other: &Self) -> Ordering {
        self.public_key.cmp(&other.public_key)
    }
}

impl Hash for Keys {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.public_key.hash(state)
    }
}

impl Keys {
    /// Construct from a secret key, deriving the public key immediately
    #[inline]
    pub fn new(secret_key: SecretKey) -> Self {
        Self::new_with_ctx(&SECP256K1, secret_key)
    }

    /// Construct from a secret key using a caller-supplied secp256k1 context
    pub fn new_with_ctx<C>(secp: &Secp256k1<C>, secret_key: SecretKey) -> Self
    where
        C: Signing,
    {
        let key_pair: Keypair = Keypair::from_secret_key(secp, &secret_key);
        let (public_key, _) = XOnlyPublicKey::from_keypair(&key_pair);

        Self {
            public_key: PublicKey::from(public_key),
            secret_key,
            key_pair: OnceLock::from(key_pair),
        }
    }

    /// Parse a secret key from `hex` and compose keys
    #[inline]
    pub fn parse<S>(secret_key: S) -> Result<Self, Error>
    where
        S: AsRef<str>,
    {
        Self::parse_with_ctx(&SECP256K1, secret_key)
    }

    /// Parse a secret key from `hex` using a caller-supplied secp256k1 context
    #[inline]
    pub fn parse_with_ctx<C, S>(secp: &Secp256k1<C>, secret_key: S) -> Result<Self, Error>
    where
        C: Signing,
        S: AsRef<str>,
    {
        let secret_key: SecretKey =
            SecretKey::parse(secret_key).map_err(|_| Error::InvalidSecretKey)?;
        Ok(Self::new_with_ctx(secp, secret_key))
    }

    /// Generate random keys using the operating system RNG
    #[inline]
    pub fn generate() -> Self {
        Self::generate_with_rng(&mut OsRng)
    }

    /// Generate random keys using a custom random source
    #[inline]
    pub fn generate_with_rng<R>(rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        Self::generate_with_ctx(&SECP256K1, rng)
    }

    /// Generate random keys without constructing the [`Keypair`] eagerly
    ///
    /// The keypair is derived lazily on first use and cached.
    pub fn generate_with_ctx<C, R>(secp: &Secp256k1<C>, rng: &mut R) -> Self
    where
        C: Signing,
        R: Rng + ?Sized,
    {
        let (secret_key, public_key) = secp.generate_keypair(rng);
        let (public_key, _) = public_key.x_only_public_key();
        Self {
            public_key: PublicKey::from(public_key),
            secret_key: SecretKey::from(secret_key),
            key_pair: OnceLock::new(),
        }
    }

    /// Get the public key
    #[inline]
    pub fn public_key(&self) -> PublicKey {
        self.public_key.clone()
    }

    /// Get the secret key
    #[inline]
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// Get (or lazily derive) the keypair
    #[inline]
    pub fn key_pair<C>(&self, secp: &Secp256k1<C>) -> &Keypair
    where
        C: Signing,
    {
        self.key_pair
            .get_or_init(|| Keypair::from_secret_key(secp, &self.secret_key))
    }

    /// Sign a message with a BIP-340 Schnorr signature using the operating system RNG
    #[inline]
    pub fn sign_schnorr(&self, message: &Message) -> Signature {
        self.sign_schnorr_with_ctx(&SECP256K1, message, &mut OsRng)
    }

    /// Sign a message with a BIP-340 Schnorr signature using a custom random source
    pub fn sign_schnorr_with_ctx<C, R>(
        &self,
        secp: &Secp256k1<C>,
        message: &Message,
        rng: &mut R,
    ) -> Signature
    where
        C: Signing,
        R: Rng + CryptoRng,
    {
        let keypair: &Keypair = self.key_pair(secp);
        secp.sign_schnorr_with_rng(message, keypair, rng)
    }
}

impl FromStr for Keys {
    type Err = Error;

    /// Parse [Keys] from a secret key `hex` string
    #[inline]
    fn from_str(secret_key: &str) -> Result<Self, Self::Err> {
        Self::parse(secret_key)
    }
}

#[async_trait]
impl NostrSigner for Keys {
    fn backend(&self) -> SignerBackend {
        SignerBackend::Keys
    }

    fn supported_encryption_schemes(&self) -> Vec<crate::signer::EncryptionScheme> {
        let mut schemes = Vec::new();
        #[cfg(feature = "nip04")]
        schemes.push(crate::signer::EncryptionScheme::Nip04);
        #[cfg(feature = "nip44")]
        schemes.push(crate::signer::EncryptionScheme::Nip44);
        schemes
    }

    async fn get_public_key(&self) -> Result<PublicKey, SignerError> {
        Ok(self.public_key())
    }

    async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event, SignerError> {
        unsigned.sign_with_keys(self).map_err(SignerError::backend)
    }

    #[cfg(feature = "nip04")]
    async fn nip04_encrypt(
        &self,
        public_key: &PublicKey,
        content: &str,
    ) -> Result<String, SignerError> {
        let secret_key: &SecretKey = self.secret_key();
        crate::nips::nip04::encrypt(secret_key, public_key, content).map_err(SignerError::backend)
    }

    #[cfg(feature = "nip04")]
    async fn nip04_decrypt(
        &self,
        public_key: &PublicKey,
        encrypted_content: &str,
    ) -> Result<String, SignerError> {
        let secret_key: &SecretKey = self.secret_key();
        crate::nips::nip04::decrypt(secret_key, public_key, encrypted_content)
            .map_err(SignerError::backend)
    }

    #[cfg(feature = "nip44")]
    async fn nip44_encrypt(
        &self,
        public_key: &PublicKey,
        content: &str,
    ) -> Result<String, SignerError> {
        use crate::nips::nip44::{self, Version};
        let secret_key: &SecretKey = self.secret_key();
        nip44::encrypt(secret_key, public_key, content, Version::default())
            .map_err(SignerError::backend)
    }

    #[cfg(feature = "nip44")]
    async fn nip44_decrypt(
        &self,
        public_key: &PublicKey,
        payload: &str,
    ) -> Result<String, SignerError> {
        let secret_key: &SecretKey = self.secret_key();
        crate::nips::nip44::decrypt(secret_key, public_key, payload).map_err(SignerError::backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET_KEY_HEX: &str = "6b911fd37cdf5c81d4c0adb1ab7fa822ed253ab0ad9aa18d77257c88b29b718e";

    #[test]
    fn parse_keys() -> Result<(), Error> {
        Keys::parse(SECRET_KEY_HEX)?;
        Ok(())
    }

    #[test]
    fn parse_invalid_keys() {
        assert_eq!(Keys::parse("not-a-key").unwrap_err(), Error::InvalidSecretKey);
        assert_eq!(
            Keys::parse("6b911fd37cdf5c8").unwrap_err(),
            Error::InvalidSecretKey
        );
    }

    #[test]
    fn generated_keys_derive_matching_public_key() {
        let keys = Keys::generate();
        let keys2 = Keys::new(keys.secret_key().clone());
        assert_eq!(keys.public_key(), keys2.public_key());
    }
}
