// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! NIP-44: Encrypted payloads
//!
//! <https://github.com/nostr-protocol/nips/blob/master/44.md>

use std::fmt;

use base64::engine::{general_purpose, Engine};
use rand::rngs::OsRng;
use rand::RngCore;

pub mod v2;

use crate::{util, PublicKey, SecretKey};

/// NIP-44 error
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// v2 payload error
    V2(v2::ErrorV2),
    /// Error while decoding from base64
    Base64Decode,
    /// Secp256k1 error
    Secp256k1(secp256k1::Error),
    /// Unknown payload version
    UnknownVersion(u8),
    /// Payload is empty
    VersionNotFound,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V2(e) => write!(f, "{e}"),
            Self::Base64Decode => write!(f, "error decoding payload from base64"),
            Self::Secp256k1(e) => write!(f, "secp256k1: {e}"),
            Self::UnknownVersion(v) => write!(f, "unknown payload version: {v}"),
            Self::VersionNotFound => write!(f, "version byte not found in payload"),
        }
    }
}

impl From<v2::ErrorV2> for Error {
    fn from(e: v2::ErrorV2) -> Self {
        Self::V2(e)
    }
}

impl From<secp256k1::Error> for Error {
    fn from(e: secp256k1::Error) -> Self {
        Self::Secp256k1(e)
    }
}

/// Payload version
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Version {
    /// Secp256k1 ECDH + padding + XChaCha20-Poly1305 + base64
    #[default]
    V2 = 0x02,
}

impl Version {
    /// Get as `u8`
    #[inline]
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u8> for Version {
    type Error = Error;

    fn try_from(version: u8) -> Result<Self, Self::Error> {
        match version {
            0x02 => Ok(Self::V2),
            v => Err(Error::UnknownVersion(v)),
        }
    }
}

/// Encrypt
#[inline]
pub fn encrypt<T>(
    secret_key: &SecretKey,
    public_key: &PublicKey,
    content: T,
    version: Version,
) -> Result<String, Error>
where
    T: AsRef<[u8]>,
{
    encrypt_with_rng(&mut OsRng, secret_key, public_key, content, version)
}

/// Encrypt with a custom RNG
pub fn encrypt_with_rng<R, T>(
    rng: &mut R,
    secret_key: &SecretKey,
    public_key: &PublicKey,
    content: T,
    version: Version,
) -> Result<String, Error>
where
    R: RngCore,
    T: AsRef<[u8]>,
{
    let shared_key: [u8; 32] = util::generate_shared_key(secret_key, public_key)?;
    match version {
        Version::V2 => Ok(v2::encrypt_with_rng(rng, &shared_key, content)?),
    }
}

/// Decrypt
#[inline]
pub fn decrypt<T>(
    secret_key: &SecretKey,
    public_key: &PublicKey,
    payload: T,
) -> Result<String, Error>
where
    T: AsRef<[u8]>,
{
    let shared_key: [u8; 32] = util::generate_shared_key(secret_key, public_key)?;

    let payload: Vec<u8> = general_purpose::STANDARD
        .decode(payload.as_ref())
        .map_err(|_| Error::Base64Decode)?;
    let version_byte: u8 = *payload.first().ok_or(Error::VersionNotFound)?;

    match Version::try_from(version_byte)? {
        Version::V2 => Ok(v2::decrypt(&shared_key, &payload)?),
    }
}
