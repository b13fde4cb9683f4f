// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Public key

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use secp256k1::XOnlyPublicKey;
use serde::{Deserialize, Deserializer, Serialize};

use super::Error;
use crate::util::hex;

/// Public key size, in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// A BIP-340 x-only-coordinate public key
///
/// Validity against the curve is checked lazily on first use (`is_valid`,
/// signature verification, ...), not at construction, so that filters and
/// events carrying a public key copied verbatim from the wire can be built
/// without paying for a curve check that may never be needed.
#[derive(Debug, Clone)]
pub struct PublicKey {
    buf: [u8; PUBLIC_KEY_SIZE],
    xonly: Arc<OnceCell<XOnlyPublicKey>>,
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.buf == other.buf
    }
}

impl Eq for PublicKey {}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.buf.cmp(&other.buf)
    }
}

impl Hash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.buf.hash(state);
    }
}

impl From<XOnlyPublicKey> for PublicKey {
    fn from(pk: XOnlyPublicKey) -> Self {
        Self {
            buf: pk.serialize(),
            xonly: Arc::new(OnceCell::from(pk)),
        }
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl PublicKey {
    /// Construct without checking the bytes lie on the curve
    #[inline]
    pub fn unchecked(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self {
            buf: bytes,
            xonly: Arc::new(OnceCell::new()),
        }
    }

    /// Construct, checking the bytes lie on the curve
    pub fn checked(bytes: [u8; PUBLIC_KEY_SIZE]) -> Result<Self, Error> {
        let xonly = XOnlyPublicKey::from_slice(&bytes)?;
        Ok(Self {
            buf: bytes,
            xonly: Arc::new(OnceCell::from(xonly)),
        })
    }

    /// Parse from `hex`
    #[inline]
    pub fn parse<S>(public_key: S) -> Result<Self, Error>
    where
        S: AsRef<str>,
    {
        Self::from_hex(public_key.as_ref())
    }

    /// Parse from a 32-byte slice
    #[inline]
    pub fn from_slice(slice: &[u8]) -> Result<Self, Error> {
        if slice.len() != PUBLIC_KEY_SIZE {
            return Err(Error::InvalidPublicKey);
        }

        let mut bytes: [u8; PUBLIC_KEY_SIZE] = [0u8; PUBLIC_KEY_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self::unchecked(bytes))
    }

    /// Parse from 32-byte `hex`
    #[inline]
    pub fn from_hex<S>(hex: S) -> Result<Self, Error>
    where
        S: AsRef<[u8]>,
    {
        let mut bytes: [u8; PUBLIC_KEY_SIZE] = [0u8; PUBLIC_KEY_SIZE];
        hex::decode_to_slice(hex, &mut bytes)?;
        Ok(Self::unchecked(bytes))
    }

    /// Get as lowercase `hex`
    #[inline]
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// Get as `bytes`
    #[inline]
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.buf
    }

    /// Consume and return `bytes`
    #[inline]
    pub fn to_bytes(self) -> [u8; PUBLIC_KEY_SIZE] {
        self.buf
    }

    /// Get or try to init the underlying [XOnlyPublicKey]
    pub(crate) fn get_xonly_public_key(&self) -> Result<&XOnlyPublicKey, secp256k1::Error> {
        self.xonly
            .get_or_try_init(|| XOnlyPublicKey::from_slice(self.as_bytes()))
    }

    /// Check whether these bytes are a valid curve point
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.get_xonly_public_key().is_ok()
    }
}

impl FromStr for PublicKey {
    type Err = Error;

    #[inline]
    fn from_str(public_key: &str) -> Result<Self, Self::Err> {
        Self::parse(public_key)
    }
}

impl From<PublicKey> for String {
    fn from(public_key: PublicKey) -> Self {
        public_key.to_hex()
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let public_key: String = String::deserialize(deserializer)?;
        Self::parse(public_key).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "aa4fc8665f5696e33db7e1a572e3b0f5b3d615837b0f362dcb1c8068b098c7b4";

    #[test]
    fn test_public_key_from_hex() {
        let public_key = PublicKey::from_hex(HEX).unwrap();
        assert_eq!(public_key.to_hex(), HEX);
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert!(PublicKey::from_hex("ab").is_err());
    }

    #[test]
    fn test_unchecked_does_not_validate() {
        let zero = PublicKey::unchecked([0u8; PUBLIC_KEY_SIZE]);
        assert!(!zero.is_valid());
    }
}
