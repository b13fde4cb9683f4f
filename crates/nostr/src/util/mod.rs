// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Small cross-cutting helpers

pub mod hex;

use secp256k1::{ecdh, Parity, PublicKey as RawPublicKey};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::key::{PublicKey, SecretKey};

/// Current unix timestamp, in seconds
pub fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Derive a shared secret via ECDH, used as the starting key material for NIP-04/NIP-44
///
/// The peer's x-only public key is normalized to even parity before the ECDH multiply, so
/// encryption and decryption agree regardless of which parity the original key carried.
pub fn generate_shared_key(
    secret_key: &SecretKey,
    public_key: &PublicKey,
) -> Result<[u8; 32], secp256k1::Error> {
    let xonly = public_key.get_xonly_public_key()?;
    let normalized = RawPublicKey::from_x_only_public_key(*xonly, Parity::Even);
    let ssp: [u8; 64] = ecdh::shared_secret_point(&normalized, secret_key);
    let mut shared_key = [0u8; 32];
    shared_key.copy_from_slice(&ssp[..32]);
    Ok(shared_key)
}

/// Canonical JSON (de)serialization for wire types
pub trait JsonUtil: Sized + Serialize + DeserializeOwned {
    /// Error
    type Err: From<serde_json::Error>;

    /// Deserialize from a JSON string or byte slice
    #[inline]
    fn from_json<T>(json: T) -> Result<Self, Self::Err>
    where
        T: AsRef<[u8]>,
    {
        Ok(serde_json::from_slice(json.as_ref())?)
    }

    /// Serialize to a JSON string
    #[inline]
    fn as_json(&self) -> String {
        serde_json::to_string(self).expect("serialization of a well-formed value cannot fail")
    }
}
