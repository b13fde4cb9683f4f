// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! NIP-44 (v2) payload framing
//!
//! <https://github.com/nostr-protocol/nips/blob/master/44.md>

use std::fmt;
use std::string::FromUtf8Error;

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::Error;

const SALT_SIZE: usize = 32;
const NONCE_SIZE: usize = 24;

/// v2 payload error
#[derive(Debug, PartialEq, Eq)]
pub enum ErrorV2 {
    /// Error while encoding to UTF-8
    Utf8Encode(String),
    /// Message is empty
    MessageEmpty,
    /// Message is too long
    MessageTooLong,
    /// Payload failed AEAD authentication or could not be parsed
    InvalidPayload,
    /// Padding did not match the plaintext length encoded in the payload
    InvalidPadding,
}

impl std::error::Error for ErrorV2 {}

impl fmt::Display for ErrorV2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Utf8Encode(e) => write!(f, "error while encoding to UTF-8: {e}"),
            Self::MessageEmpty => write!(f, "message empty"),
            Self::MessageTooLong => write!(f, "message too long"),
            Self::InvalidPayload => write!(f, "invalid or forged payload"),
            Self::InvalidPadding => write!(f, "invalid padding"),
        }
    }
}

impl From<FromUtf8Error> for ErrorV2 {
    fn from(e: FromUtf8Error) -> Self {
        Self::Utf8Encode(e.to_string())
    }
}

/// Encrypt with NIP-44 (v2)
#[inline]
pub fn encrypt<T>(shared_key: &[u8; 32], plaintext: T) -> Result<String, Error>
where
    T: AsRef<[u8]>,
{
    encrypt_with_rng(&mut OsRng, shared_key, plaintext)
}

/// Encrypt with NIP-44 (v2) using a custom RNG
pub fn encrypt_with_rng<R, T>(rng: &mut R, shared_key: &[u8; 32], plaintext: T) -> Result<String, Error>
where
    R: RngCore,
    T: AsRef<[u8]>,
{
    let mut salt: [u8; SALT_SIZE] = [0; SALT_SIZE];
    rng.fill_bytes(&mut salt);

    let mut nonce_bytes: [u8; NONCE_SIZE] = [0; NONCE_SIZE];
    rng.fill_bytes(&mut nonce_bytes);

    let key: [u8; 32] = derive_message_key(shared_key, &salt);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
    let nonce = XNonce::from_slice(&nonce_bytes);

    let padded: Vec<u8> = pad(plaintext)?;
    let ciphertext: Vec<u8> = cipher
        .encrypt(nonce, padded.as_slice())
        .map_err(|_| ErrorV2::InvalidPayload)?;

    let mut payload: Vec<u8> = vec![2]; // version
    payload.extend_from_slice(&salt);
    payload.extend_from_slice(&nonce_bytes);
    payload.extend(ciphertext);

    Ok(base64_encode(&payload))
}

/// Decrypt with NIP-44 (v2)
///
/// The payload must already be decoded from base64.
pub fn decrypt<T>(shared_key: &[u8; 32], payload: T) -> Result<String, Error>
where
    T: AsRef<[u8]>,
{
    let payload: &[u8] = payload.as_ref();
    let salt: &[u8] = payload
        .get(1..1 + SALT_SIZE)
        .ok_or(ErrorV2::InvalidPayload)?;
    let nonce_bytes: &[u8] = payload
        .get(1 + SALT_SIZE..1 + SALT_SIZE + NONCE_SIZE)
        .ok_or(ErrorV2::InvalidPayload)?;
    let ciphertext: &[u8] = payload
        .get(1 + SALT_SIZE + NONCE_SIZE..)
        .ok_or(ErrorV2::InvalidPayload)?;

    let key: [u8; 32] = derive_message_key(shared_key, salt);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
    let nonce = XNonce::from_slice(nonce_bytes);

    let buffer: Vec<u8> = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| ErrorV2::InvalidPayload)?;

    unpad(&buffer)
}

fn derive_message_key(shared_key: &[u8; 32], salt: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"nip44-v2");
    hasher.update(shared_key);
    hasher.update(salt);
    hasher.finalize().into()
}

/// Pad a plaintext to the next power-of-two-ish bucket, prefixed with its true length
///
/// Hides the exact plaintext length from anyone observing ciphertext size, per NIP-44.
fn pad<T>(unpadded: T) -> Result<Vec<u8>, ErrorV2>
where
    T: AsRef<[u8]>,
{
    let unpadded: &[u8] = unpadded.as_ref();
    let len: usize = unpadded.len();

    if len < 1 {
        return Err(ErrorV2::MessageEmpty);
    }
    if len > 65536 - 128 {
        return Err(ErrorV2::MessageTooLong);
    }

    let take: usize = calc_padding(len) - len;
    let mut padded: Vec<u8> = Vec::with_capacity(2 + len + take);
    padded.extend_from_slice(&(len as u16).to_be_bytes());
    padded.extend_from_slice(unpadded);
    padded.extend(std::iter::repeat(0).take(take));
    Ok(padded)
}

fn unpad(buffer: &[u8]) -> Result<String, Error> {
    let be_bytes: [u8; 2] = buffer
        .get(0..2)
        .and_then(|s| s.try_into().ok())
        .ok_or(ErrorV2::InvalidPadding)?;
    let unpadded_len: usize = u16::from_be_bytes(be_bytes) as usize;
    let unpadded: &[u8] = buffer.get(2..2 + unpadded_len).ok_or(ErrorV2::InvalidPadding)?;

    if unpadded.is_empty() {
        return Err(ErrorV2::MessageEmpty.into());
    }
    if buffer.len() != 2 + calc_padding(unpadded_len) {
        return Err(ErrorV2::InvalidPadding.into());
    }

    String::from_utf8(unpadded.to_vec()).map_err(|e| Error::V2(ErrorV2::from(e)))
}

#[inline]
fn calc_padding(len: usize) -> usize {
    if len <= 32 {
        return 32;
    }
    let nextpower: usize = 1 << (log2_round_down(len - 1) + 1);
    let chunk: usize = if nextpower <= 256 { 32 } else { nextpower / 8 };
    chunk * (((len - 1) / chunk) + 1)
}

#[inline]
fn log2_round_down(x: usize) -> u32 {
    if x == 0 {
        0
    } else {
        (x as f64).log2().floor() as u32
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::engine::{general_purpose, Engine};
    general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util;
    use crate::Keys;

    #[test]
    fn test_padding_buckets() {
        assert_eq!(calc_padding(1), 32);
        assert_eq!(calc_padding(32), 32);
        assert_eq!(calc_padding(33), 64);
        assert_eq!(calc_padding(256), 256);
        assert_eq!(calc_padding(257), 288);
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let alice = Keys::generate();
        let bob = Keys::generate();

        let shared: [u8; 32] =
            util::generate_shared_key(alice.secret_key(), &bob.public_key()).unwrap();

        let plaintext = "Gracias a la vida, que me ha dado tanto";
        let payload = encrypt(&shared, plaintext).unwrap();
        assert_eq!(decrypt(&shared, base64_decode(&payload)).unwrap(), plaintext);
    }

    #[test]
    fn test_rejects_forged_ciphertext() {
        let alice = Keys::generate();
        let bob = Keys::generate();
        let shared: [u8; 32] =
            util::generate_shared_key(alice.secret_key(), &bob.public_key()).unwrap();

        let payload = encrypt(&shared, "hello").unwrap();
        let mut raw = base64_decode(&payload);
        let last = raw.len() - 1;
        raw[last] ^= 0xff;

        assert!(decrypt(&shared, raw).is_err());
    }

    fn base64_decode(s: &str) -> Vec<u8> {
        use base64::engine::{general_purpose, Engine};
        general_purpose::STANDARD.decode(s).unwrap()
    }
}
