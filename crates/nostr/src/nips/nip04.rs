// Copyright (c) 2021 Paul Miller
// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! NIP04: Encrypted Direct Message (deprecated in favor of NIP17)
//!
//! <div class="warning"><strong>Unsecure!</strong> Deprecated in favor of NIP17!</div>
//!
//! <https://github.com/nostr-protocol/nips/blob/master/04.md>

use std::fmt;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use base64::engine::{general_purpose, Engine};
use cbc::{Decryptor, Encryptor};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::{util, PublicKey, SecretKey};

type Aes256CbcEnc = Encryptor<Aes256>;
type Aes256CbcDec = Decryptor<Aes256>;

/// NIP-04 error
#[derive(Debug, Eq, PartialEq)]
pub enum Error {
    /// Secp256k1 error
    Secp256k1(secp256k1::Error),
    /// Invalid content format
    InvalidContentFormat,
    /// Error while decoding from base64
    Base64Decode,
    /// Error while encoding to UTF-8
    Utf8Encode,
    /// Wrong encryption block mode
    WrongBlockMode,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secp256k1(e) => write!(f, "secp256k1: {e}"),
            Self::InvalidContentFormat => write!(f, "invalid NIP-04 content format"),
            Self::Base64Decode => write!(f, "error decoding NIP-04 payload from base64"),
            Self::Utf8Encode => write!(f, "error encoding NIP-04 plaintext to UTF-8"),
            Self::WrongBlockMode => {
                write!(f, "content must be encrypted using AES-256-CBC")
            }
        }
    }
}

impl From<secp256k1::Error> for Error {
    fn from(e: secp256k1::Error) -> Self {
        Self::Secp256k1(e)
    }
}

/// Encrypt
///
/// <div class="warning"><strong>Unsecure!</strong> Deprecated in favor of NIP17!</div>
#[inline]
pub fn encrypt<T>(secret_key: &SecretKey, public_key: &PublicKey, content: T) -> Result<String, Error>
where
    T: AsRef<[u8]>,
{
    encrypt_with_rng(&mut OsRng, secret_key, public_key, content)
}

/// Encrypt with a custom RNG
///
/// <div class="warning"><strong>Unsecure!</strong> Deprecated in favor of NIP17!</div>
pub fn encrypt_with_rng<R, T>(
    rng: &mut R,
    secret_key: &SecretKey,
    public_key: &PublicKey,
    content: T,
) -> Result<String, Error>
where
    R: RngCore,
    T: AsRef<[u8]>,
{
    let key: [u8; 32] = util::generate_shared_key(secret_key, public_key)?;

    let mut iv: [u8; 16] = [0u8; 16];
    rng.fill_bytes(&mut iv);

    let cipher = Aes256CbcEnc::new(&key.into(), &iv.into());
    let result: Vec<u8> = cipher.encrypt_padded_vec_mut::<Pkcs7>(content.as_ref());

    Ok(format!(
        "{}?iv={}",
        general_purpose::STANDARD.encode(result),
        general_purpose::STANDARD.encode(iv)
    ))
}

/// Decrypt to raw bytes, without assuming UTF-8 content
///
/// <div class="warning"><strong>Unsecure!</strong> Deprecated in favor of NIP17!</div>
pub fn decrypt_to_bytes<S>(
    secret_key: &SecretKey,
    public_key: &PublicKey,
    encrypted_content: S,
) -> Result<Vec<u8>, Error>
where
    S: AsRef<str>,
{
    let encrypted_content: &str = encrypted_content.as_ref();
    let parsed_content: Vec<&str> = encrypted_content.split("?iv=").collect();
    if parsed_content.len() != 2 {
        return Err(Error::InvalidContentFormat);
    }

    let encrypted_content: Vec<u8> = general_purpose::STANDARD
        .decode(parsed_content[0])
        .map_err(|_| Error::Base64Decode)?;
    let iv: Vec<u8> = general_purpose::STANDARD
        .decode(parsed_content[1])
        .map_err(|_| Error::Base64Decode)?;
    let key: [u8; 32] = util::generate_shared_key(secret_key, public_key)?;

    let cipher = Aes256CbcDec::new(&key.into(), iv.as_slice().into());
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&encrypted_content)
        .map_err(|_| Error::WrongBlockMode)
}

/// Decrypt to a UTF-8 string
///
/// <div class="warning"><strong>Unsecure!</strong> Deprecated in favor of NIP17!</div>
#[inline]
pub fn decrypt<S>(
    secret_key: &SecretKey,
    public_key: &PublicKey,
    encrypted_content: S,
) -> Result<String, Error>
where
    S: AsRef<str>,
{
    let result: Vec<u8> = decrypt_to_bytes(secret_key, public_key, encrypted_content)?;
    String::from_utf8(result).map_err(|_| Error::Utf8Encode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Keys;

    #[test]
    fn test_encryption_decryption() {
        let sender_sk = SecretKey::from_hex(
            "6b911fd37cdf5c81d4c0adb1ab7fa822ed253ab0ad9aa18d77257c88b29b718e",
        )
        .unwrap();
        let sender_keys = Keys::new(sender_sk);

        let receiver_sk = SecretKey::from_hex(
            "7b911fd37cdf5c81d4c0adb1ab7fa822ed253ab0ad9aa18d77257c88b29b718e",
        )
        .unwrap();
        let receiver_keys = Keys::new(receiver_sk);

        let content = "Saturn, bringer of old age".to_string();

        let encrypted_content =
            encrypt(sender_keys.secret_key(), &receiver_keys.public_key(), &content).unwrap();
        assert_eq!(
            decrypt(receiver_keys.secret_key(), &sender_keys.public_key(), encrypted_content)
                .unwrap(),
            content
        );

        assert_eq!(
            decrypt(sender_keys.secret_key(), &receiver_keys.public_key(), "invalidcontentformat")
                .unwrap_err(),
            Error::InvalidContentFormat
        );
        assert_eq!(
            decrypt(sender_keys.secret_key(), &receiver_keys.public_key(), "badbase64?iv=encode")
                .unwrap_err(),
            Error::Base64Decode
        );
    }
}
