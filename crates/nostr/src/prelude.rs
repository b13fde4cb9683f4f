// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Prelude

#![allow(unknown_lints)]
#![allow(ambiguous_glob_reexports)]
#![doc(hidden)]

// External crates
pub use secp256k1::rand;
pub use secp256k1::schnorr::Signature;
pub use serde_json::Value;

// Internal modules
pub use crate::event::builder::*;
pub use crate::event::id::*;
pub use crate::event::kind::*;
pub use crate::event::tag::*;
pub use crate::event::unsigned::*;
pub use crate::event::*;
pub use crate::key::*;
pub use crate::message::*;
pub use crate::filter::*;
// NIPs
pub use crate::nips::nip01::{self, *};
#[cfg(feature = "nip04")]
pub use crate::nips::nip04;
pub use crate::nips::nip13::{self, *};
pub use crate::nips::nip42::{self, *};
#[cfg(feature = "nip44")]
pub use crate::nips::nip44::{self, *};
pub use crate::nips::nip65::{self, *};
pub use crate::signer::*;
pub use crate::types::*;
pub use crate::util::*;
pub use crate::SECP256K1;
