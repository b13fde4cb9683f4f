// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Prelude

#![allow(unknown_lints)]
#![allow(ambiguous_glob_reexports)]
#![doc(hidden)]

pub use nostr::prelude::*;
pub use nostr_database::prelude::*;
pub use nostr_relay_pool::prelude::*;

pub use crate::client::*;
pub use crate::error::Error as ClientError;
pub use crate::*;
