// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Prelude

#![allow(unknown_lints)]
#![allow(ambiguous_glob_reexports)]
#![doc(hidden)]

// External crates
pub use nostr::prelude::*;
pub use nostr_database::prelude::*;

// Internal modules
pub use crate::engine::*;
pub use crate::pipeline::*;
pub use crate::pool::{self, *};
pub use crate::relay::{self, *};
pub use crate::*;
