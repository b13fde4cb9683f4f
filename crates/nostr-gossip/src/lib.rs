// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Outbox-model relay tracking, ranking and selection.
//!
//! This crate caches per-pubkey relay-preference records (NIP-65, falling back to the
//! legacy contact-list `relays` field), scores candidate relays, and computes the target
//! relay set for a publish or fetch call.

#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod outbox;
pub mod ranker;
pub mod selector;

pub use self::outbox::{OutboxTracker, PreferenceSource, RelayListFetcher, RelayPreferences};
pub use self::ranker::{RankerWeights, RelayHealthInput, RelayRanker};
pub use self::selector::{FetchSelection, PublishSelection, RelaySelector, SelectionOptions};
