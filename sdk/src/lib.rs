// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! High-level nostr client
//!
//! Wires together the protocol types, the cache, the relay pool with its subscription
//! engine and publishing pipeline, and outbox-model relay selection, behind one
//! [`Client`] facade.
//!
//! ```no_run
//! use nostr_sdk::prelude::*;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let keys = Keys::generate();
//! let client = Client::new(keys);
//!
//! client.add_relay("wss://relay.damus.io").await?;
//! client.add_relay("wss://nos.lol").await?;
//! client.connect().await;
//!
//! let output = client.publish_text_note("Hello, world!").await?;
//! println!("accepted by {} relays", output.result.per_relay.len());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod client;
pub mod error;
pub mod prelude;

pub use self::client::{
    Client, ClientBuilder, FetchDefaults, Options, OutboxOptions, SendEventOutput,
    SubscriptionTracking, UserHandle,
};
pub use self::error::Error;

// the layers underneath, for callers that need to reach past the facade
pub use nostr;
pub use nostr_database as database;
pub use nostr_gossip as gossip;
pub use nostr_relay_pool as pool;
