// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay pool, subscription engine and publishing pipeline
//!
//! The networking core of the SDK: per-relay WebSocket connections with supervised
//! reconnection, a pool that shares one database/signer/verifier across them, a
//! subscription engine that groups and deduplicates filters, and a publishing pipeline
//! with retries, NIP-42 auth and NIP-13 proof-of-work escalation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod engine;
pub mod filtering;
pub mod pipeline;
pub mod pool;
pub mod prelude;
pub mod relay;
pub mod shared;
pub mod transport;
pub mod verifier;

pub use self::engine::{
    CacheStrategy, CompletionReason, EngineStats, FetchOptions, FetchRelayState, FetchResult,
    FetchSummary, SubscribeOptions, SubscriptionStream,
};
pub use self::filtering::{CheckFiltering, ExclusionReason, RelayFiltering};
pub use self::pipeline::{
    PublishHandle, PublishOptions, PublishResult, PublishStatus, RelayPublishOutcome,
};
pub use self::pool::{Output, RelayPool, RelayPoolNotification, RelayPoolOptions};
pub use self::relay::{
    Relay, RelayConnectionStats, RelayNotification, RelayOptions, RelayStatus,
    RelaySubscribeOptions,
};
pub use self::shared::SharedState;
pub use self::transport::{DefaultTransport, Transport, TransportError};
pub use self::verifier::{Admission, SignatureVerifier, VerifierOptions};
