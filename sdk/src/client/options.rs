// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Client options

use std::collections::HashSet;
use std::time::Duration;

use nostr::RelayUrl;
use nostr_relay_pool::pool::RelayPoolOptions;
use nostr_relay_pool::{PublishOptions, VerifierOptions};

/// Outbox (gossip) model configuration
#[derive(Debug, Clone)]
pub struct OutboxOptions {
    /// Route publishes and fetches by per-author relay preferences (default: true)
    pub enable: bool,
    /// Cap on relays selected per call (default: 4)
    pub max_relays_per_author: u8,
    /// Fallback write relays when a selection comes up short
    pub default_write_relays: HashSet<RelayUrl>,
    /// Fallback read relays, also used to bootstrap relay-list discovery
    pub default_read_relays: HashSet<RelayUrl>,
}

impl Default for OutboxOptions {
    fn default() -> Self {
        Self {
            enable: true,
            max_relays_per_author: 4,
            default_write_relays: HashSet::new(),
            default_read_relays: HashSet::new(),
        }
    }
}

/// Defaults applied to every fetch that does not override them
#[derive(Debug, Clone)]
pub struct FetchDefaults {
    /// Overall fetch deadline (default: 10 s)
    pub timeout: Duration,
    /// When an author has no read relays, fall back to their write relays (default: true)
    pub prefer_write_if_no_read: bool,
    /// Grouping window before a REQ goes out (default: 100 ms)
    pub grouping_window: Duration,
    /// Per-subscription dedup window (default: 5 min)
    pub dedup_window: Duration,
}

impl Default for FetchDefaults {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            prefer_write_if_no_read: true,
            grouping_window: Duration::from_millis(100),
            dedup_window: Duration::from_secs(300),
        }
    }
}

/// Bookkeeping for terminated subscriptions
#[derive(Debug, Clone)]
pub struct SubscriptionTracking {
    /// Remember terminated subscriptions (default: false)
    pub track_closed: bool,
    /// How many to remember (default: 128)
    pub max_closed_history: usize,
}

impl Default for SubscriptionTracking {
    fn default() -> Self {
        Self {
            track_closed: false,
            max_closed_history: 128,
        }
    }
}

/// Client configuration surface
#[derive(Debug, Clone)]
pub struct Options {
    /// Relays excluded from any automatic selection
    pub blacklisted_relays: HashSet<RelayUrl>,
    /// Signature verification sampling policy
    pub signature_verification: VerifierOptions,
    /// Outbox model configuration
    pub outbox: OutboxOptions,
    /// Defaults applied to every publish
    pub publish_defaults: PublishOptions,
    /// Defaults applied to every fetch
    pub fetch_defaults: FetchDefaults,
    /// Terminated-subscription bookkeeping
    pub subscription_tracking: SubscriptionTracking,
    /// How often the background worker replays the unpublished queue (default: 5 min)
    pub unpublished_replay_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            blacklisted_relays: HashSet::new(),
            signature_verification: VerifierOptions::default(),
            outbox: OutboxOptions::default(),
            publish_defaults: PublishOptions::default(),
            fetch_defaults: FetchDefaults::default(),
            subscription_tracking: SubscriptionTracking::default(),
            unpublished_replay_interval: Duration::from_secs(300),
        }
    }
}

impl Options {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn pool_options(&self) -> RelayPoolOptions {
        RelayPoolOptions::default()
            .verifier(self.signature_verification.clone())
            .notification_channel_size(4096)
            .max_publish_concurrency(16)
            .track_closed(
                self.subscription_tracking.track_closed,
                self.subscription_tracking.max_closed_history,
            )
    }
}
