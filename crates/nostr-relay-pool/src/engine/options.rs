// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Subscription engine options

use std::collections::HashSet;
use std::time::Duration;

use nostr::RelayUrl;

pub(super) const DEFAULT_GROUPING_WINDOW: Duration = Duration::from_millis(100);
pub(super) const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(300);
pub(super) const DEFAULT_EOSE_IDLE: Duration = Duration::from_secs(1);
pub(super) const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub(super) const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// How a subscription combines the local cache with the relays
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheStrategy {
    /// Answer from the cache only; never touch a relay
    CacheOnly,
    /// Answer from the cache; open a relay subscription only if the cache cannot satisfy
    /// the limit
    CacheFirst,
    /// Query the cache and the relays at the same time, deduplicated
    Parallel,
    /// Skip the cache read (write-through still happens)
    #[default]
    RelayOnly,
}

/// Options for a live subscription
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    /// Cache strategy (default: [`CacheStrategy::RelayOnly`])
    pub cache_strategy: CacheStrategy,
    /// Terminate once the EOSE policy declares the subscription done (default: false)
    pub close_on_eose: bool,
    /// Exact relays to target, overriding the pool-wide default of "every relay"
    pub relay_set: Option<HashSet<RelayUrl>>,
    /// Stop after yielding this many events
    pub limit: Option<usize>,
    /// How long a new subscription waits for merge-compatible company before its REQ is
    /// sent (default: 100 ms)
    pub grouping_window: Duration,
    /// Within this window each event id is yielded at most once (default: 5 min)
    pub dedup_window: Duration,
    /// Quorum-idle threshold of the EOSE policy (default: 1 s)
    pub eose_idle: Duration,
    /// Hard deadline of the EOSE policy; only applies with `close_on_eose` (default: 10 s)
    pub deadline: Duration,
    /// Consumer channel capacity; events beyond it are dropped, not blocked on
    /// (default: 1024)
    pub channel_capacity: usize,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            cache_strategy: CacheStrategy::RelayOnly,
            close_on_eose: false,
            relay_set: None,
            limit: None,
            grouping_window: DEFAULT_GROUPING_WINDOW,
            dedup_window: DEFAULT_DEDUP_WINDOW,
            eose_idle: DEFAULT_EOSE_IDLE,
            deadline: DEFAULT_FETCH_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl SubscribeOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache strategy
    pub fn cache_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.cache_strategy = strategy;
        self
    }

    /// Terminate once the EOSE policy is satisfied
    pub fn close_on_eose(mut self, close: bool) -> Self {
        self.close_on_eose = close;
        self
    }

    /// Target exactly these relays
    pub fn relay_set<I>(mut self, relays: I) -> Self
    where
        I: IntoIterator<Item = RelayUrl>,
    {
        self.relay_set = Some(relays.into_iter().collect());
        self
    }

    /// Cap the number of yielded events
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the grouping window
    pub fn grouping_window(mut self, window: Duration) -> Self {
        self.grouping_window = window;
        self
    }

    /// Set the dedup window
    pub fn dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }
}

/// Options for a one-shot fetch
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Cache strategy (default: [`CacheStrategy::CacheFirst`])
    pub cache_strategy: CacheStrategy,
    /// Exact relays to target, overriding the pool-wide default of "every relay"
    pub relay_set: Option<HashSet<RelayUrl>>,
    /// Stop after collecting this many events
    pub limit: Option<usize>,
    /// Overall deadline (default: 10 s)
    pub timeout: Duration,
    /// Quorum-idle threshold of the EOSE policy (default: 1 s)
    pub eose_idle: Duration,
    /// Grouping window before the REQ goes out (default: 100 ms)
    pub grouping_window: Duration,
    /// Dedup window (default: 5 min)
    pub dedup_window: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            cache_strategy: CacheStrategy::CacheFirst,
            relay_set: None,
            limit: None,
            timeout: DEFAULT_FETCH_TIMEOUT,
            eose_idle: DEFAULT_EOSE_IDLE,
            grouping_window: DEFAULT_GROUPING_WINDOW,
            dedup_window: DEFAULT_DEDUP_WINDOW,
        }
    }
}

impl FetchOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache strategy
    pub fn cache_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.cache_strategy = strategy;
        self
    }

    /// Target exactly these relays
    pub fn relay_set<I>(mut self, relays: I) -> Self
    where
        I: IntoIterator<Item = RelayUrl>,
    {
        self.relay_set = Some(relays.into_iter().collect());
        self
    }

    /// Cap the number of collected events
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the overall deadline
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(super) fn into_subscribe_options(self) -> SubscribeOptions {
        SubscribeOptions {
            cache_strategy: self.cache_strategy,
            close_on_eose: true,
            relay_set: self.relay_set,
            limit: self.limit,
            grouping_window: self.grouping_window,
            dedup_window: self.dedup_window,
            eose_idle: self.eose_idle,
            deadline: self.timeout,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}
