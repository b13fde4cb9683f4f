// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Outbox Tracker
//!
//! Caches per-pubkey relay-preference records (NIP-65), falling back to the legacy
//! contact-list `relays` field when no relay-list event is available.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;

use async_trait::async_trait;
use lru::LruCache;
use nostr::nips::nip65::{self, RelayMetadata};
use nostr::{Event, Kind, PublicKey, RelayUrl, Timestamp};
use serde_json::Value;
use tokio::sync::{watch, Mutex};

const DEFAULT_TTL_SECS: u64 = 120;
const DEFAULT_CACHE_SIZE: usize = 2_000;

/// Where a [`RelayPreferences`] record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferenceSource {
    /// Parsed from a kind-10002 relay-list event
    Nip65,
    /// Parsed from the legacy kind-3 contact-list `relays` content field
    ContactList,
    /// Set directly by the caller
    Manual,
    /// No record could be found anywhere
    Unknown,
}

/// A pubkey's read/write relay preferences
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayPreferences {
    /// Relays this pubkey reads from (and where others should look for replies/mentions)
    pub read: HashSet<RelayUrl>,
    /// Relays this pubkey publishes to (and where others should look for their events)
    pub write: HashSet<RelayUrl>,
    /// Provenance of this record
    pub source: PreferenceSource,
    /// When this record was fetched
    pub fetched_at: Timestamp,
}

impl RelayPreferences {
    /// An empty, `Unknown`-sourced record, as returned on a total miss
    pub fn unknown() -> Self {
        Self {
            read: HashSet::new(),
            write: HashSet::new(),
            source: PreferenceSource::Unknown,
            fetched_at: Timestamp::now(),
        }
    }

    fn from_nip65_event(event: &Event) -> Self {
        let mut read = HashSet::new();
        let mut write = HashSet::new();
        for (url, metadata) in nip65::extract_relay_list(event) {
            match metadata {
                Some(RelayMetadata::Read) => {
                    read.insert(url);
                }
                Some(RelayMetadata::Write) => {
                    write.insert(url);
                }
                None => {
                    read.insert(url.clone());
                    write.insert(url);
                }
            }
        }
        Self {
            read,
            write,
            source: PreferenceSource::Nip65,
            fetched_at: Timestamp::now(),
        }
    }

    /// Parse the legacy NIP-02 `{"<relay-url>": {"read": bool, "write": bool}}` content map
    fn from_contact_list_event(event: &Event) -> Option<Self> {
        let map: HashMap<String, Value> = serde_json::from_str(&event.content).ok()?;
        if map.is_empty() {
            return None;
        }

        let mut read = HashSet::new();
        let mut write = HashSet::new();
        for (url, perms) in map {
            let Ok(url) = RelayUrl::parse(&url) else {
                continue;
            };
            let wants_read = perms.get("read").and_then(Value::as_bool).unwrap_or(true);
            let wants_write = perms.get("write").and_then(Value::as_bool).unwrap_or(true);
            if wants_read {
                read.insert(url.clone());
            }
            if wants_write {
                write.insert(url);
            }
        }

        Some(Self {
            read,
            write,
            source: PreferenceSource::ContactList,
            fetched_at: Timestamp::now(),
        })
    }

    fn is_expired(&self, ttl_secs: u64) -> bool {
        Timestamp::now().as_u64().saturating_sub(self.fetched_at.as_u64()) > ttl_secs
    }
}

/// Fetches the raw relay-list/contact-list events an [`OutboxTracker`] needs on a cache
/// miss. Kept as a narrow trait so this crate never depends on a relay pool directly; the
/// facade wires a pool-backed implementation in.
#[async_trait]
pub trait RelayListFetcher: Send + Sync {
    /// Fetch the latest kind-10002 relay-list event for `pubkey`, if any relay has it
    async fn fetch_relay_list(&self, pubkey: PublicKey) -> Option<Event>;

    /// Fetch the latest kind-3 contact-list event for `pubkey`, if any relay has it
    async fn fetch_contact_list(&self, pubkey: PublicKey) -> Option<Event>;
}

#[derive(Debug)]
struct Entry {
    preferences: RelayPreferences,
}

/// LRU cache of [`RelayPreferences`], with TTL expiry and coalesced in-flight fetches
#[derive(Debug)]
pub struct OutboxTracker {
    cache: Mutex<LruCache<PublicKey, Entry>>,
    ttl_secs: u64,
    /// One watch per in-flight fetch; the leader flips it to `true` when done. A watch
    /// retains its value, so a follower that subscribes after the flip still wakes.
    in_flight: Mutex<HashMap<PublicKey, watch::Receiver<bool>>>,
}

impl OutboxTracker {
    /// A tracker with the default capacity (2000 pubkeys) and TTL (2 minutes)
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_CACHE_SIZE, DEFAULT_TTL_SECS)
    }

    /// A tracker with an explicit capacity and TTL, in seconds
    pub fn with_capacity_and_ttl(capacity: usize, ttl_secs: u64) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            ttl_secs,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Insert or overwrite a record directly, bypassing any fetch
    pub async fn set(&self, pubkey: PublicKey, preferences: RelayPreferences) {
        self.cache.lock().await.put(pubkey, Entry { preferences });
    }

    /// Return the cached record for `pubkey` without triggering a fetch, even if stale
    pub async fn peek(&self, pubkey: &PublicKey) -> Option<RelayPreferences> {
        self.cache
            .lock()
            .await
            .peek(pubkey)
            .map(|entry| entry.preferences.clone())
    }

    /// Get a pubkey's relay preferences, fetching (and caching) on a miss or TTL expiry
    ///
    /// Concurrent calls for the same pubkey while a fetch is in flight all await the same
    /// fetch rather than issuing duplicate network round-trips.
    pub async fn get_or_fetch(
        &self,
        pubkey: PublicKey,
        fetcher: &dyn RelayListFetcher,
    ) -> RelayPreferences {
        if let Some(entry) = self.cache.lock().await.get(&pubkey) {
            if !entry.preferences.is_expired(self.ttl_secs) {
                return entry.preferences.clone();
            }
        }

        // elect a leader under the lock; followers take a receiver for its done signal
        let (done_tx, follower_rx) = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(&pubkey) {
                Some(rx) => (None, Some(rx.clone())),
                None => {
                    let (tx, rx) = watch::channel(false);
                    in_flight.insert(pubkey.clone(), rx);
                    (Some(tx), None)
                }
            }
        };

        if let Some(mut rx) = follower_rx {
            // wait_for checks the current value first, so a leader that finished before
            // we got here cannot strand us; a dropped sender also unblocks
            let _ = rx.wait_for(|done| *done).await;
            return self
                .peek(&pubkey)
                .await
                .unwrap_or_else(RelayPreferences::unknown);
        }

        let done_tx = done_tx.expect("leader holds the sender");
        let fetched = self.fetch(pubkey.clone(), fetcher).await;
        self.cache.lock().await.put(
            pubkey.clone(),
            Entry {
                preferences: fetched.clone(),
            },
        );

        self.in_flight.lock().await.remove(&pubkey);
        let _ = done_tx.send(true);

        fetched
    }

    async fn fetch(&self, pubkey: PublicKey, fetcher: &dyn RelayListFetcher) -> RelayPreferences {
        if let Some(event) = fetcher.fetch_relay_list(pubkey.clone()).await {
            if event.kind == Kind::new(nostr::event::kind::RELAY_LIST) {
                return RelayPreferences::from_nip65_event(&event);
            }
        }

        if let Some(event) = fetcher.fetch_contact_list(pubkey.clone()).await {
            if let Some(preferences) = RelayPreferences::from_contact_list_event(&event) {
                return preferences;
            }
        }

        tracing::debug!(pubkey = %pubkey, "no relay-preference record found anywhere");
        RelayPreferences::unknown()
    }
}

impl Default for OutboxTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use nostr::{EventBuilder, Keys, Tag};

    use super::*;

    struct StaticFetcher {
        relay_list: Option<Event>,
        contact_list: Option<Event>,
    }

    #[async_trait]
    impl RelayListFetcher for StaticFetcher {
        async fn fetch_relay_list(&self, _pubkey: PublicKey) -> Option<Event> {
            self.relay_list.clone()
        }

        async fn fetch_contact_list(&self, _pubkey: PublicKey) -> Option<Event> {
            self.contact_list.clone()
        }
    }

    #[tokio::test]
    async fn fetches_and_caches_nip65() {
        let keys = Keys::generate();
        let event = EventBuilder::new(
            Kind::new(nostr::event::kind::RELAY_LIST),
            "",
            [
                Tag::relay_list_entry("wss://relay.one", None),
                Tag::relay_list_entry("wss://read-only.example.com", Some("read")),
            ],
        )
        .sign_with_keys(&keys)
        .unwrap();

        let tracker = OutboxTracker::new();
        let fetcher = StaticFetcher {
            relay_list: Some(event),
            contact_list: None,
        };

        let prefs = tracker.get_or_fetch(keys.public_key(), &fetcher).await;
        assert_eq!(prefs.source, PreferenceSource::Nip65);
        assert!(prefs.write.contains(&RelayUrl::parse("wss://relay.one").unwrap()));
        assert!(prefs.read.contains(&RelayUrl::parse("wss://read-only.example.com").unwrap()));
        assert!(!prefs.write.contains(&RelayUrl::parse("wss://read-only.example.com").unwrap()));

        // second call is served from cache, not from the fetcher
        let cached = tracker.peek(&keys.public_key()).await.unwrap();
        assert_eq!(cached.source, PreferenceSource::Nip65);
    }

    #[tokio::test]
    async fn falls_back_to_contact_list() {
        let keys = Keys::generate();
        let content = r#"{"wss://fallback.example.com": {"write": true, "read": false}}"#;
        let event = EventBuilder::new(Kind::new(nostr::event::kind::CONTACT_LIST), content, [])
            .sign_with_keys(&keys)
            .unwrap();

        let tracker = OutboxTracker::new();
        let fetcher = StaticFetcher {
            relay_list: None,
            contact_list: Some(event),
        };

        let prefs = tracker.get_or_fetch(keys.public_key(), &fetcher).await;
        assert_eq!(prefs.source, PreferenceSource::ContactList);
        assert!(prefs
            .write
            .contains(&RelayUrl::parse("wss://fallback.example.com").unwrap()));
        assert!(prefs.read.is_empty());
    }

    #[tokio::test]
    async fn concurrent_lookups_share_one_fetch() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use std::time::Duration;

        struct SlowCountingFetcher {
            calls: AtomicUsize,
            relay_list: Option<Event>,
        }

        #[async_trait]
        impl RelayListFetcher for SlowCountingFetcher {
            async fn fetch_relay_list(&self, _pubkey: PublicKey) -> Option<Event> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                self.relay_list.clone()
            }

            async fn fetch_contact_list(&self, _pubkey: PublicKey) -> Option<Event> {
                None
            }
        }

        let keys = Keys::generate();
        let event = EventBuilder::new(
            Kind::new(nostr::event::kind::RELAY_LIST),
            "",
            [Tag::relay_list_entry("wss://relay.one", None)],
        )
        .sign_with_keys(&keys)
        .unwrap();

        let tracker = Arc::new(OutboxTracker::new());
        let fetcher = Arc::new(SlowCountingFetcher {
            calls: AtomicUsize::new(0),
            relay_list: Some(event),
        });

        let mut handles = Vec::new();
        for _ in 0..4 {
            let tracker = Arc::clone(&tracker);
            let fetcher = Arc::clone(&fetcher);
            let pubkey = keys.public_key();
            handles.push(tokio::spawn(async move {
                tracker.get_or_fetch(pubkey, fetcher.as_ref()).await
            }));
        }

        for handle in handles {
            let prefs = handle.await.unwrap();
            assert_eq!(prefs.source, PreferenceSource::Nip65);
            assert!(prefs.write.contains(&RelayUrl::parse("wss://relay.one").unwrap()));
        }

        assert_eq!(
            fetcher.calls.load(Ordering::SeqCst),
            1,
            "concurrent lookups for one pubkey must coalesce into a single fetch"
        );
    }

    #[tokio::test]
    async fn unknown_on_total_miss() {
        let keys = Keys::generate();
        let tracker = OutboxTracker::new();
        let fetcher = StaticFetcher {
            relay_list: None,
            contact_list: None,
        };

        let prefs = tracker.get_or_fetch(keys.public_key(), &fetcher).await;
        assert_eq!(prefs.source, PreferenceSource::Unknown);
    }
}
