// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Client
//!
//! The high-level facade: wires the relay pool, the cache, the outbox tracker and the
//! signer together, and routes every publish and fetch through outbox-model relay
//! selection when that is enabled.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use nostr::event::tag;
use nostr::{
    Event, EventBuilder, Filter, Kind, NostrSigner, PublicKey, RelayUrl, Timestamp, UnsignedEvent,
};
use nostr_database::{NostrDatabase, Profile};
use nostr_gossip::outbox::{OutboxTracker, RelayListFetcher, RelayPreferences};
use nostr_gossip::ranker::{RelayHealthInput, RelayRanker};
use nostr_gossip::selector::{RelaySelector, SelectionOptions};
use nostr_relay_pool::pool::RelayPoolOptions;
use nostr_relay_pool::{
    CacheStrategy, FetchOptions, FetchResult, PublishResult, Relay, RelayOptions, RelayPool,
    RelayPoolNotification, SharedState, SubscribeOptions, SubscriptionStream,
};
use tokio::sync::broadcast;

mod builder;
pub mod options;

pub use self::builder::ClientBuilder;
pub use self::options::{FetchDefaults, Options, OutboxOptions, SubscriptionTracking};
use crate::error::Error;

/// Result of a gossip-routed publish
#[derive(Debug, Clone)]
pub struct SendEventOutput {
    /// The pipeline's verdict, with the full per-relay breakdown
    pub result: PublishResult,
    /// `p`-tagged pubkeys that had no relay-preference record; the caller may want to
    /// drive discovery for them
    pub missing_relay_info_pubkeys: HashSet<PublicKey>,
}

impl SendEventOutput {
    /// Whether the publish met its success threshold
    pub fn is_success(&self) -> bool {
        self.result.success
    }
}

#[derive(Debug)]
struct ClientInner {
    pool: RelayPool,
    tracker: OutboxTracker,
    ranker: RelayRanker,
    opts: Options,
    worker_started: AtomicBool,
}

/// High-level nostr client
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Default for Client {
    fn default() -> Self {
        ClientBuilder::new().build()
    }
}

impl Client {
    /// A client with the given signer and defaults everywhere else
    pub fn new<S>(signer: S) -> Self
    where
        S: nostr::prelude::IntoNostrSigner,
    {
        ClientBuilder::new().signer(signer).build()
    }

    /// Start assembling a client
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn from_builder(
        signer: Option<Arc<dyn NostrSigner>>,
        database: Arc<dyn NostrDatabase>,
        opts: Options,
    ) -> Self {
        let pool_opts: RelayPoolOptions = opts.pool_options();
        let state = SharedState::with_parts(
            database,
            signer,
            opts.signature_verification.clone(),
        );
        let pool = RelayPool::with_shared_state(pool_opts, state);

        Self {
            inner: Arc::new(ClientInner {
                pool,
                tracker: OutboxTracker::new(),
                ranker: RelayRanker::new(),
                opts,
                worker_started: AtomicBool::new(false),
            }),
        }
    }

    /// The underlying relay pool
    pub fn pool(&self) -> &RelayPool {
        &self.inner.pool
    }

    /// The configured database
    pub fn database(&self) -> &Arc<dyn NostrDatabase> {
        self.inner.pool.database()
    }

    /// The configured signer
    pub async fn signer(&self) -> Result<Arc<dyn NostrSigner>, Error> {
        self.inner
            .pool
            .state()
            .signer()
            .await
            .map_err(|_| Error::SignerNotConfigured)
    }

    /// Set (or replace) the signer
    pub async fn set_signer<S>(&self, signer: S)
    where
        S: nostr::prelude::IntoNostrSigner,
    {
        self.inner.pool.state().set_signer(signer).await;
    }

    /// Pool-wide notifications
    pub fn notifications(&self) -> broadcast::Receiver<RelayPoolNotification> {
        self.inner.pool.notifications()
    }

    /// Exclude a relay from any automatic selection
    pub async fn blacklist_relay(&self, url: RelayUrl) {
        self.inner.pool.filtering().blacklist(url).await;
    }

    /// Clear one relay's exclusion, whatever put it there
    pub async fn unblacklist_relay(&self, url: &RelayUrl) {
        self.inner.pool.filtering().clear(url).await;
        self.inner.pool.verifier().clear(url).await;
    }

    // ------------------------------------------------------------------ relays

    /// Add a relay (without connecting)
    pub async fn add_relay<U>(&self, url: U) -> Result<bool, Error>
    where
        U: AsRef<str>,
    {
        Ok(self
            .inner
            .pool
            .add_relay(url, RelayOptions::default())
            .await?)
    }

    /// Disconnect and drop a relay
    pub async fn remove_relay<U>(&self, url: U) -> Result<(), Error>
    where
        U: AsRef<str>,
    {
        Ok(self.inner.pool.remove_relay(url).await?)
    }

    /// Get a relay handle
    pub async fn relay<U>(&self, url: U) -> Result<Relay, Error>
    where
        U: AsRef<str>,
    {
        Ok(self.inner.pool.relay(url).await?)
    }

    /// All relays
    pub async fn relays(&self) -> HashMap<RelayUrl, Relay> {
        self.inner.pool.relays().await
    }

    /// Connect every relay and start the unpublished-queue worker
    pub async fn connect(&self) {
        self.inner
            .pool
            .filtering()
            .blacklist_all(self.inner.opts.blacklisted_relays.iter().cloned())
            .await;

        // default read relays serve relay-list discovery; make sure they exist
        for url in self.inner.opts.outbox.default_read_relays.clone() {
            let _ = self
                .inner
                .pool
                .add_relay(url.as_str(), RelayOptions::default())
                .await;
        }
        self.inner.pool.connect().await;

        if !self.inner.worker_started.swap(true, Ordering::SeqCst) {
            let _ = self
                .inner
                .pool
                .spawn_unpublished_worker(self.inner.opts.unpublished_replay_interval);
        }
    }

    /// Disconnect every relay
    pub async fn disconnect(&self) {
        self.inner.pool.disconnect().await;
    }

    /// Disconnect everything and end pool notifications
    pub async fn shutdown(&self) {
        self.inner.pool.shutdown().await;
    }

    // ----------------------------------------------------------------- publish

    /// Sign `builder`'s event with the configured signer and publish it
    pub async fn send_event_builder(&self, builder: EventBuilder) -> Result<SendEventOutput, Error> {
        let signer = self.signer().await?;
        let event: Event = builder
            .sign(&*signer)
            .await
            .map_err(|e| Error::Event(e.to_string()))?;
        self.send_event(event).await
    }

    /// Publish a kind-1 text note
    pub async fn publish_text_note<S>(&self, content: S) -> Result<SendEventOutput, Error>
    where
        S: Into<String>,
    {
        self.send_event_builder(EventBuilder::text_note(content)).await
    }

    /// Publish a signed event, selecting relays by the outbox model when enabled
    pub async fn send_event(&self, event: Event) -> Result<SendEventOutput, Error> {
        if !self.inner.opts.outbox.enable {
            let result = self
                .inner
                .pool
                .publish(event, None, self.inner.opts.publish_defaults.clone())
                .await?;
            return Ok(SendEventOutput {
                result,
                missing_relay_info_pubkeys: HashSet::new(),
            });
        }

        let fetcher = self.relay_list_fetcher();
        let author_prefs: RelayPreferences = self
            .inner
            .tracker
            .get_or_fetch(event.pubkey.clone(), &fetcher)
            .await;

        let mut tagged_prefs: HashMap<PublicKey, RelayPreferences> = HashMap::new();
        for pubkey in tag::public_keys(&event.tags) {
            let prefs = self
                .inner
                .tracker
                .get_or_fetch(pubkey.clone(), &fetcher)
                .await;
            tagged_prefs.insert(pubkey, prefs);
        }

        let connected: HashSet<RelayUrl> = self.connected_urls().await;
        let health: HashMap<RelayUrl, RelayHealthInput> = self.health_inputs().await;
        let selector = self.selector();
        let selection = selector.select_for_publish(
            &event,
            Some(&author_prefs),
            &tagged_prefs,
            &connected,
            &health,
            &self.selection_options(),
        );

        if selection.relays.is_empty() {
            return Err(Error::NoRelays);
        }

        self.ensure_relays(&selection.relays).await;

        let result = self
            .inner
            .pool
            .publish(
                event,
                Some(selection.relays),
                self.inner.opts.publish_defaults.clone(),
            )
            .await?;

        Ok(SendEventOutput {
            result,
            missing_relay_info_pubkeys: selection.missing_relay_info_pubkeys,
        })
    }

    /// Publish a signed event to exactly these relays, skipping selection
    pub async fn send_event_to<I>(&self, urls: I, event: Event) -> Result<PublishResult, Error>
    where
        I: IntoIterator<Item = RelayUrl>,
    {
        let urls: HashSet<RelayUrl> = urls.into_iter().collect();
        self.ensure_relays(&urls).await;
        Ok(self
            .inner
            .pool
            .publish(event, Some(urls), self.inner.opts.publish_defaults.clone())
            .await?)
    }

    // ------------------------------------------------------------------- fetch

    /// Fetch events matching `filters`, routing by the outbox model when enabled
    pub async fn fetch_events(&self, filters: Vec<Filter>) -> Result<FetchResult, Error> {
        let mut opts: FetchOptions = self.fetch_options();
        if self.inner.opts.outbox.enable {
            if let Some(relays) = self.fetch_relay_set(&filters).await {
                self.ensure_relays(&relays).await;
                opts = opts.relay_set(relays);
            }
        }
        Ok(self.inner.pool.fetch_events(filters, opts).await?)
    }

    /// Fetch from exactly these relays
    pub async fn fetch_events_from<I>(
        &self,
        urls: I,
        filters: Vec<Filter>,
    ) -> Result<FetchResult, Error>
    where
        I: IntoIterator<Item = RelayUrl>,
    {
        let urls: HashSet<RelayUrl> = urls.into_iter().collect();
        self.ensure_relays(&urls).await;
        let opts: FetchOptions = self.fetch_options().relay_set(urls);
        Ok(self.inner.pool.fetch_events(filters, opts).await?)
    }

    /// Open a live subscription, routing by the outbox model when enabled
    pub async fn subscribe(&self, filters: Vec<Filter>) -> Result<SubscriptionStream, Error> {
        let mut opts = SubscribeOptions::default()
            .grouping_window(self.inner.opts.fetch_defaults.grouping_window)
            .dedup_window(self.inner.opts.fetch_defaults.dedup_window);
        if self.inner.opts.outbox.enable {
            if let Some(relays) = self.fetch_relay_set(&filters).await {
                self.ensure_relays(&relays).await;
                opts = opts.relay_set(relays);
            }
        }
        Ok(self.inner.pool.subscribe(filters, opts).await?)
    }

    /// Open a live subscription with explicit options
    pub async fn subscribe_with(
        &self,
        filters: Vec<Filter>,
        opts: SubscribeOptions,
    ) -> Result<SubscriptionStream, Error> {
        Ok(self.inner.pool.subscribe(filters, opts).await?)
    }

    // -------------------------------------------------------------------- user

    /// Accessors for one pubkey's profile and relay preferences
    pub fn user(&self, public_key: PublicKey) -> UserHandle {
        UserHandle {
            client: self.clone(),
            public_key,
        }
    }

    // ----------------------------------------------------------------- helpers

    fn selector(&self) -> RelaySelector<'_> {
        RelaySelector::new(&self.inner.ranker)
            .with_pool_defaults(
                self.inner
                    .opts
                    .outbox
                    .default_write_relays
                    .iter()
                    .chain(self.inner.opts.outbox.default_read_relays.iter())
                    .cloned(),
            )
            .with_blacklist(self.inner.opts.blacklisted_relays.iter().cloned())
    }

    fn selection_options(&self) -> SelectionOptions {
        SelectionOptions {
            max_relay_count: usize::from(self.inner.opts.outbox.max_relays_per_author),
            prefer_write_if_no_read: self.inner.opts.fetch_defaults.prefer_write_if_no_read,
            ..SelectionOptions::default()
        }
    }

    fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            cache_strategy: CacheStrategy::CacheFirst,
            timeout: self.inner.opts.fetch_defaults.timeout,
            grouping_window: self.inner.opts.fetch_defaults.grouping_window,
            dedup_window: self.inner.opts.fetch_defaults.dedup_window,
            ..FetchOptions::default()
        }
    }

    /// Ranker inputs from the cache adapter's per-relay health records
    async fn health_inputs(&self) -> HashMap<RelayUrl, RelayHealthInput> {
        let now: u64 = Timestamp::now().as_u64();
        let mut health: HashMap<RelayUrl, RelayHealthInput> = HashMap::new();
        for url in self.inner.pool.relay_urls().await {
            if let Ok(snapshot) = self.database().relay_health(&url).await {
                health.insert(
                    url,
                    RelayHealthInput {
                        success_count: snapshot.success_count,
                        failure_count: snapshot.failure_count,
                        average_response_ms: snapshot.average_response_ms,
                        seconds_since_last_seen: snapshot
                            .last_seen
                            .map(|seen| now.saturating_sub(seen.as_u64())),
                    },
                );
            }
        }
        health
    }

    async fn connected_urls(&self) -> HashSet<RelayUrl> {
        self.inner
            .pool
            .connected_relays()
            .await
            .into_iter()
            .map(|relay| relay.url().clone())
            .collect()
    }

    /// Make sure every selected relay exists in the pool and is connecting
    async fn ensure_relays(&self, urls: &HashSet<RelayUrl>) {
        for url in urls {
            let added = self
                .inner
                .pool
                .add_relay(url.as_str(), RelayOptions::default())
                .await
                .unwrap_or(false);
            if added {
                let _ = self.inner.pool.connect_relay(url.as_str()).await;
            }
        }
    }

    /// Authors referenced by `filters`, for read-direction selection
    fn filter_authors(filters: &[Filter]) -> Vec<PublicKey> {
        let mut authors: Vec<PublicKey> = Vec::new();
        for filter in filters {
            if let Some(set) = &filter.authors {
                authors.extend(set.iter().cloned());
            }
            if let Some(values) = filter.generic_tags.get("#p") {
                authors.extend(values.iter().filter_map(|v| PublicKey::from_hex(v).ok()));
            }
        }
        authors.sort();
        authors.dedup();
        authors
    }

    async fn fetch_relay_set(&self, filters: &[Filter]) -> Option<HashSet<RelayUrl>> {
        let authors: Vec<PublicKey> = Self::filter_authors(filters);
        if authors.is_empty() {
            return None;
        }

        let fetcher = self.relay_list_fetcher();
        let mut author_prefs: HashMap<PublicKey, RelayPreferences> = HashMap::new();
        for author in authors {
            let prefs = self
                .inner
                .tracker
                .get_or_fetch(author.clone(), &fetcher)
                .await;
            author_prefs.insert(author, prefs);
        }

        let active_user_prefs: Option<RelayPreferences> = match self.signer().await {
            Ok(signer) => match signer.get_public_key().await {
                Ok(pubkey) => Some(self.inner.tracker.get_or_fetch(pubkey, &fetcher).await),
                Err(_) => None,
            },
            Err(_) => None,
        };

        let connected: HashSet<RelayUrl> = self.connected_urls().await;
        let health: HashMap<RelayUrl, RelayHealthInput> = self.health_inputs().await;
        let selector = self.selector();
        let selection = selector.select_for_fetch(
            active_user_prefs.as_ref(),
            &author_prefs,
            &HashSet::new(),
            &connected,
            &health,
            &self.selection_options(),
        );

        if selection.relays.is_empty() {
            None
        } else {
            Some(selection.relays)
        }
    }

    fn relay_list_fetcher(&self) -> PoolRelayListFetcher {
        PoolRelayListFetcher {
            pool: self.inner.pool.clone(),
            bootstrap: self.inner.opts.outbox.default_read_relays.clone(),
        }
    }
}

/// Fetches relay-list and contact-list events for the outbox tracker, over the pool
#[derive(Debug)]
struct PoolRelayListFetcher {
    pool: RelayPool,
    bootstrap: HashSet<RelayUrl>,
}

impl PoolRelayListFetcher {
    async fn fetch_latest(&self, filter: Filter) -> Option<Event> {
        let mut opts = FetchOptions::default()
            .cache_strategy(CacheStrategy::Parallel)
            .limit(1)
            .timeout(std::time::Duration::from_secs(5));
        if !self.bootstrap.is_empty() {
            opts = opts.relay_set(self.bootstrap.iter().cloned());
        }
        match self.pool.fetch_events(vec![filter], opts).await {
            Ok(result) => result.events.into_iter().next(),
            Err(e) => {
                tracing::debug!("relay-list fetch failed: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl RelayListFetcher for PoolRelayListFetcher {
    async fn fetch_relay_list(&self, pubkey: PublicKey) -> Option<Event> {
        let filter = Filter::new()
            .author(pubkey)
            .kind(Kind::new(nostr::event::kind::RELAY_LIST))
            .limit(1);
        self.fetch_latest(filter).await
    }

    async fn fetch_contact_list(&self, pubkey: PublicKey) -> Option<Event> {
        let filter = Filter::new()
            .author(pubkey)
            .kind(Kind::new(nostr::event::kind::CONTACT_LIST))
            .limit(1);
        self.fetch_latest(filter).await
    }
}

/// Profile and relay-preference accessors for one pubkey
#[derive(Debug, Clone)]
pub struct UserHandle {
    client: Client,
    public_key: PublicKey,
}

impl UserHandle {
    /// The pubkey this handle wraps
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// The user's profile record, from the cache or the relays
    ///
    /// A relay round-trip happens only when the cache has no record.
    pub async fn profile(&self) -> Result<Option<Profile>, Error> {
        if let Some(profile) = self
            .client
            .database()
            .get_profile(&self.public_key)
            .await?
        {
            return Ok(Some(profile));
        }

        let filter = Filter::new()
            .author(self.public_key.clone())
            .kind(Kind::new(nostr::event::kind::METADATA))
            .limit(1);
        let result = self.client.fetch_events(vec![filter]).await?;
        let Some(event) = result.events.into_iter().next() else {
            return Ok(None);
        };

        let metadata: serde_json::Value =
            serde_json::from_str(&event.content).unwrap_or(serde_json::Value::Null);
        let fetched_at = Timestamp::now();
        self.client
            .database()
            .save_profile(&self.public_key, metadata.clone(), fetched_at)
            .await?;

        Ok(Some(Profile {
            public_key: self.public_key.clone(),
            metadata,
            fetched_at,
        }))
    }

    /// The user's relay preferences, from the tracker (fetching on a miss)
    pub async fn relay_preferences(&self) -> RelayPreferences {
        let fetcher = self.client.relay_list_fetcher();
        self.client
            .inner
            .tracker
            .get_or_fetch(self.public_key.clone(), &fetcher)
            .await
    }

    /// Sign and publish this user's NIP-65 relay-preference record
    pub async fn publish_relay_preferences(
        &self,
        read: &HashSet<RelayUrl>,
        write: &HashSet<RelayUrl>,
    ) -> Result<SendEventOutput, Error> {
        let signer = self.client.signer().await?;
        let mut tags: Vec<nostr::Tag> = Vec::new();
        for url in read {
            if write.contains(url) {
                tags.push(nostr::Tag::relay_list_entry(url.as_str(), None));
            } else {
                tags.push(nostr::Tag::relay_list_entry(url.as_str(), Some("read")));
            }
        }
        for url in write {
            if !read.contains(url) {
                tags.push(nostr::Tag::relay_list_entry(url.as_str(), Some("write")));
            }
        }

        let pubkey = signer
            .get_public_key()
            .await
            .map_err(|e| Error::Signer(e.to_string()))?;
        let unsigned = UnsignedEvent::new(
            pubkey,
            Timestamp::now(),
            Kind::new(nostr::event::kind::RELAY_LIST),
            tags,
            "",
        );
        let event = signer
            .sign_event(unsigned)
            .await
            .map_err(|e| Error::Signer(e.to_string()))?;
        self.client.send_event(event).await
    }
}
