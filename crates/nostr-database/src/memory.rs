// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Memory (RAM) storage backend

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use nostr::nips::nip01::Coordinate;
use nostr::{Event, EventId, Filter, PublicKey, RelayUrl, Timestamp};
use tokio::sync::RwLock;

use crate::index::EventIndex;
use crate::{
    Backend, DatabaseError, HealthSnapshot, NostrDatabase, Profile, RelayInteraction,
    UnpublishedEvent,
};

/// [`MemoryDatabase`] options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryDatabaseOptions {
    /// Max events kept in memory; older events are evicted first (default: 100 000,
    /// `None` = unbounded)
    pub max_events: Option<usize>,
    /// Keep decrypted plaintexts (default: true)
    pub decrypted_store: bool,
}

impl Default for MemoryDatabaseOptions {
    fn default() -> Self {
        Self {
            max_events: Some(100_000),
            decrypted_store: true,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    index: EventIndex,
    profiles: HashMap<PublicKey, Profile>,
    unpublished: HashMap<EventId, UnpublishedEvent>,
    relay_health: HashMap<RelayUrl, HealthSnapshot>,
    decrypted: HashMap<EventId, String>,
}

/// RAM-only adapter; everything is lost at shutdown
///
/// The default database of a freshly built pool, and the workhorse of the test suites.
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    opts: MemoryDatabaseOptions,
    inner: Arc<RwLock<Inner>>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    /// A memory database with default options
    pub fn new() -> Self {
        Self::with_opts(MemoryDatabaseOptions::default())
    }

    /// A memory database with explicit options
    pub fn with_opts(opts: MemoryDatabaseOptions) -> Self {
        Self {
            opts,
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }
}

#[async_trait]
impl NostrDatabase for MemoryDatabase {
    fn backend(&self) -> Backend {
        Backend::Memory
    }

    fn supports_decrypted_store(&self) -> bool {
        self.opts.decrypted_store
    }

    async fn save_event(&self, event: &Event) -> Result<bool, DatabaseError> {
        let mut inner = self.inner.write().await;
        let result = inner.index.insert(event.clone());
        if let Some(max) = self.opts.max_events {
            inner.index.truncate(max);
        }
        Ok(result.stored)
    }

    async fn has_event(&self, event_id: &EventId) -> Result<bool, DatabaseError> {
        Ok(self.inner.read().await.index.has_seen(event_id))
    }

    async fn event_by_id(&self, event_id: &EventId) -> Result<Option<Event>, DatabaseError> {
        Ok(self.inner.read().await.index.get(event_id).cloned())
    }

    async fn query(&self, filter: &Filter) -> Result<Vec<Event>, DatabaseError> {
        Ok(self.inner.read().await.index.query(filter))
    }

    async fn canonical_event(
        &self,
        coordinate: &Coordinate,
    ) -> Result<Option<Event>, DatabaseError> {
        Ok(self.inner.read().await.index.canonical(coordinate).cloned())
    }

    async fn save_profile(
        &self,
        public_key: &PublicKey,
        metadata: serde_json::Value,
        fetched_at: Timestamp,
    ) -> Result<(), DatabaseError> {
        let mut inner = self.inner.write().await;
        inner.profiles.insert(
            public_key.clone(),
            Profile {
                public_key: public_key.clone(),
                metadata,
                fetched_at,
            },
        );
        Ok(())
    }

    async fn get_profile(&self, public_key: &PublicKey) -> Result<Option<Profile>, DatabaseError> {
        Ok(self.inner.read().await.profiles.get(public_key).cloned())
    }

    async fn enqueue_unpublished(
        &self,
        event: Event,
        target_relays: HashSet<RelayUrl>,
    ) -> Result<(), DatabaseError> {
        let mut inner = self.inner.write().await;
        inner.unpublished.insert(
            event.id,
            UnpublishedEvent {
                event,
                target_relays,
                last_attempt: Timestamp::now(),
            },
        );
        Ok(())
    }

    async fn dequeue_unpublished(&self) -> Result<Vec<UnpublishedEvent>, DatabaseError> {
        let mut inner = self.inner.write().await;
        let now = Timestamp::now();
        let mut items: Vec<UnpublishedEvent> = inner.unpublished.values().cloned().collect();
        items.sort_by_key(|item| item.last_attempt);
        for item in inner.unpublished.values_mut() {
            item.last_attempt = now;
        }
        Ok(items)
    }

    async fn discard_unpublished(&self, event_id: &EventId) -> Result<(), DatabaseError> {
        self.inner.write().await.unpublished.remove(event_id);
        Ok(())
    }

    async fn record_relay_health(
        &self,
        url: &RelayUrl,
        interaction: RelayInteraction,
        response_ms: Option<u64>,
    ) -> Result<(), DatabaseError> {
        let mut inner = self.inner.write().await;
        inner
            .relay_health
            .entry(url.clone())
            .or_default()
            .record(interaction, response_ms);
        Ok(())
    }

    async fn relay_health(&self, url: &RelayUrl) -> Result<HealthSnapshot, DatabaseError> {
        Ok(self
            .inner
            .read()
            .await
            .relay_health
            .get(url)
            .copied()
            .unwrap_or_default())
    }

    async fn save_decrypted(
        &self,
        event_id: &EventId,
        plaintext: &str,
    ) -> Result<(), DatabaseError> {
        if !self.opts.decrypted_store {
            return Err(DatabaseError::NotSupported("decrypted store disabled"));
        }
        let mut inner = self.inner.write().await;
        inner.decrypted.insert(*event_id, plaintext.to_string());
        Ok(())
    }

    async fn get_decrypted(&self, event_id: &EventId) -> Result<Option<String>, DatabaseError> {
        Ok(self.inner.read().await.decrypted.get(event_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use nostr::{EventBuilder, Keys, Kind, Tag, UnsignedEvent};

    use super::*;

    fn replaceable_at(keys: &Keys, created_at: u64, content: &str) -> Event {
        UnsignedEvent::new(
            keys.public_key(),
            Timestamp::from(created_at),
            Kind::new(10002),
            vec![Tag::relay_list_entry("wss://relay.example.com", None)],
            content,
        )
        .sign_with_keys(keys)
        .unwrap()
    }

    #[tokio::test]
    async fn replaceable_query_returns_only_canonical() {
        let keys = Keys::generate();
        let db = MemoryDatabase::new();

        let e1 = replaceable_at(&keys, 1_000, "old");
        let e2 = replaceable_at(&keys, 2_000, "new");

        assert!(db.save_event(&e1).await.unwrap());
        assert!(db.save_event(&e2).await.unwrap());
        // saving the superseded event again is a no-op
        assert!(!db.save_event(&e1).await.unwrap());

        let found = db
            .query(&Filter::new().author(keys.public_key()).kind(Kind::new(10002)))
            .await
            .unwrap();
        assert_eq!(found, vec![e2]);
        assert_eq!(db.event_by_id(&e1.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unpublished_queue_round_trip() {
        let keys = Keys::generate();
        let db = MemoryDatabase::new();
        let event = EventBuilder::text_note("pending").sign_with_keys(&keys).unwrap();
        let relays: HashSet<RelayUrl> =
            HashSet::from([RelayUrl::parse("wss://relay.example.com").unwrap()]);

        db.enqueue_unpublished(event.clone(), relays.clone())
            .await
            .unwrap();
        let queued = db.dequeue_unpublished().await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].event, event);
        assert_eq!(queued[0].target_relays, relays);

        db.discard_unpublished(&event.id).await.unwrap();
        assert!(db.dequeue_unpublished().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn relay_health_accumulates() {
        let db = MemoryDatabase::new();
        let url = RelayUrl::parse("wss://relay.example.com").unwrap();

        db.record_relay_health(&url, RelayInteraction::Success, Some(120))
            .await
            .unwrap();
        db.record_relay_health(&url, RelayInteraction::Failure, None)
            .await
            .unwrap();

        let health = db.relay_health(&url).await.unwrap();
        assert_eq!(health.success_count, 1);
        assert_eq!(health.failure_count, 1);
        assert_eq!(health.average_response_ms, Some(120));
        assert!(health.last_seen.is_some());
    }
}
