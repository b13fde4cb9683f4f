// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Filesystem storage backend
//!
//! One directory per entity type, one JSON file per entity. Everything is read into
//! memory at [`FileDatabase::open`] and queried from the in-memory indices; disk is only
//! touched again on writes. Corrupt files are skipped with a warning rather than failing
//! the whole load.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use nostr::nips::nip01::Coordinate;
use nostr::util::hex;
use nostr::{Event, EventId, Filter, JsonUtil, PublicKey, RelayUrl, Timestamp};
use tokio::fs;
use tokio::sync::RwLock;

use crate::index::EventIndex;
use crate::{
    Backend, DatabaseError, HealthSnapshot, NostrDatabase, Profile, RelayInteraction,
    UnpublishedEvent,
};

const EVENTS_DIR: &str = "events";
const PROFILES_DIR: &str = "profiles";
const UNPUBLISHED_DIR: &str = "unpublished";
const RELAY_HEALTH_DIR: &str = "relay-health";
const DECRYPTED_DIR: &str = "decrypted";

#[derive(Debug, Default)]
struct Inner {
    index: EventIndex,
    profiles: HashMap<PublicKey, Profile>,
    unpublished: HashMap<EventId, UnpublishedEvent>,
    relay_health: HashMap<RelayUrl, HealthSnapshot>,
    decrypted: HashMap<EventId, String>,
}

/// Persistent adapter backed by a directory of JSON files
#[derive(Debug, Clone)]
pub struct FileDatabase {
    base: PathBuf,
    inner: Arc<RwLock<Inner>>,
}

impl FileDatabase {
    /// Open (or create) a database rooted at `base`, rebuilding all in-memory indices
    /// from the files found there
    pub async fn open<P>(base: P) -> Result<Self, DatabaseError>
    where
        P: AsRef<Path>,
    {
        let base: PathBuf = base.as_ref().to_path_buf();
        for dir in [
            EVENTS_DIR,
            PROFILES_DIR,
            UNPUBLISHED_DIR,
            RELAY_HEALTH_DIR,
            DECRYPTED_DIR,
        ] {
            fs::create_dir_all(base.join(dir)).await?;
        }

        let mut inner = Inner::default();

        for content in Self::read_dir_files(&base.join(EVENTS_DIR)).await? {
            match Event::from_json(&content) {
                Ok(event) => {
                    inner.index.insert(event);
                }
                Err(e) => tracing::warn!("skipping unreadable event file: {e}"),
            }
        }

        for content in Self::read_dir_files(&base.join(PROFILES_DIR)).await? {
            match serde_json::from_str::<Profile>(&content) {
                Ok(profile) => {
                    inner.profiles.insert(profile.public_key.clone(), profile);
                }
                Err(e) => tracing::warn!("skipping unreadable profile file: {e}"),
            }
        }

        for content in Self::read_dir_files(&base.join(UNPUBLISHED_DIR)).await? {
            match serde_json::from_str::<UnpublishedEvent>(&content) {
                Ok(item) => {
                    inner.unpublished.insert(item.event.id, item);
                }
                Err(e) => tracing::warn!("skipping unreadable unpublished file: {e}"),
            }
        }

        for content in Self::read_dir_files(&base.join(RELAY_HEALTH_DIR)).await? {
            match serde_json::from_str::<(RelayUrl, HealthSnapshot)>(&content) {
                Ok((url, snapshot)) => {
                    inner.relay_health.insert(url, snapshot);
                }
                Err(e) => tracing::warn!("skipping unreadable relay-health file: {e}"),
            }
        }

        for content in Self::read_dir_files(&base.join(DECRYPTED_DIR)).await? {
            match serde_json::from_str::<(EventId, String)>(&content) {
                Ok((id, plaintext)) => {
                    inner.decrypted.insert(id, plaintext);
                }
                Err(e) => tracing::warn!("skipping unreadable decrypted file: {e}"),
            }
        }

        tracing::debug!(
            events = inner.index.len(),
            profiles = inner.profiles.len(),
            unpublished = inner.unpublished.len(),
            "file database loaded"
        );

        Ok(Self {
            base,
            inner: Arc::new(RwLock::new(inner)),
        })
    }

    async fn read_dir_files(dir: &Path) -> Result<Vec<String>, DatabaseError> {
        let mut out = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().map(|e| e == "json").unwrap_or(false) {
                match fs::read_to_string(entry.path()).await {
                    Ok(content) => out.push(content),
                    Err(e) => tracing::warn!(path = ?entry.path(), "unreadable file: {e}"),
                }
            }
        }
        Ok(out)
    }

    fn event_path(&self, id: &EventId) -> PathBuf {
        self.base.join(EVENTS_DIR).join(format!("{}.json", id.to_hex()))
    }

    fn profile_path(&self, public_key: &PublicKey) -> PathBuf {
        self.base
            .join(PROFILES_DIR)
            .join(format!("{}.json", public_key.to_hex()))
    }

    fn unpublished_path(&self, id: &EventId) -> PathBuf {
        self.base
            .join(UNPUBLISHED_DIR)
            .join(format!("{}.json", id.to_hex()))
    }

    fn relay_health_path(&self, url: &RelayUrl) -> PathBuf {
        // URLs contain path separators; file names are the hex of the normalized URL
        self.base
            .join(RELAY_HEALTH_DIR)
            .join(format!("{}.json", hex::encode(url.as_str())))
    }

    fn decrypted_path(&self, id: &EventId) -> PathBuf {
        self.base
            .join(DECRYPTED_DIR)
            .join(format!("{}.json", id.to_hex()))
    }

    async fn write_json<T>(path: PathBuf, value: &T) -> Result<(), DatabaseError>
    where
        T: serde::Serialize,
    {
        let json: Vec<u8> = serde_json::to_vec(value)?;
        fs::write(path, json).await?;
        Ok(())
    }

    async fn remove_file(path: PathBuf) {
        if let Err(e) = fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = ?path, "failed to remove file: {e}");
            }
        }
    }
}

#[async_trait]
impl NostrDatabase for FileDatabase {
    fn backend(&self) -> Backend {
        Backend::FileSystem
    }

    fn supports_decrypted_store(&self) -> bool {
        true
    }

    async fn save_event(&self, event: &Event) -> Result<bool, DatabaseError> {
        let superseded: Vec<EventId>;
        {
            let mut inner = self.inner.write().await;
            let result = inner.index.insert(event.clone());
            if !result.stored {
                return Ok(false);
            }
            superseded = result.superseded;
        }

        // ephemeral kinds live in the in-memory index only
        if !event.kind.is_ephemeral() {
            Self::write_json(self.event_path(&event.id), event).await?;
        }
        for id in superseded {
            Self::remove_file(self.event_path(&id)).await;
        }
        Ok(true)
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
        let profile = Profile {
            public_key: public_key.clone(),
            metadata,
            fetched_at,
        };
        {
            let mut inner = self.inner.write().await;
            inner.profiles.insert(public_key.clone(), profile.clone());
        }
        Self::write_json(self.profile_path(public_key), &profile).await
    }

    async fn get_profile(&self, public_key: &PublicKey) -> Result<Option<Profile>, DatabaseError> {
        Ok(self.inner.read().await.profiles.get(public_key).cloned())
    }

    async fn enqueue_unpublished(
        &self,
        event: Event,
        target_relays: HashSet<RelayUrl>,
    ) -> Result<(), DatabaseError> {
        let item = UnpublishedEvent {
            event,
            target_relays,
            last_attempt: Timestamp::now(),
        };
        let path = self.unpublished_path(&item.event.id);
        {
            let mut inner = self.inner.write().await;
            inner.unpublished.insert(item.event.id, item.clone());
        }
        Self::write_json(path, &item).await
    }

    async fn dequeue_unpublished(&self) -> Result<Vec<UnpublishedEvent>, DatabaseError> {
        let mut items: Vec<UnpublishedEvent>;
        {
            let mut inner = self.inner.write().await;
            let now = Timestamp::now();
            items = inner.unpublished.values().cloned().collect();
            for item in inner.unpublished.values_mut() {
                item.last_attempt = now;
            }
        }
        items.sort_by_key(|item| item.last_attempt);
        Ok(items)
    }

    async fn discard_unpublished(&self, event_id: &EventId) -> Result<(), DatabaseError> {
        {
            let mut inner = self.inner.write().await;
            inner.unpublished.remove(event_id);
        }
        Self::remove_file(self.unpublished_path(event_id)).await;
        Ok(())
    }

    async fn record_relay_health(
        &self,
        url: &RelayUrl,
        interaction: RelayInteraction,
        response_ms: Option<u64>,
    ) -> Result<(), DatabaseError> {
        let snapshot: HealthSnapshot = {
            let mut inner = self.inner.write().await;
            let snapshot = inner.relay_health.entry(url.clone()).or_default();
            snapshot.record(interaction, response_ms);
            *snapshot
        };
        Self::write_json(self.relay_health_path(url), &(url, snapshot)).await
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
        {
            let mut inner = self.inner.write().await;
            inner.decrypted.insert(*event_id, plaintext.to_string());
        }
        Self::write_json(self.decrypted_path(event_id), &(event_id, plaintext)).await
    }

    async fn get_decrypted(&self, event_id: &EventId) -> Result<Option<String>, DatabaseError> {
        Ok(self.inner.read().await.decrypted.get(event_id).cloned())
    }
}
