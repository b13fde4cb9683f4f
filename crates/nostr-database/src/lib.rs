// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Cache adapter for nostr apps
//!
//! Defines the [`NostrDatabase`] contract the relay pool and SDK rely on: event storage
//! with replaceable/addressable canonicalization, profile records, the unpublished-event
//! queue, per-relay health metrics, and an optional decrypted-content store. Two adapters
//! ship here: [`MemoryDatabase`] (pure RAM) and [`FileDatabase`] (one JSON file per
//! entity, indices rebuilt at startup).

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use nostr::nips::nip01::Coordinate;
use nostr::{Event, EventId, Filter, PublicKey, RelayUrl, Timestamp};
use serde::{Deserialize, Serialize};

mod error;
mod file;
pub mod index;
mod memory;
pub mod prelude;

pub use self::error::DatabaseError;
pub use self::file::FileDatabase;
pub use self::index::{EventIndex, InsertResult, RejectedEvent};
pub use self::memory::{MemoryDatabase, MemoryDatabaseOptions};

/// Which storage engine backs an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// RAM only, lost at shutdown
    Memory,
    /// One JSON file per entity on the local filesystem
    FileSystem,
    /// Anything else (third-party adapter)
    Custom(&'static str),
}

/// A cached profile record (kind-0 metadata), stored per pubkey
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// The profile's author
    pub public_key: PublicKey,
    /// The raw kind-0 content, parsed to JSON
    pub metadata: serde_json::Value,
    /// When this record was fetched from a relay
    pub fetched_at: Timestamp,
}

/// An event waiting in the unpublished queue for a later publish retry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnpublishedEvent {
    /// The signed event
    pub event: Event,
    /// Relays the event should still be sent to
    pub target_relays: HashSet<RelayUrl>,
    /// Last time a publish was attempted; enqueue time for a fresh item
    pub last_attempt: Timestamp,
}

/// Success or failure of one interaction with a relay, for health accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayInteraction {
    /// The relay answered the request
    Success,
    /// The relay failed, timed out, or rejected the request
    Failure,
}

/// Accumulated health metrics for one relay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Successful interactions
    pub success_count: u64,
    /// Failed interactions
    pub failure_count: u64,
    /// Rolling average response time, if any timed samples exist
    pub average_response_ms: Option<u64>,
    /// Last time any interaction was recorded
    pub last_seen: Option<Timestamp>,
}

impl HealthSnapshot {
    /// Fold one interaction into the snapshot
    pub fn record(&mut self, interaction: RelayInteraction, response_ms: Option<u64>) {
        match interaction {
            RelayInteraction::Success => self.success_count += 1,
            RelayInteraction::Failure => self.failure_count += 1,
        }
        if let Some(ms) = response_ms {
            self.average_response_ms = Some(match self.average_response_ms {
                // exponential moving average, biased toward history
                Some(avg) => (avg * 7 + ms) / 8,
                None => ms,
            });
        }
        self.last_seen = Some(Timestamp::now());
    }
}

/// Storage contract shared by every adapter
///
/// Implementations must be safe under concurrent calls; the engine serializes mutations
/// per key but reads race writes freely. Every call may suspend for I/O.
#[async_trait]
pub trait NostrDatabase: fmt::Debug + Send + Sync {
    /// Which storage engine this is
    fn backend(&self) -> Backend;

    /// Whether [`NostrDatabase::save_decrypted`]/[`NostrDatabase::get_decrypted`] work
    /// on this adapter
    fn supports_decrypted_store(&self) -> bool {
        false
    }

    /// Store an event, enforcing the canonical-per-slot rule for replaceable and
    /// addressable kinds
    ///
    /// Idempotent. Returns `true` if the event was stored, `false` if it was already
    /// present or already superseded by a newer canonical.
    async fn save_event(&self, event: &Event) -> Result<bool, DatabaseError>;

    /// Whether the event is stored (or was stored and later superseded)
    async fn has_event(&self, event_id: &EventId) -> Result<bool, DatabaseError>;

    /// Get an event by id
    async fn event_by_id(&self, event_id: &EventId) -> Result<Option<Event>, DatabaseError>;

    /// All stored events matching `filter`, newest first, bounded by `filter.limit`
    async fn query(&self, filter: &Filter) -> Result<Vec<Event>, DatabaseError>;

    /// The canonical event for a replaceable/addressable coordinate, if stored
    async fn canonical_event(
        &self,
        coordinate: &Coordinate,
    ) -> Result<Option<Event>, DatabaseError>;

    /// Store (or overwrite) a pubkey's profile record
    async fn save_profile(
        &self,
        public_key: &PublicKey,
        metadata: serde_json::Value,
        fetched_at: Timestamp,
    ) -> Result<(), DatabaseError>;

    /// Get a pubkey's cached profile record
    async fn get_profile(&self, public_key: &PublicKey) -> Result<Option<Profile>, DatabaseError>;

    /// Add an event to the unpublished queue
    ///
    /// Re-enqueueing the same event id overwrites the prior entry (relay set and
    /// `last_attempt` are refreshed).
    async fn enqueue_unpublished(
        &self,
        event: Event,
        target_relays: HashSet<RelayUrl>,
    ) -> Result<(), DatabaseError>;

    /// Snapshot the unpublished queue, oldest attempt first
    ///
    /// Taking the snapshot counts as an attempt: each queued item's `last_attempt` is
    /// stamped to now. Items stay queued until [`NostrDatabase::discard_unpublished`]
    /// removes them.
    async fn dequeue_unpublished(&self) -> Result<Vec<UnpublishedEvent>, DatabaseError>;

    /// Remove an event from the unpublished queue
    async fn discard_unpublished(&self, event_id: &EventId) -> Result<(), DatabaseError>;

    /// Fold one interaction into a relay's health metrics
    async fn record_relay_health(
        &self,
        url: &RelayUrl,
        interaction: RelayInteraction,
        response_ms: Option<u64>,
    ) -> Result<(), DatabaseError>;

    /// A relay's accumulated health metrics (zeroed snapshot if never seen)
    async fn relay_health(&self, url: &RelayUrl) -> Result<HealthSnapshot, DatabaseError>;

    /// Store the decrypted plaintext of an encrypted event's content
    ///
    /// Fails with [`DatabaseError::NotSupported`] unless
    /// [`NostrDatabase::supports_decrypted_store`] is `true`.
    async fn save_decrypted(
        &self,
        event_id: &EventId,
        plaintext: &str,
    ) -> Result<(), DatabaseError>;

    /// Get the stored decrypted plaintext for an event, if any
    async fn get_decrypted(&self, event_id: &EventId) -> Result<Option<String>, DatabaseError>;
}

/// Convert any adapter (or an `Arc` of one) into the `Arc<dyn NostrDatabase>` the pool
/// and SDK store
#[doc(hidden)]
pub trait IntoNostrDatabase {
    fn into_nostr_database(self) -> Arc<dyn NostrDatabase>;
}

impl IntoNostrDatabase for Arc<dyn NostrDatabase> {
    fn into_nostr_database(self) -> Arc<dyn NostrDatabase> {
        self
    }
}

impl<T> IntoNostrDatabase for T
where
    T: NostrDatabase + 'static,
{
    fn into_nostr_database(self) -> Arc<dyn NostrDatabase> {
        Arc::new(self)
    }
}

impl<T> IntoNostrDatabase for Arc<T>
where
    T: NostrDatabase + 'static,
{
    fn into_nostr_database(self) -> Arc<dyn NostrDatabase> {
        self
    }
}
