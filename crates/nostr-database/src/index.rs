// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! In-memory event indexes
//!
//! Shared by every adapter in this crate: the memory backend queries it directly, the
//! file backend rebuilds it from disk at startup and keeps it as its read path.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

use nostr::nips::nip01::Coordinate;
use nostr::{Event, EventId, Filter, Kind, PublicKey, Timestamp};

/// Why [`EventIndex::insert`] did not store an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectedEvent {
    /// The exact event id is already stored
    Duplicate,
    /// A newer event for the same replaceable/addressable slot is already canonical
    Replaced,
}

/// Outcome of [`EventIndex::insert`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertResult {
    /// Whether the event was stored
    pub stored: bool,
    /// Why it was not stored, if it was not
    pub rejected: Option<RejectedEvent>,
    /// Event ids this insert superseded (prior canonical of the same slot)
    pub superseded: Vec<EventId>,
}

impl InsertResult {
    fn stored(superseded: Vec<EventId>) -> Self {
        Self {
            stored: true,
            rejected: None,
            superseded,
        }
    }

    fn rejected(why: RejectedEvent) -> Self {
        Self {
            stored: false,
            rejected: Some(why),
            superseded: Vec::new(),
        }
    }
}

/// An event ordered newest-first, ties broken by id, for range scans
#[derive(Debug, Clone, PartialEq, Eq)]
struct QueryOrd {
    created_at: Timestamp,
    id: EventId,
}

impl PartialOrd for QueryOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueryOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        // newest first; among equal timestamps, lowest id first for a stable order
        other
            .created_at
            .cmp(&self.created_at)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Event store with replaceable/addressable canonicalization and filter queries
///
/// Not internally synchronized; adapters wrap it in their own lock.
#[derive(Debug, Default)]
pub struct EventIndex {
    events: HashMap<EventId, Event>,
    by_created_at: BTreeSet<QueryOrd>,
    replaceable: HashMap<(PublicKey, Kind), EventId>,
    addressable: HashMap<(PublicKey, Kind, String), EventId>,
    /// Ids that were superseded by a newer canonical; kept so a duplicate re-insert of a
    /// replaced event is recognized and refused
    replaced: HashSet<EventId>,
}

impl EventIndex {
    /// An empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the index holds no events
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Whether `id` is stored right now (superseded events are gone)
    pub fn contains(&self, id: &EventId) -> bool {
        self.events.contains_key(id)
    }

    /// Whether `id` was stored at some point, even if since superseded
    pub fn has_seen(&self, id: &EventId) -> bool {
        self.events.contains_key(id) || self.replaced.contains(id)
    }

    /// Get an event by id
    pub fn get(&self, id: &EventId) -> Option<&Event> {
        self.events.get(id)
    }

    /// Insert an event, enforcing the canonical-per-slot rule for replaceable and
    /// addressable kinds. Idempotent: re-inserting a stored or superseded id is a no-op.
    pub fn insert(&mut self, event: Event) -> InsertResult {
        if self.events.contains_key(&event.id) {
            return InsertResult::rejected(RejectedEvent::Duplicate);
        }
        if self.replaced.contains(&event.id) {
            return InsertResult::rejected(RejectedEvent::Replaced);
        }

        let mut superseded: Vec<EventId> = Vec::new();

        if event.kind.is_replaceable() {
            let slot = (event.pubkey.clone(), event.kind);
            if let Some(prior_id) = self.replaceable.get(&slot).copied() {
                match self.events.get(&prior_id) {
                    Some(prior) if prior.created_at >= event.created_at => {
                        self.replaced.insert(event.id);
                        return InsertResult::rejected(RejectedEvent::Replaced);
                    }
                    _ => {
                        self.remove(&prior_id);
                        self.replaced.insert(prior_id);
                        superseded.push(prior_id);
                    }
                }
            }
            self.replaceable.insert(slot, event.id);
        } else if event.kind.is_addressable() {
            let slot = (event.pubkey.clone(), event.kind, event.identifier());
            if let Some(prior_id) = self.addressable.get(&slot).copied() {
                match self.events.get(&prior_id) {
                    Some(prior) if prior.created_at >= event.created_at => {
                        self.replaced.insert(event.id);
                        return InsertResult::rejected(RejectedEvent::Replaced);
                    }
                    _ => {
                        self.remove(&prior_id);
                        self.replaced.insert(prior_id);
                        superseded.push(prior_id);
                    }
                }
            }
            self.addressable.insert(slot, event.id);
        }

        self.by_created_at.insert(QueryOrd {
            created_at: event.created_at,
            id: event.id,
        });
        self.events.insert(event.id, event);

        InsertResult::stored(superseded)
    }

    /// Remove an event by id
    pub fn remove(&mut self, id: &EventId) -> Option<Event> {
        let event = self.events.remove(id)?;
        self.by_created_at.remove(&QueryOrd {
            created_at: event.created_at,
            id: event.id,
        });
        if event.kind.is_replaceable() {
            let slot = (event.pubkey.clone(), event.kind);
            if self.replaceable.get(&slot) == Some(&event.id) {
                self.replaceable.remove(&slot);
            }
        } else if event.kind.is_addressable() {
            let slot = (event.pubkey.clone(), event.kind, event.identifier());
            if self.addressable.get(&slot) == Some(&event.id) {
                self.addressable.remove(&slot);
            }
        }
        Some(event)
    }

    /// The canonical event for a replaceable/addressable coordinate, if stored
    pub fn canonical(&self, coordinate: &Coordinate) -> Option<&Event> {
        let id: &EventId = if coordinate.kind.is_addressable() {
            self.addressable.get(&(
                coordinate.public_key.clone(),
                coordinate.kind,
                coordinate.identifier.clone(),
            ))?
        } else {
            self.replaceable
                .get(&(coordinate.public_key.clone(), coordinate.kind))?
        };
        self.events.get(id)
    }

    /// All stored events matching `filter`, newest first, bounded by `filter.limit`
    pub fn query(&self, filter: &Filter) -> Vec<Event> {
        let mut out: Vec<Event> = Vec::new();
        let limit: usize = filter.limit.unwrap_or(usize::MAX);
        for entry in self.by_created_at.iter() {
            if out.len() >= limit {
                break;
            }
            // events newer than `until` sort first; skip until we enter the window
            if let Some(until) = filter.until {
                if entry.created_at > until {
                    continue;
                }
            }
            // everything from here on is older than `since`; stop
            if let Some(since) = filter.since {
                if entry.created_at < since {
                    break;
                }
            }
            if let Some(event) = self.events.get(&entry.id) {
                if filter.matches(event) {
                    out.push(event.clone());
                }
            }
        }
        out
    }

    /// Evict the oldest events until at most `max` remain
    pub fn truncate(&mut self, max: usize) {
        while self.events.len() > max {
            let oldest: Option<EventId> = self.by_created_at.iter().next_back().map(|e| e.id);
            match oldest {
                Some(id) => {
                    self.remove(&id);
                }
                None => break,
            }
        }
    }

    /// Iterate over all stored events, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.values()
    }
}

#[cfg(test)]
mod tests {
    use nostr::{EventBuilder, Keys, Tag};

    use super::*;

    fn event_at(keys: &Keys, kind: Kind, created_at: u64, content: &str, tags: Vec<Tag>) -> Event {
        let unsigned = nostr::UnsignedEvent::new(
            keys.public_key(),
            Timestamp::from(created_at),
            kind,
            tags,
            content,
        );
        unsigned.sign_with_keys(keys).unwrap()
    }

    #[test]
    fn insert_is_idempotent() {
        let keys = Keys::generate();
        let event = EventBuilder::text_note("hello").sign_with_keys(&keys).unwrap();

        let mut index = EventIndex::new();
        assert!(index.insert(event.clone()).stored);
        let again = index.insert(event);
        assert!(!again.stored);
        assert_eq!(again.rejected, Some(RejectedEvent::Duplicate));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn newer_replaceable_supersedes_older() {
        let keys = Keys::generate();
        let kind = Kind::new(10002);
        let e1 = event_at(&keys, kind, 1_000, "old", vec![]);
        let e2 = event_at(&keys, kind, 2_000, "new", vec![]);

        let mut index = EventIndex::new();
        assert!(index.insert(e1.clone()).stored);
        let result = index.insert(e2.clone());
        assert!(result.stored);
        assert_eq!(result.superseded, vec![e1.id]);

        // e1 is no longer reachable, by id or by query
        assert!(!index.contains(&e1.id));
        let found = index.query(&Filter::new().author(keys.public_key()).kind(kind));
        assert_eq!(found, vec![e2]);
    }

    #[test]
    fn older_replaceable_is_refused() {
        let keys = Keys::generate();
        let kind = Kind::new(10002);
        let e1 = event_at(&keys, kind, 2_000, "new", vec![]);
        let e2 = event_at(&keys, kind, 1_000, "old", vec![]);

        let mut index = EventIndex::new();
        assert!(index.insert(e1.clone()).stored);
        let result = index.insert(e2.clone());
        assert!(!result.stored);
        assert_eq!(result.rejected, Some(RejectedEvent::Replaced));
        assert!(index.contains(&e1.id));
        assert!(!index.contains(&e2.id));
        // superseded ids are remembered as seen
        assert!(index.has_seen(&e2.id));
    }

    #[test]
    fn addressable_slots_are_keyed_by_identifier() {
        let keys = Keys::generate();
        let kind = Kind::new(30023);
        let a1 = event_at(&keys, kind, 1_000, "v1", vec![Tag::identifier("article-a")]);
        let a2 = event_at(&keys, kind, 2_000, "v2", vec![Tag::identifier("article-a")]);
        let b1 = event_at(&keys, kind, 1_500, "other", vec![Tag::identifier("article-b")]);

        let mut index = EventIndex::new();
        assert!(index.insert(a1.clone()).stored);
        assert!(index.insert(b1.clone()).stored);
        assert!(index.insert(a2.clone()).stored);

        assert!(!index.contains(&a1.id));
        assert!(index.contains(&a2.id));
        assert!(index.contains(&b1.id));

        let coordinate = Coordinate::new(kind, keys.public_key()).identifier("article-a");
        assert_eq!(index.canonical(&coordinate), Some(&a2));
    }

    #[test]
    fn query_respects_since_until_and_limit() {
        let keys = Keys::generate();
        let mut index = EventIndex::new();
        for ts in [100u64, 200, 300, 400, 500] {
            index.insert(event_at(&keys, Kind::new(1), ts, &format!("note {ts}"), vec![]));
        }

        let filter = Filter::new()
            .since(Timestamp::from(200))
            .until(Timestamp::from(400));
        let found = index.query(&filter);
        assert_eq!(found.len(), 3);
        // newest first
        assert_eq!(found[0].created_at, Timestamp::from(400));
        assert_eq!(found[2].created_at, Timestamp::from(200));

        let found = index.query(&filter.limit(2));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].created_at, Timestamp::from(400));
    }

    #[test]
    fn truncate_evicts_oldest_first() {
        let keys = Keys::generate();
        let mut index = EventIndex::new();
        for ts in [100u64, 200, 300] {
            index.insert(event_at(&keys, Kind::new(1), ts, &format!("note {ts}"), vec![]));
        }
        index.truncate(2);
        assert_eq!(index.len(), 2);
        let found = index.query(&Filter::new());
        assert_eq!(found[0].created_at, Timestamp::from(300));
        assert_eq!(found[1].created_at, Timestamp::from(200));
    }
}
