// Copyright (c) 2021 Paul Miller
// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Subscription filters

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::tag;
use crate::{Event, EventId, Kind, PublicKey, Timestamp};

/// Filter a [`Filter`]'s generic tag map keys must satisfy: a single ASCII letter
fn tag_key(name: &str) -> String {
    format!("#{name}")
}

/// A request for events matching a set of conditions
///
/// Every non-empty field must match for an event to satisfy the filter; within a field,
/// any one of the listed values is sufficient (OR within a field, AND across fields).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Event ids
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<BTreeSet<EventId>>,
    /// Author public keys
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<BTreeSet<PublicKey>>,
    /// Event kinds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<BTreeSet<Kind>>,
    /// Events must be newer than or equal to this timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<Timestamp>,
    /// Events must be older than this timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<Timestamp>,
    /// Maximum number of events a relay should return for this filter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Search query (NIP-50)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Generic single-letter tag filters (`#e`, `#p`, `#d`, ...), keyed by bare tag name
    #[serde(flatten)]
    pub generic_tags: HashMap<String, BTreeSet<String>>,
}

impl Filter {
    /// Construct an empty filter, matching everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Match a single id
    pub fn id(self, id: EventId) -> Self {
        self.ids([id])
    }

    /// Match any of these ids
    pub fn ids(mut self, ids: impl IntoIterator<Item = EventId>) -> Self {
        self.ids.get_or_insert_with(BTreeSet::new).extend(ids);
        self
    }

    /// Match a single author
    pub fn author(self, author: PublicKey) -> Self {
        self.authors([author])
    }

    /// Match any of these authors
    pub fn authors(mut self, authors: impl IntoIterator<Item = PublicKey>) -> Self {
        self.authors.get_or_insert_with(BTreeSet::new).extend(authors);
        self
    }

    /// Match a single kind
    pub fn kind(self, kind: Kind) -> Self {
        self.kinds([kind])
    }

    /// Match any of these kinds
    pub fn kinds(mut self, kinds: impl IntoIterator<Item = Kind>) -> Self {
        self.kinds.get_or_insert_with(BTreeSet::new).extend(kinds);
        self
    }

    /// Match events with an `e` tag referencing this id
    pub fn event(self, id: EventId) -> Self {
        self.custom_tag(tag::kind::EVENT, [id.to_hex()])
    }

    /// Match events with an `e` tag referencing any of these ids
    pub fn events(self, ids: impl IntoIterator<Item = EventId>) -> Self {
        self.custom_tag(tag::kind::EVENT, ids.into_iter().map(|id| id.to_hex()))
    }

    /// Match events with a `p` tag referencing this pubkey
    pub fn pubkey(self, pubkey: PublicKey) -> Self {
        self.custom_tag(tag::kind::PUBLIC_KEY, [pubkey.to_hex()])
    }

    /// Match events with a `p` tag referencing any of these pubkeys
    pub fn pubkeys(self, pubkeys: impl IntoIterator<Item = PublicKey>) -> Self {
        self.custom_tag(tag::kind::PUBLIC_KEY, pubkeys.into_iter().map(|pk| pk.to_hex()))
    }

    /// Match events with a `d` tag equal to this identifier
    pub fn identifier(self, identifier: impl Into<String>) -> Self {
        self.custom_tag(tag::kind::IDENTIFIER, [identifier.into()])
    }

    /// Match events with a `t` tag equal to this hashtag
    pub fn hashtag(self, hashtag: impl Into<String>) -> Self {
        self.custom_tag(tag::kind::HASHTAG, [hashtag.into()])
    }

    /// Match events carrying a tag named `name` whose value is one of `values`
    pub fn custom_tag(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = String>,
    ) -> Self {
        self.generic_tags
            .entry(tag_key(&name.into()))
            .or_default()
            .extend(values);
        self
    }

    /// Match events created at or after this timestamp
    pub fn since(mut self, since: Timestamp) -> Self {
        self.since = Some(since);
        self
    }

    /// Match events created before this timestamp
    pub fn until(mut self, until: Timestamp) -> Self {
        self.until = Some(until);
        self
    }

    /// Cap the number of events a relay should return
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// NIP-50 search query
    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Whether this filter has no constraints at all
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Check whether `event` satisfies every constraint in this filter
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.contains(&event.id) {
                return false;
            }
        }

        if let Some(authors) = &self.authors {
            if !authors.contains(&event.pubkey) {
                return false;
            }
        }

        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }

        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }

        if let Some(until) = self.until {
            if event.created_at > until {
                return false;
            }
        }

        for (key, values) in self.generic_tags.iter() {
            let name: &str = key.strip_prefix('#').unwrap_or(key);
            let matched = event.tags.iter().any(|tag| {
                let slice = tag.as_slice();
                slice.first().map(String::as_str) == Some(name)
                    && slice.get(1).is_some_and(|v| values.contains(v))
            });
            if !matched {
                return false;
            }
        }

        true
    }

    /// Merge with another filter iff one filter can express the union of both
    ///
    /// `since`, `until`, `limit` and `search` must be equal (or absent on both sides).
    /// The collection fields (ids, authors, kinds, each generic tag key) may disagree on
    /// at most one field, which is unioned; an absent field counts as disagreeing, since
    /// absent means match-all. Disagreement on two or more fields would turn the union
    /// into a conjunction, so merging fails and the caller keeps both filters.
    pub fn merge(mut self, mut other: Filter) -> Option<Filter> {
        if self.since != other.since
            || self.until != other.until
            || self.limit != other.limit
            || self.search != other.search
        {
            return None;
        }

        let tag_keys: BTreeSet<String> = self
            .generic_tags
            .keys()
            .chain(other.generic_tags.keys())
            .cloned()
            .collect();

        let mut differing: usize = 0;
        if self.ids != other.ids {
            differing += 1;
        }
        if self.authors != other.authors {
            differing += 1;
        }
        if self.kinds != other.kinds {
            differing += 1;
        }
        for key in tag_keys.iter() {
            if self.generic_tags.get(key) != other.generic_tags.get(key) {
                differing += 1;
            }
        }
        if differing > 1 {
            return None;
        }

        // the union of a set with match-all is match-all, so a field present on only one
        // side is dropped rather than kept
        fn union_sets<T: Ord>(a: Option<BTreeSet<T>>, b: Option<BTreeSet<T>>) -> Option<BTreeSet<T>> {
            match (a, b) {
                (Some(mut a), Some(b)) => {
                    a.extend(b);
                    Some(a)
                }
                _ => None,
            }
        }

        self.ids = union_sets(self.ids, other.ids);
        self.authors = union_sets(self.authors, other.authors);
        self.kinds = union_sets(self.kinds, other.kinds);

        let mut merged_tags: HashMap<String, BTreeSet<String>> = HashMap::new();
        for key in tag_keys {
            if let (Some(mut a), Some(b)) = (
                self.generic_tags.remove(&key),
                other.generic_tags.remove(&key),
            ) {
                a.extend(b);
                merged_tags.insert(key, a);
            }
        }
        self.generic_tags = merged_tags;

        Some(self)
    }

    /// Serialize to the JSON value sent on the wire inside a `REQ`/`COUNT` message
    pub fn to_wire(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventBuilder, Keys, Tag};

    #[test]
    fn test_filter_matches_kind_and_author() {
        let keys = Keys::generate();
        let event = EventBuilder::text_note("hi").sign_with_keys(&keys).unwrap();

        let filter = Filter::new().kind(Kind::new(1)).author(keys.public_key());
        assert!(filter.matches(&event));

        let filter = Filter::new().kind(Kind::new(2));
        assert!(!filter.matches(&event));
    }

    #[test]
    fn test_filter_matches_generic_tag() {
        let keys = Keys::generate();
        let referenced = EventId::from_slice(&[7u8; 32]).unwrap();
        let event = EventBuilder::new(Kind::new(1), "hi", [Tag::event(referenced)])
            .sign_with_keys(&keys)
            .unwrap();

        assert!(Filter::new().event(referenced).matches(&event));
        assert!(!Filter::new().event(EventId::from_slice(&[8u8; 32]).unwrap()).matches(&event));
    }

    #[test]
    fn test_filter_merge_compatible() {
        let a = Filter::new().kind(Kind::new(1)).limit(10);
        let b = Filter::new().kind(Kind::new(2)).limit(10);
        let merged = a.merge(b).expect("compatible filters should merge");
        assert_eq!(merged.kinds, Some(BTreeSet::from([Kind::new(1), Kind::new(2)])));
        assert_eq!(merged.limit, Some(10));
    }

    #[test]
    fn test_filter_merge_incompatible_limit() {
        let a = Filter::new().limit(10);
        let b = Filter::new().limit(20);
        assert!(a.merge(b).is_none());
    }

    #[test]
    fn test_filter_merge_rejects_cross_field_union() {
        let keys = Keys::generate();

        // {kinds:[1]} ∨ {authors:[P]} is not expressible as one filter: unioning both
        // fields would produce the conjunction kind==1 AND author==P
        let a = Filter::new().kind(Kind::new(1));
        let b = Filter::new().author(keys.public_key());
        assert!(a.clone().merge(b.clone()).is_none());
        assert!(b.merge(a.clone()).is_none());

        // same shape with generic tag keys
        let e_tag = Filter::new().event(EventId::from_slice(&[7u8; 32]).unwrap());
        let p_tag = Filter::new().pubkey(keys.public_key());
        assert!(e_tag.merge(p_tag).is_none());

        // two differing plain collection fields on otherwise equal filters
        let a = Filter::new().kind(Kind::new(1)).author(keys.public_key());
        let b = Filter::new().kind(Kind::new(2));
        assert!(a.merge(b).is_none());
    }

    #[test]
    fn test_filter_merge_with_unconstrained_side_drops_the_field() {
        // absent means match-all, so the union with the empty filter is the empty filter
        let a = Filter::new().kind(Kind::new(1));
        let merged = a.merge(Filter::new()).unwrap();
        assert!(merged.is_empty());
    }

    #[test]
    fn test_merged_filter_matches_union_of_parts() {
        let keys = Keys::generate();
        let note = EventBuilder::new(Kind::new(1), "note", []).sign_with_keys(&keys).unwrap();
        let repost = EventBuilder::new(Kind::new(6), "", []).sign_with_keys(&keys).unwrap();
        let reaction = EventBuilder::new(Kind::new(7), "+", []).sign_with_keys(&keys).unwrap();

        let a = Filter::new().kind(Kind::new(1));
        let b = Filter::new().kind(Kind::new(6));
        let merged = a.clone().merge(b.clone()).unwrap();

        for event in [&note, &repost, &reaction] {
            assert_eq!(
                merged.matches(event),
                a.matches(event) || b.matches(event),
                "merged filter must match exactly the union"
            );
        }
    }
}
