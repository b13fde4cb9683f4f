// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Event tags
//!
//! A tag is an ordered list of strings; the first element names the tag, the rest are
//! its values. Most relays only assign meaning to the single-letter names (`e`, `p`,
//! `a`, `d`, `t`) plus a handful of named ones (`nonce`, `relays`, `auth`, `challenge`).

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{EventId, Kind};
use crate::key::PublicKey;
use crate::nips::nip01::Coordinate;

/// Well-known tag names
pub mod kind {
    /// `e` - references an event id
    pub const EVENT: &str = "e";
    /// `p` - references a pubkey
    pub const PUBLIC_KEY: &str = "p";
    /// `a` - references an addressable/replaceable event coordinate
    pub const COORDINATE: &str = "a";
    /// `d` - identifier for addressable events
    pub const IDENTIFIER: &str = "d";
    /// `t` - hashtag
    pub const HASHTAG: &str = "t";
    /// `nonce` - NIP-13 proof-of-work nonce and target difficulty
    pub const NONCE: &str = "nonce";
    /// `relays` - relay hints, used in contact lists and NIP-42 auth
    pub const RELAYS: &str = "relays";
    /// `challenge` - NIP-42 AUTH challenge string
    pub const CHALLENGE: &str = "challenge";
    /// `relay` - NIP-42 AUTH target relay URL
    pub const RELAY: &str = "relay";
    /// `r` - NIP-65 relay-list entry
    pub const RELAY_LIST_ENTRY: &str = "r";
}

/// [`Tag`] error
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// A tag must have at least one element (its name)
    Empty,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "tag has no elements"),
        }
    }
}

/// An event tag: an ordered, non-empty list of strings
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Tag(Vec<String>);

impl Tag {
    /// Construct from a non-empty vector of strings
    pub fn new(values: Vec<String>) -> Result<Self, Error> {
        if values.is_empty() {
            return Err(Error::Empty);
        }
        Ok(Self(values))
    }

    /// Construct from a non-empty vector of strings
    ///
    /// Alias for [`Tag::new`], used where tags arrive as raw `Vec<String>` (e.g. wire parsing).
    #[inline]
    pub fn parse(values: Vec<String>) -> Result<Self, Error> {
        Self::new(values)
    }

    /// Construct a single-element tag
    pub fn from_standardized(name: &str) -> Self {
        Self(vec![name.to_string()])
    }

    /// Tag name (first element)
    #[inline]
    pub fn kind(&self) -> &str {
        &self.0[0]
    }

    /// Tag content (second element), if any
    #[inline]
    pub fn content(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }

    /// All elements after the name
    #[inline]
    pub fn values(&self) -> &[String] {
        &self.0[1..]
    }

    /// Full tag, including the name, as a slice
    #[inline]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Consume and return the backing vector
    #[inline]
    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    /// `e` tag referencing an event id
    pub fn event(event_id: EventId) -> Self {
        Self(vec![kind::EVENT.to_string(), event_id.to_hex()])
    }

    /// `p` tag referencing a pubkey
    pub fn public_key(public_key: PublicKey) -> Self {
        Self(vec![kind::PUBLIC_KEY.to_string(), public_key.to_hex()])
    }

    /// `a` tag referencing an addressable/replaceable event coordinate
    pub fn coordinate(coordinate: &Coordinate, relay_url: Option<&str>) -> Self {
        let mut values = vec![kind::COORDINATE.to_string(), coordinate.to_string()];
        if let Some(relay) = relay_url {
            values.push(relay.to_string());
        }
        Self(values)
    }

    /// `d` tag carrying an addressable event's identifier
    pub fn identifier<S>(identifier: S) -> Self
    where
        S: Into<String>,
    {
        Self(vec![kind::IDENTIFIER.to_string(), identifier.into()])
    }

    /// `t` hashtag tag
    pub fn hashtag<S>(hashtag: S) -> Self
    where
        S: Into<String>,
    {
        Self(vec![kind::HASHTAG.to_string(), hashtag.into()])
    }

    /// NIP-13 `nonce` tag, recording the nonce tried and the target difficulty
    pub fn pow_nonce(nonce: u128, difficulty: u8) -> Self {
        Self(vec![
            kind::NONCE.to_string(),
            nonce.to_string(),
            difficulty.to_string(),
        ])
    }

    /// `relays` tag, as used in contact lists and NIP-42
    pub fn relays(urls: impl IntoIterator<Item = String>) -> Self {
        let mut values = vec![kind::RELAYS.to_string()];
        values.extend(urls);
        Self(values)
    }

    /// NIP-42 `challenge` tag
    pub fn challenge<S>(challenge: S) -> Self
    where
        S: Into<String>,
    {
        Self(vec![kind::CHALLENGE.to_string(), challenge.into()])
    }

    /// NIP-42 `relay` tag
    pub fn relay<S>(url: S) -> Self
    where
        S: Into<String>,
    {
        Self(vec![kind::RELAY.to_string(), url.into()])
    }

    /// NIP-65 `r` relay-list entry, with an optional `read`/`write` marker
    pub fn relay_list_entry<S>(url: S, metadata: Option<&str>) -> Self
    where
        S: Into<String>,
    {
        let mut values = vec![kind::RELAY_LIST_ENTRY.to_string(), url.into()];
        if let Some(m) = metadata {
            values.push(m.to_string());
        }
        Self(values)
    }

    /// If this is an `e` tag, the referenced event id
    pub fn event_id(&self) -> Option<EventId> {
        if self.kind() != kind::EVENT {
            return None;
        }
        EventId::from_hex(self.content()?).ok()
    }

    /// If this is a `p` tag, the referenced pubkey
    pub fn public_key_ref(&self) -> Option<PublicKey> {
        if self.kind() != kind::PUBLIC_KEY {
            return None;
        }
        PublicKey::from_hex(self.content()?).ok()
    }
}

impl TryFrom<Vec<String>> for Tag {
    type Error = Error;

    fn try_from(values: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<Tag> for Vec<String> {
    fn from(tag: Tag) -> Self {
        tag.0
    }
}

/// Filter a tag list down to the `e` tags' referenced event ids, in order
pub fn event_ids<'a>(tags: &'a [Tag]) -> impl Iterator<Item = EventId> + 'a {
    tags.iter().filter_map(Tag::event_id)
}

/// Filter a tag list down to the `p` tags' referenced pubkeys, in order
pub fn public_keys<'a>(tags: &'a [Tag]) -> impl Iterator<Item = PublicKey> + 'a {
    tags.iter().filter_map(Tag::public_key_ref)
}

/// Find the first tag named `d` and return its identifier value, if present
pub fn identifier(tags: &[Tag]) -> Option<&str> {
    tags.iter()
        .find(|t| t.kind() == kind::IDENTIFIER)
        .and_then(Tag::content)
}

/// The kind-qualifier this event's `Kind` needs in its addressable coordinate, if any
pub fn identifier_or_empty(tags: &[Tag], kind: Kind) -> String {
    if kind.is_addressable() {
        identifier(tags).unwrap_or_default().to_string()
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tag_roundtrip() {
        let id = EventId::from_hex("2be17aa3031bdcb006f0fce80c146dea9c1c0268b0af2398bb673365c6444d45")
            .unwrap();
        let tag = Tag::event(id);
        assert_eq!(tag.kind(), "e");
        assert_eq!(tag.event_id(), Some(id));
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(Tag::new(vec![]).unwrap_err(), Error::Empty);
    }

    #[test]
    fn test_identifier_lookup() {
        let tags = vec![Tag::identifier("my-article")];
        assert_eq!(identifier(&tags), Some("my-article"));
    }
}
