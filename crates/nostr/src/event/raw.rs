// Copyright (c) 2021 Paul Miller
// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Raw event
//!
//! A loosely-typed mirror of an event's JSON fields, used to deserialize wire messages
//! before the stronger [`Event`] type is constructed from them.

use std::fmt;
use std::str::FromStr;

use secp256k1::schnorr::Signature;
use serde::{Deserialize, Serialize};

use super::{id, tag};
use crate::key;
use crate::util::JsonUtil;
use crate::{Event, EventId, Kind, PublicKey, Tag, Timestamp};

/// [`RawEvent`] error
#[derive(Debug)]
pub enum Error {
    /// Secp256k1 error
    Secp256k1(secp256k1::Error),
    /// Event ID error
    EventId(id::Error),
    /// Key error
    Key(key::Error),
    /// Tag error
    Tag(tag::Error),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secp256k1(e) => write!(f, "secp256k1: {e}"),
            Self::EventId(e) => write!(f, "event id: {e}"),
            Self::Key(e) => write!(f, "key: {e}"),
            Self::Tag(e) => write!(f, "tag: {e}"),
        }
    }
}

impl From<secp256k1::Error> for Error {
    fn from(e: secp256k1::Error) -> Self {
        Self::Secp256k1(e)
    }
}

impl From<id::Error> for Error {
    fn from(e: id::Error) -> Self {
        Self::EventId(e)
    }
}

impl From<key::Error> for Error {
    fn from(e: key::Error) -> Self {
        Self::Key(e)
    }
}

impl From<tag::Error> for Error {
    fn from(e: tag::Error) -> Self {
        Self::Tag(e)
    }
}

/// Raw event, as it arrives over the wire before hex/signature parsing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawEvent {
    /// ID
    pub id: String,
    /// Author
    pub pubkey: String,
    /// Timestamp (seconds)
    pub created_at: u64,
    /// Kind
    pub kind: u16,
    /// Vector of strings
    pub tags: Vec<Vec<String>>,
    /// Content
    pub content: String,
    /// Signature
    pub sig: String,
}

impl JsonUtil for RawEvent {
    type Err = serde_json::Error;
}

impl TryFrom<RawEvent> for Event {
    type Error = Error;

    fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
        let id: EventId = EventId::from_hex(raw.id)?;
        let public_key: PublicKey = PublicKey::from_hex(raw.pubkey)?;
        let created_at: Timestamp = Timestamp::from(raw.created_at);
        let kind: Kind = Kind::from(raw.kind);
        let tags: Vec<Tag> = raw
            .tags
            .into_iter()
            .map(Tag::parse)
            .collect::<Result<Vec<_>, _>>()?;
        let sig: Signature = Signature::from_str(&raw.sig)?;
        Ok(Self::new(
            id,
            public_key,
            created_at,
            kind,
            tags,
            raw.content,
            sig,
        ))
    }
}

impl From<Event> for RawEvent {
    fn from(event: Event) -> Self {
        Self {
            id: event.id.to_hex(),
            pubkey: event.pubkey.to_hex(),
            created_at: event.created_at.as_u64(),
            kind: event.kind.as_u16(),
            tags: event.tags.into_iter().map(Tag::into_vec).collect(),
            content: event.content,
            sig: event.sig.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_event_missing_tag_name_rejected() {
        let raw = RawEvent {
            id: "2be17aa3031bdcb006f0fce80c146dea9c1c0268b0af2398bb673365c6444d45".to_string(),
            pubkey: "f86c44a2de95d9149b51c6a29afeabba264c18e2fa7c49de93424a0c56947785".to_string(),
            created_at: 0,
            kind: 1,
            tags: vec![vec![]],
            content: String::new(),
            sig: "0".repeat(128),
        };
        assert!(Event::try_from(raw).is_err());
    }
}
