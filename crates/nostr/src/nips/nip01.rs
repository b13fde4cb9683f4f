// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! NIP-01
//!
//! Core protocol: event shape and id computation, the addressable-event coordinate,
//! client/relay wire messages.
//!
//! <https://github.com/nostr-protocol/nips/blob/master/01.md>

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::event::id;
use crate::{key, Filter, Kind, PublicKey, Tag};

/// NIP-01 error
#[derive(Debug)]
pub enum Error {
    /// Keys error
    Keys(key::Error),
    /// Event ID error
    EventId(id::Error),
    /// Integer parse error
    ParseInt(ParseIntError),
    /// Malformed `kind:pubkey:identifier` coordinate string
    InvalidCoordinate,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keys(e) => write!(f, "keys: {e}"),
            Self::EventId(e) => write!(f, "event id: {e}"),
            Self::ParseInt(e) => write!(f, "parse int: {e}"),
            Self::InvalidCoordinate => write!(f, "invalid coordinate"),
        }
    }
}

impl From<key::Error> for Error {
    fn from(e: key::Error) -> Self {
        Self::Keys(e)
    }
}

impl From<id::Error> for Error {
    fn from(e: id::Error) -> Self {
        Self::EventId(e)
    }
}

impl From<ParseIntError> for Error {
    fn from(e: ParseIntError) -> Self {
        Self::ParseInt(e)
    }
}

/// The `(pubkey, kind, d-tag)` address of a replaceable or addressable event, as carried
/// in an `a` tag
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    /// Kind
    pub kind: Kind,
    /// Author
    pub public_key: PublicKey,
    /// `d` tag identifier; empty for a plain replaceable event
    pub identifier: String,
    /// Relay hints where this coordinate might be found
    pub relays: Vec<String>,
}

impl Coordinate {
    /// Construct a coordinate for a (non-addressable) replaceable event
    pub fn new(kind: Kind, public_key: PublicKey) -> Self {
        Self {
            kind,
            public_key,
            identifier: String::new(),
            relays: Vec::new(),
        }
    }

    /// Attach a `d` tag identifier, making this an addressable-event coordinate
    pub fn identifier<S>(mut self, identifier: S) -> Self
    where
        S: Into<String>,
    {
        self.identifier = identifier.into();
        self
    }

    /// Attach relay hints
    pub fn relays(mut self, relays: Vec<String>) -> Self {
        self.relays = relays;
        self
    }
}

impl From<Coordinate> for Tag {
    fn from(value: Coordinate) -> Self {
        let relay_url: Option<String> = value.relays.first().cloned();
        Tag::coordinate(&value, relay_url.as_deref())
    }
}

impl From<Coordinate> for Filter {
    fn from(value: Coordinate) -> Self {
        (&value).into()
    }
}

impl From<&Coordinate> for Filter {
    fn from(value: &Coordinate) -> Self {
        let filter = Filter::new().kind(value.kind).author(value.public_key.clone());
        if value.identifier.is_empty() {
            filter
        } else {
            filter.identifier(value.identifier.clone())
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.public_key, self.identifier)
    }
}

impl FromStr for Coordinate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(kind_str), Some(public_key_str), Some(identifier)) => Ok(Self {
                kind: Kind::new(kind_str.parse()?),
                public_key: PublicKey::from_str(public_key_str)?,
                identifier: identifier.to_owned(),
                relays: Vec::new(),
            }),
            _ => Err(Error::InvalidCoordinate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_display_and_parse_roundtrip() {
        let pk = PublicKey::from_hex(
            "aa4fc8665f5696e33db7e1a572e3b0f5b3d615837b0f362dcb1c8068b098c7b4",
        )
        .unwrap();
        let coordinate = Coordinate::new(Kind::new(30023), pk).identifier("my-article");
        let s = coordinate.to_string();
        let parsed = Coordinate::from_str(&s).unwrap();
        assert_eq!(coordinate, parsed);
    }
}
