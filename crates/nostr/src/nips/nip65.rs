// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! NIP-65: Relay List Metadata
//!
//! <https://github.com/nostr-protocol/nips/blob/master/65.md>

use std::fmt;
use std::str::FromStr;

use crate::event::tag::kind as tag_kind;
use crate::{Event, RelayUrl};

/// NIP-65 error
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Neither `read` nor `write`
    InvalidRelayMetadata(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRelayMetadata(s) => write!(f, "invalid relay metadata: {s}"),
        }
    }
}

/// Direction marker on a relay-list `r` tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RelayMetadata {
    /// Relay is used for reading events
    Read,
    /// Relay is used for publishing events
    Write,
}

impl fmt::Display for RelayMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

impl FromStr for RelayMetadata {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            s => Err(Error::InvalidRelayMetadata(s.to_string())),
        }
    }
}

/// Extract `(relay_url, metadata)` pairs from a kind-10002 event's `r` tags
///
/// `metadata` is `None` for an `r` tag with no third element, meaning the relay is
/// used for both reading and writing.
pub fn extract_relay_list(event: &Event) -> Vec<(RelayUrl, Option<RelayMetadata>)> {
    event
        .tags
        .iter()
        .filter(|t| t.kind() == tag_kind::RELAY_LIST_ENTRY)
        .filter_map(|t| {
            let url = RelayUrl::parse(t.content()?).ok()?;
            let metadata = t.values().get(1).and_then(|m| RelayMetadata::from_str(m).ok());
            Some((url, metadata))
        })
        .collect()
}
