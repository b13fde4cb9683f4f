// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Event kind and its replaceability classification

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Profile metadata (NIP-01)
pub const METADATA: u16 = 0;
/// Text note (NIP-01)
pub const TEXT_NOTE: u16 = 1;
/// Contact list (NIP-02)
pub const CONTACT_LIST: u16 = 3;
/// Relay list metadata (NIP-65)
pub const RELAY_LIST: u16 = 10002;
/// Client authentication to a relay (NIP-42)
pub const AUTHENTICATION: u16 = 22242;

/// How a kind's events are retained and superseded
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum KindClass {
    /// All events of this kind are kept; nothing is superseded
    Regular,
    /// Only the latest event per `(pubkey, kind)` is canonical
    Replaceable,
    /// Relays may discard events of this kind without notice
    Ephemeral,
    /// Only the latest event per `(pubkey, kind, d-tag)` is canonical
    Addressable,
}

/// Event kind
///
/// A non-negative integer. Ranges `10000..20000` are replaceable, `20000..30000` are
/// ephemeral, `30000..40000` are addressable; everything else, including `0` and `3`
/// which carry their own special meaning, is regular.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Kind(u16);

impl Kind {
    /// Construct from the numeric value
    #[inline]
    pub fn new(kind: u16) -> Self {
        Self(kind)
    }

    /// Get the numeric value
    #[inline]
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Get the numeric value widened to `u64`, matching wire integer width
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0 as u64
    }

    /// Classify this kind's replaceability per NIP-01 kind ranges
    pub fn classify(&self) -> KindClass {
        match self.0 {
            10000..=19999 => KindClass::Replaceable,
            20000..=29999 => KindClass::Ephemeral,
            30000..=39999 => KindClass::Addressable,
            _ => KindClass::Regular,
        }
    }

    /// `true` if only the latest event per `(pubkey, kind)` is canonical
    #[inline]
    pub fn is_replaceable(&self) -> bool {
        matches!(self.classify(), KindClass::Replaceable)
    }

    /// `true` if relays may discard events of this kind without notice
    #[inline]
    pub fn is_ephemeral(&self) -> bool {
        matches!(self.classify(), KindClass::Ephemeral)
    }

    /// `true` if only the latest event per `(pubkey, kind, d-tag)` is canonical
    #[inline]
    pub fn is_addressable(&self) -> bool {
        matches!(self.classify(), KindClass::Addressable)
    }

    /// `true` for a profile metadata event (kind `0`)
    #[inline]
    pub fn is_metadata(&self) -> bool {
        self.0 == METADATA
    }

    /// `true` for a contact list event (kind `3`)
    #[inline]
    pub fn is_contact_list(&self) -> bool {
        self.0 == CONTACT_LIST
    }

    /// `true` for a relay-preference record (kind `10002`)
    #[inline]
    pub fn is_relay_list(&self) -> bool {
        self.0 == RELAY_LIST
    }

    /// `true` for a NIP-42 client authentication event (kind `22242`)
    #[inline]
    pub fn is_authentication(&self) -> bool {
        self.0 == AUTHENTICATION
    }
}

impl From<u16> for Kind {
    fn from(kind: u16) -> Self {
        Self::new(kind)
    }
}

impl From<Kind> for u16 {
    fn from(kind: Kind) -> Self {
        kind.0
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Kind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u16(self.0)
    }
}

impl<'de> Deserialize<'de> for Kind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let kind: u16 = Deserialize::deserialize(deserializer)?;
        Ok(Self::new(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_ranges() {
        assert_eq!(Kind::new(1).classify(), KindClass::Regular);
        assert_eq!(Kind::new(10000).classify(), KindClass::Replaceable);
        assert_eq!(Kind::new(19999).classify(), KindClass::Replaceable);
        assert_eq!(Kind::new(20000).classify(), KindClass::Ephemeral);
        assert_eq!(Kind::new(29999).classify(), KindClass::Ephemeral);
        assert_eq!(Kind::new(30000).classify(), KindClass::Addressable);
        assert_eq!(Kind::new(39999).classify(), KindClass::Addressable);
        assert_eq!(Kind::new(40000).classify(), KindClass::Regular);
    }

    #[test]
    fn test_relay_list_is_replaceable() {
        let kind = Kind::new(RELAY_LIST);
        assert!(kind.is_replaceable());
        assert!(kind.is_relay_list());
    }
}
