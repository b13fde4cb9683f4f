// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Event

use secp256k1::schnorr::Signature;
use secp256k1::{Message, Secp256k1, Verification};
use serde::{Deserialize, Serialize};

pub mod builder;
pub mod error;
pub mod id;
pub mod kind;
pub mod raw;
pub mod tag;
pub mod unsigned;

pub use self::builder::EventBuilder;
pub use self::error::Error;
pub use self::id::EventId;
pub use self::kind::Kind;
pub use self::raw::RawEvent;
pub use self::tag::Tag;
pub use self::unsigned::UnsignedEvent;
use crate::util::JsonUtil;
use crate::{PublicKey, Timestamp, SECP256K1};

/// A signed nostr event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Id
    pub id: EventId,
    /// Author
    pub pubkey: PublicKey,
    /// Creation time
    pub created_at: Timestamp,
    /// Kind
    pub kind: Kind,
    /// Tags
    pub tags: Vec<Tag>,
    /// Content
    pub content: String,
    /// Signature
    pub sig: Signature,
}

impl Event {
    /// Construct from already-known fields, without recomputing the id or checking the signature
    #[allow(clippy::too_many_arguments)]
    pub fn new<I, S>(
        id: EventId,
        pubkey: PublicKey,
        created_at: Timestamp,
        kind: Kind,
        tags: I,
        content: S,
        sig: Signature,
    ) -> Self
    where
        I: IntoIterator<Item = Tag>,
        S: Into<String>,
    {
        Self {
            id,
            pubkey,
            created_at,
            kind,
            tags: tags.into_iter().collect(),
            content: content.into(),
            sig,
        }
    }

    /// Recompute the canonical id from this event's fields
    #[inline]
    pub fn compute_id(&self) -> EventId {
        EventId::new(
            &self.pubkey,
            &self.created_at,
            &self.kind,
            &self.tags,
            &self.content,
        )
    }

    /// Check that `id` matches the recomputed canonical id
    pub fn verify_id(&self) -> Result<(), Error> {
        if self.id == self.compute_id() {
            Ok(())
        } else {
            Err(Error::InvalidId)
        }
    }

    /// Check the signature against `id` and `pubkey`, using the shared secp256k1 context
    #[inline]
    pub fn verify_signature(&self) -> Result<(), Error> {
        self.verify_signature_with_ctx(&SECP256K1)
    }

    /// Check the signature against `id` and `pubkey`, using a caller-supplied secp256k1 context
    pub fn verify_signature_with_ctx<C>(&self, secp: &Secp256k1<C>) -> Result<(), Error>
    where
        C: Verification,
    {
        let message = Message::from_digest_slice(self.id.as_bytes())
            .map_err(|_| Error::InvalidSignature)?;
        let pubkey = self
            .pubkey
            .get_xonly_public_key()
            .map_err(|_| Error::InvalidSignature)?;
        secp.verify_schnorr(&self.sig, &message, pubkey)
            .map_err(|_| Error::InvalidSignature)
    }

    /// Check both the id and the signature
    pub fn verify(&self) -> Result<(), Error> {
        self.verify_id()?;
        self.verify_signature()
    }

    /// The `d` tag value this event's addressable coordinate is keyed on, if any
    #[inline]
    pub fn identifier(&self) -> String {
        tag::identifier_or_empty(&self.tags, self.kind)
    }

    /// The first tag named `name`, as its full element slice
    pub fn first_tag(&self, name: &str) -> Option<&[String]> {
        self.tags
            .iter()
            .find(|t| t.kind() == name)
            .map(Tag::as_slice)
    }

    /// The value (second element) of every tag named `name`, in order
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.tags
            .iter()
            .filter(move |t| t.kind() == name)
            .filter_map(Tag::content)
    }
}

impl JsonUtil for Event {
    type Err = Error;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Keys;

    #[test]
    fn test_sign_and_verify() {
        let keys = Keys::generate();
        let unsigned = UnsignedEvent::new(
            keys.public_key(),
            Timestamp::now(),
            Kind::new(1),
            vec![],
            "hello",
        );
        let event = unsigned.sign_with_keys(&keys).unwrap();
        assert!(event.verify().is_ok());
    }

    #[test]
    fn test_tag_lookup_helpers() {
        let keys = Keys::generate();
        let unsigned = UnsignedEvent::new(
            keys.public_key(),
            Timestamp::now(),
            Kind::new(1),
            vec![Tag::hashtag("rust"), Tag::hashtag("nostr")],
            "tagged",
        );
        let event = unsigned.sign_with_keys(&keys).unwrap();

        assert_eq!(event.first_tag("t").map(|t| &t[1]), Some(&"rust".to_string()));
        assert_eq!(event.first_tag("e"), None);
        let values: Vec<&str> = event.tag_values("t").collect();
        assert_eq!(values, vec!["rust", "nostr"]);
    }

    #[test]
    fn test_tampered_content_fails_verify() {
        let keys = Keys::generate();
        let unsigned = UnsignedEvent::new(
            keys.public_key(),
            Timestamp::now(),
            Kind::new(1),
            vec![],
            "hello",
        );
        let mut event = unsigned.sign_with_keys(&keys).unwrap();
        event.content = "tampered".to_string();
        assert_eq!(event.verify().unwrap_err(), Error::InvalidId);
    }
}
