// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Event builder

use rand::{CryptoRng, Rng};
use secp256k1::{Secp256k1, Signing, Verification};

use super::{Error, Event, Kind, Tag, UnsignedEvent};
use crate::{Keys, PublicKey, Timestamp, SECP256K1};

/// Builds an [`Event`] from a kind, content and tags, deferring the creation timestamp and
/// signature until it is consumed by [`EventBuilder::sign_with_keys`]/[`EventBuilder::sign`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBuilder {
    kind: Kind,
    tags: Vec<Tag>,
    content: String,
    pow_difficulty: Option<u8>,
}

impl EventBuilder {
    /// Construct a new builder
    pub fn new<S>(kind: Kind, content: S, tags: impl IntoIterator<Item = Tag>) -> Self
    where
        S: Into<String>,
    {
        Self {
            kind,
            tags: tags.into_iter().collect(),
            content: content.into(),
            pow_difficulty: None,
        }
    }

    /// A kind-1 text note
    pub fn text_note<S>(content: S) -> Self
    where
        S: Into<String>,
    {
        Self::new(Kind::new(crate::event::kind::TEXT_NOTE), content, [])
    }

    /// NIP-42 AUTH response to a relay's challenge
    pub fn auth<S>(challenge: S, relay_url: &str) -> Self
    where
        S: Into<String>,
    {
        Self::new(
            Kind::new(crate::event::kind::AUTHENTICATION),
            "",
            [Tag::challenge(challenge), Tag::relay(relay_url)],
        )
    }

    /// Append an additional tag
    pub fn tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    /// Mine a NIP-13 `nonce` tag so the resulting event id has at least `difficulty`
    /// leading zero bits
    pub fn pow(mut self, difficulty: u8) -> Self {
        self.pow_difficulty = Some(difficulty);
        self
    }

    /// Assemble the unsigned event for `pubkey`, mining proof-of-work if requested
    pub fn build(self, pubkey: PublicKey) -> UnsignedEvent {
        let (tags, created_at) = self.mine(&pubkey);
        UnsignedEvent::new(pubkey, created_at, self.kind, tags, self.content)
    }

    /// Sign with any [`NostrSigner`]
    pub async fn sign(self, signer: &dyn crate::NostrSigner) -> Result<Event, Error> {
        let pubkey: PublicKey = signer.get_public_key().await?;
        let unsigned: UnsignedEvent = self.build(pubkey);
        signer.sign_event(unsigned).await.map_err(Error::from)
    }

    /// Sign with the given keys, using the shared secp256k1 context and OS randomness
    #[inline]
    pub fn sign_with_keys(self, keys: &Keys) -> Result<Event, Error> {
        self.sign_with_ctx(&SECP256K1, &mut rand::thread_rng(), keys)
    }

    /// Sign with the given keys, using a caller-supplied secp256k1 context and RNG
    pub fn sign_with_ctx<C, R>(
        self,
        secp: &Secp256k1<C>,
        rng: &mut R,
        keys: &Keys,
    ) -> Result<Event, Error>
    where
        C: Signing + Verification,
        R: Rng + CryptoRng,
    {
        let pubkey: PublicKey = keys.public_key();
        let (tags, created_at) = self.mine(&pubkey);
        let unsigned = UnsignedEvent::new(pubkey, created_at, self.kind, tags, self.content);
        unsigned
            .sign_with_ctx(secp, rng, keys)
            .map_err(|e| Error::Builder(e.to_string()))
    }

    /// Find a `created_at`/nonce pair satisfying the configured PoW difficulty, if any
    ///
    /// Returns the final tag list (with the mined `nonce` tag appended, if PoW was requested)
    /// and the `created_at` used to mine it.
    fn mine(&self, pubkey: &PublicKey) -> (Vec<Tag>, Timestamp) {
        let Some(difficulty) = self.pow_difficulty else {
            return (self.tags.clone(), Timestamp::now());
        };

        let mut nonce: u128 = 0;
        loop {
            nonce += 1;
            let created_at: Timestamp = Timestamp::now();
            let mut tags: Vec<Tag> = self.tags.clone();
            tags.push(Tag::pow_nonce(nonce, difficulty));

            let id = super::EventId::new(pubkey, &created_at, &self.kind, &tags, &self.content);
            if id.check_pow(difficulty) {
                return (tags, created_at);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::JsonUtil;

    #[test]
    fn test_builder_signs_and_verifies() {
        let keys = Keys::generate();
        let event = EventBuilder::text_note("hello world")
            .sign_with_keys(&keys)
            .unwrap();
        assert!(event.verify().is_ok());
        assert_eq!(event.kind, Kind::new(1));
        assert_eq!(event.content, "hello world");
    }

    #[test]
    fn test_builder_round_trips_through_json() {
        let keys = Keys::generate();
        let event = EventBuilder::text_note("gm").sign_with_keys(&keys).unwrap();
        let json = event.as_json();
        let parsed = Event::from_json(json).unwrap();
        assert_eq!(event, parsed);
    }

    #[test]
    fn test_pow_event_meets_difficulty() {
        let keys = Keys::generate();
        let event = EventBuilder::text_note("mined")
            .pow(8)
            .sign_with_keys(&keys)
            .unwrap();
        assert!(event.verify().is_ok());
        assert!(event.id.check_pow(8));
    }
}
