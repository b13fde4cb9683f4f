// Copyright (c) 2021 Paul Miller
// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Event, filter and signer model for a nostr client development kit
//!
//! This crate provides the core data types of the nostr protocol: signed/unsigned events,
//! an [`EventBuilder`], subscription [`Filter`]s, the [`ClientMessage`]/[`RelayMessage`]
//! wire envelopes, [`Keys`]-based signing, and a pluggable [`NostrSigner`] for remote
//! signers. Higher-level concerns (relay connections, databases, gossip) live in sibling
//! crates.

use once_cell::sync::Lazy;
use secp256k1::{All, Secp256k1};

pub mod event;
pub mod filter;
pub mod key;
pub mod message;
pub mod nips;
pub mod prelude;
pub mod signer;
pub mod types;
pub mod util;

pub use self::event::{
    Error as EventError, Event, EventBuilder, EventId, Kind, RawEvent, Tag, UnsignedEvent,
};
pub use self::filter::Filter;
pub use self::key::{Keys, PublicKey, SecretKey};
pub use self::message::{ClientMessage, MessageHandleError, RelayMessage, SubscriptionId};
pub use self::signer::{
    EncryptionScheme, IntoNostrSigner, NostrSigner, SignerBackend, SignerError,
};
pub use self::types::{RelayUrl, RelayUrlError, Timestamp};
pub use self::util::JsonUtil;

pub use ::url::{self, Url};

/// A secp256k1 context shared across the crate, randomized once at startup
pub static SECP256K1: Lazy<Secp256k1<All>> = Lazy::new(|| {
    let mut ctx = Secp256k1::new();
    let mut rng = rand::thread_rng();
    ctx.randomize(&mut rng);
    ctx
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_signed_event() {
        let keys = Keys::generate();
        let event = EventBuilder::text_note("hello").sign_with_keys(&keys).unwrap();
        let serialized = event.as_json();
        let deserialized = Event::from_json(serialized).unwrap();
        assert_eq!(event, deserialized);
    }

    #[test]
    fn parse_relay_message_event() {
        const SAMPLE_EVENT: &str = r#"["EVENT", "random_string", {"id":"70b10f70c1318967eddf12527799411b1a9780ad9c43858f5e5fcd45486a13a5","pubkey":"379e863e8357163b5bce5d2688dc4f1dcc2d505222fb8d74db600f30535dfdfe","created_at":1612809991,"kind":1,"tags":[],"content":"test","sig":"273a9cd5d11455590f4359500bccb7a89428262b96b3ea87a756b770964472f8c3e87f5d5e64d8d2e859a71462a3f477b554565c4f2f326cb01dd7620db71502"}]"#;

        let parsed = RelayMessage::from_json(SAMPLE_EVENT).expect("failed to parse event");
        if let RelayMessage::Event { subscription_id, event } = parsed {
            assert_eq!(subscription_id, SubscriptionId::new("random_string"));
            event.verify().unwrap();
        } else {
            panic!("wrong relay message variant");
        }
    }

    #[cfg(feature = "nip04")]
    #[test]
    fn encrypted_direct_message_round_trips() {
        use crate::nips::nip04;

        let sender_keys = Keys::generate();
        let receiver_keys = Keys::generate();

        let content = "Mercury, the Winged Messenger";
        let encrypted =
            nip04::encrypt(sender_keys.secret_key(), &receiver_keys.public_key(), content).unwrap();
        let decrypted =
            nip04::decrypt(receiver_keys.secret_key(), &sender_keys.public_key(), &encrypted).unwrap();

        assert_eq!(decrypted, content);
    }
}
