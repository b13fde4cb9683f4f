// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! NIP-42: Authentication of clients to relays
//!
//! <https://github.com/nostr-protocol/nips/blob/master/42.md>

use crate::event::tag::kind as tag_kind;
use crate::{Event, RelayUrl};

/// Check that a kind-22242 event is a valid response to an AUTH challenge
///
/// Verifies the event kind, the `relay` tag matches `relay_url`, and the `challenge`
/// tag matches `challenge`. Signature and id validity are checked separately.
pub fn is_valid_auth_event(event: &Event, relay_url: &RelayUrl, challenge: &str) -> bool {
    if !event.kind.is_authentication() {
        return false;
    }

    let relay_matches = event
        .tags
        .iter()
        .find(|t| t.kind() == tag_kind::RELAY)
        .and_then(|t| t.content())
        == Some(relay_url.as_str());

    let challenge_matches = event
        .tags
        .iter()
        .find(|t| t.kind() == tag_kind::CHALLENGE)
        .and_then(|t| t.content())
        == Some(challenge);

    relay_matches && challenge_matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventBuilder, Keys, Kind, Tag};

    fn auth_event(keys: &Keys, challenge: &str, relay_url: &RelayUrl) -> Event {
        EventBuilder::new(
            Kind::new(crate::event::kind::AUTHENTICATION),
            "",
            [
                Tag::relay(relay_url.as_str()),
                Tag::challenge(challenge),
            ],
        )
        .sign_with_keys(keys)
        .unwrap()
    }

    #[test]
    fn test_valid_auth_event() {
        let keys = Keys::generate();
        let relay_url = RelayUrl::parse("wss://relay.damus.io").unwrap();
        let challenge = "1234567890";

        let event = auth_event(&keys, challenge, &relay_url);
        assert!(is_valid_auth_event(&event, &relay_url, challenge));
    }

    #[test]
    fn test_invalid_auth_event() {
        let keys = Keys::generate();
        let relay_url = RelayUrl::parse("wss://relay.damus.io").unwrap();
        let challenge = "1234567890";

        let event = auth_event(&keys, "wrong", &relay_url);
        assert!(!is_valid_auth_event(&event, &relay_url, challenge));

        let other_relay = RelayUrl::parse("wss://example.com").unwrap();
        let event = auth_event(&keys, challenge, &other_relay);
        assert!(!is_valid_auth_event(&event, &relay_url, challenge));

        let event = EventBuilder::new(Kind::new(1), "abcd", [])
            .sign_with_keys(&keys)
            .unwrap();
        assert!(!is_valid_auth_event(&event, &relay_url, challenge));
    }
}
