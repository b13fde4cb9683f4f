// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Malicious-relay handling, against an in-process mock relay

use std::time::Duration;

use nostr::{EventBuilder, Filter, JsonUtil, Keys, Kind, RelayUrl};
use nostr_relay_pool::{
    CacheStrategy, CheckFiltering, ExclusionReason, FetchOptions, RelayOptions, RelayPool,
    RelayPoolOptions, RelayStatus,
};

mod common;

use common::{MockRelay, MockRelayConfig};

async fn add_and_connect(pool: &RelayPool, mock: &MockRelay) -> RelayUrl {
    let url = RelayUrl::parse(&mock.url()).unwrap();
    pool.add_relay(url.as_str(), RelayOptions::default())
        .await
        .unwrap();
    pool.connect_relay(url.as_str()).await.unwrap();
    let relay = pool.relay(url.as_str()).await.unwrap();
    for _ in 0..200 {
        if relay.status() == RelayStatus::Connected {
            return url;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("relay {url} did not connect");
}

fn forged_event(keys: &Keys) -> nostr::Event {
    let mut event = EventBuilder::text_note("trust me").sign_with_keys(keys).unwrap();
    event.content = String::from("tampered");
    event.id = event.compute_id();
    event
}

#[tokio::test]
async fn forged_signature_invalidates_the_relay() {
    let keys = Keys::generate();
    let forged = forged_event(&keys);
    let honest = EventBuilder::text_note("honest").sign_with_keys(&keys).unwrap();

    // the forged event is streamed first; the honest one after it must be dropped too
    let mock = MockRelay::start(MockRelayConfig {
        events_on_req: vec![
            serde_json::from_str(&forged.as_json()).unwrap(),
            serde_json::from_str(&honest.as_json()).unwrap(),
        ],
        ..MockRelayConfig::accept_all()
    })
    .await;

    let pool = RelayPool::new(RelayPoolOptions::default());
    let url = add_and_connect(&pool, &mock).await;

    let result = pool
        .fetch_events(
            vec![Filter::new().kind(Kind::new(1)).author(keys.public_key())],
            FetchOptions::default()
                .cache_strategy(CacheStrategy::RelayOnly)
                .timeout(Duration::from_secs(3)),
        )
        .await
        .unwrap();

    assert!(
        result.events.is_empty(),
        "nothing from an invalid relay may be emitted"
    );

    // the relay is marked invalid and excluded from future selection
    assert!(pool.verifier().is_invalid(&url).await);
    assert_eq!(
        pool.filtering().check(&url).await,
        CheckFiltering::Excluded(ExclusionReason::InvalidSignatures)
    );

    // a later fetch refuses to target it at all
    let later = pool
        .fetch_events(
            vec![Filter::new().kind(Kind::new(1))],
            FetchOptions::default()
                .cache_strategy(CacheStrategy::RelayOnly)
                .timeout(Duration::from_secs(1)),
        )
        .await
        .unwrap();
    assert!(!later.per_relay.contains_key(&url));

    // until the caller clears the mark
    pool.filtering().clear(&url).await;
    pool.verifier().clear(&url).await;
    assert_eq!(pool.filtering().check(&url).await, CheckFiltering::Allow);
}

#[tokio::test]
async fn forged_event_never_reaches_the_cache() {
    let keys = Keys::generate();
    let forged = forged_event(&keys);

    let mock = MockRelay::start(MockRelayConfig {
        events_on_req: vec![serde_json::from_str(&forged.as_json()).unwrap()],
        ..MockRelayConfig::accept_all()
    })
    .await;

    let pool = RelayPool::new(RelayPoolOptions::default());
    add_and_connect(&pool, &mock).await;

    let _ = pool
        .fetch_events(
            vec![Filter::new().kind(Kind::new(1)).author(keys.public_key())],
            FetchOptions::default()
                .cache_strategy(CacheStrategy::RelayOnly)
                .timeout(Duration::from_secs(2)),
        )
        .await
        .unwrap();

    assert_eq!(
        pool.database().event_by_id(&forged.id).await.unwrap(),
        None,
        "write-through must not happen for rejected events"
    );
}
