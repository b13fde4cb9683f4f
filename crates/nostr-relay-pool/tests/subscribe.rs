// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Subscription engine integration tests, against in-process mock relays

use std::time::{Duration, Instant};

use futures_util::StreamExt;
use nostr::{EventBuilder, Filter, JsonUtil, Keys, Kind, RelayUrl};
use nostr_relay_pool::{
    CacheStrategy, CompletionReason, FetchOptions, FetchRelayState, RelayOptions, RelayPool,
    RelayPoolOptions, RelayStatus, SubscribeOptions,
};

mod common;

use common::{MockRelay, MockRelayConfig};

async fn add_and_connect(pool: &RelayPool, mock: &MockRelay, opts: RelayOptions) -> RelayUrl {
    let url = RelayUrl::parse(&mock.url()).unwrap();
    pool.add_relay(url.as_str(), opts).await.unwrap();
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

#[tokio::test]
async fn reconnect_replays_live_subscription_without_duplicates() {
    let keys = Keys::generate();
    let event = EventBuilder::text_note("history").sign_with_keys(&keys).unwrap();
    let config = MockRelayConfig {
        events_on_req: vec![serde_json::from_str(&event.as_json()).unwrap()],
        ..MockRelayConfig::accept_all()
    };
    let mock = MockRelay::start(config).await;

    let pool = RelayPool::new(RelayPoolOptions::default());
    let relay_opts = RelayOptions::default()
        .reconnect_delays(Duration::from_millis(100), Duration::from_millis(200));
    add_and_connect(&pool, &mock, relay_opts).await;

    let filters = vec![Filter::new().kind(Kind::new(1)).author(keys.public_key())];
    let mut stream = pool
        .subscribe(filters, SubscribeOptions::default())
        .await
        .unwrap();

    // the pre-disconnect event arrives
    let first = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("first event before disconnect")
        .expect("stream open");
    assert_eq!(first.id, event.id);

    let reqs_before = mock.state.reqs.lock().await.len();
    assert_eq!(reqs_before, 1);

    // kill the socket; the relay reconnects on its own and must replay the REQ
    mock.drop_connections();
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        {
            let reqs = mock.state.reqs.lock().await;
            if reqs.len() >= 2 {
                assert_eq!(
                    reqs[0].subscription_id, reqs[1].subscription_id,
                    "replayed REQ reuses the same subscription id"
                );
                assert_eq!(reqs[1].connection, 1, "replay arrives on the new socket");
                break;
            }
        }
        assert!(Instant::now() < deadline, "no replay REQ after reconnect");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // the relay re-streams the same event after replay; dedup keeps it from the consumer
    let dup = tokio::time::timeout(Duration::from_millis(500), stream.next()).await;
    assert!(dup.is_err(), "pre-disconnect event must not be delivered twice");
}

#[tokio::test]
async fn fetch_terminates_on_eose_quorum_not_deadline() {
    // two relays EOSE promptly; the third never does
    let a = MockRelay::start(MockRelayConfig::accept_all()).await;
    let b = MockRelay::start(MockRelayConfig::accept_all()).await;
    let silent = MockRelay::start(MockRelayConfig {
        send_eose: false,
        ..MockRelayConfig::accept_all()
    })
    .await;

    let pool = RelayPool::new(RelayPoolOptions::default());
    let url_a = add_and_connect(&pool, &a, RelayOptions::default()).await;
    let url_b = add_and_connect(&pool, &b, RelayOptions::default()).await;
    let url_silent = add_and_connect(&pool, &silent, RelayOptions::default()).await;

    let started = Instant::now();
    let result = pool
        .fetch_events(
            vec![Filter::new().kind(Kind::new(1))],
            FetchOptions::default()
                .cache_strategy(CacheStrategy::RelayOnly)
                .timeout(Duration::from_secs(10)),
        )
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(result.reason, CompletionReason::QuorumIdle);
    assert!(
        elapsed >= Duration::from_millis(900),
        "must wait out the idle window, took {elapsed:?}"
    );
    assert!(
        elapsed < Duration::from_secs(5),
        "must not wait for the slow relay or the deadline, took {elapsed:?}"
    );

    assert_eq!(result.per_relay[&url_a], FetchRelayState::Eose);
    assert_eq!(result.per_relay[&url_b], FetchRelayState::Eose);
    assert_eq!(result.per_relay[&url_silent], FetchRelayState::Incomplete);
}

#[tokio::test]
async fn same_event_from_two_relays_is_delivered_once() {
    let keys = Keys::generate();
    let event = EventBuilder::text_note("seen everywhere").sign_with_keys(&keys).unwrap();
    let event_json: serde_json::Value = serde_json::from_str(&event.as_json()).unwrap();

    let a = MockRelay::start(MockRelayConfig {
        events_on_req: vec![event_json.clone()],
        ..MockRelayConfig::accept_all()
    })
    .await;
    let b = MockRelay::start(MockRelayConfig {
        events_on_req: vec![event_json],
        ..MockRelayConfig::accept_all()
    })
    .await;

    let pool = RelayPool::new(RelayPoolOptions::default());
    add_and_connect(&pool, &a, RelayOptions::default()).await;
    add_and_connect(&pool, &b, RelayOptions::default()).await;

    let result = pool
        .fetch_events(
            vec![Filter::new().kind(Kind::new(1)).author(keys.public_key())],
            FetchOptions::default().cache_strategy(CacheStrategy::RelayOnly),
        )
        .await
        .unwrap();

    assert_eq!(result.events.len(), 1);
    assert_eq!(result.events[0].id, event.id);
    assert!(pool.engine_stats().duplicates_suppressed() >= 1);
}

#[tokio::test]
async fn compatible_subscriptions_share_one_wire_req() {
    let keys = Keys::generate();
    let note = EventBuilder::text_note("note").sign_with_keys(&keys).unwrap();
    let mock = MockRelay::start(MockRelayConfig {
        events_on_req: vec![serde_json::from_str(&note.as_json()).unwrap()],
        ..MockRelayConfig::accept_all()
    })
    .await;

    let pool = RelayPool::new(RelayPoolOptions::default());
    add_and_connect(&pool, &mock, RelayOptions::default()).await;

    // created inside one grouping window, with mergeable filters
    let mut notes = pool
        .subscribe(
            vec![Filter::new().kind(Kind::new(1))],
            SubscribeOptions::default(),
        )
        .await
        .unwrap();
    let mut reposts = pool
        .subscribe(
            vec![Filter::new().kind(Kind::new(6))],
            SubscribeOptions::default(),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;

    {
        let reqs = mock.state.reqs.lock().await;
        assert_eq!(reqs.len(), 1, "both subscriptions ride one REQ");
        let kinds = reqs[0].filters[0]["kinds"].as_array().unwrap();
        assert_eq!(kinds.len(), 2, "kinds are merged into one filter");
    }

    // the kind-1 event reaches only the subscription whose filter matches
    let received = tokio::time::timeout(Duration::from_millis(500), notes.next())
        .await
        .expect("kind-1 subscriber gets the note")
        .unwrap();
    assert_eq!(received.id, note.id);

    let nothing = tokio::time::timeout(Duration::from_millis(300), reposts.next()).await;
    assert!(nothing.is_err(), "kind-6 subscriber must not see a kind-1 note");
}

#[tokio::test]
async fn cache_first_fetch_skips_relays_when_satisfied() {
    let keys = Keys::generate();
    let event = EventBuilder::text_note("cached").sign_with_keys(&keys).unwrap();

    let mock = MockRelay::start(MockRelayConfig::accept_all()).await;
    let pool = RelayPool::new(RelayPoolOptions::default());
    add_and_connect(&pool, &mock, RelayOptions::default()).await;

    pool.database().save_event(&event).await.unwrap();

    let result = pool
        .fetch_events(
            vec![Filter::new().kind(Kind::new(1)).author(keys.public_key())],
            FetchOptions::default()
                .cache_strategy(CacheStrategy::CacheFirst)
                .limit(1),
        )
        .await
        .unwrap();

    assert_eq!(result.reason, CompletionReason::Cache);
    assert_eq!(result.events.len(), 1);
    assert_eq!(result.events[0].id, event.id);
    assert_eq!(
        mock.state.reqs.lock().await.len(),
        0,
        "a satisfied cache-first fetch sends no REQ"
    );
}

#[tokio::test]
async fn closing_a_subscription_sends_close() {
    let mock = MockRelay::start(MockRelayConfig::accept_all()).await;
    let pool = RelayPool::new(RelayPoolOptions::default());
    let url = add_and_connect(&pool, &mock, RelayOptions::default()).await;

    let stream = pool
        .subscribe(
            vec![Filter::new().kind(Kind::new(1))],
            SubscribeOptions::default(),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let relay = pool.relay(url.as_str()).await.unwrap();
    assert_eq!(relay.subscriptions().await.len(), 1);

    stream.close().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        relay.subscriptions().await.len(),
        0,
        "closing the last member tears the REQ down"
    );
}
