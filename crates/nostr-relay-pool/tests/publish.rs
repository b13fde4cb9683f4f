// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Publishing pipeline integration tests, against in-process mock relays

use std::collections::HashSet;
use std::time::Duration;

use nostr::{EventBuilder, Keys, RelayUrl};
use nostr_relay_pool::{
    PublishOptions, PublishStatus, RelayOptions, RelayPool, RelayPoolOptions, RelayStatus,
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

fn fast_options() -> PublishOptions {
    PublishOptions {
        initial_backoff: Duration::from_millis(10),
        rate_limit_max_retries: 2,
        max_retries: 2,
        per_relay_timeout: Duration::from_secs(5),
        persist_failures: false,
        ..Default::default()
    }
}

#[tokio::test]
async fn fan_out_with_partial_failure() {
    // relays A and B accept; C keeps answering rate-limited
    let a = MockRelay::start(MockRelayConfig::accept_all()).await;
    let b = MockRelay::start(MockRelayConfig::accept_all()).await;
    let c = MockRelay::start(MockRelayConfig::reject_all("rate-limited")).await;

    let pool = RelayPool::new(RelayPoolOptions::default());
    let url_a = add_and_connect(&pool, &a).await;
    let url_b = add_and_connect(&pool, &b).await;
    let url_c = add_and_connect(&pool, &c).await;

    let keys = Keys::generate();
    let event = EventBuilder::text_note("fan out").sign_with_keys(&keys).unwrap();

    let opts = fast_options().min_successful_relays(2);
    let result = pool.publish(event, None, opts).await.unwrap();

    assert!(result.success, "two accepting relays meet the threshold");
    assert_eq!(result.per_relay.len(), 3);
    assert_eq!(result.per_relay[&url_a].status, PublishStatus::Succeeded);
    assert_eq!(result.per_relay[&url_b].status, PublishStatus::Succeeded);

    let c_outcome = &result.per_relay[&url_c];
    assert_eq!(c_outcome.status, PublishStatus::Failed);
    assert!(c_outcome.message.contains("rate-limited"));
    // the rate-limit budget was exhausted, not a single shot
    assert!(c_outcome.attempts > 1, "rate-limited must be retried");
}

#[tokio::test]
async fn pow_escalation_regenerates_and_succeeds() {
    // the relay demands pow twice, then accepts
    let config = MockRelayConfig {
        ok_script: vec![
            (false, String::from("pow: 8 required")),
            (false, String::from("pow: 8 required")),
        ],
        dedupe: false,
        ..MockRelayConfig::accept_all()
    };
    let mock = MockRelay::start(config).await;

    let keys = Keys::generate();
    let pool = RelayPool::new(RelayPoolOptions::default());
    pool.state().set_signer(keys.clone()).await;
    add_and_connect(&pool, &mock).await;

    let event = EventBuilder::text_note("mine me").sign_with_keys(&keys).unwrap();
    let original_id = event.id;

    let opts = PublishOptions {
        enable_pow: true,
        max_pow_difficulty: 16,
        persist_failures: false,
        ..fast_options()
    };
    let result = pool.publish(event, None, opts).await.unwrap();

    assert!(result.success);
    assert_ne!(result.event.id, original_id, "PoW regeneration changes the id");
    assert!(result.event.id.check_pow(8), "final id carries >= 8 zero bits");
    assert!(result.event.verify().is_ok(), "regenerated event is re-signed");

    let nonce = result
        .event
        .tags
        .iter()
        .find(|t| t.kind() == "nonce")
        .expect("nonce tag present");
    assert_eq!(nonce.as_slice()[2], "8", "nonce tag records the target difficulty");
}

#[tokio::test]
async fn pow_above_cap_is_refused() {
    let config = MockRelayConfig {
        default_ok: (false, String::from("pow: 30 required")),
        dedupe: false,
        ..MockRelayConfig::accept_all()
    };
    let mock = MockRelay::start(config).await;

    let keys = Keys::generate();
    let pool = RelayPool::new(RelayPoolOptions::default());
    pool.state().set_signer(keys.clone()).await;
    let url = add_and_connect(&pool, &mock).await;

    let event = EventBuilder::text_note("too hard").sign_with_keys(&keys).unwrap();
    let opts = PublishOptions {
        enable_pow: true,
        max_pow_difficulty: 16,
        persist_failures: false,
        ..fast_options()
    };
    let result = pool.publish(event, None, opts).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.per_relay[&url].status, PublishStatus::Failed);
    assert!(result.per_relay[&url].message.contains("pow"));
}

#[tokio::test]
async fn republishing_the_same_event_is_idempotent() {
    let mock = MockRelay::start(MockRelayConfig::accept_all()).await;

    let keys = Keys::generate();
    let pool = RelayPool::new(RelayPoolOptions::default());
    add_and_connect(&pool, &mock).await;

    let event = EventBuilder::text_note("send twice").sign_with_keys(&keys).unwrap();

    let first = pool
        .publish(event.clone(), None, fast_options())
        .await
        .unwrap();
    let second = pool.publish(event, None, fast_options()).await.unwrap();

    // the relay dedupes on id; both calls resolve as accepted
    assert!(first.success);
    assert!(second.success);
    assert_eq!(mock.received_event_count().await, 2);
}

#[tokio::test]
async fn auth_required_triggers_nip42_and_retry() {
    let config = MockRelayConfig {
        auth_challenge: Some(String::from("challenge-123")),
        require_auth: true,
        ..MockRelayConfig::accept_all()
    };
    let mock = MockRelay::start(config).await;

    let keys = Keys::generate();
    let pool = RelayPool::new(RelayPoolOptions::default());
    pool.state().set_signer(keys.clone()).await;
    let url = add_and_connect(&pool, &mock).await;

    let event = EventBuilder::text_note("members only").sign_with_keys(&keys).unwrap();
    let result = pool.publish(event, None, fast_options()).await.unwrap();

    assert!(result.success);
    assert_eq!(result.per_relay[&url].status, PublishStatus::Succeeded);

    // the AUTH response bound the challenge and the relay url
    let auth_events = mock.state.auth_events_received.lock().await;
    assert_eq!(auth_events.len(), 1);
    let tags = auth_events[0]["tags"].as_array().unwrap();
    assert!(tags
        .iter()
        .any(|t| t[0] == "challenge" && t[1] == "challenge-123"));
    assert!(tags.iter().any(|t| t[0] == "relay"));
}

#[tokio::test]
async fn overall_failure_parks_event_in_unpublished_queue() {
    let mock = MockRelay::start(MockRelayConfig::reject_all("error: broken")).await;

    let keys = Keys::generate();
    let pool = RelayPool::new(RelayPoolOptions::default());
    let url = add_and_connect(&pool, &mock).await;

    let event = EventBuilder::text_note("keep for later").sign_with_keys(&keys).unwrap();
    let opts = PublishOptions {
        persist_failures: true,
        ..fast_options()
    };
    let result = pool.publish(event.clone(), None, opts).await.unwrap();

    assert!(!result.success);
    assert!(result.queued);

    let queued = pool.database().dequeue_unpublished().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].event.id, event.id);
    assert_eq!(
        queued[0].target_relays,
        HashSet::from([url])
    );
}
