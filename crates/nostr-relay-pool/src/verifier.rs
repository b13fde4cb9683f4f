// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Sampling signature verifier
//!
//! Verifying every Schnorr signature from a relay that has never lied is wasted CPU.
//! Each relay starts fully distrusted (verify ratio 1.0); every verification that passes
//! decays the ratio toward a floor, so a long-lived honest relay is only spot-checked.
//! One failed verification is unforgivable: the relay is marked invalid and everything it
//! sends afterwards is dropped.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use nostr::{Event, EventId, Kind, RelayUrl};
use tokio::sync::Mutex;
use tokio::task;

use crate::filtering::RelayFiltering;

const DEFAULT_VERIFIED_CACHE_SIZE: usize = 16_384;

/// [`SignatureVerifier`] configuration
#[derive(Debug, Clone)]
pub struct VerifierOptions {
    /// Floor the per-relay verify ratio decays toward (default: 0.02)
    pub ratio_min: f64,
    /// Kinds that are always verified, whatever the relay's ratio
    pub always_verify_kinds: Vec<Kind>,
    /// Mark a relay invalid (and excluded from selection) after a forged signature
    /// (default: true)
    pub auto_blacklist_invalid: bool,
    /// Size of the verified-id cache shared across relays
    pub verified_cache_size: usize,
}

impl Default for VerifierOptions {
    fn default() -> Self {
        Self {
            ratio_min: 0.02,
            always_verify_kinds: Vec::new(),
            auto_blacklist_invalid: true,
            verified_cache_size: DEFAULT_VERIFIED_CACHE_SIZE,
        }
    }
}

/// What the verifier decided about one received event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Verified now, or already verified earlier on any relay
    Verified,
    /// Not verified: the sampling policy skipped it
    Sampled,
    /// Forged: id hash mismatch or bad signature. The event must be dropped.
    Rejected,
    /// The relay was already marked invalid; drop without looking
    RelayInvalid,
}

impl Admission {
    /// Whether the event may be emitted to consumers
    pub fn admitted(&self) -> bool {
        matches!(self, Self::Verified | Self::Sampled)
    }
}

#[derive(Debug, Default)]
struct RelayTrust {
    verified_ok: u64,
    invalid: bool,
}

impl RelayTrust {
    fn ratio(&self, ratio_min: f64) -> f64 {
        (1.0 / ((1 + self.verified_ok) as f64).sqrt()).max(ratio_min)
    }
}

/// Sampling-based signature verification with per-relay trust
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    opts: Arc<VerifierOptions>,
    relays: Arc<Mutex<HashMap<RelayUrl, RelayTrust>>>,
    verified_ids: Arc<Mutex<LruCache<EventId, ()>>>,
    filtering: RelayFiltering,
}

impl SignatureVerifier {
    /// A verifier wired to `filtering` for invalid-relay marks
    pub fn new(opts: VerifierOptions, filtering: RelayFiltering) -> Self {
        let cache_size = NonZeroUsize::new(opts.verified_cache_size)
            .unwrap_or(NonZeroUsize::new(DEFAULT_VERIFIED_CACHE_SIZE).unwrap());
        Self {
            opts: Arc::new(opts),
            relays: Arc::new(Mutex::new(HashMap::new())),
            verified_ids: Arc::new(Mutex::new(LruCache::new(cache_size))),
            filtering,
        }
    }

    /// Whether `url` has been marked invalid
    pub async fn is_invalid(&self, url: &RelayUrl) -> bool {
        self.relays
            .lock()
            .await
            .get(url)
            .map(|t| t.invalid)
            .unwrap_or(false)
    }

    /// Forget a relay's invalid mark and trust history
    pub async fn clear(&self, url: &RelayUrl) {
        self.relays.lock().await.remove(url);
    }

    /// Decide whether `event`, received on `relay`, may be admitted
    ///
    /// Verification runs on the blocking pool; the caller's task only suspends.
    pub async fn admit(&self, relay: &RelayUrl, event: &Event) -> Admission {
        {
            let relays = self.relays.lock().await;
            if relays.get(relay).map(|t| t.invalid).unwrap_or(false) {
                return Admission::RelayInvalid;
            }
        }

        if self.verified_ids.lock().await.get(&event.id).is_some() {
            return Admission::Verified;
        }

        let must_verify: bool = self.opts.always_verify_kinds.contains(&event.kind);
        if !must_verify {
            let ratio: f64 = {
                let mut relays = self.relays.lock().await;
                relays
                    .entry(relay.clone())
                    .or_default()
                    .ratio(self.opts.ratio_min)
            };
            if rand::random::<f64>() >= ratio {
                return Admission::Sampled;
            }
        }

        let to_verify: Event = event.clone();
        let ok: bool = task::spawn_blocking(move || to_verify.verify().is_ok())
            .await
            .unwrap_or(false);

        if ok {
            self.verified_ids.lock().await.put(event.id, ());
            let mut relays = self.relays.lock().await;
            relays.entry(relay.clone()).or_default().verified_ok += 1;
            return Admission::Verified;
        }

        tracing::error!(
            relay = %relay,
            event_id = %event.id,
            "forged signature received; dropping relay"
        );
        {
            let mut relays = self.relays.lock().await;
            relays.entry(relay.clone()).or_default().invalid = true;
        }
        if self.opts.auto_blacklist_invalid {
            self.filtering.mark_invalid(relay.clone()).await;
        }
        Admission::Rejected
    }
}
