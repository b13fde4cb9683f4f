// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay Ranker
//!
//! Scores a candidate relay set for a given set of target pubkeys by a weighted sum of
//! coverage, health, connection state and latency.

use std::collections::{HashMap, HashSet};

use nostr::{PublicKey, RelayUrl};

use crate::outbox::RelayPreferences;

/// Per-factor weights for [`RelayRanker::rank`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankerWeights {
    /// Weight for "already connected"
    pub connection: f64,
    /// Weight for the health score (success/failure history)
    pub health: f64,
    /// Weight for coverage of the target pubkey set
    pub coverage: f64,
    /// Weight for inverse latency
    pub latency: f64,
}

impl Default for RankerWeights {
    fn default() -> Self {
        Self {
            connection: 0.3,
            health: 0.3,
            coverage: 0.5,
            latency: 0.2,
        }
    }
}

/// How long before health history fades to neutral
const RECENCY_HORIZON_SECS: f64 = 7.0 * 24.0 * 3600.0;

/// Observed health for a single relay, as tracked by the cache adapter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayHealthInput {
    /// Successful round-trips
    pub success_count: u64,
    /// Failed round-trips
    pub failure_count: u64,
    /// Rolling average response time, if any samples exist
    pub average_response_ms: Option<u64>,
    /// Age of the newest observation; `None` when the relay was never seen
    pub seconds_since_last_seen: Option<u64>,
}

impl RelayHealthInput {
    fn score(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            // no history: assume average trustworthiness rather than penalizing
            return 0.5;
        }
        let raw = self.success_count as f64 / total as f64;
        // week-old history fades back toward neutral
        match self.seconds_since_last_seen {
            Some(age) => {
                let staleness = (age as f64 / RECENCY_HORIZON_SECS).min(1.0);
                raw * (1.0 - staleness) + 0.5 * staleness
            }
            None => raw,
        }
    }
}

/// Scores and orders candidate relays
#[derive(Debug, Clone)]
pub struct RelayRanker {
    weights: RankerWeights,
    max_acceptable_latency_ms: u64,
}

impl RelayRanker {
    /// A ranker using the default weights (connection 0.3, health 0.3, coverage 0.5,
    /// latency 0.2) and a max acceptable latency of 1000 ms
    pub fn new() -> Self {
        Self {
            weights: RankerWeights::default(),
            max_acceptable_latency_ms: 1_000,
        }
    }

    /// A ranker with explicit weights and max-acceptable-latency
    pub fn with_weights(weights: RankerWeights, max_acceptable_latency_ms: u64) -> Self {
        Self {
            weights,
            max_acceptable_latency_ms,
        }
    }

    fn coverage(&self, relay: &RelayUrl, target_pubkeys: &[PublicKey], preferences: &HashMap<PublicKey, RelayPreferences>) -> f64 {
        if target_pubkeys.is_empty() {
            return 0.0;
        }
        let covered = target_pubkeys
            .iter()
            .filter(|&pk| {
                preferences
                    .get(pk)
                    .map(|prefs| prefs.write.contains(relay) || prefs.read.contains(relay))
                    .unwrap_or(false)
            })
            .count();
        covered as f64 / target_pubkeys.len() as f64
    }

    fn latency_score(&self, health: Option<&RelayHealthInput>) -> f64 {
        match health.and_then(|h| h.average_response_ms) {
            Some(ms) => (1.0 - (ms as f64 / self.max_acceptable_latency_ms as f64)).max(0.0),
            None => 0.5,
        }
    }

    /// Score every candidate relay and return a stable ordering, highest score first
    pub fn rank(
        &self,
        candidates: &HashSet<RelayUrl>,
        target_pubkeys: &[PublicKey],
        preferences: &HashMap<PublicKey, RelayPreferences>,
        connected: &HashSet<RelayUrl>,
        health: &HashMap<RelayUrl, RelayHealthInput>,
    ) -> Vec<(RelayUrl, f64)> {
        let mut scored: Vec<(RelayUrl, f64)> = candidates
            .iter()
            .map(|relay| {
                let connection = if connected.contains(relay) { 1.0 } else { 0.0 };
                let health_score = health.get(relay).map(RelayHealthInput::score).unwrap_or(0.5);
                let coverage = self.coverage(relay, target_pubkeys, preferences);
                let latency = self.latency_score(health.get(relay));

                let score = self.weights.connection * connection
                    + self.weights.health * health_score
                    + self.weights.coverage * coverage
                    + self.weights.latency * latency;

                (relay.clone(), score)
            })
            .collect();

        // sort by score desc, then by URL for a stable, reproducible order between ties
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.to_string().cmp(&b.0.to_string()))
        });
        scored
    }
}

impl Default for RelayRanker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::PreferenceSource;
    use nostr::{Keys, Timestamp};

    fn prefs(write: &[&str]) -> RelayPreferences {
        RelayPreferences {
            read: HashSet::new(),
            write: write.iter().map(|u| RelayUrl::parse(u).unwrap()).collect(),
            source: PreferenceSource::Nip65,
            fetched_at: Timestamp::now(),
        }
    }

    #[test]
    fn stale_history_fades_to_neutral() {
        let fresh = RelayHealthInput {
            success_count: 9,
            failure_count: 1,
            average_response_ms: None,
            seconds_since_last_seen: Some(0),
        };
        let stale = RelayHealthInput {
            seconds_since_last_seen: Some(30 * 24 * 3600),
            ..fresh
        };
        assert!((fresh.score() - 0.9).abs() < 1e-9);
        assert!((stale.score() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn ranks_connected_and_covering_relay_highest() {
        let pk = Keys::generate().public_key();
        let r1 = RelayUrl::parse("wss://one.example.com").unwrap();
        let r2 = RelayUrl::parse("wss://two.example.com").unwrap();

        let mut candidates = HashSet::new();
        candidates.insert(r1.clone());
        candidates.insert(r2.clone());

        let mut preferences = HashMap::new();
        preferences.insert(pk.clone(), prefs(&["wss://one.example.com"]));

        let mut connected = HashSet::new();
        connected.insert(r1.clone());

        let ranker = RelayRanker::new();
        let ranked = ranker.rank(&candidates, &[pk], &preferences, &connected, &HashMap::new());

        assert_eq!(ranked[0].0, r1);
        assert!(ranked[0].1 > ranked[1].1);
    }
}
