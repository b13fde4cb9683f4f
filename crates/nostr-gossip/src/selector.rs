// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay Selector
//!
//! Computes the target relay set for a publish or fetch call, and a minimal per-relay
//! pubkey coverage map for multi-author fetches.

use std::collections::{HashMap, HashSet};

use nostr::event::tag::kind as tag_kind;
use nostr::{Event, PublicKey, RelayUrl};

use crate::outbox::RelayPreferences;
use crate::ranker::{RelayHealthInput, RelayRanker};

/// Relay count bounds and fetch-direction tie-breaks for a selection call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionOptions {
    /// If the union of preferred relays is smaller than this, top up with pool defaults
    pub min_relay_count: usize,
    /// Truncate the ranked set to at most this many relays
    pub max_relay_count: usize,
    /// When fetching and an author has no read relays, fall back to their write relays
    pub prefer_write_if_no_read: bool,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            min_relay_count: 2,
            max_relay_count: 4,
            prefer_write_if_no_read: true,
        }
    }
}

/// Result of [`RelaySelector::select_for_publish`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishSelection {
    /// The relays the event should be sent to
    pub relays: HashSet<RelayUrl>,
    /// `p`-tagged pubkeys for which no relay-preference record was available
    pub missing_relay_info_pubkeys: HashSet<PublicKey>,
}

/// Result of [`RelaySelector::select_for_fetch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSelection {
    /// The relays a filter should be sent to
    pub relays: HashSet<RelayUrl>,
    /// Filter-authors for which no relay-preference record was available
    pub missing_relay_info_pubkeys: HashSet<PublicKey>,
}

/// Computes target relay sets from relay preferences and a ranker
pub struct RelaySelector<'a> {
    ranker: &'a RelayRanker,
    pool_defaults: Vec<RelayUrl>,
    blacklist: HashSet<RelayUrl>,
}

impl<'a> RelaySelector<'a> {
    /// A selector with no pool defaults and an empty blacklist
    pub fn new(ranker: &'a RelayRanker) -> Self {
        Self {
            ranker,
            pool_defaults: Vec::new(),
            blacklist: HashSet::new(),
        }
    }

    /// Set the fallback relays used to top up a selection that's smaller than
    /// `min_relay_count`
    pub fn with_pool_defaults(mut self, defaults: impl IntoIterator<Item = RelayUrl>) -> Self {
        self.pool_defaults = defaults.into_iter().collect();
        self
    }

    /// Relays that are never selected, even as a top-up fallback
    pub fn with_blacklist(mut self, blacklist: impl IntoIterator<Item = RelayUrl>) -> Self {
        self.blacklist = blacklist.into_iter().collect();
        self
    }

    fn top_up_rank_truncate(
        &self,
        mut candidates: HashSet<RelayUrl>,
        target_pubkeys: &[PublicKey],
        preferences: &HashMap<PublicKey, RelayPreferences>,
        connected: &HashSet<RelayUrl>,
        health: &HashMap<RelayUrl, RelayHealthInput>,
        options: &SelectionOptions,
    ) -> HashSet<RelayUrl> {
        candidates.retain(|relay| !self.blacklist.contains(relay));

        if candidates.len() < options.min_relay_count {
            for fallback in &self.pool_defaults {
                if self.blacklist.contains(fallback) {
                    continue;
                }
                candidates.insert(fallback.clone());
                if candidates.len() >= options.min_relay_count {
                    break;
                }
            }
        }

        let ranked = self
            .ranker
            .rank(&candidates, target_pubkeys, preferences, connected, health);
        ranked
            .into_iter()
            .take(options.max_relay_count)
            .map(|(relay, _)| relay)
            .collect()
    }

    /// Recommended-relay hints carried on `e`/`p` tags (the optional third/second element)
    fn tag_relay_hints(event: &Event) -> HashSet<RelayUrl> {
        event
            .tags
            .iter()
            .filter(|t| t.kind() == tag_kind::EVENT || t.kind() == tag_kind::PUBLIC_KEY)
            .filter_map(|t| t.values().get(1))
            .filter_map(|hint| RelayUrl::parse(hint).ok())
            .collect()
    }

    /// `p`-tagged pubkeys on an event
    fn tagged_pubkeys(event: &Event) -> Vec<PublicKey> {
        nostr::event::tag::public_keys(&event.tags).collect()
    }

    /// Compute the write-direction relay set for publishing `event`
    ///
    /// Union of the author's write-relays, the write-relays of every `p`-tagged pubkey,
    /// and any `e`/`p`-tag relay hints. For relay-list-metadata events (kind 10002) the
    /// author's read-relays are added too, so the update can be discovered.
    pub fn select_for_publish(
        &self,
        event: &Event,
        author_preferences: Option<&RelayPreferences>,
        tagged_preferences: &HashMap<PublicKey, RelayPreferences>,
        connected: &HashSet<RelayUrl>,
        health: &HashMap<RelayUrl, RelayHealthInput>,
        options: &SelectionOptions,
    ) -> PublishSelection {
        let mut candidates = HashSet::new();
        let mut missing = HashSet::new();

        if let Some(prefs) = author_preferences {
            candidates.extend(prefs.write.iter().cloned());
            if event.kind == nostr::Kind::new(nostr::event::kind::RELAY_LIST) {
                candidates.extend(prefs.read.iter().cloned());
            }
        }

        for pubkey in Self::tagged_pubkeys(event) {
            match tagged_preferences.get(&pubkey) {
                Some(prefs) if !prefs.write.is_empty() => candidates.extend(prefs.write.iter().cloned()),
                _ => {
                    missing.insert(pubkey);
                }
            }
        }

        candidates.extend(Self::tag_relay_hints(event));

        let target_pubkeys: Vec<PublicKey> = tagged_preferences.keys().cloned().collect();
        let relays = self.top_up_rank_truncate(
            candidates,
            &target_pubkeys,
            tagged_preferences,
            connected,
            health,
            options,
        );

        PublishSelection {
            relays,
            missing_relay_info_pubkeys: missing,
        }
    }

    /// Compute the read-direction relay set for fetching with `filter_author_preferences`
    pub fn select_for_fetch(
        &self,
        active_user_preferences: Option<&RelayPreferences>,
        filter_author_preferences: &HashMap<PublicKey, RelayPreferences>,
        tag_hint_relays: &HashSet<RelayUrl>,
        connected: &HashSet<RelayUrl>,
        health: &HashMap<RelayUrl, RelayHealthInput>,
        options: &SelectionOptions,
    ) -> FetchSelection {
        let mut candidates = HashSet::new();
        let mut missing = HashSet::new();

        if let Some(prefs) = active_user_preferences {
            candidates.extend(prefs.read.iter().cloned());
        }

        for (pubkey, prefs) in filter_author_preferences {
            if !prefs.read.is_empty() {
                candidates.extend(prefs.read.iter().cloned());
            } else if options.prefer_write_if_no_read && !prefs.write.is_empty() {
                candidates.extend(prefs.write.iter().cloned());
            } else {
                missing.insert(pubkey.clone());
            }
        }

        candidates.extend(tag_hint_relays.iter().cloned());

        let target_pubkeys: Vec<PublicKey> = filter_author_preferences.keys().cloned().collect();
        let relays = self.top_up_rank_truncate(
            candidates,
            &target_pubkeys,
            filter_author_preferences,
            connected,
            health,
            options,
        );

        FetchSelection {
            relays,
            missing_relay_info_pubkeys: missing,
        }
    }

    /// Greedily assign each pubkey to at least `coverage_k` relays, preferring already
    /// connected relays and then relays that cover the most remaining under-covered
    /// pubkeys. Lets the engine issue per-relay filters scoped to the authors it hosts.
    pub fn minimal_set(
        &self,
        pubkeys: &[PublicKey],
        coverage_k: usize,
        preferences: &HashMap<PublicKey, RelayPreferences>,
        connected: &HashSet<RelayUrl>,
    ) -> HashMap<RelayUrl, Vec<PublicKey>> {
        let mut remaining: HashMap<PublicKey, usize> =
            pubkeys.iter().map(|pk| (pk.clone(), coverage_k)).collect();
        let mut result: HashMap<RelayUrl, Vec<PublicKey>> = HashMap::new();

        // relay -> pubkeys it can serve, derived from preferences
        let mut relay_candidates: HashMap<RelayUrl, Vec<PublicKey>> = HashMap::new();
        for pubkey in pubkeys {
            if let Some(prefs) = preferences.get(pubkey) {
                for relay in prefs.write.iter().chain(prefs.read.iter()) {
                    relay_candidates.entry(relay.clone()).or_default().push(pubkey.clone());
                }
            }
        }

        while remaining.values().any(|&need| need > 0) {
            let best = relay_candidates
                .iter()
                .map(|(relay, served)| {
                    let useful = served
                        .iter()
                        .filter(|&pk| remaining.get(pk).copied().unwrap_or(0) > 0)
                        .count();
                    let connection_bonus = if connected.contains(relay) { 1 } else { 0 };
                    (relay.clone(), useful, connection_bonus)
                })
                .filter(|(_, useful, _)| *useful > 0)
                .max_by_key(|(_, useful, bonus)| (*useful, *bonus));

            let Some((relay, _, _)) = best else {
                break;
            };

            let served = relay_candidates.remove(&relay).unwrap_or_default();
            let mut covered_here = Vec::new();
            for pubkey in &served {
                if let Some(need) = remaining.get_mut(pubkey) {
                    if *need > 0 {
                        *need -= 1;
                        covered_here.push(pubkey.clone());
                    }
                }
            }
            result.entry(relay).or_default().extend(covered_here);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::PreferenceSource;
    use nostr::{EventBuilder, Keys, Kind, Tag, Timestamp};

    fn prefs(write: &[&str]) -> RelayPreferences {
        RelayPreferences {
            read: HashSet::new(),
            write: write.iter().map(|u| RelayUrl::parse(u).unwrap()).collect(),
            source: PreferenceSource::Nip65,
            fetched_at: Timestamp::now(),
        }
    }

    #[test]
    fn publish_selection_reports_missing_pubkeys() {
        // S5: event has p-tags [P1, P2]; only P1 has a relay-preference record.
        let author = Keys::generate();
        let p1 = Keys::generate().public_key();
        let p2 = Keys::generate().public_key();

        let event = EventBuilder::new(
            Kind::new(1),
            "hi",
            [Tag::public_key(p1.clone()), Tag::public_key(p2.clone())],
        )
        .sign_with_keys(&author)
        .unwrap();

        let author_prefs = prefs(&["wss://r2.example.com"]);
        let mut tagged = HashMap::new();
        tagged.insert(p1.clone(), prefs(&["wss://r1.example.com"]));

        let ranker = RelayRanker::new();
        let selector = RelaySelector::new(&ranker)
            .with_pool_defaults([RelayUrl::parse("wss://fallback.example.com").unwrap()]);

        let options = SelectionOptions {
            min_relay_count: 2,
            max_relay_count: 4,
            prefer_write_if_no_read: true,
        };

        let selection = selector.select_for_publish(
            &event,
            Some(&author_prefs),
            &tagged,
            &HashSet::new(),
            &HashMap::new(),
            &options,
        );

        assert!(selection.relays.contains(&RelayUrl::parse("wss://r1.example.com").unwrap()));
        assert!(selection.relays.contains(&RelayUrl::parse("wss://r2.example.com").unwrap()));
        assert_eq!(selection.missing_relay_info_pubkeys, HashSet::from([p2]));
    }

    #[test]
    fn minimal_set_covers_each_pubkey_at_least_k_times() {
        let p1 = Keys::generate().public_key();
        let p2 = Keys::generate().public_key();
        let r1 = RelayUrl::parse("wss://r1.example.com").unwrap();
        let r2 = RelayUrl::parse("wss://r2.example.com").unwrap();

        let mut preferences = HashMap::new();
        preferences.insert(p1.clone(), prefs(&["wss://r1.example.com", "wss://r2.example.com"]));
        preferences.insert(p2.clone(), prefs(&["wss://r2.example.com"]));

        let ranker = RelayRanker::new();
        let selector = RelaySelector::new(&ranker);
        let map = selector.minimal_set(&[p1.clone(), p2.clone()], 1, &preferences, &HashSet::new());

        let covered: HashSet<PublicKey> = map.values().flatten().cloned().collect();
        assert!(covered.contains(&p1));
        assert!(covered.contains(&p2));
        assert!(map.contains_key(&r2));
        let _ = r1;
    }
}
