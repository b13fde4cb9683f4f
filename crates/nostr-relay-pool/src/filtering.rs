// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay filtering
//!
//! Tracks which relays must never be used: the caller's static blacklist, plus relays
//! marked invalid at runtime after serving a forged signature. Selection code asks
//! [`RelayFiltering::check`] and can report *why* a relay was excluded.

use std::collections::HashMap;
use std::sync::Arc;

use nostr::RelayUrl;
use tokio::sync::RwLock;

/// Why a relay is excluded from selection and ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionReason {
    /// On the caller-supplied blacklist
    Blacklisted,
    /// Served an event with a forged signature; dropped until the caller clears it
    InvalidSignatures,
}

/// Outcome of a filtering check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckFiltering {
    /// Relay may be used
    Allow,
    /// Relay is excluded
    Excluded(ExclusionReason),
}

/// Shared, clonable registry of excluded relays
#[derive(Debug, Clone, Default)]
pub struct RelayFiltering {
    excluded: Arc<RwLock<HashMap<RelayUrl, ExclusionReason>>>,
}

impl RelayFiltering {
    /// An empty filtering registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `url` on the blacklist
    pub async fn blacklist(&self, url: RelayUrl) {
        self.excluded
            .write()
            .await
            .insert(url, ExclusionReason::Blacklisted);
    }

    /// Put several URLs on the blacklist
    pub async fn blacklist_all<I>(&self, urls: I)
    where
        I: IntoIterator<Item = RelayUrl>,
    {
        let mut excluded = self.excluded.write().await;
        for url in urls {
            excluded.insert(url, ExclusionReason::Blacklisted);
        }
    }

    /// Mark `url` invalid after a failed signature verification
    pub async fn mark_invalid(&self, url: RelayUrl) {
        tracing::error!(url = %url, "relay marked invalid: served a forged signature");
        self.excluded
            .write()
            .await
            .insert(url, ExclusionReason::InvalidSignatures);
    }

    /// Remove `url` from the exclusion set, whatever put it there
    pub async fn clear(&self, url: &RelayUrl) {
        self.excluded.write().await.remove(url);
    }

    /// Remove every exclusion
    pub async fn clear_all(&self) {
        self.excluded.write().await.clear();
    }

    /// Whether (and why) `url` is excluded
    pub async fn check(&self, url: &RelayUrl) -> CheckFiltering {
        match self.excluded.read().await.get(url) {
            Some(reason) => CheckFiltering::Excluded(*reason),
            None => CheckFiltering::Allow,
        }
    }

    /// Whether `url` may be used
    pub async fn is_allowed(&self, url: &RelayUrl) -> bool {
        matches!(self.check(url).await, CheckFiltering::Allow)
    }

    /// Snapshot of every excluded relay and the reason
    pub async fn excluded(&self) -> HashMap<RelayUrl, ExclusionReason> {
        self.excluded.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blacklist_and_clear() {
        let filtering = RelayFiltering::new();
        let url = RelayUrl::parse("wss://spam.example.com").unwrap();

        assert!(filtering.is_allowed(&url).await);
        filtering.blacklist(url.clone()).await;
        assert_eq!(
            filtering.check(&url).await,
            CheckFiltering::Excluded(ExclusionReason::Blacklisted)
        );

        filtering.clear(&url).await;
        assert!(filtering.is_allowed(&url).await);
    }

    #[tokio::test]
    async fn invalid_mark_is_reported_distinctly() {
        let filtering = RelayFiltering::new();
        let url = RelayUrl::parse("wss://malicious.example.com").unwrap();

        filtering.mark_invalid(url.clone()).await;
        assert_eq!(
            filtering.check(&url).await,
            CheckFiltering::Excluded(ExclusionReason::InvalidSignatures)
        );
    }
}
