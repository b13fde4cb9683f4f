// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay pool options

use crate::verifier::VerifierOptions;

/// Pool-wide tunables
#[derive(Debug, Clone)]
pub struct RelayPoolOptions {
    /// Capacity of the pool notification broadcast channel (default: 4096)
    pub notification_channel_size: usize,
    /// Max publish fan-out tasks running at once across the whole pool (default: 16)
    pub max_publish_concurrency: usize,
    /// Signature verification sampling policy
    pub verifier: VerifierOptions,
    /// Keep a record of terminated subscriptions (default: false)
    pub track_closed_subscriptions: bool,
    /// How many terminated subscriptions to remember (default: 128)
    pub max_closed_history: usize,
}

impl Default for RelayPoolOptions {
    fn default() -> Self {
        Self {
            notification_channel_size: 4096,
            max_publish_concurrency: 16,
            verifier: VerifierOptions::default(),
            track_closed_subscriptions: false,
            max_closed_history: 128,
        }
    }
}

impl RelayPoolOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the notification channel capacity
    pub fn notification_channel_size(mut self, size: usize) -> Self {
        self.notification_channel_size = size;
        self
    }

    /// Set the publish concurrency cap
    pub fn max_publish_concurrency(mut self, max: usize) -> Self {
        self.max_publish_concurrency = max;
        self
    }

    /// Set the verifier policy
    pub fn verifier(mut self, verifier: VerifierOptions) -> Self {
        self.verifier = verifier;
        self
    }

    /// Remember terminated subscriptions, keeping at most `max_history` of them
    pub fn track_closed(mut self, track: bool, max_history: usize) -> Self {
        self.track_closed_subscriptions = track;
        self.max_closed_history = max_history;
        self
    }
}
