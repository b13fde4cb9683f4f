// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Per-relay outcome breakdown
//!
//! Multi-relay calls never hide partial failure: the caller always gets the verdict of
//! every relay that was asked.

use std::collections::HashMap;
use std::fmt;

use nostr::RelayUrl;

/// Result of an operation fanned out to several relays
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output<T>
where
    T: fmt::Debug,
{
    /// The operation's value (e.g. the event id sent, the subscription id opened)
    pub val: T,
    /// Relays that accepted
    pub success: HashMap<RelayUrl, String>,
    /// Relays that refused or failed, with the reason
    pub failed: HashMap<RelayUrl, String>,
}

impl<T> Output<T>
where
    T: fmt::Debug,
{
    /// Wrap a value with empty outcome maps
    pub fn new(val: T) -> Self {
        Self {
            val,
            success: HashMap::new(),
            failed: HashMap::new(),
        }
    }

    /// Total relays asked
    pub fn total(&self) -> usize {
        self.success.len() + self.failed.len()
    }

    /// Whether at least one relay accepted
    pub fn any_success(&self) -> bool {
        !self.success.is_empty()
    }
}
