// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay
//!
//! One WebSocket connection to one relay: lifecycle, reconnection with backoff, NIP-42
//! authentication, the per-relay subscription registry, and per-relay send/receive.

use std::cmp;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use nostr::{ClientMessage, Event, Filter, RelayMessage, RelayUrl, SubscriptionId};
use tokio::sync::broadcast;

mod constants;
pub mod error;
mod inner;
pub mod options;
pub mod stats;
pub mod status;

pub use self::error::Error;
use self::inner::InnerRelay;
pub use self::options::{RelayOptions, RelaySubscribeOptions};
pub use self::stats::RelayConnectionStats;
pub use self::status::RelayStatus;
use crate::pool::RelayPoolNotification;
use crate::shared::SharedState;

/// What one relay tells its observers
#[derive(Debug, Clone)]
pub enum RelayNotification {
    /// An admitted event arrived on a subscription
    Event {
        /// Subscription ID
        subscription_id: SubscriptionId,
        /// Event
        event: Box<Event>,
    },
    /// Any parsed relay message, including `OK`, `EOSE`, `CLOSED`, `NOTICE`
    Message {
        /// Relay message
        message: RelayMessage,
    },
    /// The connection changed state
    RelayStatus {
        /// New status
        status: RelayStatus,
    },
    /// The relay issued a NIP-42 challenge
    AuthChallenge {
        /// Challenge string
        challenge: String,
    },
}

/// Handle to one relay connection
///
/// Clones share the same connection; the connection outlives any particular clone and is
/// owned by the pool.
#[derive(Debug, Clone)]
pub struct Relay {
    pub(crate) inner: Arc<InnerRelay>,
}

impl PartialEq for Relay {
    fn eq(&self, other: &Self) -> bool {
        self.url() == other.url()
    }
}

impl Eq for Relay {}

impl PartialOrd for Relay {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Relay {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.url().cmp(other.url())
    }
}

impl Relay {
    /// A standalone relay with its own default shared state
    ///
    /// Mostly useful in tests; a pool constructs relays through [`Relay::with_shared_state`]
    /// so they share its database, signer, filtering and verifier.
    pub fn new(url: RelayUrl, opts: RelayOptions) -> Self {
        Self::with_shared_state(url, opts, SharedState::default())
    }

    /// A relay wired into an existing shared state
    pub fn with_shared_state(url: RelayUrl, opts: RelayOptions, state: SharedState) -> Self {
        Self {
            inner: Arc::new(InnerRelay::new(url, opts, state)),
        }
    }

    /// The relay's normalized URL
    pub fn url(&self) -> &RelayUrl {
        &self.inner.url
    }

    /// Current connection status
    pub fn status(&self) -> RelayStatus {
        self.inner.status()
    }

    /// Whether frames can currently be written
    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Connection statistics
    pub fn stats(&self) -> &RelayConnectionStats {
        &self.inner.stats
    }

    /// Subscribe to this relay's notifications
    pub fn notifications(&self) -> broadcast::Receiver<RelayNotification> {
        self.inner.notifications()
    }

    pub(crate) async fn set_pool_sender(&self, sender: broadcast::Sender<RelayPoolNotification>) {
        self.inner.set_pool_sender(sender).await;
    }

    /// Start connecting; returns immediately
    ///
    /// The connection is supervised: a lost socket reconnects with exponential backoff
    /// and jitter until [`Relay::disconnect`] is called (if the options allow reconnects).
    pub fn connect(&self) {
        self.inner.connect();
    }

    /// Stop the connection and any reconnection attempts
    pub async fn disconnect(&self) {
        self.inner.disconnect().await;
    }

    /// Queue a message for the serial writer
    pub fn send_msg(&self, msg: ClientMessage) -> Result<(), Error> {
        self.inner.send_msg(msg)
    }

    /// Send an event and wait for the relay's `OK` verdict
    pub async fn send_event(
        &self,
        event: &Event,
        timeout: Option<Duration>,
    ) -> Result<(bool, String), Error> {
        self.inner.send_event_waiting_ok(event, timeout).await
    }

    /// Register a subscription under `id` and send its REQ
    ///
    /// Registration completes before the REQ is enqueued, so inbound events never
    /// reference an unknown id.
    pub async fn subscribe_with_id(
        &self,
        id: SubscriptionId,
        filters: Vec<Filter>,
        opts: RelaySubscribeOptions,
    ) -> Result<(), Error> {
        self.inner.subscribe_with_id(id, filters, opts).await
    }

    /// Register a subscription under a fresh random id and send its REQ
    pub async fn subscribe(
        &self,
        filters: Vec<Filter>,
        opts: RelaySubscribeOptions,
    ) -> Result<SubscriptionId, Error> {
        let id = SubscriptionId::generate();
        self.subscribe_with_id(id.clone(), filters, opts).await?;
        Ok(id)
    }

    /// Close a subscription
    pub async fn unsubscribe(&self, id: &SubscriptionId) -> Result<(), Error> {
        self.inner.unsubscribe(id).await
    }

    /// Close every subscription on this relay
    pub async fn unsubscribe_all(&self) -> Result<(), Error> {
        self.inner.unsubscribe_all().await
    }

    /// Live subscriptions and their filters
    pub async fn subscriptions(&self) -> HashMap<SubscriptionId, Vec<Filter>> {
        self.inner.subscriptions().await
    }

    /// The filters of one subscription, if registered
    pub async fn subscription(&self, id: &SubscriptionId) -> Option<Vec<Filter>> {
        self.inner.subscription(id).await.map(|sub| sub.filters)
    }

    /// Answer the relay's pending NIP-42 challenge with a signed AUTH event
    pub async fn authenticate(&self) -> Result<(), Error> {
        self.inner.authenticate().await
    }
}
