// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay pool
//!
//! A URL-keyed collection of relays sharing one database, signer, verifier and filtering
//! registry. The subscription engine and publishing pipeline (sibling modules) operate on
//! the pool; the pool itself only manages membership and lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use nostr::{ClientMessage, Event, RelayMessage, RelayUrl, SubscriptionId};
use nostr_database::NostrDatabase;
use tokio::sync::{broadcast, RwLock, Semaphore};

pub mod error;
pub mod options;
pub mod output;

pub use self::error::Error;
pub use self::options::RelayPoolOptions;
pub use self::output::Output;
use crate::engine::Engine;
use crate::filtering::RelayFiltering;
use crate::relay::{Relay, RelayOptions, RelayStatus};
use crate::shared::SharedState;
use crate::verifier::SignatureVerifier;

/// What the pool tells its observers, across all relays
#[derive(Debug, Clone)]
pub enum RelayPoolNotification {
    /// An admitted event arrived
    Event {
        /// Source relay
        relay_url: RelayUrl,
        /// Relay-local subscription ID
        subscription_id: SubscriptionId,
        /// Event
        event: Box<Event>,
    },
    /// Any parsed message from any relay
    Message {
        /// Source relay
        relay_url: RelayUrl,
        /// Relay message
        message: RelayMessage,
    },
    /// A relay's connection changed state
    RelayStatus {
        /// Relay
        relay_url: RelayUrl,
        /// New status
        status: RelayStatus,
    },
    /// The pool is shutting down; no further notifications follow
    Shutdown,
}

#[derive(Debug)]
pub(crate) struct InnerPool {
    pub(crate) relays: RwLock<HashMap<RelayUrl, Relay>>,
    pub(crate) notification_sender: broadcast::Sender<RelayPoolNotification>,
    pub(crate) state: SharedState,
    pub(crate) engine: Engine,
    pub(crate) publish_permits: Arc<Semaphore>,
}

/// Relay pool
#[derive(Debug, Clone)]
pub struct RelayPool {
    pub(crate) inner: Arc<InnerPool>,
}

impl Default for RelayPool {
    fn default() -> Self {
        Self::new(RelayPoolOptions::default())
    }
}

impl RelayPool {
    /// A pool over an in-memory database
    pub fn new(opts: RelayPoolOptions) -> Self {
        Self::with_shared_state(
            opts.clone(),
            SharedState::new(nostr_database::MemoryDatabase::new(), opts.verifier),
        )
    }

    /// A pool over a caller-supplied database
    pub fn with_database<D>(opts: RelayPoolOptions, database: D) -> Self
    where
        D: nostr_database::IntoNostrDatabase,
    {
        Self::with_shared_state(
            opts.clone(),
            SharedState::new(database, opts.verifier),
        )
    }

    /// A pool over existing shared state
    pub fn with_shared_state(opts: RelayPoolOptions, state: SharedState) -> Self {
        let (notification_sender, _) = broadcast::channel(opts.notification_channel_size);
        Self {
            inner: Arc::new(InnerPool {
                relays: RwLock::new(HashMap::new()),
                notification_sender,
                state,
                engine: Engine::new(opts.track_closed_subscriptions, opts.max_closed_history),
                publish_permits: Arc::new(Semaphore::new(opts.max_publish_concurrency)),
            }),
        }
    }

    /// The shared state (database, signer, filtering, verifier)
    pub fn state(&self) -> &SharedState {
        &self.inner.state
    }

    /// The configured database
    pub fn database(&self) -> &Arc<dyn NostrDatabase> {
        self.inner.state.database()
    }

    /// The relay filtering registry
    pub fn filtering(&self) -> &RelayFiltering {
        self.inner.state.filtering()
    }

    /// The signature verifier
    pub fn verifier(&self) -> &SignatureVerifier {
        self.inner.state.verifier()
    }

    /// Subscribe to pool-wide notifications
    pub fn notifications(&self) -> broadcast::Receiver<RelayPoolNotification> {
        self.inner.notification_sender.subscribe()
    }

    /// Add a relay (without connecting it)
    ///
    /// Returns `false` if the normalized URL was already present.
    pub async fn add_relay<U>(&self, url: U, opts: RelayOptions) -> Result<bool, Error>
    where
        U: AsRef<str>,
    {
        let url: RelayUrl = RelayUrl::parse(url.as_ref())?;
        let mut relays = self.inner.relays.write().await;
        if relays.contains_key(&url) {
            return Ok(false);
        }
        let relay = Relay::with_shared_state(
            url.clone(),
            opts,
            self.inner.state.clone(),
        );
        relay
            .set_pool_sender(self.inner.notification_sender.clone())
            .await;
        relays.insert(url, relay);
        Ok(true)
    }

    /// Disconnect and drop a relay
    pub async fn remove_relay<U>(&self, url: U) -> Result<(), Error>
    where
        U: AsRef<str>,
    {
        let url: RelayUrl = RelayUrl::parse(url.as_ref())?;
        let relay: Relay = {
            let mut relays = self.inner.relays.write().await;
            relays.remove(&url).ok_or(Error::RelayNotFound)?
        };
        relay.disconnect().await;
        Ok(())
    }

    /// Get a relay handle by URL
    pub async fn relay<U>(&self, url: U) -> Result<Relay, Error>
    where
        U: AsRef<str>,
    {
        let url: RelayUrl = RelayUrl::parse(url.as_ref())?;
        self.inner
            .relays
            .read()
            .await
            .get(&url)
            .cloned()
            .ok_or(Error::RelayNotFound)
    }

    /// All relays, keyed by URL
    pub async fn relays(&self) -> HashMap<RelayUrl, Relay> {
        self.inner.relays.read().await.clone()
    }

    /// URLs of all relays
    pub async fn relay_urls(&self) -> Vec<RelayUrl> {
        self.inner.relays.read().await.keys().cloned().collect()
    }

    /// Relays whose socket is currently open
    pub async fn connected_relays(&self) -> Vec<Relay> {
        self.inner
            .relays
            .read()
            .await
            .values()
            .filter(|relay| relay.is_connected())
            .cloned()
            .collect()
    }

    /// Start connecting every relay; returns immediately
    pub async fn connect(&self) {
        let relays = self.inner.relays.read().await;
        for relay in relays.values() {
            relay.connect();
        }
    }

    /// Connect one relay
    pub async fn connect_relay<U>(&self, url: U) -> Result<(), Error>
    where
        U: AsRef<str>,
    {
        let relay: Relay = self.relay(url).await?;
        relay.connect();
        Ok(())
    }

    /// Disconnect every relay (subscriptions stay registered for a later reconnect)
    pub async fn disconnect(&self) {
        let relays = self.inner.relays.read().await;
        for relay in relays.values() {
            relay.disconnect().await;
        }
    }

    /// Send a message to every relay in the pool
    pub async fn broadcast_msg(&self, msg: ClientMessage) -> Output<()> {
        let mut output: Output<()> = Output::new(());
        let relays = self.inner.relays.read().await;
        for (url, relay) in relays.iter() {
            match relay.send_msg(msg.clone()) {
                Ok(()) => {
                    output.success.insert(url.clone(), String::new());
                }
                Err(e) => {
                    output.failed.insert(url.clone(), e.to_string());
                }
            }
        }
        output
    }

    /// Disconnect everything and notify observers that the pool is done
    pub async fn shutdown(&self) {
        self.disconnect().await;
        let _ = self
            .inner
            .notification_sender
            .send(RelayPoolNotification::Shutdown);
    }
}
