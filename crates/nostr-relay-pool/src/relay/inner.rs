// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay connection internals
//!
//! One task per relay owns the socket. Outbound frames are funnelled through a bounded
//! queue drained by that task, so wire order always matches enqueue order. Inbound frames
//! are parsed, screened by the signature verifier, written through to the database, and
//! broadcast to whoever is listening.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use nostr::message::relay::MachineReadablePrefix;
use nostr::{
    ClientMessage, Event, EventBuilder, EventId, Filter, JsonUtil, RelayMessage, RelayUrl,
    SubscriptionId, UnsignedEvent,
};
use nostr_database::RelayInteraction;
use rand::Rng;
use tokio::sync::{broadcast, mpsc, Mutex, Notify, RwLock};

use super::constants::{
    DEFAULT_SEND_TIMEOUT, NOTIFICATION_CHANNEL_CAPACITY, WRITE_QUEUE_CAPACITY,
};
use super::options::{RelayOptions, RelaySubscribeOptions};
use super::stats::RelayConnectionStats;
use super::status::{AtomicRelayStatus, RelayStatus};
use super::{Error, RelayNotification};
use crate::pool::RelayPoolNotification;
use crate::shared::SharedState;
use crate::transport::{BoxSink, BoxStream, WsMessage};
use crate::verifier::Admission;

/// A frame queued for the writer side of the connection task
#[derive(Debug)]
enum OutboundFrame {
    Message(ClientMessage),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
}

/// One subscription as this relay sees it
#[derive(Debug, Clone)]
pub(crate) struct RelaySubscription {
    pub(crate) filters: Vec<Filter>,
    pub(crate) opts: RelaySubscribeOptions,
    /// EOSE arrived for the current REQ
    pub(crate) eose: bool,
    /// CLOSE was sent, or CLOSED received; never replayed
    pub(crate) closed: bool,
}

#[derive(Debug)]
pub(crate) struct InnerRelay {
    pub(crate) url: RelayUrl,
    pub(crate) opts: RelayOptions,
    pub(crate) stats: RelayConnectionStats,
    pub(crate) state: SharedState,
    status: AtomicRelayStatus,
    subscriptions: RwLock<HashMap<SubscriptionId, RelaySubscription>>,
    notification_sender: broadcast::Sender<RelayNotification>,
    pool_sender: RwLock<Option<broadcast::Sender<RelayPoolNotification>>>,
    write_tx: mpsc::Sender<OutboundFrame>,
    write_rx: Mutex<mpsc::Receiver<OutboundFrame>>,
    auth_challenge: RwLock<Option<String>>,
    /// Guards against spawning two connection tasks
    running: AtomicBool,
    terminate: Notify,
}

impl InnerRelay {
    pub(crate) fn new(url: RelayUrl, opts: RelayOptions, state: SharedState) -> Self {
        let (notification_sender, _) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);
        let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        Self {
            url,
            opts,
            stats: RelayConnectionStats::new(),
            state,
            status: AtomicRelayStatus::default(),
            subscriptions: RwLock::new(HashMap::new()),
            notification_sender,
            pool_sender: RwLock::new(None),
            write_tx,
            write_rx: Mutex::new(write_rx),
            auth_challenge: RwLock::new(None),
            running: AtomicBool::new(false),
            terminate: Notify::new(),
        }
    }

    pub(crate) fn status(&self) -> RelayStatus {
        self.status.load()
    }

    pub(crate) fn notifications(&self) -> broadcast::Receiver<RelayNotification> {
        self.notification_sender.subscribe()
    }

    pub(crate) async fn set_pool_sender(&self, sender: broadcast::Sender<RelayPoolNotification>) {
        let mut pool_sender = self.pool_sender.write().await;
        *pool_sender = Some(sender);
    }

    async fn set_status(&self, status: RelayStatus) {
        self.status.set(status);
        tracing::debug!(relay = %self.url, status = %status, "relay status changed");
        let _ = self
            .notification_sender
            .send(RelayNotification::RelayStatus { status });
        if let Some(pool) = self.pool_sender.read().await.as_ref() {
            let _ = pool.send(RelayPoolNotification::RelayStatus {
                relay_url: self.url.clone(),
                status,
            });
        }
    }

    pub(crate) async fn subscriptions(&self) -> HashMap<SubscriptionId, Vec<Filter>> {
        self.subscriptions
            .read()
            .await
            .iter()
            .filter(|(_, sub)| !sub.closed)
            .map(|(id, sub)| (id.clone(), sub.filters.clone()))
            .collect()
    }

    pub(crate) async fn subscription(&self, id: &SubscriptionId) -> Option<RelaySubscription> {
        self.subscriptions.read().await.get(id).cloned()
    }

    // ---------------------------------------------------------------- connect

    /// Spawn the connection supervisor, if not already running
    pub(crate) fn connect(self: &Arc<Self>) {
        if self.status().is_terminal() {
            self.status.set(RelayStatus::Initialized);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            // a supervisor is alive; wake it in case it is parked in a backoff sleep
            self.terminate.notify_waiters();
            return;
        }

        let relay: Arc<Self> = Arc::clone(self);
        tokio::spawn(async move {
            relay.connection_loop().await;
            relay.running.store(false, Ordering::SeqCst);
        });
    }

    /// Stop the connection and prevent reconnects until `connect` is called again
    pub(crate) async fn disconnect(&self) {
        self.set_status(RelayStatus::Terminated).await;
        self.terminate.notify_waiters();
    }

    async fn connection_loop(&self) {
        let mut attempt: u32 = 0;
        loop {
            if self.status().is_terminal() {
                break;
            }

            self.set_status(RelayStatus::Connecting).await;
            self.stats.new_attempt();

            match self
                .opts
                .transport
                .connect(&self.url, self.opts.connection_timeout)
                .await
            {
                Ok((sink, stream)) => {
                    attempt = 0;
                    self.stats.new_success();
                    let _ = self
                        .state
                        .database
                        .record_relay_health(&self.url, RelayInteraction::Success, None)
                        .await;
                    self.set_status(RelayStatus::Connected).await;
                    self.replay_subscriptions().await;
                    self.connection_session(sink, stream).await;
                }
                Err(e) => {
                    tracing::warn!(relay = %self.url, "connection failed: {e}");
                    let _ = self
                        .state
                        .database
                        .record_relay_health(&self.url, RelayInteraction::Failure, None)
                        .await;
                }
            }

            if self.status().is_terminal() || !self.opts.reconnect {
                if !self.status().is_terminal() {
                    self.set_status(RelayStatus::Terminated).await;
                }
                break;
            }

            self.set_status(RelayStatus::Disconnected).await;
            attempt = attempt.saturating_add(1);
            let delay: Duration = self.reconnect_delay(attempt);
            tracing::debug!(relay = %self.url, ?delay, attempt, "reconnecting after backoff");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.terminate.notified() => {}
            }
        }
    }

    /// Exponential backoff with ±20% jitter, capped
    fn reconnect_delay(&self, attempt: u32) -> Duration {
        let base: f64 = self.opts.reconnect_base_delay.as_secs_f64();
        let max: f64 = self.opts.reconnect_max_delay.as_secs_f64();
        let exp: f64 = base * 2f64.powi(attempt.saturating_sub(1).min(16) as i32);
        let capped: f64 = exp.min(max);
        let jitter: f64 = rand::thread_rng().gen_range(-super::constants::RECONNECT_JITTER..=super::constants::RECONNECT_JITTER);
        Duration::from_secs_f64((capped * (1.0 + jitter)).max(0.0))
    }

    /// Drive one open socket until it dies or the relay is stopped
    ///
    /// This task is the only writer, so enqueue order is wire order.
    async fn connection_session(&self, mut sink: BoxSink, mut stream: BoxStream) {
        let mut write_rx = self.write_rx.lock().await;
        let mut ping_interval = tokio::time::interval(self.opts.ping_interval);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ping_interval.tick().await; // first tick fires immediately; skip it
        let mut outstanding_pings: u8 = 0;

        loop {
            tokio::select! {
                frame = write_rx.recv() => match frame {
                    Some(frame) => {
                        let msg: WsMessage = match frame {
                            OutboundFrame::Message(msg) => {
                                let json: String = msg.as_json();
                                tracing::trace!(relay = %self.url, "sending: {json}");
                                self.stats.add_bytes_sent(json.len());
                                WsMessage::Text(json)
                            }
                            OutboundFrame::Ping(data) => WsMessage::Ping(data),
                            OutboundFrame::Pong(data) => WsMessage::Pong(data),
                        };
                        if let Err(e) = sink.send(msg).await {
                            tracing::warn!(relay = %self.url, "write failed: {e}");
                            break;
                        }
                    }
                    None => break,
                },
                item = stream.next() => match item {
                    Some(Ok(WsMessage::Text(json))) => {
                        self.stats.add_bytes_received(json.len());
                        self.handle_frame(&json).await;
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = self.write_tx.try_send(OutboundFrame::Pong(data));
                    }
                    Some(Ok(WsMessage::Pong(_))) => {
                        outstanding_pings = 0;
                    }
                    Some(Ok(WsMessage::Binary(_))) => {
                        tracing::debug!(relay = %self.url, "ignoring binary frame");
                    }
                    Some(Ok(WsMessage::Close)) | None => {
                        tracing::debug!(relay = %self.url, "socket closed");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(relay = %self.url, "read failed: {e}");
                        break;
                    }
                },
                _ = ping_interval.tick() => {
                    if outstanding_pings >= 2 {
                        tracing::warn!(relay = %self.url, "two pings unanswered; closing");
                        break;
                    }
                    outstanding_pings += 1;
                    let _ = self.write_tx.try_send(OutboundFrame::Ping(Vec::new()));
                }
                _ = self.terminate.notified() => {
                    let _ = sink.send(WsMessage::Close).await;
                    break;
                }
            }
        }
    }

    // ------------------------------------------------------------------ inbound

    async fn handle_frame(&self, json: &str) {
        // a relay that served a forged signature gets nothing through, ever
        if self.state.verifier.is_invalid(&self.url).await {
            return;
        }

        let msg: RelayMessage = match RelayMessage::from_json(json) {
            Ok(msg) => msg,
            Err(e) => {
                // unknown or malformed frames are logged and ignored
                tracing::debug!(relay = %self.url, "unparseable frame ({e}): {json}");
                return;
            }
        };

        match msg {
            RelayMessage::Event {
                subscription_id,
                event,
            } => self.handle_event(subscription_id, *event).await,
            RelayMessage::EndOfStoredEvents(subscription_id) => {
                self.handle_eose(subscription_id).await;
            }
            RelayMessage::Closed {
                subscription_id,
                message,
            } => self.handle_closed(subscription_id, message).await,
            RelayMessage::Auth { challenge } => self.handle_auth_challenge(challenge).await,
            RelayMessage::Notice { ref message } => {
                tracing::info!(relay = %self.url, "NOTICE: {message}");
                self.broadcast_message(msg).await;
            }
            RelayMessage::Ok { .. } => {
                self.broadcast_message(msg).await;
            }
        }
    }

    async fn handle_event(&self, subscription_id: SubscriptionId, event: Event) {
        // registration happens-before REQ, so an unknown id is relay misbehavior
        {
            let subscriptions = self.subscriptions.read().await;
            match subscriptions.get(&subscription_id) {
                Some(sub) if !sub.closed => {}
                _ => {
                    tracing::debug!(
                        relay = %self.url,
                        subscription = %subscription_id,
                        "event for unknown or closed subscription; ignoring"
                    );
                    return;
                }
            }
        }

        match self.state.verifier.admit(&self.url, &event).await {
            Admission::Verified | Admission::Sampled => {}
            Admission::Rejected | Admission::RelayInvalid => return,
        }

        // write-through before anyone can observe the event
        if let Err(e) = self.state.database.save_event(&event).await {
            tracing::warn!(relay = %self.url, "cache write-through failed: {e}");
        }

        let _ = self.notification_sender.send(RelayNotification::Event {
            subscription_id: subscription_id.clone(),
            event: Box::new(event.clone()),
        });
        if let Some(pool) = self.pool_sender.read().await.as_ref() {
            let _ = pool.send(RelayPoolNotification::Event {
                relay_url: self.url.clone(),
                subscription_id,
                event: Box::new(event),
            });
        }
    }

    async fn handle_eose(&self, subscription_id: SubscriptionId) {
        let close_after: bool = {
            let mut subscriptions = self.subscriptions.write().await;
            match subscriptions.get_mut(&subscription_id) {
                Some(sub) => {
                    sub.eose = true;
                    sub.opts.close_on_eose
                }
                None => false,
            }
        };

        self.broadcast_message(RelayMessage::EndOfStoredEvents(subscription_id.clone()))
            .await;

        if close_after {
            let _ = self.unsubscribe(&subscription_id).await;
        }
    }

    async fn handle_closed(&self, subscription_id: SubscriptionId, message: String) {
        {
            let mut subscriptions = self.subscriptions.write().await;
            if let Some(sub) = subscriptions.get_mut(&subscription_id) {
                sub.closed = true;
            }
        }
        tracing::debug!(relay = %self.url, subscription = %subscription_id, "CLOSED: {message}");
        self.broadcast_message(RelayMessage::Closed {
            subscription_id,
            message,
        })
        .await;
    }

    async fn handle_auth_challenge(&self, challenge: String) {
        {
            let mut stored = self.auth_challenge.write().await;
            *stored = Some(challenge.clone());
        }
        let _ = self
            .notification_sender
            .send(RelayNotification::AuthChallenge {
                challenge: challenge.clone(),
            });
        self.broadcast_message(RelayMessage::Auth { challenge }).await;
    }

    async fn broadcast_message(&self, message: RelayMessage) {
        let _ = self.notification_sender.send(RelayNotification::Message {
            message: message.clone(),
        });
        if let Some(pool) = self.pool_sender.read().await.as_ref() {
            let _ = pool.send(RelayPoolNotification::Message {
                relay_url: self.url.clone(),
                message,
            });
        }
    }

    // ----------------------------------------------------------------- outbound

    /// Queue a message for the writer task
    pub(crate) fn send_msg(&self, msg: ClientMessage) -> Result<(), Error> {
        if self.status().is_terminal() {
            return Err(Error::NotConnected);
        }
        self.write_tx
            .try_send(OutboundFrame::Message(msg))
            .map_err(|_| Error::WriteQueueFull)
    }

    /// Send an event and wait for the relay's `OK`
    ///
    /// Returns the relay's `(accepted, message)` verdict; transport problems and
    /// deadline misses are errors.
    pub(crate) async fn send_event_waiting_ok(
        &self,
        event: &Event,
        timeout: Option<Duration>,
    ) -> Result<(bool, String), Error> {
        let timeout: Duration = timeout.unwrap_or(DEFAULT_SEND_TIMEOUT);
        let mut notifications = self.notifications();
        let started: Instant = Instant::now();
        let event_id: EventId = event.id;

        self.send_msg(ClientMessage::event(event.clone()))?;

        let wait = async {
            loop {
                match notifications.recv().await {
                    Ok(RelayNotification::Message {
                        message:
                            RelayMessage::Ok {
                                event_id: got,
                                status,
                                message,
                            },
                    }) if got == event_id => return Ok((status, message)),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return Err(Error::NotConnected),
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok((status, message))) => {
                let rtt: Duration = started.elapsed();
                self.stats.record_latency(rtt);
                let interaction = if status {
                    RelayInteraction::Success
                } else {
                    RelayInteraction::Failure
                };
                let _ = self
                    .state
                    .database
                    .record_relay_health(&self.url, interaction, Some(rtt.as_millis() as u64))
                    .await;
                Ok((status, message))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                let _ = self
                    .state
                    .database
                    .record_relay_health(&self.url, RelayInteraction::Failure, None)
                    .await;
                Err(Error::Timeout(timeout))
            }
        }
    }

    // ------------------------------------------------------------ subscriptions

    /// Register a subscription and queue its REQ
    ///
    /// The registry insert completes before the REQ is enqueued, so an inbound EVENT can
    /// never reference an id this relay does not know.
    pub(crate) async fn subscribe_with_id(
        &self,
        id: SubscriptionId,
        filters: Vec<Filter>,
        opts: RelaySubscribeOptions,
    ) -> Result<(), Error> {
        {
            let mut subscriptions = self.subscriptions.write().await;
            subscriptions.insert(
                id.clone(),
                RelaySubscription {
                    filters: filters.clone(),
                    opts,
                    eose: false,
                    closed: false,
                },
            );
        }
        self.send_msg(ClientMessage::req(id, filters))
    }

    /// Close a subscription and queue its CLOSE
    pub(crate) async fn unsubscribe(&self, id: &SubscriptionId) -> Result<(), Error> {
        let existed: bool = {
            let mut subscriptions = self.subscriptions.write().await;
            match subscriptions.remove(id) {
                Some(sub) => !sub.closed,
                None => false,
            }
        };
        if existed {
            self.send_msg(ClientMessage::close(id.clone()))?;
        }
        Ok(())
    }

    /// Close every subscription
    pub(crate) async fn unsubscribe_all(&self) -> Result<(), Error> {
        let ids: Vec<SubscriptionId> = {
            let subscriptions = self.subscriptions.read().await;
            subscriptions.keys().cloned().collect()
        };
        for id in ids {
            self.unsubscribe(&id).await?;
        }
        Ok(())
    }

    /// Re-send the REQ of every live subscription after a reconnect
    ///
    /// A `close_on_eose` subscription whose EOSE already arrived is done; it is dropped
    /// instead of replayed. Everything else gets a fresh EOSE cycle.
    async fn replay_subscriptions(&self) {
        let mut to_send: Vec<(SubscriptionId, Vec<Filter>)> = Vec::new();
        {
            let mut subscriptions = self.subscriptions.write().await;
            subscriptions.retain(|id, sub| {
                if sub.closed {
                    return false;
                }
                if sub.opts.close_on_eose && sub.eose {
                    return false;
                }
                sub.eose = false;
                to_send.push((id.clone(), sub.filters.clone()));
                true
            });
        }
        for (id, filters) in to_send {
            tracing::debug!(relay = %self.url, subscription = %id, "replaying subscription");
            if let Err(e) = self.send_msg(ClientMessage::req(id, filters)) {
                tracing::warn!(relay = %self.url, "replay failed: {e}");
            }
        }
    }

    // ------------------------------------------------------------------- auth

    /// Respond to the relay's NIP-42 challenge and wait for the verdict
    pub(crate) async fn authenticate(&self) -> Result<(), Error> {
        let challenge: String = self
            .auth_challenge
            .read()
            .await
            .clone()
            .ok_or(Error::NoAuthChallenge)?;

        let signer = self
            .state
            .signer()
            .await
            .map_err(|_| Error::SignerNotConfigured)?;
        let public_key = signer
            .get_public_key()
            .await
            .map_err(|e| Error::Signer(e.to_string()))?;

        let unsigned: UnsignedEvent =
            EventBuilder::auth(challenge, self.url.as_str()).build(public_key);
        let auth_event: Event = signer
            .sign_event(unsigned)
            .await
            .map_err(|e| Error::Signer(e.to_string()))?;
        let auth_id: EventId = auth_event.id;

        self.set_status(RelayStatus::AwaitingAuth).await;

        let mut notifications = self.notifications();
        self.send_msg(ClientMessage::auth(auth_event))?;

        let wait = async {
            loop {
                match notifications.recv().await {
                    Ok(RelayNotification::Message {
                        message:
                            RelayMessage::Ok {
                                event_id,
                                status,
                                message,
                            },
                    }) if event_id == auth_id => return Ok((status, message)),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return Err(Error::NotConnected),
                }
            }
        };

        match tokio::time::timeout(DEFAULT_SEND_TIMEOUT, wait).await {
            Ok(Ok((true, _))) => {
                self.set_status(RelayStatus::Connected).await;
                Ok(())
            }
            Ok(Ok((false, message))) => {
                // a restricted message means the key is unwelcome; give up on this relay
                if MachineReadablePrefix::parse(&message)
                    == Some(MachineReadablePrefix::Restricted)
                {
                    self.set_status(RelayStatus::Failed).await;
                } else {
                    self.set_status(RelayStatus::Connected).await;
                }
                Err(Error::AuthenticationFailed(message))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                self.set_status(RelayStatus::Connected).await;
                Err(Error::Timeout(DEFAULT_SEND_TIMEOUT))
            }
        }
    }
}
