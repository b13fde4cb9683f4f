// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Publishing pipeline
//!
//! Fans an event out to its target relays, one concurrent task per relay, each driving a
//! retry state machine: transient failures back off, `rate-limited` has its own retry
//! budget, `auth-required` triggers NIP-42, and a `pow:` demand re-mines and re-signs the
//! event (resetting every relay task to the new id). The caller always receives the full
//! per-relay breakdown; an overall failure can park the event in the unpublished queue
//! for the background worker.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nostr::message::relay::MachineReadablePrefix;
use nostr::{Event, EventId, Kind, PublicKey, RelayUrl, Tag, Timestamp, UnsignedEvent};
use tokio::sync::{watch, Mutex, RwLock};

use crate::pool::{Error, RelayPool, RelayPoolNotification};
use crate::relay::{Relay, RelayStatus};

/// Publishing tunables
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// The publish succeeds once this many relays accepted (default: 1)
    pub min_successful_relays: usize,
    /// Retry budget for transient failures (default: 3)
    pub max_retries: u32,
    /// First retry delay; multiplied per attempt (default: 1 s)
    pub initial_backoff: Duration,
    /// Backoff multiplier (default: 2.0)
    pub backoff_multiplier: f64,
    /// Separate retry budget for `rate-limited` answers (default: 5)
    pub rate_limit_max_retries: u32,
    /// Per-relay deadline for one send/OK round-trip (default: 30 s)
    pub per_relay_timeout: Duration,
    /// Mine proof-of-work when a relay demands it (default: false)
    pub enable_pow: bool,
    /// Refuse PoW demands above this difficulty (default: 20)
    pub max_pow_difficulty: u8,
    /// On overall failure, park the event in the unpublished queue (default: true)
    pub persist_failures: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            min_successful_relays: 1,
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            rate_limit_max_retries: 5,
            per_relay_timeout: Duration::from_secs(30),
            enable_pow: false,
            max_pow_difficulty: 20,
            persist_failures: true,
        }
    }
}

impl PublishOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Require this many accepting relays for overall success
    pub fn min_successful_relays(mut self, min: usize) -> Self {
        self.min_successful_relays = min;
        self
    }

    /// Set the transient-failure retry budget
    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    /// Enable PoW mining up to `max_difficulty`
    pub fn pow(mut self, max_difficulty: u8) -> Self {
        self.enable_pow = true;
        self.max_pow_difficulty = max_difficulty;
        self
    }

    /// Set the per-relay round-trip deadline
    pub fn per_relay_timeout(mut self, timeout: Duration) -> Self {
        self.per_relay_timeout = timeout;
        self
    }

    /// Keep failed publishes out of the unpublished queue
    pub fn persist_failures(mut self, persist: bool) -> Self {
        self.persist_failures = persist;
        self
    }
}

/// Where one relay's publish attempt ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishStatus {
    /// Waiting for a task slot
    Pending,
    /// A send/OK round-trip is in flight
    InProgress,
    /// The relay accepted the event
    Succeeded,
    /// Terminal failure; the message says why
    Failed,
    /// The publish was cancelled before this relay reached a terminal state
    Cancelled,
}

/// Terminal record for one relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayPublishOutcome {
    /// Terminal status
    pub status: PublishStatus,
    /// The relay's last message (or the local error)
    pub message: String,
    /// Send attempts made
    pub attempts: u32,
}

/// Result of a publish call
#[derive(Debug, Clone)]
pub struct PublishResult {
    /// Whether `min_successful_relays` was met
    pub success: bool,
    /// The published event, after any PoW regeneration
    pub event: Event,
    /// Per-relay terminal states; never hidden, even on success
    pub per_relay: HashMap<RelayUrl, RelayPublishOutcome>,
    /// Whether the event was parked in the unpublished queue
    pub queued: bool,
}

impl PublishResult {
    /// The published event's id (the final one, after any PoW regeneration)
    pub fn event_id(&self) -> EventId {
        self.event.id
    }

    /// Relays that accepted
    pub fn accepted_by(&self) -> impl Iterator<Item = &RelayUrl> {
        self.per_relay
            .iter()
            .filter(|(_, o)| o.status == PublishStatus::Succeeded)
            .map(|(url, _)| url)
    }
}

/// Handle to a publish running in the background
#[derive(Debug)]
pub struct PublishHandle {
    result_rx: watch::Receiver<Option<PublishResult>>,
    live: Arc<RwLock<HashMap<RelayUrl, PublishStatus>>>,
    cancelled: Arc<AtomicBool>,
}

impl PublishHandle {
    /// Snapshot of every relay's current status
    pub async fn status(&self) -> HashMap<RelayUrl, PublishStatus> {
        self.live.read().await.clone()
    }

    /// The final result, if the publish already terminated
    pub fn try_result(&self) -> Option<PublishResult> {
        self.result_rx.borrow().clone()
    }

    /// Wait for the publish to terminate
    pub async fn wait(mut self) -> Result<PublishResult, Error> {
        loop {
            if let Some(result) = self.result_rx.borrow().clone() {
                return Ok(result);
            }
            self.result_rx
                .changed()
                .await
                .map_err(|_| Error::Cancelled)?;
        }
    }

    /// Cancel the remaining per-relay tasks; relays that already accepted stay accepted
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// The event being published, swapped atomically when PoW regenerates it
#[derive(Debug)]
struct ActiveEvent {
    event: RwLock<Arc<Event>>,
    generation: AtomicU64,
    regen: Mutex<()>,
}

impl ActiveEvent {
    fn new(event: Event) -> Self {
        Self {
            event: RwLock::new(Arc::new(event)),
            generation: AtomicU64::new(0),
            regen: Mutex::new(()),
        }
    }

    async fn current(&self) -> (Arc<Event>, u64) {
        let event = self.event.read().await.clone();
        (event, self.generation.load(Ordering::SeqCst))
    }
}

/// First integer in the detail of a `pow:` message, e.g. `pow: 8 required` or
/// `pow: difficulty 25>=24`
fn parse_pow_difficulty(message: &str) -> Option<u8> {
    let detail: &str = message.split_once(':').map(|(_, d)| d).unwrap_or(message);
    for token in detail.split_whitespace() {
        let digits: String = token.chars().take_while(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() {
            return digits.parse().ok();
        }
    }
    None
}

/// Mine a `nonce` tag so the event id carries at least `difficulty` leading zero bits
///
/// Strips any prior nonce tag first; the returned unsigned event has its id set.
fn mine_pow(
    pubkey: PublicKey,
    kind: Kind,
    tags: Vec<Tag>,
    content: String,
    difficulty: u8,
) -> UnsignedEvent {
    let base_tags: Vec<Tag> = tags
        .into_iter()
        .filter(|t| t.kind() != nostr::event::tag::kind::NONCE)
        .collect();

    let mut nonce: u128 = 0;
    loop {
        nonce += 1;
        let created_at = Timestamp::now();
        let mut tags = base_tags.clone();
        tags.push(Tag::pow_nonce(nonce, difficulty));
        let id = EventId::new(&pubkey, &created_at, &kind, &tags, &content);
        if id.check_pow(difficulty) {
            let mut unsigned = UnsignedEvent::new(pubkey, created_at, kind, tags, content);
            unsigned.id = Some(id);
            return unsigned;
        }
    }
}

/// Re-mine and re-sign the active event at `difficulty`, bumping the generation
///
/// Single-flight: concurrent demands from several relays regenerate once. A task whose
/// generation is already stale returns immediately and picks up the new event.
async fn regenerate_with_pow(
    pool: &RelayPool,
    active: &ActiveEvent,
    difficulty: u8,
    seen_generation: u64,
) -> Result<(), Error> {
    let _guard = active.regen.lock().await;
    if active.generation.load(Ordering::SeqCst) != seen_generation {
        return Ok(());
    }

    let signer = pool
        .state()
        .signer()
        .await
        .map_err(|_| Error::SignerNotConfigured)?;

    let (current, _) = active.current().await;
    let pubkey = current.pubkey.clone();
    let kind = current.kind;
    let tags = current.tags.clone();
    let content = current.content.clone();

    let unsigned: UnsignedEvent =
        tokio::task::spawn_blocking(move || mine_pow(pubkey, kind, tags, content, difficulty))
            .await
            .map_err(|e| Error::Signer(e.to_string()))?;

    let signed: Event = signer
        .sign_event(unsigned)
        .await
        .map_err(|e| Error::Signer(e.to_string()))?;

    tracing::debug!(
        event_id = %signed.id,
        difficulty,
        "regenerated event with proof of work"
    );

    {
        let mut event = active.event.write().await;
        *event = Arc::new(signed);
    }
    active.generation.fetch_add(1, Ordering::SeqCst);
    Ok(())
}

struct RelayTaskContext<'a> {
    pool: &'a RelayPool,
    active: &'a ActiveEvent,
    opts: &'a PublishOptions,
    cancelled: &'a AtomicBool,
    live: &'a RwLock<HashMap<RelayUrl, PublishStatus>>,
}

async fn set_live(
    live: &RwLock<HashMap<RelayUrl, PublishStatus>>,
    url: &RelayUrl,
    status: PublishStatus,
) {
    live.write().await.insert(url.clone(), status);
}

/// Drive one relay to a terminal state
async fn relay_task(ctx: &RelayTaskContext<'_>, relay: Relay) -> RelayPublishOutcome {
    let _permit = ctx.pool.inner.publish_permits.acquire().await;

    let mut attempts: u32 = 0;
    let mut retries: u32 = 0;
    let mut rate_retries: u32 = 0;
    let mut auth_attempted: bool = false;
    let (mut event, mut generation) = ctx.active.current().await;

    loop {
        if ctx.cancelled.load(Ordering::SeqCst) {
            set_live(ctx.live, relay.url(), PublishStatus::Cancelled).await;
            return RelayPublishOutcome {
                status: PublishStatus::Cancelled,
                message: String::from("cancelled"),
                attempts,
            };
        }

        // PoW regeneration swaps the event under every task; start over with a clean
        // retry budget on the new id
        {
            let (current, current_generation) = ctx.active.current().await;
            if current_generation != generation {
                event = current;
                generation = current_generation;
                retries = 0;
                rate_retries = 0;
            }
        }

        set_live(ctx.live, relay.url(), PublishStatus::InProgress).await;
        attempts += 1;

        match relay
            .send_event(&event, Some(ctx.opts.per_relay_timeout))
            .await
        {
            Ok((true, message)) => {
                set_live(ctx.live, relay.url(), PublishStatus::Succeeded).await;
                return RelayPublishOutcome {
                    status: PublishStatus::Succeeded,
                    message,
                    attempts,
                };
            }
            Ok((false, message)) => match MachineReadablePrefix::parse(&message) {
                Some(MachineReadablePrefix::Duplicate) => {
                    // the relay already has it; publishing is idempotent on the id
                    set_live(ctx.live, relay.url(), PublishStatus::Succeeded).await;
                    return RelayPublishOutcome {
                        status: PublishStatus::Succeeded,
                        message,
                        attempts,
                    };
                }
                Some(MachineReadablePrefix::Pow) => {
                    let difficulty: Option<u8> = parse_pow_difficulty(&message);
                    match difficulty {
                        Some(difficulty)
                            if ctx.opts.enable_pow
                                && difficulty <= ctx.opts.max_pow_difficulty =>
                        {
                            if let Err(e) = regenerate_with_pow(
                                ctx.pool,
                                ctx.active,
                                difficulty,
                                generation,
                            )
                            .await
                            {
                                set_live(ctx.live, relay.url(), PublishStatus::Failed).await;
                                return RelayPublishOutcome {
                                    status: PublishStatus::Failed,
                                    message: e.to_string(),
                                    attempts,
                                };
                            }
                            continue;
                        }
                        _ => {
                            set_live(ctx.live, relay.url(), PublishStatus::Failed).await;
                            return RelayPublishOutcome {
                                status: PublishStatus::Failed,
                                message,
                                attempts,
                            };
                        }
                    }
                }
                Some(MachineReadablePrefix::AuthRequired) => {
                    if auth_attempted {
                        set_live(ctx.live, relay.url(), PublishStatus::Failed).await;
                        return RelayPublishOutcome {
                            status: PublishStatus::Failed,
                            message,
                            attempts,
                        };
                    }
                    auth_attempted = true;
                    match relay.authenticate().await {
                        Ok(()) => continue,
                        Err(e) => {
                            set_live(ctx.live, relay.url(), PublishStatus::Failed).await;
                            return RelayPublishOutcome {
                                status: PublishStatus::Failed,
                                message: format!("authentication failed: {e}"),
                                attempts,
                            };
                        }
                    }
                }
                Some(MachineReadablePrefix::RateLimited) => {
                    rate_retries += 1;
                    if rate_retries > ctx.opts.rate_limit_max_retries {
                        set_live(ctx.live, relay.url(), PublishStatus::Failed).await;
                        return RelayPublishOutcome {
                            status: PublishStatus::Failed,
                            message,
                            attempts,
                        };
                    }
                    backoff(ctx.opts, rate_retries).await;
                    continue;
                }
                // invalid / blocked / error / restricted, or any other non-empty
                // message: permanent
                _ => {
                    set_live(ctx.live, relay.url(), PublishStatus::Failed).await;
                    return RelayPublishOutcome {
                        status: PublishStatus::Failed,
                        message,
                        attempts,
                    };
                }
            },
            Err(e) => {
                retries += 1;
                if retries > ctx.opts.max_retries {
                    set_live(ctx.live, relay.url(), PublishStatus::Failed).await;
                    return RelayPublishOutcome {
                        status: PublishStatus::Failed,
                        message: e.to_string(),
                        attempts,
                    };
                }
                backoff(ctx.opts, retries).await;
            }
        }
    }
}

async fn backoff(opts: &PublishOptions, attempt: u32) {
    let factor: f64 = opts
        .backoff_multiplier
        .powi(attempt.saturating_sub(1).min(16) as i32);
    let base: f64 = opts.initial_backoff.as_secs_f64() * factor;
    let jitter: f64 = 1.0 + rand::random::<f64>() * 0.2 - 0.1;
    tokio::time::sleep(Duration::from_secs_f64((base * jitter).max(0.0))).await;
}

impl RelayPool {
    /// Publish an event to `urls` (or every pool relay) and wait for the outcome
    ///
    /// Succeeds once `min_successful_relays` accepted. Always returns the per-relay
    /// breakdown; on overall failure the event is parked in the unpublished queue when
    /// the options say so.
    pub async fn publish(
        &self,
        event: Event,
        urls: Option<HashSet<RelayUrl>>,
        opts: PublishOptions,
    ) -> Result<PublishResult, Error> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let live = Arc::new(RwLock::new(HashMap::new()));
        self.publish_internal(event, urls, opts, cancelled, live)
            .await
    }

    /// Publish without waiting; poll or await the returned handle
    pub async fn publish_in_background(
        &self,
        event: Event,
        urls: Option<HashSet<RelayUrl>>,
        opts: PublishOptions,
    ) -> PublishHandle {
        let (result_tx, result_rx) = watch::channel(None);
        let cancelled = Arc::new(AtomicBool::new(false));
        let live: Arc<RwLock<HashMap<RelayUrl, PublishStatus>>> =
            Arc::new(RwLock::new(HashMap::new()));

        let pool = self.clone();
        let task_cancelled = Arc::clone(&cancelled);
        let task_live = Arc::clone(&live);
        tokio::spawn(async move {
            let result = pool
                .publish_internal(event, urls, opts, task_cancelled, task_live)
                .await;
            if let Ok(result) = result {
                let _ = result_tx.send(Some(result));
            }
        });

        PublishHandle {
            result_rx,
            live,
            cancelled,
        }
    }

    async fn publish_internal(
        &self,
        event: Event,
        urls: Option<HashSet<RelayUrl>>,
        opts: PublishOptions,
        cancelled: Arc<AtomicBool>,
        live: Arc<RwLock<HashMap<RelayUrl, PublishStatus>>>,
    ) -> Result<PublishResult, Error> {
        let targets: Vec<Relay> = {
            let relays = self.inner.relays.read().await;
            let mut targets: Vec<Relay> = Vec::new();
            for (url, relay) in relays.iter() {
                if let Some(set) = &urls {
                    if !set.contains(url) {
                        continue;
                    }
                }
                if self.inner.state.filtering.is_allowed(url).await {
                    targets.push(relay.clone());
                }
            }
            targets
        };

        if targets.is_empty() {
            return Err(Error::NoRelays);
        }

        {
            let mut live = live.write().await;
            for relay in targets.iter() {
                live.insert(relay.url().clone(), PublishStatus::Pending);
            }
        }

        let active = ActiveEvent::new(event);
        let ctx = RelayTaskContext {
            pool: self,
            active: &active,
            opts: &opts,
            cancelled: &cancelled,
            live: &live,
        };

        let outcomes: Vec<(RelayUrl, RelayPublishOutcome)> = futures_util::future::join_all(
            targets
                .into_iter()
                .map(|relay| {
                    let ctx = &ctx;
                    async move { (relay.url().clone(), relay_task(ctx, relay).await) }
                }),
        )
        .await;

        let per_relay: HashMap<RelayUrl, RelayPublishOutcome> = outcomes.into_iter().collect();
        let succeeded: usize = per_relay
            .values()
            .filter(|o| o.status == PublishStatus::Succeeded)
            .count();
        let success: bool = succeeded >= opts.min_successful_relays;

        let (final_event, _) = active.current().await;
        let final_event: Event = (*final_event).clone();

        let mut queued: bool = false;
        if !success && opts.persist_failures && !cancelled.load(Ordering::SeqCst) {
            let remaining: HashSet<RelayUrl> = per_relay
                .iter()
                .filter(|(_, o)| o.status != PublishStatus::Succeeded)
                .map(|(url, _)| url.clone())
                .collect();
            match self
                .database()
                .enqueue_unpublished(final_event.clone(), remaining)
                .await
            {
                Ok(()) => queued = true,
                Err(e) => tracing::warn!("failed to enqueue unpublished event: {e}"),
            }
        }

        Ok(PublishResult {
            success,
            event: final_event,
            per_relay,
            queued,
        })
    }

    /// Spawn the background worker that replays the unpublished queue
    ///
    /// Runs on `interval` and additionally whenever any relay reconnects. Items that
    /// finally get accepted are discarded from the queue; the rest stay for next time.
    pub fn spawn_unpublished_worker(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let pool = self.clone();
        let mut notifications = self.notifications();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    notification = notifications.recv() => match notification {
                        Ok(RelayPoolNotification::RelayStatus {
                            status: RelayStatus::Connected,
                            ..
                        }) => {}
                        Ok(RelayPoolNotification::Shutdown) => break,
                        Ok(_) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
                pool.replay_unpublished().await;
            }
        })
    }

    /// One pass over the unpublished queue
    pub async fn replay_unpublished(&self) {
        let items = match self.database().dequeue_unpublished().await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!("failed to read unpublished queue: {e}");
                return;
            }
        };
        for item in items {
            let opts = PublishOptions::default().persist_failures(false);
            match self
                .publish(item.event.clone(), Some(item.target_relays), opts)
                .await
            {
                Ok(result) if result.success => {
                    let _ = self.database().discard_unpublished(&item.event.id).await;
                    tracing::debug!(event_id = %item.event.id, "unpublished event delivered");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(event_id = %item.event.id, "unpublished replay failed: {e}");
                }
            }
        }
    }
}
