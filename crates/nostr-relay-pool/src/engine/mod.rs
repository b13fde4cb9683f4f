// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Subscription engine
//!
//! Sits between consumers and the pool's relays. New subscriptions wait out a short
//! grouping window so merge-compatible filters ride the same relay-level REQ; inbound
//! events are deduplicated per subscription; one-shot fetches terminate on an EOSE
//! quorum instead of waiting for the slowest relay.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures_util::Stream;
use lru::LruCache;
use nostr::{Event, EventId, Filter, RelayMessage, RelayUrl, SubscriptionId};
use tokio::sync::{mpsc, Mutex};

pub mod options;

pub use self::options::{CacheStrategy, FetchOptions, SubscribeOptions};
use crate::pool::{Error, InnerPool, RelayPool, RelayPoolNotification};
use crate::relay::RelaySubscribeOptions;

const MEMBER_DEDUP_CAPACITY: usize = 8_192;
const RECENT_OBSERVATIONS_CAPACITY: usize = 16_384;
const MONITOR_TICK: Duration = Duration::from_millis(25);

/// Why a subscription's stream ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompletionReason {
    /// Every target relay sent EOSE
    AllEose,
    /// At least half the target relays sent EOSE and the stream then went idle
    QuorumIdle,
    /// The hard deadline elapsed
    Deadline,
    /// The requested limit was reached
    Limit,
    /// Every target relay closed the subscription
    Closed,
    /// The consumer closed the subscription
    #[default]
    Cancelled,
    /// The cache alone satisfied the request; no relay was asked
    Cache,
}

/// Per-relay terminal state of a one-shot fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchRelayState {
    /// The relay finished its historical replay
    Eose,
    /// The relay closed the subscription
    Closed,
    /// The relay had sent neither EOSE nor CLOSED when the fetch terminated
    Incomplete,
}

/// How a finished subscription saw its relays
#[derive(Debug, Clone, Default)]
pub struct FetchSummary {
    /// Terminal per-relay states
    pub per_relay: HashMap<RelayUrl, FetchRelayState>,
    /// Why the stream ended
    pub reason: CompletionReason,
}

/// Result of [`RelayPool::fetch_events`]
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    /// Collected events, newest first
    pub events: Vec<Event>,
    /// Terminal per-relay states
    pub per_relay: HashMap<RelayUrl, FetchRelayState>,
    /// Why the fetch terminated
    pub reason: CompletionReason,
}

/// Counters the engine keeps across all subscriptions
#[derive(Debug, Default)]
pub struct EngineStats {
    duplicates_suppressed: AtomicU64,
    cross_relay_duplicates: AtomicU64,
    dropped_events: AtomicU64,
}

impl EngineStats {
    /// Events suppressed by per-subscription deduplication
    pub fn duplicates_suppressed(&self) -> u64 {
        self.duplicates_suppressed.load(Ordering::Relaxed)
    }

    /// Events observed from more than one relay
    pub fn cross_relay_duplicates(&self) -> u64 {
        self.cross_relay_duplicates.load(Ordering::Relaxed)
    }

    /// Events dropped because a consumer stopped reading
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
enum StreamItem {
    Event(Box<Event>),
    Done(FetchSummary),
}

#[derive(Debug)]
struct Member {
    public_id: SubscriptionId,
    filters: Vec<Filter>,
    limit: Option<usize>,
    sent: usize,
    tx: mpsc::Sender<StreamItem>,
    dedup: LruCache<EventId, Instant>,
    dedup_window: Duration,
    eose_idle: Duration,
    deadline: Duration,
    created_at: Instant,
}

#[derive(Debug)]
struct Group {
    close_on_eose: bool,
    relay_set: Option<BTreeSet<RelayUrl>>,
    filters: Vec<Filter>,
    members: HashMap<u64, Member>,
    flushed: bool,
    target_relays: HashSet<RelayUrl>,
    eose_relays: HashSet<RelayUrl>,
    closed_relays: HashSet<RelayUrl>,
    last_activity: Instant,
}

impl Group {
    fn summary(&self, reason: CompletionReason) -> FetchSummary {
        let mut per_relay = HashMap::with_capacity(self.target_relays.len());
        for url in self.target_relays.iter() {
            let state = if self.eose_relays.contains(url) {
                FetchRelayState::Eose
            } else if self.closed_relays.contains(url) {
                FetchRelayState::Closed
            } else {
                FetchRelayState::Incomplete
            };
            per_relay.insert(url.clone(), state);
        }
        FetchSummary { per_relay, reason }
    }
}

#[derive(Debug, Default)]
struct EngineInner {
    groups: HashMap<SubscriptionId, Group>,
    recent: Option<LruCache<EventId, ()>>,
    closed_history: std::collections::VecDeque<(SubscriptionId, FetchSummary)>,
    router_running: bool,
    next_member_key: u64,
}

/// Subscription engine state, owned by the pool
#[derive(Debug)]
pub(crate) struct Engine {
    inner: Mutex<EngineInner>,
    stats: Arc<EngineStats>,
    track_closed: bool,
    max_closed_history: usize,
}

impl Engine {
    pub(crate) fn new(track_closed: bool, max_closed_history: usize) -> Self {
        Self {
            inner: Mutex::new(EngineInner::default()),
            stats: Arc::new(EngineStats::default()),
            track_closed,
            max_closed_history,
        }
    }
}

/// Merge `incoming` into `existing` where compatible; append what will not merge
fn merge_filter_lists(existing: &mut Vec<Filter>, incoming: &[Filter]) {
    for filter in incoming.iter() {
        let mut merged: Option<(usize, Filter)> = None;
        for (i, slot) in existing.iter().enumerate() {
            if let Some(m) = slot.clone().merge(filter.clone()) {
                merged = Some((i, m));
                break;
            }
        }
        match merged {
            Some((i, m)) => existing[i] = m,
            None => existing.push(filter.clone()),
        }
    }
}

/// Whether `filters` is already covered by `wire`: merging changes nothing on the wire
fn covered_by(wire: &[Filter], filters: &[Filter]) -> bool {
    filters.iter().all(|filter| {
        wire.iter()
            .any(|slot| slot.clone().merge(filter.clone()).as_ref() == Some(slot))
    })
}

/// A live subscription's event stream
///
/// Ends when the subscription terminates ([`SubscriptionStream::summary`] then says why).
/// Dropping the stream closes the subscription: CLOSE goes to every relay whose REQ
/// exists solely for it.
#[derive(Debug)]
pub struct SubscriptionStream {
    id: SubscriptionId,
    rx: mpsc::Receiver<StreamItem>,
    pool: Weak<InnerPool>,
    wire_id: Option<SubscriptionId>,
    member_key: u64,
    summary: Option<FetchSummary>,
    closed: bool,
}

impl SubscriptionStream {
    /// The subscription's opaque id
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    /// Why and how the subscription ended; `None` while still live
    pub fn summary(&self) -> Option<&FetchSummary> {
        self.summary.as_ref()
    }

    /// Close the subscription now
    pub async fn close(mut self) {
        self.close_inner().await;
    }

    async fn close_inner(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.rx.close();
        if let (Some(pool), Some(wire_id)) = (self.pool.upgrade(), self.wire_id.clone()) {
            close_member(&pool, &wire_id, self.member_key, CompletionReason::Cancelled).await;
        }
    }
}

impl Stream for SubscriptionStream {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match this.rx.poll_recv(cx) {
                Poll::Ready(Some(StreamItem::Event(event))) => {
                    return Poll::Ready(Some(*event));
                }
                Poll::Ready(Some(StreamItem::Done(summary))) => {
                    this.summary = Some(summary);
                    this.closed = true;
                    this.rx.close();
                    return Poll::Ready(None);
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for SubscriptionStream {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let (Some(pool), Some(wire_id)) = (self.pool.upgrade(), self.wire_id.take()) {
            let member_key = self.member_key;
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    close_member(&pool, &wire_id, member_key, CompletionReason::Cancelled).await;
                });
            }
        }
    }
}

impl RelayPool {
    /// Engine counters (dedup suppressions, dropped events)
    pub fn engine_stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.inner.engine.stats)
    }

    /// Terminated subscriptions, oldest first
    ///
    /// Empty unless [`crate::pool::RelayPoolOptions::track_closed_subscriptions`] is on.
    pub async fn closed_subscriptions(&self) -> Vec<(SubscriptionId, FetchSummary)> {
        let engine = self.inner.engine.inner.lock().await;
        engine.closed_history.iter().cloned().collect()
    }

    /// Open a subscription
    ///
    /// The returned stream yields events until the caller closes it, every target relay
    /// reports CLOSED, or (with `close_on_eose`) the EOSE policy declares it done.
    pub async fn subscribe(
        &self,
        filters: Vec<Filter>,
        opts: SubscribeOptions,
    ) -> Result<SubscriptionStream, Error> {
        let public_id = SubscriptionId::generate();

        // cache side of the strategy
        let cached: Vec<Event> = match opts.cache_strategy {
            CacheStrategy::RelayOnly => Vec::new(),
            _ => {
                let mut cached: Vec<Event> = Vec::new();
                for filter in filters.iter() {
                    match self.database().query(filter).await {
                        Ok(found) => cached.extend(found),
                        Err(e) => {
                            // a broken cache read falls through to the relays
                            tracing::warn!("cache query failed: {e}");
                        }
                    }
                }
                cached.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                cached.dedup_by_key(|e| e.id);
                if let Some(limit) = opts.limit {
                    cached.truncate(limit);
                }
                cached
            }
        };

        let cache_satisfies: bool = match opts.cache_strategy {
            CacheStrategy::CacheOnly => true,
            CacheStrategy::CacheFirst => match opts.limit {
                Some(limit) => cached.len() >= limit,
                None => false,
            },
            _ => false,
        };

        if cache_satisfies {
            return Ok(detached_stream(public_id, cached, opts.channel_capacity));
        }

        self.ensure_router().await;

        let (tx, rx) = mpsc::channel(opts.channel_capacity.max(1));

        let mut member = Member {
            public_id: public_id.clone(),
            filters: filters.clone(),
            limit: opts.limit,
            sent: 0,
            tx,
            dedup: LruCache::new(NonZeroUsize::new(MEMBER_DEDUP_CAPACITY).unwrap()),
            dedup_window: opts.dedup_window,
            eose_idle: opts.eose_idle,
            deadline: opts.deadline,
            created_at: Instant::now(),
        };

        // pre-feed cached events through the same dedup the live events will hit
        for event in cached {
            member.dedup.put(event.id, Instant::now());
            if member.tx.try_send(StreamItem::Event(Box::new(event))).is_ok() {
                member.sent += 1;
            }
        }

        let relay_set: Option<BTreeSet<RelayUrl>> =
            opts.relay_set.as_ref().map(|set| set.iter().cloned().collect());

        let (wire_id, member_key, needs_flush_timer) = {
            let mut engine = self.inner.engine.inner.lock().await;
            let member_key: u64 = engine.next_member_key;
            engine.next_member_key += 1;

            // attach to an existing compatible group if possible
            let mut attach_to: Option<SubscriptionId> = None;
            for (wire_id, group) in engine.groups.iter() {
                if group.close_on_eose != opts.close_on_eose || group.relay_set != relay_set {
                    continue;
                }
                let compatible: bool = if group.flushed {
                    // the REQ is on the wire; only join if it already covers us
                    covered_by(&group.filters, &filters)
                } else {
                    true
                };
                if compatible {
                    attach_to = Some(wire_id.clone());
                    break;
                }
            }

            match attach_to {
                Some(wire_id) => {
                    let group = engine.groups.get_mut(&wire_id).expect("group exists");
                    if !group.flushed {
                        merge_filter_lists(&mut group.filters, &filters);
                    }
                    group.members.insert(member_key, member);
                    (wire_id, member_key, false)
                }
                None => {
                    let wire_id = SubscriptionId::generate();
                    let mut members = HashMap::new();
                    members.insert(member_key, member);
                    let mut group_filters: Vec<Filter> = Vec::new();
                    merge_filter_lists(&mut group_filters, &filters);
                    engine.groups.insert(
                        wire_id.clone(),
                        Group {
                            close_on_eose: opts.close_on_eose,
                            relay_set,
                            filters: group_filters,
                            members,
                            flushed: false,
                            target_relays: HashSet::new(),
                            eose_relays: HashSet::new(),
                            closed_relays: HashSet::new(),
                            last_activity: Instant::now(),
                        },
                    );
                    (wire_id, member_key, true)
                }
            }
        };

        if needs_flush_timer {
            let pool: Weak<InnerPool> = Arc::downgrade(&self.inner);
            let wire = wire_id.clone();
            let window: Duration = opts.grouping_window;
            tokio::spawn(async move {
                tokio::time::sleep(window).await;
                if let Some(pool) = pool.upgrade() {
                    flush_group(&pool, &wire).await;
                }
            });
        }

        if opts.close_on_eose {
            let pool: Weak<InnerPool> = Arc::downgrade(&self.inner);
            let wire = wire_id.clone();
            tokio::spawn(async move {
                monitor_member(pool, wire, member_key).await;
            });
        }

        Ok(SubscriptionStream {
            id: public_id,
            rx,
            pool: Arc::downgrade(&self.inner),
            wire_id: Some(wire_id),
            member_key,
            summary: None,
            closed: false,
        })
    }

    /// One-shot fetch: open a `close_on_eose` subscription and collect it
    ///
    /// Completes when the EOSE policy is satisfied, the deadline passes, or the limit is
    /// met. The result always carries the per-relay terminal states.
    pub async fn fetch_events(
        &self,
        filters: Vec<Filter>,
        opts: FetchOptions,
    ) -> Result<FetchResult, Error> {
        use futures_util::StreamExt;

        let limit: Option<usize> = opts.limit;
        let mut stream = self.subscribe(filters, opts.into_subscribe_options()).await?;

        let mut events: Vec<Event> = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event);
        }

        let summary: FetchSummary = stream.summary.take().unwrap_or_default();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        events.dedup_by_key(|e| e.id);
        if let Some(limit) = limit {
            events.truncate(limit);
        }

        Ok(FetchResult {
            events,
            per_relay: summary.per_relay,
            reason: summary.reason,
        })
    }

    /// Spawn the notification router once
    async fn ensure_router(&self) {
        let mut engine = self.inner.engine.inner.lock().await;
        if engine.router_running {
            return;
        }
        engine.router_running = true;
        engine.recent = Some(LruCache::new(
            NonZeroUsize::new(RECENT_OBSERVATIONS_CAPACITY).unwrap(),
        ));
        drop(engine);

        let pool: Weak<InnerPool> = Arc::downgrade(&self.inner);
        let mut notifications = self.notifications();
        let stats: Arc<EngineStats> = Arc::clone(&self.inner.engine.stats);
        tokio::spawn(async move {
            loop {
                let notification = match notifications.recv().await {
                    Ok(n) => n,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "engine router lagged behind notifications");
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                let Some(pool) = pool.upgrade() else { break };
                match notification {
                    RelayPoolNotification::Event {
                        relay_url,
                        subscription_id,
                        event,
                    } => {
                        route_event(&pool, &stats, relay_url, subscription_id, *event).await;
                    }
                    RelayPoolNotification::Message { relay_url, message } => {
                        route_message(&pool, relay_url, message).await;
                    }
                    RelayPoolNotification::RelayStatus { .. } => {}
                    RelayPoolNotification::Shutdown => {
                        shutdown_groups(&pool).await;
                        break;
                    }
                }
            }
        });
    }
}

fn detached_stream(
    id: SubscriptionId,
    events: Vec<Event>,
    capacity: usize,
) -> SubscriptionStream {
    let (tx, rx) = mpsc::channel(capacity.max(events.len() + 1));
    for event in events {
        let _ = tx.try_send(StreamItem::Event(Box::new(event)));
    }
    let _ = tx.try_send(StreamItem::Done(FetchSummary {
        per_relay: HashMap::new(),
        reason: CompletionReason::Cache,
    }));
    SubscriptionStream {
        id,
        rx,
        pool: Weak::new(),
        wire_id: None,
        member_key: 0,
        summary: None,
        closed: true,
    }
}

/// Send the group's REQ to its target relays once the grouping window closes
async fn flush_group(pool: &Arc<InnerPool>, wire_id: &SubscriptionId) {
    let (filters, relay_set, close_on_eose): (Vec<Filter>, Option<BTreeSet<RelayUrl>>, bool) = {
        let engine = pool.engine.inner.lock().await;
        match engine.groups.get(wire_id) {
            Some(group) if !group.flushed => (
                group.filters.clone(),
                group.relay_set.clone(),
                group.close_on_eose,
            ),
            _ => return,
        }
    };

    // resolve targets outside the engine lock
    let mut targets: Vec<crate::relay::Relay> = Vec::new();
    {
        let relays = pool.relays.read().await;
        for (url, relay) in relays.iter() {
            if let Some(set) = &relay_set {
                if !set.contains(url) {
                    continue;
                }
            }
            if pool.state.filtering.is_allowed(url).await {
                targets.push(relay.clone());
            }
        }
    }

    {
        let mut engine = pool.engine.inner.lock().await;
        let Some(group) = engine.groups.get_mut(wire_id) else { return };
        group.flushed = true;
        group.target_relays = targets.iter().map(|r| r.url().clone()).collect();
        group.last_activity = Instant::now();
    }

    let opts = RelaySubscribeOptions { close_on_eose };
    for relay in targets {
        if let Err(e) = relay
            .subscribe_with_id(wire_id.clone(), filters.clone(), opts)
            .await
        {
            tracing::warn!(relay = %relay.url(), "subscribe failed: {e}");
        }
    }
}

async fn route_event(
    pool: &Arc<InnerPool>,
    stats: &EngineStats,
    relay_url: RelayUrl,
    wire_id: SubscriptionId,
    event: Event,
) {
    let mut to_close: Vec<u64> = Vec::new();
    {
        let mut engine = pool.engine.inner.lock().await;
        if let Some(recent) = engine.recent.as_mut() {
            if recent.put(event.id, ()).is_some() {
                stats.cross_relay_duplicates.fetch_add(1, Ordering::Relaxed);
            }
        }
        let Some(group) = engine.groups.get_mut(&wire_id) else { return };
        group.last_activity = Instant::now();
        let _ = relay_url;

        for (key, member) in group.members.iter_mut() {
            if !member.filters.iter().any(|f| f.matches(&event)) {
                continue;
            }
            let now = Instant::now();
            if let Some(seen_at) = member.dedup.get(&event.id) {
                if now.duration_since(*seen_at) < member.dedup_window {
                    stats.duplicates_suppressed.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            }
            member.dedup.put(event.id, now);

            match member.tx.try_send(StreamItem::Event(Box::new(event.clone()))) {
                Ok(()) => {
                    member.sent += 1;
                    if let Some(limit) = member.limit {
                        if member.sent >= limit {
                            to_close.push(*key);
                        }
                    }
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // a stalled consumer loses events instead of stalling the reader
                    stats.dropped_events.fetch_add(1, Ordering::Relaxed);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    to_close.push(*key);
                }
            }
        }
    }

    for key in to_close {
        close_member(pool, &wire_id, key, CompletionReason::Limit).await;
    }
}

async fn route_message(pool: &Arc<InnerPool>, relay_url: RelayUrl, message: RelayMessage) {
    match message {
        RelayMessage::EndOfStoredEvents(wire_id) => {
            let mut engine = pool.engine.inner.lock().await;
            if let Some(group) = engine.groups.get_mut(&wire_id) {
                group.eose_relays.insert(relay_url);
                group.last_activity = Instant::now();
            }
        }
        RelayMessage::Closed {
            subscription_id: wire_id,
            ..
        } => {
            let all_closed: bool = {
                let mut engine = pool.engine.inner.lock().await;
                match engine.groups.get_mut(&wire_id) {
                    Some(group) => {
                        group.closed_relays.insert(relay_url);
                        group.flushed
                            && group
                                .target_relays
                                .iter()
                                .all(|url| group.closed_relays.contains(url))
                    }
                    None => false,
                }
            };
            if all_closed {
                close_group(pool, &wire_id, CompletionReason::Closed).await;
            }
        }
        _ => {}
    }
}

/// EOSE policy for one `close_on_eose` member
///
/// Terminates when all target relays sent EOSE, when at least half did and the group went
/// idle for `eose_idle`, or at the hard deadline. A slow relay still replaying history
/// cannot hold the fetch open once quorum-plus-idle is met.
async fn monitor_member(pool: Weak<InnerPool>, wire_id: SubscriptionId, member_key: u64) {
    loop {
        tokio::time::sleep(MONITOR_TICK).await;
        let Some(pool) = pool.upgrade() else { return };

        let done: Option<CompletionReason> = {
            let engine = pool.engine.inner.lock().await;
            let Some(group) = engine.groups.get(&wire_id) else { return };
            let Some(member) = group.members.get(&member_key) else { return };

            if member.created_at.elapsed() >= member.deadline {
                Some(CompletionReason::Deadline)
            } else if group.flushed {
                let targets: usize = group.target_relays.len();
                let finished: usize = group
                    .target_relays
                    .iter()
                    .filter(|url| {
                        group.eose_relays.contains(*url) || group.closed_relays.contains(*url)
                    })
                    .count();
                if finished >= targets {
                    Some(CompletionReason::AllEose)
                } else if 2 * finished >= targets
                    && group.last_activity.elapsed() >= member.eose_idle
                {
                    Some(CompletionReason::QuorumIdle)
                } else {
                    None
                }
            } else {
                None
            }
        };

        if let Some(reason) = done {
            close_member(&pool, &wire_id, member_key, reason).await;
            return;
        }
    }
}

/// Remove one member; when the group empties, CLOSE its REQ everywhere
async fn close_member(
    pool: &Arc<InnerPool>,
    wire_id: &SubscriptionId,
    member_key: u64,
    reason: CompletionReason,
) {
    let unsubscribe: Option<HashSet<RelayUrl>> = {
        let mut engine = pool.engine.inner.lock().await;
        let Some(group) = engine.groups.get_mut(wire_id) else { return };
        let Some(member) = group.members.remove(&member_key) else { return };

        let summary: FetchSummary = group.summary(reason);
        let _ = member.tx.try_send(StreamItem::Done(summary.clone()));

        if pool.engine.track_closed {
            engine
                .closed_history
                .push_back((member.public_id.clone(), summary));
            while engine.closed_history.len() > pool.engine.max_closed_history {
                engine.closed_history.pop_front();
            }
        }

        let group = engine.groups.get_mut(wire_id).expect("group still present");
        if group.members.is_empty() {
            let flushed: bool = group.flushed;
            let targets: HashSet<RelayUrl> = group.target_relays.clone();
            engine.groups.remove(wire_id);
            if flushed {
                Some(targets)
            } else {
                None
            }
        } else {
            None
        }
    };

    if let Some(targets) = unsubscribe {
        let relays = pool.relays.read().await;
        for url in targets {
            if let Some(relay) = relays.get(&url) {
                let _ = relay.unsubscribe(wire_id).await;
            }
        }
    }
}

/// Close every member of a group at once
async fn close_group(pool: &Arc<InnerPool>, wire_id: &SubscriptionId, reason: CompletionReason) {
    let keys: Vec<u64> = {
        let engine = pool.engine.inner.lock().await;
        match engine.groups.get(wire_id) {
            Some(group) => group.members.keys().copied().collect(),
            None => return,
        }
    };
    for key in keys {
        close_member(pool, wire_id, key, reason).await;
    }
}

async fn shutdown_groups(pool: &Arc<InnerPool>) {
    let wire_ids: Vec<SubscriptionId> = {
        let engine = pool.engine.inner.lock().await;
        engine.groups.keys().cloned().collect()
    };
    for wire_id in wire_ids {
        close_group(pool, &wire_id, CompletionReason::Cancelled).await;
    }
}

#[cfg(test)]
mod tests {
    use nostr::{Keys, Kind};

    use super::*;

    #[test]
    fn merge_filter_lists_unions_compatible() {
        let mut wire: Vec<Filter> = vec![Filter::new().kind(Kind::new(1))];
        merge_filter_lists(&mut wire, &[Filter::new().kind(Kind::new(7))]);
        assert_eq!(wire.len(), 1);
        assert_eq!(
            wire[0].kinds.as_ref().unwrap().len(),
            2,
            "kinds should be unioned into one filter"
        );
    }

    #[test]
    fn merge_filter_lists_appends_incompatible() {
        let mut wire: Vec<Filter> = vec![Filter::new().kind(Kind::new(1)).limit(10)];
        merge_filter_lists(&mut wire, &[Filter::new().kind(Kind::new(7)).limit(20)]);
        assert_eq!(wire.len(), 2, "conflicting limits cannot share a filter");
    }

    #[test]
    fn merge_filter_lists_keeps_cross_field_filters_apart() {
        // a by-kind and a by-author subscription must ride the REQ as two filters;
        // unioning them would over-constrain the wire and starve both members
        let keys = Keys::generate();
        let mut wire: Vec<Filter> = vec![Filter::new().kind(Kind::new(1))];
        merge_filter_lists(&mut wire, &[Filter::new().author(keys.public_key())]);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0], Filter::new().kind(Kind::new(1)));
        assert_eq!(wire[1], Filter::new().author(keys.public_key()));
    }

    #[test]
    fn covered_by_detects_subset() {
        let wire: Vec<Filter> =
            vec![Filter::new().kinds([Kind::new(1), Kind::new(7)])];
        assert!(covered_by(&wire, &[Filter::new().kind(Kind::new(1))]));
        assert!(!covered_by(&wire, &[Filter::new().kind(Kind::new(30023))]));
    }
}
