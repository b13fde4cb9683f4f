// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

use std::time::Duration;

/// First reconnect delay
pub(super) const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);
/// Reconnect delays double each attempt, up to this cap
pub(super) const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(60);
/// Jitter applied to every reconnect delay, as a fraction of the delay
pub(super) const RECONNECT_JITTER: f64 = 0.2;

/// Dial timeout used when the caller gives none
pub(super) const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between pings; a connection missing two pongs in a row is torn down
pub(super) const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long `send_event` waits for the relay's `OK` before giving up
pub(super) const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the outbound frame queue feeding the writer task
pub(super) const WRITE_QUEUE_CAPACITY: usize = 1024;

/// Capacity of the per-relay notification broadcast channel
pub(super) const NOTIFICATION_CHANNEL_CAPACITY: usize = 4096;
