// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay options

use std::sync::Arc;
use std::time::Duration;

use super::constants::{
    DEFAULT_CONNECTION_TIMEOUT, PING_INTERVAL, RECONNECT_BASE_DELAY, RECONNECT_MAX_DELAY,
};
use crate::transport::{DefaultTransport, Transport};

/// Per-relay tunables
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Reconnect automatically after a lost connection (default: true)
    pub reconnect: bool,
    /// First reconnect delay; doubles per failed attempt (default: 1 s)
    pub reconnect_base_delay: Duration,
    /// Reconnect delay cap (default: 60 s)
    pub reconnect_max_delay: Duration,
    /// Dial timeout (default: 30 s)
    pub connection_timeout: Duration,
    /// Ping interval; two missed pongs close the connection (default: 30 s)
    pub ping_interval: Duration,
    /// Transport used to dial
    pub transport: Arc<dyn Transport>,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            reconnect: true,
            reconnect_base_delay: RECONNECT_BASE_DELAY,
            reconnect_max_delay: RECONNECT_MAX_DELAY,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            ping_interval: PING_INTERVAL,
            transport: Arc::new(DefaultTransport),
        }
    }
}

impl RelayOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable automatic reconnection
    pub fn reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the dial timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the reconnect backoff bounds
    pub fn reconnect_delays(mut self, base: Duration, max: Duration) -> Self {
        self.reconnect_base_delay = base;
        self.reconnect_max_delay = max;
        self
    }

    /// Set the ping interval
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Use a custom transport
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }
}

/// How a subscription on a single relay behaves after EOSE
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySubscribeOptions {
    /// Unsubscribe from this relay once its EOSE arrives
    pub close_on_eose: bool,
}
