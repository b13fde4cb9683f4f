// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay connection statistics

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nostr::Timestamp;

/// Counters describing one relay connection's history
///
/// Cheap to clone; all clones observe the same counters.
#[derive(Debug, Clone, Default)]
pub struct RelayConnectionStats {
    inner: Arc<InnerStats>,
}

#[derive(Debug, Default)]
struct InnerStats {
    attempts: AtomicU32,
    success: AtomicU32,
    connected_at: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    /// EWMA of request/response latency, in microseconds
    latency_us: AtomicU64,
}

impl RelayConnectionStats {
    /// New zeroed stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Connection attempts, including failed ones
    pub fn attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Connection attempts that reached the open socket
    pub fn success(&self) -> u32 {
        self.inner.success.load(Ordering::SeqCst)
    }

    /// Ratio of successful attempts, in `[0, 1]`
    pub fn success_rate(&self) -> f64 {
        let attempts = self.attempts();
        if attempts == 0 {
            return 0.0;
        }
        self.success() as f64 / attempts as f64
    }

    /// When the current (or last) connection was established
    pub fn connected_at(&self) -> Timestamp {
        Timestamp::from(self.inner.connected_at.load(Ordering::SeqCst))
    }

    /// Bytes written to the socket
    pub fn bytes_sent(&self) -> u64 {
        self.inner.bytes_sent.load(Ordering::SeqCst)
    }

    /// Bytes read from the socket
    pub fn bytes_received(&self) -> u64 {
        self.inner.bytes_received.load(Ordering::SeqCst)
    }

    /// Smoothed request/response latency, if any sample was recorded
    pub fn latency(&self) -> Option<Duration> {
        match self.inner.latency_us.load(Ordering::SeqCst) {
            0 => None,
            us => Some(Duration::from_micros(us)),
        }
    }

    pub(crate) fn new_attempt(&self) {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn new_success(&self) {
        self.inner.success.fetch_add(1, Ordering::SeqCst);
        self.inner
            .connected_at
            .store(Timestamp::now().as_u64(), Ordering::SeqCst);
    }

    pub(crate) fn add_bytes_sent(&self, size: usize) {
        self.inner.bytes_sent.fetch_add(size as u64, Ordering::SeqCst);
    }

    pub(crate) fn add_bytes_received(&self, size: usize) {
        self.inner
            .bytes_received
            .fetch_add(size as u64, Ordering::SeqCst);
    }

    pub(crate) fn record_latency(&self, rtt: Duration) {
        let sample = rtt.as_micros() as u64;
        let prior = self.inner.latency_us.load(Ordering::SeqCst);
        let next = if prior == 0 { sample } else { (prior * 7 + sample) / 8 };
        self.inner.latency_us.store(next, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate() {
        let stats = RelayConnectionStats::new();
        assert_eq!(stats.success_rate(), 0.0);
        stats.new_attempt();
        stats.new_attempt();
        stats.new_success();
        assert_eq!(stats.attempts(), 2);
        assert_eq!(stats.success(), 1);
        assert!((stats.success_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn latency_smoothing_starts_at_first_sample() {
        let stats = RelayConnectionStats::new();
        assert_eq!(stats.latency(), None);
        stats.record_latency(Duration::from_millis(80));
        assert_eq!(stats.latency(), Some(Duration::from_millis(80)));
        stats.record_latency(Duration::from_millis(160));
        let smoothed = stats.latency().unwrap();
        assert!(smoothed > Duration::from_millis(80));
        assert!(smoothed < Duration::from_millis(160));
    }
}
