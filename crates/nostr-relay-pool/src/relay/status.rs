// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay connection status

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Where a relay connection is in its lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RelayStatus {
    /// Created, never asked to connect
    #[default]
    Initialized,
    /// Dialing the socket
    Connecting,
    /// Socket open, frames flowing
    Connected,
    /// Relay demanded NIP-42 authentication; a signed AUTH response is in flight
    AwaitingAuth,
    /// Socket lost; a reconnect is scheduled
    Disconnected,
    /// Authentication was refused; no reconnect will be attempted
    Failed,
    /// Stopped by the caller; no reconnect until asked again
    Terminated,
}

impl RelayStatus {
    /// Whether frames can currently be written to the socket
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::AwaitingAuth)
    }

    /// Whether the connection loop has given up (no reconnect scheduled)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Terminated)
    }
}

impl fmt::Display for RelayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialized => write!(f, "initialized"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::AwaitingAuth => write!(f, "awaiting-auth"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Failed => write!(f, "failed"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Lock-free cell holding the current [`RelayStatus`]
#[derive(Debug, Default)]
pub(crate) struct AtomicRelayStatus {
    value: AtomicU8,
}

impl AtomicRelayStatus {
    pub(crate) fn set(&self, status: RelayStatus) {
        self.value.store(status as u8, Ordering::SeqCst);
    }

    pub(crate) fn load(&self) -> RelayStatus {
        match self.value.load(Ordering::SeqCst) {
            0 => RelayStatus::Initialized,
            1 => RelayStatus::Connecting,
            2 => RelayStatus::Connected,
            3 => RelayStatus::AwaitingAuth,
            4 => RelayStatus::Disconnected,
            5 => RelayStatus::Failed,
            _ => RelayStatus::Terminated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_round_trip() {
        let cell = AtomicRelayStatus::default();
        assert_eq!(cell.load(), RelayStatus::Initialized);
        for status in [
            RelayStatus::Connecting,
            RelayStatus::Connected,
            RelayStatus::AwaitingAuth,
            RelayStatus::Disconnected,
            RelayStatus::Failed,
            RelayStatus::Terminated,
        ] {
            cell.set(status);
            assert_eq!(cell.load(), status);
        }
    }

    #[test]
    fn connected_states() {
        assert!(RelayStatus::Connected.is_connected());
        assert!(RelayStatus::AwaitingAuth.is_connected());
        assert!(!RelayStatus::Disconnected.is_connected());
        assert!(RelayStatus::Failed.is_terminal());
        assert!(RelayStatus::Terminated.is_terminal());
    }
}
