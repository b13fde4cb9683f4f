// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay error

use std::time::Duration;

use nostr::message::MessageHandleError;

use crate::transport::TransportError;

/// Relay error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport failure (dial, socket closed, frame error)
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Wire message could not be parsed
    #[error(transparent)]
    MessageHandle(#[from] MessageHandleError),
    /// The relay answered `OK` with `accepted = false`
    #[error("event rejected: {0}")]
    EventRejected(String),
    /// No `OK`/response arrived within the deadline
    #[error("relay did not respond within {0:?}")]
    Timeout(Duration),
    /// Frames cannot be sent in the current connection state
    #[error("relay is not connected")]
    NotConnected,
    /// The outbound queue is full; the frame was not enqueued
    #[error("outbound write queue is full")]
    WriteQueueFull,
    /// The relay closed the subscription
    #[error("subscription closed by relay: {0}")]
    SubscriptionClosed(String),
    /// No signer is configured for an operation that must sign (NIP-42 AUTH)
    #[error("signer not configured")]
    SignerNotConfigured,
    /// Signer call failed
    #[error("signer: {0}")]
    Signer(String),
    /// NIP-42 authentication was attempted and refused
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    /// The relay sent no AUTH challenge, so there is nothing to respond to
    #[error("no authentication challenge received")]
    NoAuthChallenge,
    /// Event construction during AUTH/PoW failed
    #[error("event: {0}")]
    Event(String),
}
