// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Raw Relay messages

use serde_json::Value;

use crate::event::raw::RawEvent;
use crate::message::MessageHandleError;

/// Raw Relay Message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRelayMessage {
    /// `["EVENT", <subscription_id>, <event JSON>]` (NIP01)
    Event {
        /// Subscription ID
        subscription_id: String,
        /// Event JSON
        event: RawEvent,
    },
    /// `["OK", <event_id>, <true|false>, <message>]` (NIP01)
    Ok {
        /// Event ID
        event_id: String,
        /// Status
        status: bool,
        /// Message
        message: String,
    },
    /// `["EOSE", <subscription_id>]` (NIP01)
    EndOfStoredEvents(String),
    /// `["NOTICE", <message>]` (NIP01)
    Notice {
        /// Message
        message: String,
    },
    /// `["CLOSED", <subscription_id>, <message>]` (NIP01)
    Closed {
        /// Subscription ID
        subscription_id: String,
        /// Message
        message: String,
    },
    /// `["AUTH", <challenge-string>]` (NIP42)
    Auth {
        /// Challenge
        challenge: String,
    },
}

impl RawRelayMessage {
    /// Deserialize [`RawRelayMessage`] from [`Value`]
    pub fn from_value(msg: Value) -> Result<Self, MessageHandleError> {
        let v = msg
            .as_array()
            .ok_or(MessageHandleError::InvalidMessageFormat)?;

        if v.is_empty() {
            return Err(MessageHandleError::InvalidMessageFormat);
        }

        let v_len: usize = v.len();
        let v_type: &str = v[0]
            .as_str()
            .ok_or(MessageHandleError::InvalidMessageFormat)?;

        // Notice
        // Relay response format: ["NOTICE", <message>]
        if v_type == "NOTICE" {
            return if v_len >= 2 {
                Ok(Self::Notice {
                    message: serde_json::from_value(v[1].clone())?,
                })
            } else {
                Err(MessageHandleError::InvalidMessageFormat)
            };
        }

        // Closed
        // Relay response format: ["CLOSED", <subscription_id>, <message>]
        if v_type == "CLOSED" {
            return if v_len >= 3 {
                Ok(Self::Closed {
                    subscription_id: serde_json::from_value(v[1].clone())?,
                    message: serde_json::from_value(v[2].clone())?,
                })
            } else {
                Err(MessageHandleError::InvalidMessageFormat)
            };
        }

        // Event
        // Relay response format: ["EVENT", <subscription id>, <event JSON>]
        if v_type == "EVENT" {
            return if v_len >= 3 {
                Ok(Self::Event {
                    subscription_id: serde_json::from_value(v[1].clone())?,
                    event: serde_json::from_value(v[2].clone())?,
                })
            } else {
                Err(MessageHandleError::InvalidMessageFormat)
            };
        }

        // EOSE (NIP-15)
        // Relay response format: ["EOSE", <subscription_id>]
        if v_type == "EOSE" {
            return if v_len >= 2 {
                let subscription_id: String = serde_json::from_value(v[1].clone())?;
                Ok(Self::EndOfStoredEvents(subscription_id))
            } else {
                Err(MessageHandleError::InvalidMessageFormat)
            };
        }

        // OK (NIP-20)
        // Relay response format: ["OK", <event_id>, <true|false>, <message>]
        if v_type == "OK" {
            return if v_len >= 4 {
                Ok(Self::Ok {
                    event_id: serde_json::from_value(v[1].clone())?,
                    status: serde_json::from_value(v[2].clone())?,
                    message: serde_json::from_value(v[3].clone())?,
                })
            } else {
                Err(MessageHandleError::InvalidMessageFormat)
            };
        }

        // OK (NIP-42)
        // Relay response format: ["AUTH", <challenge>]
        if v_type == "AUTH" {
            return if v_len >= 2 {
                Ok(Self::Auth {
                    challenge: serde_json::from_value(v[1].clone())?,
                })
            } else {
                Err(MessageHandleError::InvalidMessageFormat)
            };
        }

        Err(MessageHandleError::InvalidMessageFormat)
    }

    /// Deserialize [`RawRelayMessage`] from JSON string
    #[inline]
    pub fn from_json<T>(json: T) -> Result<Self, MessageHandleError>
    where
        T: AsRef<[u8]>,
    {
        let msg: &[u8] = json.as_ref();

        if msg.is_empty() {
            return Err(MessageHandleError::EmptyMsg);
        }

        let value: Value = serde_json::from_slice(msg)?;
        Self::from_value(value)
    }
}
