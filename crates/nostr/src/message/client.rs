// Copyright (c) 2021 Paul Miller
// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Client messages

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};

use super::subscription::SubscriptionId;
use super::MessageHandleError;
use crate::util::JsonUtil;
use crate::{Event, Filter};

/// Messages sent by clients, received by relays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// `["EVENT", <event JSON>]`
    Event(Box<Event>),
    /// `["REQ", <subscription_id>, <filters JSON>...]`
    Req {
        /// Subscription ID
        subscription_id: SubscriptionId,
        /// Filters
        filters: Vec<Filter>,
    },
    /// `["CLOSE", <subscription_id>]`
    Close(SubscriptionId),
    /// `["AUTH", <event JSON>]` (NIP-42)
    Auth(Box<Event>),
}

impl ClientMessage {
    /// Create `EVENT` message
    pub fn event(event: Event) -> Self {
        Self::Event(Box::new(event))
    }

    /// Create `REQ` message
    pub fn req(subscription_id: SubscriptionId, filters: Vec<Filter>) -> Self {
        Self::Req {
            subscription_id,
            filters,
        }
    }

    /// Create `CLOSE` message
    pub fn close(subscription_id: SubscriptionId) -> Self {
        Self::Close(subscription_id)
    }

    /// Create `AUTH` message
    pub fn auth(event: Event) -> Self {
        Self::Auth(Box::new(event))
    }

    fn as_value(&self) -> Value {
        match self {
            Self::Event(event) => json!(["EVENT", event]),
            Self::Req {
                subscription_id,
                filters,
            } => {
                let mut value = json!(["REQ", subscription_id]);
                if let Value::Array(ref mut array) = value {
                    for filter in filters {
                        array.push(filter.to_wire());
                    }
                }
                value
            }
            Self::Close(subscription_id) => json!(["CLOSE", subscription_id]),
            Self::Auth(event) => json!(["AUTH", event]),
        }
    }
}

impl Serialize for ClientMessage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.as_value().serialize(serializer)
    }
}

impl JsonUtil for ClientMessage {
    type Err = MessageHandleError;
}

impl TryFrom<Value> for ClientMessage {
    type Error = MessageHandleError;

    fn try_from(msg: Value) -> Result<Self, Self::Error> {
        let array = msg.as_array().ok_or(MessageHandleError::InvalidMessageFormat)?;
        if array.is_empty() {
            return Err(MessageHandleError::InvalidMessageFormat);
        }

        let msg_type: &str = array[0].as_str().ok_or(MessageHandleError::InvalidMessageFormat)?;

        match msg_type {
            "EVENT" if array.len() >= 2 => {
                let event: Event = serde_json::from_value(array[1].clone())?;
                Ok(Self::event(event))
            }
            "REQ" if array.len() >= 2 => {
                let subscription_id: String = serde_json::from_value(array[1].clone())?;
                let filters = array[2..]
                    .iter()
                    .map(|v| serde_json::from_value(v.clone()))
                    .collect::<Result<Vec<Filter>, _>>()?;
                Ok(Self::req(SubscriptionId::new(subscription_id), filters))
            }
            "CLOSE" if array.len() >= 2 => {
                let subscription_id: String = serde_json::from_value(array[1].clone())?;
                Ok(Self::close(SubscriptionId::new(subscription_id)))
            }
            "AUTH" if array.len() >= 2 => {
                let event: Event = serde_json::from_value(array[1].clone())?;
                Ok(Self::auth(event))
            }
            _ => Err(MessageHandleError::InvalidMessageFormat),
        }
    }
}

impl<'de> Deserialize<'de> for ClientMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        ClientMessage::try_from(value).map_err(serde::de::Error::custom)
    }
}
