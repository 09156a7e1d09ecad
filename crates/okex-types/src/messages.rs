//! Outbound control messages

use crate::enums::Op;
use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Literal keepalive frame sent by the client
pub const PING: &str = "ping";

/// Literal keepalive reply sent by the exchange
pub const PONG: &str = "pong";

/// A subscription topic: `channel` or `channel:filter`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionTopic {
    channel: String,
    filter: Option<String>,
}

impl SubscriptionTopic {
    /// Create a topic, rejecting an empty channel
    pub fn new(channel: impl Into<String>, filter: Option<&str>) -> ProtocolResult<Self> {
        let channel = channel.into();
        if channel.is_empty() {
            return Err(ProtocolError::EmptyChannel);
        }
        Ok(Self {
            channel,
            filter: filter.filter(|f| !f.is_empty()).map(str::to_string),
        })
    }

    /// Channel name, e.g. `spot/depth`
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Filter, e.g. `BTC-USDT`
    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }
}

impl fmt::Display for SubscriptionTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filter {
            Some(filter) => write!(f, "{}:{}", self.channel, filter),
            None => f.write_str(&self.channel),
        }
    }
}

impl FromStr for SubscriptionTopic {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((channel, filter)) => Self::new(channel, Some(filter)),
            None => Self::new(s, None),
        }
    }
}

/// Control frame: `{"op": ..., "args": [...]}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMessage {
    /// Operation
    pub op: Op,
    /// Positional arguments
    pub args: Vec<String>,
}

impl ControlMessage {
    /// Subscribe to the given topics
    pub fn subscribe(topics: &[SubscriptionTopic]) -> Self {
        Self {
            op: Op::Subscribe,
            args: topics.iter().map(ToString::to_string).collect(),
        }
    }

    /// Unsubscribe from the given topics
    pub fn unsubscribe(topics: &[SubscriptionTopic]) -> Self {
        Self {
            op: Op::Unsubscribe,
            args: topics.iter().map(ToString::to_string).collect(),
        }
    }

    /// Login; argument order is fixed by the exchange
    pub fn login(api_key: &str, passphrase: &str, timestamp: &str, signature: &str) -> Self {
        Self {
            op: Op::Login,
            args: vec![
                api_key.to_string(),
                passphrase.to_string(),
                timestamp.to_string(),
                signature.to_string(),
            ],
        }
    }

    /// Serialize to the JSON text frame
    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
