//! Inbound response types and the response classifier
//!
//! The v3 push format carries no type tag, so a raw message is tried against
//! each known shape in a fixed priority order and the first shape that both
//! decodes and passes its validity check wins:
//!
//! 1. [`EventResponse`] - subscribe/unsubscribe/login acknowledgement
//! 2. [`DepthTableResponse`] - depth push with level deltas
//! 3. [`TableResponse`] - any other table push
//! 4. [`ErrorResponse`] - exchange error (`errorCode >= 30000`)
//! 5. the literal `pong`
//!
//! The message is parsed once into a JSON tree; cheap structural probes skip
//! shapes that cannot match before any typed decoding happens. A push whose
//! `table` names a depth channel is only ever a depth push: if it does not
//! decode as one it is unrecognized, never a generic table.

use crate::enums::DepthAction;
use crate::error::{ProtocolError, ProtocolResult};
use crate::level::RawLevel;
use crate::messages::PONG;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Smallest error code the exchange uses for error responses
pub const MIN_ERROR_CODE: i64 = 30000;

/// Lenient string: a missing or null field becomes empty
fn string_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Lenient list: a missing or null field becomes empty
fn vec_or_default<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// `success` arrives as a bool or as the strings "true"/"false"
fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        String(String),
    }

    Ok(match Option::<BoolOrString>::deserialize(deserializer)? {
        Some(BoolOrString::Bool(b)) => Some(b),
        Some(BoolOrString::String(s)) => Some(s.eq_ignore_ascii_case("true")),
        None => None,
    })
}

/// Shape-specific validity check applied after decoding
pub trait Validate {
    /// Returns true if the decoded value really is this shape
    fn is_valid(&self) -> bool;
}

/// Subscribe/unsubscribe/login acknowledgement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventResponse {
    /// Event name: subscribe, unsubscribe, login
    #[serde(default, deserialize_with = "string_or_default")]
    pub event: String,
    /// Acknowledged channel (`channel:filter`)
    #[serde(default, deserialize_with = "string_or_default")]
    pub channel: String,
    /// Outcome, present on login acknowledgements
    #[serde(
        default,
        deserialize_with = "lenient_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub success: Option<bool>,
}

impl EventResponse {
    /// Returns true if this acknowledges a subscription
    pub fn is_subscribe(&self) -> bool {
        self.event == "subscribe"
    }

    /// Returns true if this acknowledges a login
    pub fn is_login(&self) -> bool {
        self.event == "login"
    }
}

impl Validate for EventResponse {
    fn is_valid(&self) -> bool {
        (!self.event.is_empty() && !self.channel.is_empty()) || self.is_login()
    }
}

/// Generic table push
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableResponse {
    /// Table (channel) name
    #[serde(default, deserialize_with = "string_or_default")]
    pub table: String,
    /// Push action, often absent
    #[serde(default, deserialize_with = "string_or_default")]
    pub action: String,
    /// Channel-specific payload
    #[serde(default, deserialize_with = "vec_or_default")]
    pub data: Vec<Value>,
}

impl Validate for TableResponse {
    fn is_valid(&self) -> bool {
        (!self.table.is_empty() || !self.action.is_empty()) && !self.data.is_empty()
    }
}

/// Per-instrument payload of a depth push
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthUpdate {
    /// Instrument, e.g. `BTC-USDT`
    #[serde(default, deserialize_with = "string_or_default")]
    pub instrument_id: String,
    /// Ask levels (ascending)
    #[serde(default, deserialize_with = "vec_or_default")]
    pub asks: Vec<RawLevel>,
    /// Bid levels (descending)
    #[serde(default, deserialize_with = "vec_or_default")]
    pub bids: Vec<RawLevel>,
    /// Exchange timestamp
    #[serde(default, deserialize_with = "string_or_default")]
    pub timestamp: String,
    /// CRC32 of the top 25 levels after applying this payload
    #[serde(default)]
    pub checksum: i32,
}

/// Depth table push
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthTableResponse {
    /// Table name, contains "depth"
    #[serde(default, deserialize_with = "string_or_default")]
    pub table: String,
    /// "partial" or "update"
    #[serde(default, deserialize_with = "string_or_default")]
    pub action: String,
    /// Per-instrument payloads
    #[serde(default, deserialize_with = "vec_or_default")]
    pub data: Vec<DepthUpdate>,
}

impl DepthTableResponse {
    /// Parsed action
    pub fn depth_action(&self) -> DepthAction {
        DepthAction::parse(&self.action)
    }
}

impl Validate for DepthTableResponse {
    fn is_valid(&self) -> bool {
        (!self.table.is_empty() || !self.action.is_empty())
            && self.table.contains("depth")
            && !self.data.is_empty()
    }
}

/// Exchange error response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always "error"
    #[serde(default, deserialize_with = "string_or_default")]
    pub event: String,
    /// Human-readable message
    #[serde(default, deserialize_with = "string_or_default")]
    pub message: String,
    /// Numeric error code
    #[serde(default, rename = "errorCode")]
    pub error_code: i64,
}

impl Validate for ErrorResponse {
    fn is_valid(&self) -> bool {
        !self.event.is_empty() && !self.message.is_empty() && self.error_code >= MIN_ERROR_CODE
    }
}

/// A classified inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Subscription or login acknowledgement
    Event(EventResponse),
    /// Depth push
    DepthTable(DepthTableResponse),
    /// Any other table push
    Table(TableResponse),
    /// Exchange error
    Error(ErrorResponse),
    /// Keepalive reply
    Pong,
}

impl Response {
    /// Short name of the variant, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Event(_) => "event",
            Self::DepthTable(_) => "depth",
            Self::Table(_) => "table",
            Self::Error(_) => "error",
            Self::Pong => "pong",
        }
    }

    /// Table name for table pushes
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::DepthTable(r) => Some(&r.table),
            Self::Table(r) => Some(&r.table),
            _ => None,
        }
    }

    /// Depth push, if this is one
    pub fn as_depth(&self) -> Option<&DepthTableResponse> {
        match self {
            Self::DepthTable(r) => Some(r),
            _ => None,
        }
    }
}

type Decode = fn(&Value) -> Result<Option<Response>, serde_json::Error>;
type Probe = fn(&Value) -> bool;

fn decode_as<T>(value: &Value, wrap: fn(T) -> Response) -> Result<Option<Response>, serde_json::Error>
where
    T: DeserializeOwned + Validate,
{
    let decoded = T::deserialize(value)?;
    Ok(decoded.is_valid().then(|| wrap(decoded)))
}

fn decode_event(value: &Value) -> Result<Option<Response>, serde_json::Error> {
    decode_as(value, Response::Event)
}

fn decode_depth(value: &Value) -> Result<Option<Response>, serde_json::Error> {
    decode_as(value, Response::DepthTable)
}

fn decode_table(value: &Value) -> Result<Option<Response>, serde_json::Error> {
    decode_as(value, Response::Table)
}

fn decode_error(value: &Value) -> Result<Option<Response>, serde_json::Error> {
    decode_as(value, Response::Error)
}

fn has_event(value: &Value) -> bool {
    value.get("event").is_some()
}

fn has_depth_table(value: &Value) -> bool {
    value
        .get("table")
        .and_then(Value::as_str)
        .is_some_and(|table| table.contains("depth"))
}

fn has_data(value: &Value) -> bool {
    value.get("data").is_some()
}

struct Candidate {
    probe: Probe,
    decode: Decode,
    /// A matching probe rules out every later shape
    exclusive: bool,
}

/// Candidate shapes in priority order
const CANDIDATES: [Candidate; 4] = [
    Candidate {
        probe: has_event,
        decode: decode_event,
        exclusive: false,
    },
    Candidate {
        probe: has_depth_table,
        decode: decode_depth,
        exclusive: true,
    },
    Candidate {
        probe: has_data,
        decode: decode_table,
        exclusive: false,
    },
    Candidate {
        probe: has_event,
        decode: decode_error,
        exclusive: false,
    },
];

/// Classify a raw (already inflated) message
pub fn classify(raw: &[u8]) -> ProtocolResult<Response> {
    let value: Value = match serde_json::from_slice(raw) {
        Ok(value) => value,
        Err(e) => {
            if raw == PONG.as_bytes() {
                return Ok(Response::Pong);
            }
            return Err(unrecognized(raw, Some(e.to_string())));
        }
    };

    let mut last_error = None;
    for candidate in &CANDIDATES {
        if !(candidate.probe)(&value) {
            continue;
        }
        match (candidate.decode)(&value) {
            Ok(Some(response)) => return Ok(response),
            Ok(None) => {}
            Err(e) => last_error = Some(e.to_string()),
        }
        if candidate.exclusive {
            break;
        }
    }

    Err(unrecognized(raw, last_error))
}

fn unrecognized(raw: &[u8], last_error: Option<String>) -> ProtocolError {
    ProtocolError::Unrecognized {
        last_error,
        raw: String::from_utf8_lossy(raw).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_subscribe_ack() {
        let raw = br#"{"event":"subscribe","channel":"spot/depth:BTC-USDT"}"#;
        match classify(raw).unwrap() {
            Response::Event(evt) => {
                assert!(evt.is_subscribe());
                assert_eq!(evt.channel, "spot/depth:BTC-USDT");
            }
            other => panic!("Expected Event, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_login_without_channel() {
        let raw = br#"{"event":"login"}"#;
        match classify(raw).unwrap() {
            Response::Event(evt) => assert!(evt.is_login()),
            other => panic!("Expected Event, got {:?}", other),
        }

        let raw = br#"{"event":"login","success":true}"#;
        match classify(raw).unwrap() {
            Response::Event(evt) => assert_eq!(evt.success, Some(true)),
            other => panic!("Expected Event, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_pong() {
        assert_eq!(classify(b"pong").unwrap(), Response::Pong);
    }

    #[test]
    fn test_classify_depth_partial() {
        let raw = br#"{
            "table": "spot/depth",
            "action": "partial",
            "data": [{
                "instrument_id": "ETH-USDT",
                "asks": [["8.8", "96.99999966", "1"], ["9", "39", "3"]],
                "bids": [["7.8", "1", "1"]],
                "timestamp": "2019-03-06T09:41:53.536Z",
                "checksum": -1200119424
            }]
        }"#;

        match classify(raw).unwrap() {
            Response::DepthTable(depth) => {
                assert_eq!(depth.depth_action(), DepthAction::Partial);
                assert_eq!(depth.data[0].instrument_id, "ETH-USDT");
                assert_eq!(depth.data[0].asks.len(), 2);
                assert_eq!(depth.data[0].bids[0].price_text(), "7.8");
                assert_eq!(depth.data[0].checksum, -1200119424);
            }
            other => panic!("Expected DepthTable, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_generic_table() {
        let raw = br#"{"table":"spot/ticker","data":[{"instrument_id":"ETH-USDT","last":"8.8"}]}"#;
        match classify(raw).unwrap() {
            Response::Table(table) => {
                assert_eq!(table.table, "spot/ticker");
                assert_eq!(table.data.len(), 1);
            }
            other => panic!("Expected Table, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_depth_is_unrecognized() {
        let raw = br#"{"table":"spot/depth","action":"update","data":[{"instrument_id":"X","asks":[["1"]]}]}"#;
        match classify(raw) {
            Err(ProtocolError::Unrecognized { last_error, .. }) => assert!(last_error.is_some()),
            other => panic!("Expected Unrecognized, got {:?}", other),
        }

        let raw = br#"{"table":"spot/depth","action":"update","data":[{"instrument_id":"X","checksum":"abc"}]}"#;
        assert!(classify(raw).is_err());
    }

    #[test]
    fn test_depth_without_data_is_not_depth() {
        let raw = br#"{"table":"spot/depth","action":"update","data":[]}"#;
        assert!(classify(raw).is_err());
    }

    #[test]
    fn test_classify_error() {
        let raw = br#"{"event":"error","message":"Invalid sign","errorCode":30013}"#;
        match classify(raw).unwrap() {
            Response::Error(err) => {
                assert_eq!(err.error_code, 30013);
                assert_eq!(err.message, "Invalid sign");
            }
            other => panic!("Expected Error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_code_below_range_is_unrecognized() {
        let raw = br#"{"event":"error","message":"odd","errorCode":100}"#;
        assert!(matches!(
            classify(raw),
            Err(ProtocolError::Unrecognized { .. })
        ));
    }

    #[test]
    fn test_event_wins_over_table() {
        let raw = br#"{"event":"subscribe","channel":"spot/depth:BTC-USDT","table":"spot/depth","data":[{}]}"#;
        assert!(matches!(classify(raw).unwrap(), Response::Event(_)));
    }

    #[test]
    fn test_garbage_carries_decode_error() {
        match classify(b"not json") {
            Err(ProtocolError::Unrecognized { last_error, raw }) => {
                assert!(last_error.is_some());
                assert_eq!(raw, "not json");
            }
            other => panic!("Expected Unrecognized, got {:?}", other),
        }
    }

    #[test]
    fn test_type_mismatch_reports_last_error() {
        let raw = br#"{"event":5}"#;
        match classify(raw) {
            Err(ProtocolError::Unrecognized { last_error, .. }) => assert!(last_error.is_some()),
            other => panic!("Expected Unrecognized, got {:?}", other),
        }
    }

    #[test]
    fn test_null_fields_are_lenient() {
        let raw = br#"{"event":"subscribe","channel":"spot/ticker:BTC-USDT","success":null}"#;
        assert!(matches!(classify(raw).unwrap(), Response::Event(_)));
    }
}
