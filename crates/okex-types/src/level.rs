//! Price level types
//!
//! Depth pushes carry levels as JSON arrays: `[price, size, extra...]`.
//! [`RawLevel`] keeps the price and size exactly as the exchange sent them,
//! because the book checksum is computed over that text. [`PriceLevel`] adds
//! the parsed decimal values used for ordering and removal.

use crate::error::{ProtocolError, ProtocolResult};
use rust_decimal::Decimal;
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A price level as received on the wire
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawLevel {
    price: String,
    size: String,
    extra: Vec<serde_json::Value>,
}

impl RawLevel {
    /// Create a level from price and size text
    pub fn new(price: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            price: price.into(),
            size: size.into(),
            extra: Vec::new(),
        }
    }

    /// Attach trailing fields (order counts and similar)
    pub fn with_extra(mut self, extra: Vec<serde_json::Value>) -> Self {
        self.extra = extra;
        self
    }

    /// Price exactly as received
    pub fn price_text(&self) -> &str {
        &self.price
    }

    /// Size exactly as received
    pub fn size_text(&self) -> &str {
        &self.size
    }

    /// Fields after price and size, passed through untouched
    pub fn extra(&self) -> &[serde_json::Value] {
        &self.extra
    }

    /// Parse into a [`PriceLevel`]
    pub fn parse(&self) -> ProtocolResult<PriceLevel> {
        PriceLevel::parse(self.clone())
    }
}

/// Render a JSON scalar the way the checksum expects it.
///
/// Strings are used verbatim. Numbers go through `f64` and its shortest
/// round-trip form, so `100.0` becomes `"100"`.
fn level_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => n.as_f64().map(|f| f.to_string()),
        _ => None,
    }
}

impl<'de> Deserialize<'de> for RawLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RawLevelVisitor;

        impl<'de> Visitor<'de> for RawLevelVisitor {
            type Value = RawLevel;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an array [price, size, ...]")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<RawLevel, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let price: serde_json::Value = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let size: serde_json::Value = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;

                let price = level_text(&price)
                    .ok_or_else(|| de::Error::custom("price must be a string or number"))?;
                let size = level_text(&size)
                    .ok_or_else(|| de::Error::custom("size must be a string or number"))?;

                let mut extra = Vec::new();
                while let Some(value) = seq.next_element::<serde_json::Value>()? {
                    extra.push(value);
                }

                Ok(RawLevel { price, size, extra })
            }
        }

        deserializer.deserialize_seq(RawLevelVisitor)
    }
}

impl Serialize for RawLevel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(2 + self.extra.len()))?;
        seq.serialize_element(&self.price)?;
        seq.serialize_element(&self.size)?;
        for value in &self.extra {
            seq.serialize_element(value)?;
        }
        seq.end()
    }
}

/// A parsed price level
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceLevel {
    /// Price of this level
    pub price: Decimal,
    /// Size at this price level
    pub size: Decimal,
    /// Wire form, kept for checksums and pass-through fields
    #[serde(skip)]
    pub raw: RawLevel,
}

impl PriceLevel {
    /// Parse price and size out of a raw level
    ///
    /// Text that is not a finite decimal number is rejected.
    pub fn parse(raw: RawLevel) -> ProtocolResult<Self> {
        let price = parse_decimal(&raw.price)
            .ok_or_else(|| ProtocolError::invalid_number("price", raw.price.clone()))?;
        let size = parse_decimal(&raw.size)
            .ok_or_else(|| ProtocolError::invalid_number("size", raw.size.clone()))?;
        Ok(Self { price, size, raw })
    }

    /// Check if this level has zero size (should be removed)
    pub fn is_removal(&self) -> bool {
        self.size.is_zero()
    }

    /// Price exactly as received
    pub fn price_text(&self) -> &str {
        self.raw.price_text()
    }

    /// Size exactly as received
    pub fn size_text(&self) -> &str {
        self.raw.size_text()
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}
