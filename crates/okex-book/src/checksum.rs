//! CRC32 checksum validation for depth book integrity
//!
//! # Algorithm
//!
//! 1. Take the top 25 levels of each side (bids high to low, asks low to high)
//! 2. If both sides have the same number of levels, interleave them per index
//!    as `bidPrice:bidSize:askPrice:askSize`
//! 3. Otherwise list every bid as `price:size`, then every ask
//! 4. Join everything with `:` and apply standard CRC32 (IEEE)
//! 5. Reinterpret the unsigned result as a signed 32-bit integer
//!
//! Prices and sizes are hashed in their textual wire form, never re-formatted,
//! so `"0.10"` and `"0.1"` hash differently.

use okex_types::{PriceLevel, RawLevel};

/// Number of levels per side covered by the checksum
pub const CHECKSUM_DEPTH: usize = 25;

/// A level that exposes its wire text for hashing
pub trait ChecksumLevel {
    /// Price text as received
    fn price_text(&self) -> &str;
    /// Size text as received
    fn size_text(&self) -> &str;
}

impl ChecksumLevel for RawLevel {
    fn price_text(&self) -> &str {
        RawLevel::price_text(self)
    }

    fn size_text(&self) -> &str {
        RawLevel::size_text(self)
    }
}

impl ChecksumLevel for PriceLevel {
    fn price_text(&self) -> &str {
        PriceLevel::price_text(self)
    }

    fn size_text(&self) -> &str {
        PriceLevel::size_text(self)
    }
}

impl<T: ChecksumLevel + ?Sized> ChecksumLevel for &T {
    fn price_text(&self) -> &str {
        (**self).price_text()
    }

    fn size_text(&self) -> &str {
        (**self).size_text()
    }
}

/// Build the string the checksum is computed over
///
/// # Arguments
///
/// * `bids` - Bid levels sorted high to low (best bid first)
/// * `asks` - Ask levels sorted low to high (best ask first)
pub fn checksum_payload<B, A>(bids: B, asks: A) -> String
where
    B: IntoIterator,
    B::Item: ChecksumLevel,
    A: IntoIterator,
    A::Item: ChecksumLevel,
{
    let bids: Vec<B::Item> = bids.into_iter().take(CHECKSUM_DEPTH).collect();
    let asks: Vec<A::Item> = asks.into_iter().take(CHECKSUM_DEPTH).collect();

    let mut parts: Vec<&str> = Vec::with_capacity(2 * (bids.len() + asks.len()));
    if bids.len() == asks.len() {
        for (bid, ask) in bids.iter().zip(&asks) {
            parts.extend([
                bid.price_text(),
                bid.size_text(),
                ask.price_text(),
                ask.size_text(),
            ]);
        }
    } else {
        for bid in &bids {
            parts.extend([bid.price_text(), bid.size_text()]);
        }
        for ask in &asks {
            parts.extend([ask.price_text(), ask.size_text()]);
        }
    }

    parts.join(":")
}

/// CRC32 of a checksum payload, as the signed value the exchange sends
pub fn checksum_of_payload(payload: &str) -> i32 {
    crc32fast::hash(payload.as_bytes()) as i32
}

/// Compute the exchange checksum over the top levels of a book
pub fn compute_checksum<B, A>(bids: B, asks: A) -> i32
where
    B: IntoIterator,
    B::Item: ChecksumLevel,
    A: IntoIterator,
    A::Item: ChecksumLevel,
{
    checksum_of_payload(&checksum_payload(bids, asks))
}
