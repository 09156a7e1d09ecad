//! BTreeMap-based depth storage
//!
//! Provides O(log N) operations for book management.
//! Uses `Reverse<Decimal>` for bids to maintain descending order.

use okex_types::{PriceLevel, Side};
use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// Both sides of a book, keyed by price
///
/// - Bids: Stored with `Reverse<Decimal>` key for descending order (highest first)
/// - Asks: Stored with `Decimal` key for ascending order (lowest first)
#[derive(Debug, Clone, Default)]
pub struct BookSides {
    bids: BTreeMap<Reverse<Decimal>, PriceLevel>,
    asks: BTreeMap<Decimal, PriceLevel>,
}

impl BookSides {
    /// Create an empty book
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a level, returning the level it replaced
    pub fn upsert(&mut self, side: Side, level: PriceLevel) -> Option<PriceLevel> {
        match side {
            Side::Bid => self.bids.insert(Reverse(level.price), level),
            Side::Ask => self.asks.insert(level.price, level),
        }
    }

    /// Remove a level by price, returning it if it was present
    pub fn remove(&mut self, side: Side, price: &Decimal) -> Option<PriceLevel> {
        match side {
            Side::Bid => self.bids.remove(&Reverse(*price)),
            Side::Ask => self.asks.remove(price),
        }
    }

    /// Apply one delta: zero size removes the price, anything else upserts
    ///
    /// Returns the level previously stored at that price.
    pub fn apply(&mut self, side: Side, level: PriceLevel) -> Option<PriceLevel> {
        if level.is_removal() {
            self.remove(side, &level.price)
        } else {
            self.upsert(side, level)
        }
    }

    /// Put back the state of one price as it was before a delta
    pub fn restore(&mut self, side: Side, price: Decimal, previous: Option<PriceLevel>) {
        match previous {
            Some(level) => {
                self.upsert(side, level);
            }
            None => {
                self.remove(side, &price);
            }
        }
    }

    /// Get the best bid (highest price)
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.values().next()
    }

    /// Get the best ask (lowest price)
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.values().next()
    }

    /// Returns the best bid and ask prices if the book is crossed
    pub fn crossed(&self) -> Option<(Decimal, Decimal)> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) if bid.price >= ask.price => Some((bid.price, ask.price)),
            _ => None,
        }
    }

    /// Iterator over bids (highest to lowest price)
    pub fn bids(&self) -> impl Iterator<Item = &PriceLevel> {
        self.bids.values()
    }

    /// Iterator over asks (lowest to highest price)
    pub fn asks(&self) -> impl Iterator<Item = &PriceLevel> {
        self.asks.values()
    }

    /// Get top N bids
    pub fn top_bids(&self, n: usize) -> Vec<PriceLevel> {
        self.bids.values().take(n).cloned().collect()
    }

    /// Get top N asks
    pub fn top_asks(&self, n: usize) -> Vec<PriceLevel> {
        self.asks.values().take(n).cloned().collect()
    }

    /// Number of bid levels
    pub fn bid_count(&self) -> usize {
        self.bids.len()
    }

    /// Number of ask levels
    pub fn ask_count(&self) -> usize {
        self.asks.len()
    }

    /// Check if the book is empty
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Clear all levels
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }
}
