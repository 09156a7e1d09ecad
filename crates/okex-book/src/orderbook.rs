//! Per-instrument book reconciliation
//!
//! Manages one instrument's book and verifies every mutation against the
//! checksum carried by the push.
//!
//! # State Machine
//!
//! ```text
//! (absent) --snapshot ok--> Synced <--snapshot or verified update-- Desynchronized
//!                             |                                           ^
//!                             +-------------rejected update---------------+
//! ```
//!
//! A book never holds unverified state: a snapshot is built aside and only
//! installed once its checksum matches, and an update that fails verification
//! is rolled back level by level.

use crate::checksum::{checksum_of_payload, checksum_payload, compute_checksum};
use crate::error::{BookError, BookResult};
use crate::storage::BookSides;
use okex_types::{DepthUpdate, PriceLevel, RawLevel, Side};
use rust_decimal::Decimal;
use serde::Serialize;

/// Book synchronization state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookState {
    /// Last push was verified
    #[default]
    Synced,
    /// The last update was rejected
    Desynchronized,
}

/// Result of applying a push to a book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
    /// The book was (re)built from a snapshot
    Snapshot,
    /// A delta update was merged
    Update,
}

/// One instrument's depth book
#[derive(Debug, Clone)]
pub struct InstrumentBook {
    instrument_id: String,
    sides: BookSides,
    timestamp: String,
    checksum: i32,
    state: BookState,
}

fn parse_side(instrument: &str, levels: &[RawLevel]) -> BookResult<Vec<PriceLevel>> {
    levels
        .iter()
        .map(|raw| {
            raw.parse().map_err(|source| BookError::InvalidLevel {
                instrument: instrument.to_string(),
                source,
            })
        })
        .collect()
}

impl InstrumentBook {
    /// Build a book from a full snapshot
    ///
    /// The snapshot is loaded into a fresh book and verified before it is
    /// returned; on failure nothing is kept.
    pub fn from_snapshot(update: &DepthUpdate) -> BookResult<Self> {
        let asks = parse_side(&update.instrument_id, &update.asks)?;
        let bids = parse_side(&update.instrument_id, &update.bids)?;

        let mut sides = BookSides::new();
        for level in asks {
            sides.apply(Side::Ask, level);
        }
        for level in bids {
            sides.apply(Side::Bid, level);
        }

        let book = Self {
            instrument_id: update.instrument_id.clone(),
            sides,
            timestamp: update.timestamp.clone(),
            checksum: update.checksum,
            state: BookState::Synced,
        };
        book.verify(update.checksum)?;
        Ok(book)
    }

    /// Merge an incremental update
    ///
    /// All levels are parsed before anything is touched. Asks are applied
    /// before bids; a zero size removes the price. If the result is crossed
    /// or its checksum differs from the push, every change is undone, the
    /// book is marked [`BookState::Desynchronized`] and the error returned.
    /// A verified update marks the book [`BookState::Synced`] again.
    pub fn apply_update(&mut self, update: &DepthUpdate) -> BookResult<ApplyResult> {
        let asks = parse_side(&self.instrument_id, &update.asks)?;
        let bids = parse_side(&self.instrument_id, &update.bids)?;

        let mut undo: Vec<(Side, Decimal, Option<PriceLevel>)> =
            Vec::with_capacity(asks.len() + bids.len());
        let deltas = asks
            .into_iter()
            .map(|level| (Side::Ask, level))
            .chain(bids.into_iter().map(|level| (Side::Bid, level)));
        for (side, level) in deltas {
            let price = level.price;
            let previous = self.sides.apply(side, level);
            undo.push((side, price, previous));
        }

        if let Err(e) = self.verify(update.checksum) {
            for (side, price, previous) in undo.into_iter().rev() {
                self.sides.restore(side, price, previous);
            }
            self.state = BookState::Desynchronized;
            return Err(e);
        }

        self.checksum = update.checksum;
        self.timestamp = update.timestamp.clone();
        self.state = BookState::Synced;
        Ok(ApplyResult::Update)
    }

    /// Check the current levels against an expected checksum
    fn verify(&self, expected: i32) -> BookResult<()> {
        if let Some((bid, ask)) = self.sides.crossed() {
            return Err(BookError::Crossed {
                instrument: self.instrument_id.clone(),
                bid,
                ask,
            });
        }

        let payload = checksum_payload(self.sides.bids(), self.sides.asks());
        let computed = checksum_of_payload(&payload);
        if computed != expected {
            return Err(BookError::ChecksumMismatch {
                instrument: self.instrument_id.clone(),
                expected,
                computed,
                payload,
            });
        }
        Ok(())
    }

    /// Get the instrument id
    pub fn instrument_id(&self) -> &str {
        &self.instrument_id
    }

    /// Get the current state
    pub fn state(&self) -> BookState {
        self.state
    }

    /// Check if the book is synchronized
    pub fn is_synced(&self) -> bool {
        self.state == BookState::Synced
    }

    /// Get the last verified checksum
    pub fn checksum(&self) -> i32 {
        self.checksum
    }

    /// Exchange timestamp of the last verified push
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Checksum of the levels currently held
    pub fn local_checksum(&self) -> i32 {
        compute_checksum(self.sides.bids(), self.sides.asks())
    }

    /// Get the best bid
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.sides.best_bid()
    }

    /// Get the best ask
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.sides.best_ask()
    }

    /// Get the spread (ask - bid)
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_ask(), self.best_bid()) {
            (Some(ask), Some(bid)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// Get the mid price ((ask + bid) / 2)
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_ask(), self.best_bid()) {
            (Some(ask), Some(bid)) => Some((ask.price + bid.price) / Decimal::TWO),
            _ => None,
        }
    }

    /// Get top N bids
    pub fn top_bids(&self, n: usize) -> Vec<PriceLevel> {
        self.sides.top_bids(n)
    }

    /// Get top N asks
    pub fn top_asks(&self, n: usize) -> Vec<PriceLevel> {
        self.sides.top_asks(n)
    }

    /// Number of bid levels
    pub fn bid_count(&self) -> usize {
        self.sides.bid_count()
    }

    /// Number of ask levels
    pub fn ask_count(&self) -> usize {
        self.sides.ask_count()
    }

    /// Capture current state as a snapshot
    pub fn snapshot(&self) -> DepthSnapshot {
        DepthSnapshot {
            instrument_id: self.instrument_id.clone(),
            bids: self.sides.bids().cloned().collect(),
            asks: self.sides.asks().cloned().collect(),
            timestamp: self.timestamp.clone(),
            checksum: self.checksum,
            state: self.state,
        }
    }
}

/// Immutable copy of a book
#[derive(Debug, Clone, Default, Serialize)]
pub struct DepthSnapshot {
    /// Instrument id
    pub instrument_id: String,
    /// Bid levels, best first
    pub bids: Vec<PriceLevel>,
    /// Ask levels, best first
    pub asks: Vec<PriceLevel>,
    /// Exchange timestamp of the last verified push
    pub timestamp: String,
    /// Checksum at time of snapshot
    pub checksum: i32,
    /// State at time of snapshot
    pub state: BookState,
}

impl DepthSnapshot {
    /// Get the best bid price
    pub fn best_bid_price(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    /// Get the best ask price
    pub fn best_ask_price(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Get the spread
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_ask_price(), self.best_bid_price()) {
            (Some(ask), Some(bid)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Get the mid price
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_ask_price(), self.best_bid_price()) {
            (Some(ask), Some(bid)) => Some((ask + bid) / Decimal::TWO),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn raw(pairs: &[(&str, &str)]) -> Vec<RawLevel> {
        pairs.iter().map(|(p, s)| RawLevel::new(*p, *s)).collect()
    }

    /// Build a push whose checksum matches the given resulting book
    fn push(
        instrument: &str,
        bids: &[(&str, &str)],
        asks: &[(&str, &str)],
        checksum: i32,
    ) -> DepthUpdate {
        DepthUpdate {
            instrument_id: instrument.to_string(),
            bids: raw(bids),
            asks: raw(asks),
            timestamp: "2019-03-06T09:41:53.536Z".to_string(),
            checksum,
        }
    }

    fn checksum_of(bids: &[(&str, &str)], asks: &[(&str, &str)]) -> i32 {
        compute_checksum(&raw(bids), &raw(asks))
    }

    fn seeded() -> InstrumentBook {
        let bids = [("100", "1"), ("99", "2")];
        let asks = [("101", "1"), ("102", "2")];
        InstrumentBook::from_snapshot(&push("BTC-USDT", &bids, &asks, checksum_of(&bids, &asks)))
            .unwrap()
    }

    #[test]
    fn test_snapshot_builds_sorted_book() {
        let book = seeded();
        assert_eq!(book.state(), BookState::Synced);
        assert_eq!(book.best_bid().map(|l| l.price), Some(dec!(100)));
        assert_eq!(book.best_ask().map(|l| l.price), Some(dec!(101)));
        assert_eq!(book.spread(), Some(dec!(1)));
        assert_eq!(book.mid_price(), Some(dec!(100.5)));
        assert_eq!(book.local_checksum(), book.checksum());
    }

    #[test]
    fn test_snapshot_checksum_mismatch() {
        let update = push("BTC-USDT", &[("100", "1")], &[("101", "1")], 12345);
        match InstrumentBook::from_snapshot(&update) {
            Err(BookError::ChecksumMismatch {
                expected, payload, ..
            }) => {
                assert_eq!(expected, 12345);
                assert_eq!(payload, "100:1:101:1");
            }
            other => panic!("Expected ChecksumMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_update_zero_size_removes() {
        let mut book = seeded();
        let checksum = checksum_of(&[("100", "1")], &[("101", "1"), ("102", "2")]);

        let result = book
            .apply_update(&push("BTC-USDT", &[("99", "0")], &[], checksum))
            .unwrap();

        assert_eq!(result, ApplyResult::Update);
        assert_eq!(book.bid_count(), 1);
        assert_eq!(book.checksum(), checksum);
    }

    #[test]
    fn test_update_upserts_and_inserts() {
        let mut book = seeded();
        let bids = [("100.5", "3"), ("100", "4"), ("99", "2")];
        let asks = [("101", "1"), ("102", "2")];
        let checksum = checksum_of(&bids, &asks);

        book.apply_update(&push("BTC-USDT", &[("100", "4"), ("100.5", "3")], &[], checksum))
            .unwrap();

        let top: Vec<_> = book.top_bids(3).into_iter().map(|l| l.size).collect();
        assert_eq!(top, vec![dec!(3), dec!(4), dec!(2)]);
    }

    #[test]
    fn test_mismatch_rolls_back_everything() {
        let mut book = seeded();
        let before = book.snapshot();

        let err = book
            .apply_update(&push(
                "BTC-USDT",
                &[("99", "0"), ("98", "5")],
                &[("101", "7")],
                before.checksum.wrapping_add(1),
            ))
            .unwrap_err();

        assert!(matches!(err, BookError::ChecksumMismatch { .. }));
        assert_eq!(book.state(), BookState::Desynchronized);
        assert_eq!(book.checksum(), before.checksum);
        assert_eq!(book.timestamp(), before.timestamp);
        let after = book.snapshot();
        assert_eq!(after.bids, before.bids);
        assert_eq!(after.asks, before.asks);
    }

    #[test]
    fn test_verified_update_resyncs_after_rejection() {
        let mut book = seeded();
        let checksum = book.checksum();
        book.apply_update(&push("BTC-USDT", &[("99", "3")], &[], checksum.wrapping_add(1)))
            .unwrap_err();
        assert_eq!(book.state(), BookState::Desynchronized);

        let after = checksum_of(&[("100", "1")], &[("101", "1"), ("102", "2")]);
        book.apply_update(&push("BTC-USDT", &[("99", "0")], &[], after))
            .unwrap();

        assert!(book.is_synced());
        assert_eq!(book.snapshot().state, BookState::Synced);
        assert_eq!(book.checksum(), after);
    }

    #[test]
    fn test_crossed_update_is_rejected() {
        let mut book = seeded();
        let bids = [("101", "1"), ("100", "1"), ("99", "2")];
        let asks = [("101", "1"), ("102", "2")];
        // Even a matching checksum cannot make a crossed book acceptable
        let checksum = checksum_of(&bids, &asks);

        let err = book
            .apply_update(&push("BTC-USDT", &[("101", "1")], &[], checksum))
            .unwrap_err();

        assert!(matches!(err, BookError::Crossed { .. }));
        assert_eq!(book.bid_count(), 2);
        assert!(!book.is_synced());
    }

    #[test]
    fn test_invalid_level_aborts_before_mutation() {
        let mut book = seeded();
        let before = book.snapshot();

        let err = book
            .apply_update(&push("BTC-USDT", &[("98", "1")], &[("abc", "1")], 0))
            .unwrap_err();

        assert!(matches!(err, BookError::InvalidLevel { .. }));
        assert_eq!(book.snapshot().bids, before.bids);
        assert_eq!(book.state(), BookState::Synced);
    }

    #[test]
    fn test_zero_delta_update_is_idempotent() {
        let mut book = seeded();
        let before = book.snapshot();

        for _ in 0..3 {
            book.apply_update(&push("BTC-USDT", &[], &[], before.checksum))
                .unwrap();
        }

        let after = book.snapshot();
        assert_eq!(after.bids, before.bids);
        assert_eq!(after.asks, before.asks);
    }

    #[test]
    fn test_removing_absent_price_is_noop() {
        let mut book = seeded();
        let checksum = book.checksum();
        book.apply_update(&push("BTC-USDT", &[("50", "0")], &[("500", "0")], checksum))
            .unwrap();
        assert_eq!(book.bid_count(), 2);
        assert_eq!(book.ask_count(), 2);
    }

    #[test]
    fn test_snapshot_helpers() {
        let snap = seeded().snapshot();
        assert_eq!(snap.best_bid_price(), Some(dec!(100)));
        assert_eq!(snap.best_ask_price(), Some(dec!(101)));
        assert_eq!(snap.spread(), Some(dec!(1)));
        assert_eq!(compute_checksum(&snap.bids, &snap.asks), snap.checksum);
    }
}
