//! Table registry: per-table collections of instrument books
//!
//! Depth pushes name a table (`spot/depth`, `futures/depth_l2_tbt`, ...) and
//! carry payloads for one or more instruments. [`DepthRegistry`] creates the
//! [`TableBooks`] for a table on first sight and routes every payload to the
//! instrument's [`InstrumentBook`]. A failing instrument never stops the
//! others; failures are collected in the [`RouteReport`].

use crate::error::{BookError, BookResult};
use crate::orderbook::{ApplyResult, DepthSnapshot, InstrumentBook};
use okex_types::{DepthAction, DepthTableResponse, DepthUpdate};
use std::collections::HashMap;

/// Outcome of routing one depth push
#[derive(Debug, Default)]
pub struct RouteReport {
    /// Action of the push
    pub action: DepthAction,
    /// Instruments that reconciled, with how
    pub applied: Vec<(String, ApplyResult)>,
    /// Instruments that failed
    pub failures: Vec<BookError>,
}

impl RouteReport {
    fn new(action: DepthAction) -> Self {
        Self {
            action,
            ..Self::default()
        }
    }

    /// Returns true if the push was not reconciled at all (unknown action)
    pub fn is_passthrough(&self) -> bool {
        !self.action.is_reconciled()
    }

    /// Returns true if no instrument failed
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns true if the instrument reconciled successfully
    pub fn reconciled(&self, instrument_id: &str) -> bool {
        self.applied.iter().any(|(id, _)| id == instrument_id)
    }
}

/// Books for every instrument of one table
#[derive(Debug, Clone)]
pub struct TableBooks {
    table: String,
    books: HashMap<String, InstrumentBook>,
}

impl TableBooks {
    /// Create an empty set for a table
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            books: HashMap::new(),
        }
    }

    /// Table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Book for an instrument
    pub fn get(&self, instrument_id: &str) -> Option<&InstrumentBook> {
        self.books.get(instrument_id)
    }

    /// Instruments with a book
    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.books.keys().map(String::as_str)
    }

    /// Number of books
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// Check if there are no books
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// Drop every book
    pub fn clear(&mut self) {
        self.books.clear();
    }

    /// Route a depth push to the instrument books
    ///
    /// `partial` rebuilds the instrument from scratch, `update` merges into
    /// the existing book (or builds one from the delta if there is none yet).
    /// Other actions are passed through untouched.
    pub fn route(&mut self, response: &DepthTableResponse) -> BookResult<RouteReport> {
        if response.table != self.table {
            return Err(BookError::TableMismatch {
                expected: self.table.clone(),
                actual: response.table.clone(),
            });
        }

        let action = response.depth_action();
        let mut report = RouteReport::new(action);
        if !action.is_reconciled() {
            return Ok(report);
        }

        for update in &response.data {
            if update.instrument_id.is_empty() {
                report.failures.push(BookError::MissingInstrument {
                    table: self.table.clone(),
                });
                continue;
            }

            match self.apply(action, update) {
                Ok(result) => report.applied.push((update.instrument_id.clone(), result)),
                Err(e) => report.failures.push(e),
            }
        }

        Ok(report)
    }

    fn apply(&mut self, action: DepthAction, update: &DepthUpdate) -> BookResult<ApplyResult> {
        if action == DepthAction::Update {
            if let Some(book) = self.books.get_mut(&update.instrument_id) {
                return book.apply_update(update);
            }
        }

        // Snapshot path: the old book goes away whether or not the new one verifies
        self.books.remove(&update.instrument_id);
        let book = InstrumentBook::from_snapshot(update)?;
        self.books.insert(update.instrument_id.clone(), book);
        Ok(ApplyResult::Snapshot)
    }
}

/// Every table's books for one session
#[derive(Debug, Clone, Default)]
pub struct DepthRegistry {
    tables: HashMap<String, TableBooks>,
}

impl DepthRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a depth push, creating the table's books on first sight
    pub fn route(&mut self, response: &DepthTableResponse) -> BookResult<RouteReport> {
        self.tables
            .entry(response.table.clone())
            .or_insert_with(|| TableBooks::new(response.table.clone()))
            .route(response)
    }

    /// Books of one table
    pub fn table(&self, table: &str) -> Option<&TableBooks> {
        self.tables.get(table)
    }

    /// Book for an instrument in a table
    pub fn book(&self, table: &str, instrument_id: &str) -> Option<&InstrumentBook> {
        self.tables.get(table)?.get(instrument_id)
    }

    /// Snapshot of an instrument's book
    pub fn snapshot(&self, table: &str, instrument_id: &str) -> Option<DepthSnapshot> {
        self.book(table, instrument_id).map(InstrumentBook::snapshot)
    }

    /// Names of tables seen so far
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Number of tables
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Check if no table has been seen
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Drop every table
    pub fn clear(&mut self) {
        self.tables.clear();
    }
}
