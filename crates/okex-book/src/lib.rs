//! Checksum-verified depth books for the OKEx v3 WebSocket API
//!
//! This crate provides the book data structures, the checksum engine and the
//! per-table registry. It holds no tasks and does no I/O: a single owner
//! drives it with classified depth pushes.
//!
//! # Example
//!
//! ```
//! use okex_book::{compute_checksum, DepthRegistry};
//! use okex_types::{DepthTableResponse, DepthUpdate, RawLevel};
//!
//! let bids = vec![RawLevel::new("100", "1")];
//! let asks = vec![RawLevel::new("101", "1")];
//! let push = DepthTableResponse {
//!     table: "spot/depth".into(),
//!     action: "partial".into(),
//!     data: vec![DepthUpdate {
//!         instrument_id: "BTC-USDT".into(),
//!         checksum: compute_checksum(&bids, &asks),
//!         bids,
//!         asks,
//!         timestamp: String::new(),
//!     }],
//! };
//!
//! let mut registry = DepthRegistry::new();
//! let report = registry.route(&push).unwrap();
//! assert!(report.is_clean());
//! ```

pub mod checksum;
pub mod error;
pub mod orderbook;
pub mod registry;
pub mod storage;

// Re-export main types
pub use checksum::{
    checksum_of_payload, checksum_payload, compute_checksum, ChecksumLevel, CHECKSUM_DEPTH,
};
pub use error::{BookError, BookResult};
pub use orderbook::{ApplyResult, BookState, DepthSnapshot, InstrumentBook};
pub use registry::{DepthRegistry, RouteReport, TableBooks};
pub use storage::BookSides;
