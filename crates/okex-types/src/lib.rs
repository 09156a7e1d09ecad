//! Shared types for the OKEx v3 WebSocket API
//!
//! This crate provides the wire-level type definitions used across the
//! workspace. It has no networking dependencies and can be used on its own,
//! for example to classify captured messages offline.
//!
//! # Key Types
//!
//! - [`SubscriptionTopic`], [`ControlMessage`] - Outbound control protocol
//! - [`RawLevel`], [`PriceLevel`] - Depth levels, raw text and parsed decimals
//! - [`Response`] and [`classify`] - Inbound response shapes and classification
//! - [`ProtocolError`] - Error types

pub mod enums;
pub mod error;
pub mod level;
pub mod messages;
pub mod response;

// Re-export commonly used types
pub use enums::*;
pub use error::*;
pub use level::*;
pub use messages::*;
pub use response::*;

// Re-export rust_decimal for users
pub use rust_decimal::Decimal;
