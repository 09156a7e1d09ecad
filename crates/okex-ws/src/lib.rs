//! Native WebSocket agent for the OKEx v3 API
//!
//! This crate connects to the v3 websocket endpoint, drives the
//! subscribe/login/keepalive control protocol and keeps a checksum-verified
//! depth book for every instrument of every depth table it sees.
//!
//! # Features
//!
//! - Raw-deflate frame inflation (`?compress=true`)
//! - Response classification into events, tables, depth tables and errors
//! - Depth reconciliation with CRC32 verification and rollback
//! - Supervised read and dispatch tasks with cooperative shutdown
//!
//! # Example
//!
//! ```no_run
//! use okex_ws::{handler_fn, AgentConfig, OkexAgent};
//! use okex_types::Response;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let agent = OkexAgent::new(AgentConfig::new().with_signal_handling(true));
//!
//!     agent
//!         .start(handler_fn(|response| {
//!             if let Response::DepthTable(depth) = response {
//!                 for update in &depth.data {
//!                     println!("{} verified at {}", update.instrument_id, update.timestamp);
//!                 }
//!             }
//!             Ok(())
//!         }))
//!         .await?;
//!
//!     agent.subscribe("spot/depth", Some("BTC-USDT")).await?;
//!
//!     let reason = agent.wait_closed().await;
//!     println!("closed: {:?}", reason);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod codec;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod handler;
pub mod transport;

// Re-export main types
pub use agent::{AgentState, CloseReason, OkexAgent};
pub use codec::{decode_frame, inflate, inflate_limited, MAX_INFLATED_LEN};
pub use config::AgentConfig;
pub use endpoint::Endpoint;
pub use error::{AgentError, AgentResult};
pub use handler::{handler_fn, FnHandler, HandlerError, HandlerResult, ResponseHandler};
pub use transport::{Frame, FrameSink, FrameSource, Transport, TransportError, WsTransport};

#[cfg(any(test, feature = "test-utils"))]
pub use transport::{MockHandle, MockTransport};
