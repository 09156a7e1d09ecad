//! WebSocket endpoint definitions

use std::fmt;

/// Default server of the v3 API
pub const DEFAULT_BASE: &str = "wss://real.okex.com:8443/";

/// Path of the v3 websocket API under a server base
pub const WS_PATH: &str = "ws/v3";

/// OKEx v3 WebSocket endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: String,
    compress: bool,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_BASE)
    }
}

impl Endpoint {
    /// Endpoint under a server base such as `wss://real.okex.com:8443/`
    ///
    /// Compression is on by default.
    pub fn new(base: impl Into<String>) -> Self {
        let mut base = base.into();
        if !base.ends_with('/') {
            base.push('/');
        }
        Self {
            base,
            compress: true,
        }
    }

    /// Request plain text frames instead of deflated binary frames
    pub fn uncompressed(mut self) -> Self {
        self.compress = false;
        self
    }

    /// Returns true if the server is asked to deflate pushes
    pub fn is_compressed(&self) -> bool {
        self.compress
    }

    /// Get the WebSocket URL for this endpoint
    pub fn url(&self) -> String {
        if self.compress {
            format!("{}{}?compress=true", self.base, WS_PATH)
        } else {
            format!("{}{}", self.base, WS_PATH)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}
