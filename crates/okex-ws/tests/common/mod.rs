//! Shared helpers for agent tests

#![allow(dead_code)]

use flate2::write::DeflateEncoder;
use flate2::Compression;
use okex_book::compute_checksum;
use okex_types::{RawLevel, Response};
use okex_ws::{AgentConfig, AgentError, HandlerResult, MockHandle, MockTransport, OkexAgent, ResponseHandler};
use serde_json::{json, Value};
use std::io::Write;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

pub const WAIT: Duration = Duration::from_secs(5);

/// Handler that forwards everything it sees to the test
pub struct Recorder {
    responses: mpsc::UnboundedSender<Response>,
    errors: mpsc::UnboundedSender<String>,
}

impl ResponseHandler for Recorder {
    fn on_response(&self, response: &Response) -> HandlerResult {
        let _ = self.responses.send(response.clone());
        Ok(())
    }

    fn on_error(&self, error: &AgentError) {
        let _ = self.errors.send(error.to_string());
    }
}

/// Test side of a [`Recorder`]
pub struct Recorded {
    pub responses: mpsc::UnboundedReceiver<Response>,
    pub errors: mpsc::UnboundedReceiver<String>,
}

impl Recorded {
    pub async fn next_response(&mut self) -> Response {
        timeout(WAIT, self.responses.recv())
            .await
            .expect("timed out waiting for a response")
            .expect("handler dropped")
    }

    pub async fn next_error(&mut self) -> String {
        timeout(WAIT, self.errors.recv())
            .await
            .expect("timed out waiting for an error")
            .expect("handler dropped")
    }
}

pub fn recorder() -> (Recorder, Recorded) {
    let (responses_tx, responses) = mpsc::unbounded_channel();
    let (errors_tx, errors) = mpsc::unbounded_channel();
    (
        Recorder {
            responses: responses_tx,
            errors: errors_tx,
        },
        Recorded { responses, errors },
    )
}

/// Agent on a mock transport, not yet started
pub fn mock_agent(config: AgentConfig) -> (OkexAgent, MockHandle) {
    let (transport, handle) = MockTransport::new();
    (OkexAgent::with_transport(config, transport), handle)
}

/// Agent on a mock transport, started with a recorder
pub async fn started_agent() -> (OkexAgent, MockHandle, Recorded) {
    let (agent, handle) = mock_agent(AgentConfig::new().with_url("wss://mock.test/ws/v3"));
    let (recorder, recorded) = recorder();
    agent.start(recorder).await.expect("start");
    (agent, handle, recorded)
}

pub fn levels(pairs: &[(&str, &str)]) -> Vec<RawLevel> {
    pairs.iter().map(|(p, s)| RawLevel::new(*p, *s)).collect()
}

/// Checksum the exchange would send for a book holding these levels
pub fn checksum(bids: &[(&str, &str)], asks: &[(&str, &str)]) -> i32 {
    compute_checksum(&levels(bids), &levels(asks))
}

pub fn entry(
    instrument: &str,
    bids: &[(&str, &str)],
    asks: &[(&str, &str)],
    checksum: i32,
) -> Value {
    let side = |pairs: &[(&str, &str)]| {
        pairs
            .iter()
            .map(|(p, s)| json!([p, s, "1"]))
            .collect::<Vec<_>>()
    };
    json!({
        "instrument_id": instrument,
        "bids": side(bids),
        "asks": side(asks),
        "timestamp": "2019-03-06T09:41:53.536Z",
        "checksum": checksum,
    })
}

/// Snapshot entry whose checksum matches its content
pub fn verified_entry(instrument: &str, bids: &[(&str, &str)], asks: &[(&str, &str)]) -> Value {
    entry(instrument, bids, asks, checksum(bids, asks))
}

pub fn depth_push(action: &str, entries: Vec<Value>) -> String {
    json!({ "table": "spot/depth", "action": action, "data": entries }).to_string()
}

pub fn deflate(text: &str) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).expect("deflate");
    encoder.finish().expect("deflate")
}
