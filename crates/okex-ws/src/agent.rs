//! Session state machine
//!
//! # State Machine
//!
//! ```text
//! Disconnected → Connecting → Connected → Closing → Closed
//!       ^             |                                 |
//!       +--- failed --+                 start again ----+
//! ```
//!
//! A running session has two long-lived tasks and a supervisor:
//!
//! - the **read task** pulls frames off the transport, inflates and
//!   classifies them and pushes them onto the error, event or table queue
//! - the **dispatch task** owns the depth books; it serves the queues, the
//!   keepalive tick and book queries, one item per wake-up
//! - the **supervisor** joins both tasks, traps their panics, closes the
//!   transport and records the [`CloseReason`]

use crate::codec::decode_frame;
use crate::config::AgentConfig;
use crate::error::{AgentError, AgentResult};
use crate::handler::ResponseHandler;
use crate::transport::{BoxSink, BoxSource, FrameSource, Transport, TransportError, WsTransport};
use okex_auth::Credentials;
use okex_book::{DepthRegistry, DepthSnapshot};
use okex_types::{
    classify, ControlMessage, DepthTableResponse, ErrorResponse, EventResponse, Op, Response,
    SubscriptionTopic, PING,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Agent lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// Never started, or the last start failed
    Disconnected,
    /// Opening the transport
    Connecting,
    /// Session running
    Connected,
    /// Stop requested or transport lost; tearing down
    Closing,
    /// Session torn down
    Closed,
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// [`OkexAgent::stop`] was called
    Requested,
    /// The process received an interrupt
    Signal,
    /// The transport failed or the peer closed the connection
    TransportError(String),
    /// An internal task panicked
    TaskFault(String),
}

type SharedSink = Arc<tokio::sync::Mutex<Option<BoxSink>>>;
type ChannelMap = Arc<RwLock<HashMap<String, bool>>>;

enum BookQuery {
    Snapshot {
        table: String,
        instrument_id: String,
        reply: oneshot::Sender<Option<DepthSnapshot>>,
    },
}

struct Session {
    stop: CancellationToken,
    queries: mpsc::Sender<BookQuery>,
    closed: watch::Receiver<Option<CloseReason>>,
}

#[derive(Clone)]
struct Lifecycle {
    state: Arc<RwLock<AgentState>>,
    requested: Arc<Mutex<Option<CloseReason>>>,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(AgentState::Disconnected)),
            requested: Arc::new(Mutex::new(None)),
        }
    }

    /// Connected → Closing; only the first request records its reason
    fn request_stop(&self, stop: &CancellationToken, reason: CloseReason) -> bool {
        {
            let mut state = self.state.write();
            if *state != AgentState::Connected {
                return false;
            }
            *state = AgentState::Closing;
        }
        self.requested.lock().get_or_insert(reason);
        stop.cancel();
        true
    }
}

/// WebSocket agent for the OKEx v3 API
///
/// The agent keeps checksum-verified depth books for every subscribed depth
/// table and hands verified responses to a [`ResponseHandler`].
pub struct OkexAgent {
    config: AgentConfig,
    transport: Arc<dyn Transport>,
    lifecycle: Lifecycle,
    sink: SharedSink,
    /// Serializes control operations; never taken by the session tasks
    control: tokio::sync::Mutex<()>,
    channels: ChannelMap,
    session: Mutex<Option<Session>>,
}

impl OkexAgent {
    /// Create an agent that connects over tokio-tungstenite
    pub fn new(config: AgentConfig) -> Self {
        Self::with_transport(config, WsTransport::new())
    }

    /// Create an agent on a custom transport
    pub fn with_transport(config: AgentConfig, transport: impl Transport + 'static) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
            lifecycle: Lifecycle::new(),
            sink: Arc::new(tokio::sync::Mutex::new(None)),
            control: tokio::sync::Mutex::new(()),
            channels: Arc::new(RwLock::new(HashMap::new())),
            session: Mutex::new(None),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Get the current state
    pub fn state(&self) -> AgentState {
        *self.lifecycle.state.read()
    }

    /// Check if a session is running
    pub fn is_connected(&self) -> bool {
        self.state() == AgentState::Connected
    }

    /// Open the transport and start a session
    ///
    /// Allowed from `Disconnected` and `Closed`. If the transport cannot be
    /// opened within the connect timeout the agent goes back to
    /// `Disconnected` and the error is returned.
    pub async fn start<H: ResponseHandler>(&self, handler: H) -> AgentResult<()> {
        self.config.validate()?;
        {
            let mut state = self.lifecycle.state.write();
            match *state {
                AgentState::Disconnected | AgentState::Closed => *state = AgentState::Connecting,
                other => {
                    return Err(AgentError::InvalidState {
                        operation: "start",
                        state: other,
                    })
                }
            }
        }

        info!(url = %self.config.url, "Connecting");
        let opened = match timeout(
            self.config.connect_timeout,
            self.transport.open(&self.config.url),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.config.connect_timeout)),
        };
        let (sink, source) = match opened {
            Ok(halves) => halves,
            Err(e) => {
                error!(error = %e, "Connection failed");
                *self.lifecycle.state.write() = AgentState::Disconnected;
                return Err(e.into());
            }
        };

        *self.sink.lock().await = Some(sink);
        self.channels.write().clear();
        *self.lifecycle.requested.lock() = None;

        let capacity = self.config.queue_capacity;
        let (error_tx, error_rx) = mpsc::channel(capacity);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (table_tx, table_rx) = mpsc::channel(capacity);
        let (query_tx, query_rx) = mpsc::channel(capacity);
        let (closed_tx, closed_rx) = watch::channel(None);
        let stop = CancellationToken::new();
        let handler: Arc<dyn ResponseHandler> = Arc::new(handler);

        *self.session.lock() = Some(Session {
            stop: stop.clone(),
            queries: query_tx,
            closed: closed_rx,
        });
        *self.lifecycle.state.write() = AgentState::Connected;
        info!("Connected");

        let queues = Queues {
            errors: error_tx,
            events: event_tx,
            tables: table_tx,
        };
        let reader = tokio::spawn(read_loop(source, queues, stop.clone()));

        let dispatcher = Dispatcher {
            handler: handler.clone(),
            sink: self.sink.clone(),
            channels: self.channels.clone(),
            registry: DepthRegistry::new(),
            errors: error_rx,
            events: event_rx,
            tables: table_rx,
            queries: query_rx,
            stop: stop.clone(),
            keepalive: self.config.keepalive_interval,
        };
        let dispatcher = tokio::spawn(dispatcher.run());

        if self.config.handle_signals {
            tokio::spawn(watch_signal(self.lifecycle.clone(), stop.clone()));
        }

        let supervisor = Supervisor {
            reader,
            dispatcher,
            stop,
            lifecycle: self.lifecycle.clone(),
            sink: self.sink.clone(),
            channels: self.channels.clone(),
            handler,
            closed: closed_tx,
        };
        tokio::spawn(supervisor.run());

        Ok(())
    }

    /// Ask the running session to close
    ///
    /// Idempotent; does nothing unless the agent is `Connected`.
    pub fn stop(&self) {
        if let Some(session) = self.session.lock().as_ref() {
            if self
                .lifecycle
                .request_stop(&session.stop, CloseReason::Requested)
            {
                info!("Stop requested");
            }
        }
    }

    /// Wait for the current session to be torn down
    ///
    /// Returns `None` if no session was ever started.
    pub async fn wait_closed(&self) -> Option<CloseReason> {
        let mut closed = self.session.lock().as_ref()?.closed.clone();
        let reason = closed
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|reason| (*reason).clone());
        reason
    }

    /// Subscribe to one topic
    pub async fn subscribe(&self, channel: &str, filter: Option<&str>) -> AgentResult<()> {
        let topic = SubscriptionTopic::new(channel, filter)?;
        self.subscribe_topics(&[topic]).await
    }

    /// Subscribe to several topics in one frame
    pub async fn subscribe_topics(&self, topics: &[SubscriptionTopic]) -> AgentResult<()> {
        self.send_control(&ControlMessage::subscribe(topics), Duration::ZERO)
            .await
    }

    /// Unsubscribe from one topic
    ///
    /// The channel stays marked active until the server acknowledges.
    pub async fn unsubscribe(&self, channel: &str, filter: Option<&str>) -> AgentResult<()> {
        let topic = SubscriptionTopic::new(channel, filter)?;
        self.unsubscribe_topics(&[topic]).await
    }

    /// Unsubscribe from several topics in one frame
    pub async fn unsubscribe_topics(&self, topics: &[SubscriptionTopic]) -> AgentResult<()> {
        self.send_control(&ControlMessage::unsubscribe(topics), Duration::ZERO)
            .await
    }

    /// Authenticate the session
    ///
    /// Returns after the login grace period; the outcome arrives later as
    /// a `login` event.
    pub async fn login(&self, credentials: &Credentials) -> AgentResult<()> {
        let params = credentials.login_params()?;
        let message = ControlMessage::login(
            &params.api_key,
            &params.passphrase,
            &params.timestamp,
            &params.signature,
        );
        self.send_control(&message, self.config.login_grace).await
    }

    /// Send one control frame
    ///
    /// Control operations exclude each other for the whole call, grace period
    /// included. The sink itself is only locked for the write, so keepalive
    /// and dispatch keep running meanwhile.
    async fn send_control(&self, message: &ControlMessage, grace: Duration) -> AgentResult<()> {
        let text = message.to_json()?;

        let _control = self.control.lock().await;
        if self.state() != AgentState::Connected {
            return Err(AgentError::NotConnected);
        }

        if message.op == Op::Login {
            debug!(op = message.op.as_str(), "Sending control frame");
        } else {
            debug!(op = message.op.as_str(), frame = %text, "Sending control frame");
        }
        {
            let mut guard = self.sink.lock().await;
            let sink = guard.as_mut().ok_or(AgentError::NotConnected)?;
            sink.send_text(&text).await?;
        }

        if !grace.is_zero() {
            tokio::time::sleep(grace).await;
        }
        Ok(())
    }

    /// Returns true if the server acknowledged a subscription to `channel`
    ///
    /// `channel` is the acknowledged form, e.g. `spot/depth:BTC-USDT`.
    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.channels.read().get(channel).copied().unwrap_or(false)
    }

    /// Every acknowledged channel with its subscribed flag
    pub fn active_channels(&self) -> HashMap<String, bool> {
        self.channels.read().clone()
    }

    /// Copy of an instrument's verified book
    pub async fn depth_snapshot(
        &self,
        table: &str,
        instrument_id: &str,
    ) -> AgentResult<Option<DepthSnapshot>> {
        let queries = self
            .session
            .lock()
            .as_ref()
            .map(|session| session.queries.clone())
            .ok_or(AgentError::NotConnected)?;

        let (reply, response) = oneshot::channel();
        queries
            .send(BookQuery::Snapshot {
                table: table.to_string(),
                instrument_id: instrument_id.to_string(),
                reply,
            })
            .await
            .map_err(|_| AgentError::NotConnected)?;
        response.await.map_err(|_| AgentError::NotConnected)
    }
}

impl Drop for OkexAgent {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().as_ref() {
            self.lifecycle
                .request_stop(&session.stop, CloseReason::Requested);
        }
    }
}

struct Queues {
    errors: mpsc::Sender<ErrorResponse>,
    events: mpsc::Sender<EventResponse>,
    tables: mpsc::Sender<Response>,
}

impl Queues {
    /// Returns false once the session is stopping or dispatch is gone
    async fn forward(&self, response: Response, stop: &CancellationToken) -> bool {
        match response {
            Response::Pong => {
                debug!("Received pong");
                true
            }
            Response::Error(error) => offer(&self.errors, error, stop).await,
            Response::Event(event) => offer(&self.events, event, stop).await,
            table => offer(&self.tables, table, stop).await,
        }
    }
}

async fn offer<T>(tx: &mpsc::Sender<T>, item: T, stop: &CancellationToken) -> bool {
    tokio::select! {
        _ = stop.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}

async fn read_loop(
    mut source: BoxSource,
    queues: Queues,
    stop: CancellationToken,
) -> Result<(), TransportError> {
    let result = read_frames(source.as_mut(), &queues, &stop).await;
    if let Err(e) = &result {
        error!(error = %e, "Read loop failed");
        stop.cancel();
    }
    result
}

async fn read_frames(
    source: &mut dyn FrameSource,
    queues: &Queues,
    stop: &CancellationToken,
) -> Result<(), TransportError> {
    loop {
        let frame = tokio::select! {
            _ = stop.cancelled() => return Ok(()),
            frame = source.next_frame() => frame?,
        };
        let Some(frame) = frame else {
            return Err(TransportError::ConnectionClosed);
        };

        let raw = match decode_frame(frame) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable frame");
                continue;
            }
        };
        let response = match classify(&raw) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Dropping unrecognized message");
                continue;
            }
        };

        if !queues.forward(response, stop).await {
            return Ok(());
        }
    }
}

struct Dispatcher {
    handler: Arc<dyn ResponseHandler>,
    sink: SharedSink,
    channels: ChannelMap,
    registry: DepthRegistry,
    errors: mpsc::Receiver<ErrorResponse>,
    events: mpsc::Receiver<EventResponse>,
    tables: mpsc::Receiver<Response>,
    queries: mpsc::Receiver<BookQuery>,
    stop: CancellationToken,
    keepalive: Duration,
}

impl Dispatcher {
    async fn run(mut self) {
        let mut ticker = interval_at(Instant::now() + self.keepalive, self.keepalive);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.stop.cancelled() => break,
                _ = ticker.tick() => send_keepalive(&self.sink, self.handler.as_ref()).await,
                error = self.errors.recv() => match error {
                    Some(error) => self.on_exchange_error(error),
                    None => break,
                },
                event = self.events.recv() => match event {
                    Some(event) => self.on_event(event),
                    None => break,
                },
                table = self.tables.recv() => match table {
                    Some(table) => self.on_table(table),
                    None => break,
                },
                Some(query) = self.queries.recv() => self.answer(query),
            }
        }

        self.registry.clear();
        debug!("Dispatch loop stopped");
    }

    fn on_exchange_error(&self, response: ErrorResponse) {
        warn!(code = response.error_code, message = %response.message, "Exchange error");
        self.handler.on_error(&AgentError::Exchange {
            code: response.error_code,
            message: response.message,
        });
    }

    fn on_event(&self, event: EventResponse) {
        if !event.channel.is_empty() {
            self.channels
                .write()
                .insert(event.channel.clone(), event.is_subscribe());
        }
        info!(event = %event.event, channel = %event.channel, success = ?event.success, "Event");
        self.deliver(&Response::Event(event));
    }

    fn on_table(&mut self, response: Response) {
        match response {
            Response::DepthTable(depth) => self.on_depth(depth),
            other => self.deliver(&other),
        }
    }

    fn on_depth(&mut self, mut depth: DepthTableResponse) {
        let report = match self.registry.route(&depth) {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, table = %depth.table, "Depth push rejected");
                self.handler.on_error(&AgentError::Book(e));
                return;
            }
        };

        if report.is_passthrough() {
            self.deliver(&Response::DepthTable(depth));
            return;
        }

        depth
            .data
            .retain(|update| report.reconciled(&update.instrument_id));
        for failure in report.failures {
            warn!(error = %failure, table = %depth.table, "Book reconciliation failed");
            self.handler.on_error(&AgentError::Book(failure));
        }
        if !depth.data.is_empty() {
            self.deliver(&Response::DepthTable(depth));
        }
    }

    fn deliver(&self, response: &Response) {
        if let Err(e) = self.handler.on_response(response) {
            warn!(error = %e, kind = response.kind(), "Handler failed");
            self.handler.on_error(&AgentError::Handler(e.to_string()));
        }
    }

    fn answer(&self, query: BookQuery) {
        match query {
            BookQuery::Snapshot {
                table,
                instrument_id,
                reply,
            } => {
                // The caller may have given up waiting
                let _ = reply.send(self.registry.snapshot(&table, &instrument_id));
            }
        }
    }
}

async fn send_keepalive(sink: &SharedSink, handler: &dyn ResponseHandler) {
    let result = match sink.lock().await.as_mut() {
        Some(sink) => sink.send_text(PING).await,
        None => Err(TransportError::ConnectionClosed),
    };

    match result {
        Ok(()) => debug!("Sent keepalive ping"),
        Err(e) => {
            warn!(error = %e, "Keepalive failed");
            handler.on_error(&AgentError::Keepalive(e));
        }
    }
}

struct Supervisor {
    reader: JoinHandle<Result<(), TransportError>>,
    dispatcher: JoinHandle<()>,
    stop: CancellationToken,
    lifecycle: Lifecycle,
    sink: SharedSink,
    channels: ChannelMap,
    handler: Arc<dyn ResponseHandler>,
    closed: watch::Sender<Option<CloseReason>>,
}

impl Supervisor {
    async fn run(self) {
        let Supervisor {
            reader,
            dispatcher,
            stop,
            lifecycle,
            sink,
            channels,
            handler,
            closed,
        } = self;

        let dispatched = dispatcher.await;
        stop.cancel();
        let read = reader.await;
        *lifecycle.state.write() = AgentState::Closing;

        let reason = match (dispatched, read) {
            (Err(e), _) => {
                error!(error = %e, "Dispatch task failed");
                CloseReason::TaskFault(format!("dispatch task: {}", e))
            }
            (Ok(()), Err(e)) => {
                error!(error = %e, "Read task failed");
                CloseReason::TaskFault(format!("read task: {}", e))
            }
            (Ok(()), Ok(Err(e))) => {
                let reason = CloseReason::TransportError(e.to_string());
                handler.on_error(&AgentError::Transport(e));
                reason
            }
            (Ok(()), Ok(Ok(()))) => lifecycle
                .requested
                .lock()
                .clone()
                .unwrap_or(CloseReason::Requested),
        };

        let open_sink = sink.lock().await.take();
        if let Some(mut open_sink) = open_sink {
            if let Err(e) = open_sink.close().await {
                debug!(error = %e, "Transport close failed");
            }
        }
        channels.write().clear();

        *lifecycle.state.write() = AgentState::Closed;
        info!(reason = ?reason, "Session closed");
        closed.send_replace(Some(reason));
    }
}

async fn watch_signal(lifecycle: Lifecycle, stop: CancellationToken) {
    tokio::select! {
        _ = stop.cancelled() => {}
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => {
                info!("Received interrupt, closing session");
                lifecycle.request_stop(&stop, CloseReason::Signal);
            }
            Err(e) => warn!(error = %e, "Failed to listen for interrupt"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_stop_only_from_connected() {
        let lifecycle = Lifecycle::new();
        let stop = CancellationToken::new();

        assert!(!lifecycle.request_stop(&stop, CloseReason::Requested));
        assert!(!stop.is_cancelled());

        *lifecycle.state.write() = AgentState::Connected;
        assert!(lifecycle.request_stop(&stop, CloseReason::Signal));
        assert!(stop.is_cancelled());
        assert_eq!(*lifecycle.state.read(), AgentState::Closing);

        // Second request keeps the first reason
        assert!(!lifecycle.request_stop(&stop, CloseReason::Requested));
        assert_eq!(*lifecycle.requested.lock(), Some(CloseReason::Signal));
    }

    #[test]
    fn test_new_agent_is_disconnected() {
        let agent = OkexAgent::new(AgentConfig::new());
        assert_eq!(agent.state(), AgentState::Disconnected);
        assert!(!agent.is_subscribed("spot/depth:BTC-USDT"));
        assert!(agent.active_channels().is_empty());
    }

    #[tokio::test]
    async fn test_send_without_session() {
        let agent = OkexAgent::new(AgentConfig::new());
        let err = agent.subscribe("spot/depth", Some("BTC-USDT")).await.unwrap_err();
        assert!(matches!(err, AgentError::NotConnected));
        assert!(agent.wait_closed().await.is_none());
    }
}
