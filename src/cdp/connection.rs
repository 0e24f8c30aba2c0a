//! CDP session core
//!
//! [`CdpSession`] owns one transport. A dedicated reader task routes every inbound
//! frame either to the pending-call registry (frames with an `id`) or to the event
//! hub (notifications). Command senders share the outbound sink and never block
//! the reader.

use super::codec::{self, preview};
use super::hub::{EventHub, EventStream};
use super::pending::{Completion, PendingCalls, PendingGuard};
use super::transport::{Frame, FrameSink, FrameStream, Transport, WebSocketTransport};
use super::types::{Command, InboundMessage, ProtocolViolation, SessionState};
use super::discovery;
use crate::config::{Config, TimeoutConfig};
use crate::{Error, Result};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Capacity of the protocol violation channel
const VIOLATION_BUFFER: usize = 16;

/// How long `close` waits for the close frame to be written
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// State shared between the session handle and its reader task
#[derive(Debug)]
struct SessionShared {
    /// Connection identifier (for logging)
    id: Uuid,
    /// Lifecycle state
    state: watch::Sender<SessionState>,
    /// In-flight commands
    pending: PendingCalls,
    /// Inbound events
    hub: EventHub,
    /// Session-level protocol violations
    violations: broadcast::Sender<ProtocolViolation>,
}

impl SessionShared {
    /// Route one inbound frame
    fn dispatch(&self, frame: Frame) {
        match codec::decode_frame(&frame) {
            Ok(InboundMessage::Response(response)) => {
                debug!("Received response for command ID: {}", response.id);
                self.pending.resolve(response);
            }
            Ok(InboundMessage::MalformedResponse { id, reason }) => {
                warn!("Malformed response for command ID {}: {}", id, reason);
                self.pending.reject(id, Error::protocol(reason));
            }
            Ok(InboundMessage::Event(event)) => {
                debug!("Received event: {}", event.method);
                self.hub.publish(event);
            }
            Err(e) => self.report_violation(e, &frame),
        }
    }

    fn report_violation(&self, err: Error, frame: &Frame) {
        let violation = ProtocolViolation {
            reason: err.to_string(),
            frame: preview(frame),
            at: chrono::Utc::now(),
        };
        error!(
            connection = %self.id,
            "Dropping undecodable frame: {} ({})", violation.reason, violation.frame
        );
        let _ = self.violations.send(violation);
    }

    /// Move from `Connecting`/`Open` to `Closing`. Returns false if already on the way out.
    fn begin_closing(&self) -> bool {
        self.state.send_if_modified(|state| match state {
            SessionState::Connecting | SessionState::Open => {
                *state = SessionState::Closing;
                true
            }
            SessionState::Closing | SessionState::Closed => false,
        })
    }

    /// Fail every pending call, end every subscription, and mark the session closed
    fn teardown(&self, reason: &str) {
        self.begin_closing();
        info!(connection = %self.id, "Session closing: {}", reason);

        let failed = self.pending.fail_all(reason);
        self.hub.close();
        self.state.send_replace(SessionState::Closed);

        info!(connection = %self.id, "Session closed ({} pending commands failed)", failed);
    }

    async fn read_loop(
        self: Arc<Self>,
        mut stream: FrameStream,
        mut state_rx: watch::Receiver<SessionState>,
    ) {
        info!(connection = %self.id, "Reader task started");

        let reason = loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(frame)) => self.dispatch(frame),
                    Some(Err(e)) => {
                        error!(connection = %self.id, "Transport failed: {}", e);
                        break format!("transport failed: {}", e);
                    }
                    None => {
                        warn!(connection = %self.id, "Transport closed by peer");
                        break "transport closed by peer".to_string();
                    }
                },
                changed = state_rx.changed() => {
                    let state = *state_rx.borrow_and_update();
                    if changed.is_err() || matches!(state, SessionState::Closing | SessionState::Closed) {
                        break "session closed".to_string();
                    }
                }
            }
        };

        self.teardown(&reason);
        info!(connection = %self.id, "Reader task exited");
    }
}

/// A live CDP session over one transport
///
/// Dropping the last handle closes the session.
pub struct CdpSession {
    shared: Arc<SessionShared>,
    /// Outbound half of the transport
    sink: Mutex<FrameSink>,
    /// Next command ID
    next_id: AtomicU64,
    /// Timeout configuration
    timeouts: TimeoutConfig,
}

impl CdpSession {
    /// Connect to the configured endpoint over WebSocket.
    ///
    /// `http://` endpoints are resolved to the browser's debugger URL first.
    pub async fn connect(config: &Config) -> Result<Arc<Self>> {
        let url = discovery::resolve_ws_url(&config.endpoint).await?;
        let transport = WebSocketTransport::connect(&url).await?;
        Ok(Self::open(transport, config))
    }

    /// Start a session over an already connected transport.
    ///
    /// Spawns the reader task, so this must be called inside a Tokio runtime.
    pub fn open<T: Transport>(transport: T, config: &Config) -> Arc<Self> {
        let (state, state_rx) = watch::channel(SessionState::Connecting);
        let (violations, _) = broadcast::channel(VIOLATION_BUFFER);

        let shared = Arc::new(SessionShared {
            id: Uuid::new_v4(),
            state,
            pending: PendingCalls::new(),
            hub: EventHub::new(config.event_buffer),
            violations,
        });

        let (sink, stream) = transport.split();

        info!(connection = %shared.id, "Starting CDP session");
        tokio::spawn(Arc::clone(&shared).read_loop(stream, state_rx));

        shared.state.send_if_modified(|state| {
            if *state == SessionState::Connecting {
                *state = SessionState::Open;
                true
            } else {
                false
            }
        });

        Arc::new(Self {
            shared,
            sink: Mutex::new(sink),
            next_id: AtomicU64::new(1),
            timeouts: config.timeouts.clone(),
        })
    }

    /// Connection identifier used in logs
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    /// Whether commands can currently be sent
    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Number of commands awaiting a response
    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }

    /// Send a command on the top-level session and wait for its result
    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value> {
        self.send_command_to(method, params, None).await
    }

    /// Send a command routed to `session_id` (flat mode) and wait for its result
    pub async fn send_command_to(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<Value> {
        let timeout = self.timeouts.for_method(method);
        self.send_command_with_timeout(method, params, session_id, timeout)
            .await
    }

    /// Send a command with an explicit timeout; `None` waits until the response or teardown.
    ///
    /// The timeout covers writing the frame as well as waiting for the response, and
    /// a write still blocked when the session closes fails with a transport error.
    /// A `null` `params` is omitted from the frame. On timeout or when the returned
    /// future is dropped, the pending entry is removed; the debuggee-side operation
    /// is not cancelled.
    #[instrument(level = "debug", skip(self, params), fields(connection = %self.shared.id))]
    pub async fn send_command_with_timeout(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let state = self.state();
        if state != SessionState::Open {
            return Err(Error::NotConnected(state));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = codec::encode_command(id, method, Some(params), session_id)?;

        let completion = self.shared.pending.register(id, method)?;
        let _guard = PendingGuard::new(&self.shared.pending, id);

        debug!("Sending CDP command {}: {}", id, method);
        let exchange = self.exchange(id, frame, completion);

        match timeout {
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!("Command {} ({}) timed out after {:?}", id, method, limit);
                    Err(Error::Timeout {
                        method: method.to_string(),
                        id,
                    })
                }
            },
            None => exchange.await,
        }
    }

    /// Send a typed command on the top-level session
    pub async fn execute<C: Command>(&self, command: &C) -> Result<C::Response> {
        self.execute_in(command, None).await
    }

    /// Send a typed command routed to `session_id`
    pub async fn execute_in<C: Command>(
        &self,
        command: &C,
        session_id: Option<&str>,
    ) -> Result<C::Response> {
        let params = serde_json::to_value(command)?;
        let result = self.send_command_to(C::METHOD, params, session_id).await?;

        serde_json::from_value(result)
            .map_err(|e| Error::protocol(format!("Invalid {} result: {}", C::METHOD, e)))
    }

    /// Event hub fed by this session
    pub fn events(&self) -> &EventHub {
        &self.shared.hub
    }

    /// Subscribe to an event on any session
    pub fn subscribe(&self, method: &str) -> EventStream {
        self.shared.hub.subscribe(method)
    }

    /// Subscribe to an event on one session (`None` for the top-level session)
    pub fn subscribe_session(&self, method: &str, session_id: Option<&str>) -> EventStream {
        self.shared.hub.subscribe_session(method, session_id)
    }

    /// Subscribe to every event
    pub fn subscribe_all(&self) -> EventStream {
        self.shared.hub.subscribe_all()
    }

    /// Session-level protocol violations: frames whose id could not be determined
    pub fn protocol_errors(&self) -> broadcast::Receiver<ProtocolViolation> {
        self.shared.violations.subscribe()
    }

    /// Close the session. Idempotent; resolves once the session is `Closed`.
    pub async fn close(&self) -> Result<()> {
        if self.shared.begin_closing() {
            info!(connection = %self.shared.id, "Closing CDP session");
        }

        self.closed().await;

        let close_sink = async {
            let mut sink = self.sink.lock().await;
            sink.close().await
        };
        match tokio::time::timeout(CLOSE_FRAME_TIMEOUT, close_sink).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Transport close: {}", e),
            Err(_) => warn!("Timed out closing transport"),
        }

        Ok(())
    }

    /// Resolves once the session reaches `Closed`
    pub async fn closed(&self) {
        let mut state_rx = self.shared.state.subscribe();
        loop {
            let state = *state_rx.borrow_and_update();
            if state == SessionState::Closed {
                return;
            }
            if state_rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Write `frame`, then wait for its response
    async fn exchange(&self, id: u64, frame: Frame, completion: Completion) -> Result<Value> {
        // A stalled sink must not outlive the session
        tokio::select! {
            written = self.write(frame) => written?,
            _ = self.closed() => {
                return Err(Error::transport(format!(
                    "Session closed before command {} was written",
                    id
                )));
            }
        }

        match completion.await {
            Ok(result) => result,
            Err(_) => Err(Error::transport(format!(
                "Response channel for command {} closed",
                id
            ))),
        }
    }

    async fn write(&self, frame: Frame) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.send(frame).await
    }
}

impl std::fmt::Debug for CdpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpSession")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl Drop for CdpSession {
    fn drop(&mut self) {
        if self.shared.begin_closing() {
            debug!(connection = %self.shared.id, "Session handle dropped, shutting down");
        }
    }
}
