//! Mock CDP transport for testing
//!
//! [`mock_transport`] returns an in-memory transport and the [`MockPeer`] that
//! plays the debuggee on its other end: it observes outgoing commands and injects
//! responses, events, raw frames and transport failures.

use super::transport::{Frame, FrameSink, FrameStream, Transport};
use super::types::CommandEnvelope;
use crate::{Error, Result};
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::debug;

/// In-memory transport half handed to the session
#[derive(Debug)]
pub struct MockTransport {
    outbound: mpsc::UnboundedSender<Frame>,
    inbound: mpsc::UnboundedReceiver<Result<Frame>>,
}

impl Transport for MockTransport {
    fn split(self) -> (FrameSink, FrameStream) {
        let sink = self
            .outbound
            .sink_map_err(|e| Error::transport(format!("Mock peer gone: {}", e)));
        (Box::pin(sink), Box::pin(self.inbound))
    }
}

/// Debuggee side of a [`MockTransport`]
#[derive(Debug)]
pub struct MockPeer {
    sent: mpsc::UnboundedReceiver<Frame>,
    inject: Option<mpsc::UnboundedSender<Result<Frame>>>,
}

/// Create a connected transport/peer pair
pub fn mock_transport() -> (MockTransport, MockPeer) {
    let (outbound, sent) = mpsc::unbounded();
    let (inject, inbound) = mpsc::unbounded();

    (
        MockTransport { outbound, inbound },
        MockPeer {
            sent,
            inject: Some(inject),
        },
    )
}

impl MockPeer {
    /// Next command written by the session; `None` once the session dropped its sink
    pub async fn next_command(&mut self) -> Option<CommandEnvelope> {
        let frame = self.sent.next().await?;
        let text = match frame {
            Frame::Text(text) => text,
            Frame::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        };
        serde_json::from_str(&text).ok()
    }

    /// Inject a raw text frame
    pub fn send_raw(&self, text: impl Into<String>) {
        self.push(Ok(Frame::Text(text.into())));
    }

    /// Inject a JSON frame
    pub fn send_json(&self, value: Value) {
        self.send_raw(value.to_string());
    }

    /// Answer command `id` with a result
    pub fn respond(&self, id: u64, result: Value) {
        self.send_json(json!({ "id": id, "result": result }));
    }

    /// Answer command `id` with an error
    pub fn respond_error(&self, id: u64, code: i64, message: &str) {
        self.send_json(json!({ "id": id, "error": { "code": code, "message": message } }));
    }

    /// Emit an event on the top-level session
    pub fn emit(&self, method: &str, params: Value) {
        self.send_json(json!({ "method": method, "params": params }));
    }

    /// Emit an event routed to `session_id`
    pub fn emit_to(&self, session_id: &str, method: &str, params: Value) {
        self.send_json(json!({ "method": method, "params": params, "sessionId": session_id }));
    }

    /// Make the transport report an error; the session treats it as fatal
    pub fn fail(&self, reason: &str) {
        self.push(Err(Error::transport(reason)));
    }

    /// Close the inbound direction, as if the debuggee hung up
    pub fn hang_up(&mut self) {
        self.inject = None;
    }

    fn push(&self, item: Result<Frame>) {
        match &self.inject {
            Some(inject) => {
                if inject.unbounded_send(item).is_err() {
                    debug!("Mock peer: session no longer reading");
                }
            }
            None => debug!("Mock peer: already hung up"),
        }
    }

    /// Answer every command with [`default_response`] on a background task
    pub fn serve(self) -> JoinHandle<()> {
        self.serve_with(default_response)
    }

    /// Answer every command with `handler`; `None` leaves the command unanswered
    pub fn serve_with<F>(mut self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(&CommandEnvelope) -> Option<Value> + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(command) = self.next_command().await {
                if let Some(reply) = handler(&command) {
                    self.send_json(reply);
                }
            }
            debug!("Mock peer: session sink closed");
        })
    }
}

/// Canned debuggee reply for a command
pub fn default_response(command: &CommandEnvelope) -> Option<Value> {
    let id = command.id;
    let params = command.params.clone().unwrap_or(Value::Null);

    let mut reply = match command.method.as_str() {
        "Page.enable" | "Runtime.enable" | "Network.enable" | "DOM.enable" | "Network.disable"
        | "Target.setDiscoverTargets" | "Page.reload" => json!({ "id": id, "result": {} }),
        "Page.navigate" => match params.get("url").and_then(Value::as_str) {
            Some(url) if url.starts_with("http") => json!({
                "id": id,
                "result": { "frameId": "test-frame", "loaderId": "test-loader" }
            }),
            _ => json!({
                "id": id,
                "error": { "code": -32000, "message": "Invalid URL" }
            }),
        },
        "Runtime.evaluate" => match params.get("expression").and_then(Value::as_str) {
            Some(_) => json!({
                "id": id,
                "result": { "result": { "type": "string", "value": "test-result" } }
            }),
            None => json!({
                "id": id,
                "error": { "code": -32000, "message": "Invalid expression" }
            }),
        },
        "Page.captureScreenshot" => json!({
            "id": id,
            "result": {
                "data": "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg=="
            }
        }),
        "Target.attachToTarget" => {
            let target = params.get("targetId").and_then(Value::as_str).unwrap_or("unknown");
            json!({ "id": id, "result": { "sessionId": format!("session-{}", target) } })
        }
        "Target.getTargets" => json!({
            "id": id,
            "result": {
                "targetInfos": [{
                    "targetId": "test-target-1",
                    "type": "page",
                    "title": "Test Page",
                    "url": "about:blank",
                    "attached": false
                }]
            }
        }),
        "Browser.getVersion" => json!({
            "id": id,
            "result": {
                "protocolVersion": "1.3",
                "product": "Chrome/120.0.6099.109",
                "userAgent": "Mozilla/5.0 (Test)",
                "jsVersion": "12.0.267.8"
            }
        }),
        method => json!({
            "id": id,
            "error": { "code": -32601, "message": format!("'{}' wasn't found", method) }
        }),
    };

    if let Some(session_id) = &command.session_id {
        reply["sessionId"] = json!(session_id);
    }
    Some(reply)
}
