//! Common test utilities
//!
//! A mock Chrome server for integration tests: a WebSocket endpoint speaking CDP
//! and a `wiremock` HTTP server answering `/json/version` and `/json/list`.

#![allow(dead_code)]

use chaser_cdp::cdp::mock::default_response;
use chaser_cdp::cdp::CommandEnvelope;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Method that makes the server drop the connection instead of answering
pub const CLOSE_SOCKET: &str = "Test.closeSocket";

/// Mock Chrome server
pub struct MockChromeServer {
    ws_addr: String,
    http: MockServer,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MockChromeServer {
    /// Start a new mock Chrome server
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let ws_listener = TcpListener::bind("127.0.0.1:0").await?;
        let ws_addr = format!("ws://{}/devtools/browser/mock-browser", ws_listener.local_addr()?);
        let http = Self::start_discovery(&ws_addr).await;

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            let mut connection_id = 0;

            loop {
                tokio::select! {
                    result = ws_listener.accept() => match result {
                        Ok((stream, peer_addr)) => {
                            tracing::info!("Mock Chrome: Connection from {}", peer_addr);
                            tokio::spawn(Self::handle_connection(stream, connection_id));
                            connection_id += 1;
                        }
                        Err(e) => {
                            tracing::error!("Mock Chrome: Accept error: {}", e);
                            break;
                        }
                    },
                    _ = &mut shutdown_rx => {
                        tracing::info!("Mock Chrome: Shutdown signal received");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            ws_addr,
            http,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Handle a WebSocket connection
    async fn handle_connection(stream: TcpStream, connection_id: u32) {
        let ws_stream = match accept_async(stream).await {
            Ok(ws_stream) => ws_stream,
            Err(e) => {
                tracing::error!("Mock Chrome: WebSocket handshake error: {}", e);
                return;
            }
        };
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    let Ok(command) = serde_json::from_str::<CommandEnvelope>(&text) else {
                        continue;
                    };

                    if command.method == CLOSE_SOCKET {
                        let _ = ws_sender.send(Message::Close(None)).await;
                        break;
                    }

                    for reply in Self::create_cdp_replies(&command) {
                        if ws_sender.send(Message::Text(reply.to_string())).await.is_err() {
                            return;
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!("Mock Chrome: Connection {} closed", connection_id);
                    break;
                }
                Err(e) => {
                    tracing::error!("Mock Chrome: WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    }

    /// Frames sent back for a command: the response, then any events it triggers
    fn create_cdp_replies(command: &CommandEnvelope) -> Vec<Value> {
        let mut replies: Vec<Value> = default_response(command).into_iter().collect();

        let navigated = command.method == "Page.navigate"
            && replies.first().is_some_and(|reply| reply.get("result").is_some());
        if navigated {
            let mut event = json!({
                "method": "Page.loadEventFired",
                "params": { "timestamp": 1234.5 }
            });
            if let Some(session_id) = &command.session_id {
                event["sessionId"] = json!(session_id);
            }
            replies.push(event);
        }

        replies
    }

    /// HTTP discovery endpoints pointing at `debugger_url`
    async fn start_discovery(debugger_url: &str) -> MockServer {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/json/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Browser": "Chrome/120.0.6099.109",
                "Protocol-Version": "1.3",
                "User-Agent": "Mozilla/5.0 (Test)",
                "V8-Version": "12.0.267.8",
                "webSocketDebuggerUrl": debugger_url,
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/json/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": "test-target-1",
                "type": "page",
                "title": "Test Page",
                "url": "about:blank",
                "webSocketDebuggerUrl": debugger_url.replace("browser/mock-browser", "page/test-target-1"),
            }])))
            .mount(&server)
            .await;

        server
    }

    /// Debugger WebSocket URL
    pub fn ws_endpoint(&self) -> &str {
        &self.ws_addr
    }

    /// HTTP discovery endpoint
    pub fn http_endpoint(&self) -> String {
        self.http.uri()
    }

    /// Stop accepting connections
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockChromeServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Config pointing at `endpoint` with default everything else
pub fn config_for(endpoint: &str) -> chaser_cdp::config::Config {
    chaser_cdp::config::Config {
        endpoint: endpoint.to_string(),
        ..Default::default()
    }
}
