//! Transport abstraction
//!
//! A transport is a duplex channel of complete, ordered frames. The session splits
//! it once: the sink is shared by command senders, the stream is owned by the
//! reader task.

use crate::{Error, Result};
use bytes::Bytes;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

/// A complete wire frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame
    Text(String),
    /// Binary frame
    Binary(Bytes),
}

/// Outbound half of a transport
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = Error> + Send>>;

/// Inbound half of a transport. The stream ends when the peer closes the channel.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame>> + Send>>;

/// Duplex frame channel to a debuggee
pub trait Transport: Send + 'static {
    /// Split into independently usable outbound and inbound halves
    fn split(self) -> (FrameSink, FrameStream);
}

/// WebSocket transport backed by `tokio-tungstenite`
#[derive(Debug)]
pub struct WebSocketTransport {
    url: String,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WebSocketTransport {
    /// Connect to a debugger WebSocket URL
    ///
    /// # Arguments
    /// * `url` - WebSocket URL (e.g., "ws://localhost:9222/devtools/browser/ABC123")
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to WebSocket: {}", url);

        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::transport(format!("Failed to connect to {}: {}", url, e)))?;

        info!("WebSocket connection established");

        Ok(Self {
            url: url.to_string(),
            stream,
        })
    }

    /// URL this transport is connected to
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for WebSocketTransport {
    fn split(self) -> (FrameSink, FrameStream) {
        let (sink, stream) = self.stream.split();

        let sink = sink
            .sink_map_err(|e| Error::transport(format!("Failed to send message: {}", e)))
            .with(|frame: Frame| {
                let message = match frame {
                    Frame::Text(text) => Message::Text(text),
                    Frame::Binary(data) => Message::Binary(data.to_vec()),
                };
                future::ready(Ok::<_, Error>(message))
            });

        let stream = stream
            .take_while(|item| {
                let closing = matches!(item, Ok(Message::Close(_)));
                if closing {
                    info!("WebSocket close frame received");
                }
                future::ready(!closing)
            })
            .filter_map(|item| {
                future::ready(match item {
                    Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
                    Ok(Message::Binary(data)) => Some(Ok(Frame::Binary(Bytes::from(data)))),
                    Ok(other) => {
                        debug!("Ignoring control message: {:?}", other);
                        None
                    }
                    Err(e) => Some(Err(Error::transport(format!("WebSocket error: {}", e)))),
                })
            });

        (Box::pin(sink), Box::pin(stream))
    }
}
