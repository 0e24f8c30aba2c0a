//! Network domain

use super::standing_view;
use crate::cdp::client::{Domain, SessionHandle};
use crate::cdp::hub::EventView;
use crate::cdp::types::{Command, Event};
use crate::Result;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

/// `Network.enable`
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enable {
    /// Buffer size for network payloads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_total_buffer_size: Option<u64>,
}

impl Command for Enable {
    const METHOD: &'static str = "Network.enable";
    type Response = Value;
}

/// `Network.disable`
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Disable;

impl Command for Disable {
    const METHOD: &'static str = "Network.disable";
    type Response = Value;
}

/// HTTP request data
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, Value>,
}

/// HTTP response data
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub url: String,
    pub status: u16,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub mime_type: String,
}

/// `Network.requestWillBeSent`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestWillBeSent {
    pub request_id: String,
    pub request: Request,
    #[serde(default)]
    pub frame_id: Option<String>,
    #[serde(default)]
    pub timestamp: f64,
}

impl Event for RequestWillBeSent {
    const METHOD: &'static str = "Network.requestWillBeSent";
}

/// `Network.responseReceived`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseReceived {
    pub request_id: String,
    pub response: Response,
    #[serde(default)]
    pub timestamp: f64,
}

impl Event for ResponseReceived {
    const METHOD: &'static str = "Network.responseReceived";
}

/// `Network.loadingFinished`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingFinished {
    pub request_id: String,
    #[serde(default)]
    pub encoded_data_length: f64,
}

impl Event for LoadingFinished {
    const METHOD: &'static str = "Network.loadingFinished";
}

/// `Network.loadingFailed`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingFailed {
    pub request_id: String,
    #[serde(default)]
    pub error_text: String,
    #[serde(default)]
    pub canceled: Option<bool>,
}

impl Event for LoadingFailed {
    const METHOD: &'static str = "Network.loadingFailed";
}

/// Network domain wrapper
#[derive(Debug)]
pub struct Network {
    session: SessionHandle,
    request_will_be_sent: OnceLock<EventView<RequestWillBeSent>>,
    response_received: OnceLock<EventView<ResponseReceived>>,
    loading_finished: OnceLock<EventView<LoadingFinished>>,
    loading_failed: OnceLock<EventView<LoadingFailed>>,
}

impl Domain for Network {
    fn attach(session: SessionHandle) -> Self {
        Self {
            session,
            request_will_be_sent: OnceLock::new(),
            response_received: OnceLock::new(),
            loading_finished: OnceLock::new(),
            loading_failed: OnceLock::new(),
        }
    }
}

impl Network {
    /// Start receiving network events
    pub async fn enable(&self) -> Result<()> {
        self.session.execute(&Enable::default()).await?;
        Ok(())
    }

    /// Stop receiving network events
    pub async fn disable(&self) -> Result<()> {
        self.session.execute(&Disable).await?;
        Ok(())
    }

    pub fn on_request_will_be_sent(&self) -> BoxStream<'static, RequestWillBeSent> {
        standing_view(&self.request_will_be_sent, &self.session).subscribe()
    }

    pub fn on_response_received(&self) -> BoxStream<'static, ResponseReceived> {
        standing_view(&self.response_received, &self.session).subscribe()
    }

    pub fn on_loading_finished(&self) -> BoxStream<'static, LoadingFinished> {
        standing_view(&self.loading_finished, &self.session).subscribe()
    }

    pub fn on_loading_failed(&self) -> BoxStream<'static, LoadingFailed> {
        standing_view(&self.loading_failed, &self.session).subscribe()
    }
}
