//! Page domain

use super::standing_view;
use crate::cdp::client::{Domain, SessionHandle};
use crate::cdp::hub::EventView;
use crate::cdp::types::{Command, Event};
use crate::{Error, Result};
use base64::Engine;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;
use tracing::{debug, info};

/// `Page.enable`
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Enable;

impl Command for Enable {
    const METHOD: &'static str = "Page.enable";
    type Response = Value;
}

/// `Page.navigate`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Navigate {
    /// URL to navigate to
    pub url: String,
    /// Referrer URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    /// Transition type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition_type: Option<String>,
}

impl Command for Navigate {
    const METHOD: &'static str = "Page.navigate";
    type Response = NavigateResult;
}

/// Result of `Page.navigate`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateResult {
    /// Frame that navigated
    pub frame_id: String,
    /// Loader id; absent for same-document navigations
    #[serde(default)]
    pub loader_id: Option<String>,
    /// Set when the navigation failed without a protocol error
    #[serde(default)]
    pub error_text: Option<String>,
}

/// `Page.reload`
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reload {
    /// Bypass the cache
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_cache: Option<bool>,
}

impl Command for Reload {
    const METHOD: &'static str = "Page.reload";
    type Response = Value;
}

/// Screenshot image format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG (lossless)
    #[default]
    Png,
    /// JPEG
    Jpeg,
    /// WebP
    Webp,
}

/// `Page.captureScreenshot`
#[derive(Debug, Clone, Default, Serialize)]
pub struct CaptureScreenshot {
    /// Image format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<ImageFormat>,
    /// Compression quality (0-100), jpeg and webp only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
}

impl Command for CaptureScreenshot {
    const METHOD: &'static str = "Page.captureScreenshot";
    type Response = ScreenshotData;
}

/// Result of `Page.captureScreenshot`
#[derive(Debug, Clone, Deserialize)]
pub struct ScreenshotData {
    /// Base64-encoded image
    pub data: String,
}

impl ScreenshotData {
    /// Decoded image bytes
    pub fn decode(&self) -> Result<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.data)
            .map_err(|e| Error::protocol(format!("Failed to decode screenshot: {}", e)))
    }
}

/// `Page.loadEventFired`
#[derive(Debug, Clone, Deserialize)]
pub struct LoadEventFired {
    /// Monotonic time
    pub timestamp: f64,
}

impl Event for LoadEventFired {
    const METHOD: &'static str = "Page.loadEventFired";
}

/// `Page.domContentEventFired`
#[derive(Debug, Clone, Deserialize)]
pub struct DomContentEventFired {
    /// Monotonic time
    pub timestamp: f64,
}

impl Event for DomContentEventFired {
    const METHOD: &'static str = "Page.domContentEventFired";
}

/// `Page.frameStartedLoading`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameStartedLoading {
    /// Frame that started loading
    pub frame_id: String,
}

impl Event for FrameStartedLoading {
    const METHOD: &'static str = "Page.frameStartedLoading";
}

/// Page domain wrapper
#[derive(Debug)]
pub struct Page {
    session: SessionHandle,
    load_event_fired: OnceLock<EventView<LoadEventFired>>,
    dom_content_event_fired: OnceLock<EventView<DomContentEventFired>>,
    frame_started_loading: OnceLock<EventView<FrameStartedLoading>>,
}

impl Domain for Page {
    fn attach(session: SessionHandle) -> Self {
        Self {
            session,
            load_event_fired: OnceLock::new(),
            dom_content_event_fired: OnceLock::new(),
            frame_started_loading: OnceLock::new(),
        }
    }
}

impl Page {
    /// Enable page event notifications
    pub async fn enable(&self) -> Result<()> {
        self.session.execute(&Enable).await?;
        Ok(())
    }

    /// Navigate to a URL
    pub async fn navigate(&self, url: &str) -> Result<NavigateResult> {
        info!("Navigating to {}", url);

        let result = self
            .session
            .execute(&Navigate {
                url: url.to_string(),
                referrer: None,
                transition_type: None,
            })
            .await?;

        if let Some(error_text) = &result.error_text {
            debug!("Navigation to {} reported: {}", url, error_text);
        }
        Ok(result)
    }

    /// Reload the page
    pub async fn reload(&self, ignore_cache: bool) -> Result<()> {
        self.session
            .execute(&Reload {
                ignore_cache: Some(ignore_cache),
            })
            .await?;
        Ok(())
    }

    /// Capture a screenshot and return the decoded image
    pub async fn capture_screenshot(&self, format: ImageFormat) -> Result<Vec<u8>> {
        debug!("Capturing {:?} screenshot", format);

        let shot = self
            .session
            .execute(&CaptureScreenshot {
                format: Some(format),
                quality: None,
            })
            .await?;
        shot.decode()
    }

    /// Stream of `Page.loadEventFired`
    pub fn on_load_event_fired(&self) -> BoxStream<'static, LoadEventFired> {
        standing_view(&self.load_event_fired, &self.session).subscribe()
    }

    /// Stream of `Page.domContentEventFired`
    pub fn on_dom_content_event_fired(&self) -> BoxStream<'static, DomContentEventFired> {
        standing_view(&self.dom_content_event_fired, &self.session).subscribe()
    }

    /// Stream of `Page.frameStartedLoading`
    pub fn on_frame_started_loading(&self) -> BoxStream<'static, FrameStartedLoading> {
        standing_view(&self.frame_started_loading, &self.session).subscribe()
    }
}
