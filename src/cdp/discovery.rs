//! Debugger endpoint discovery
//!
//! Resolves a browser's HTTP debugging endpoint (`http://host:9222`) to the
//! WebSocket URL the session connects to, and lists its targets.

use crate::{Error, Result};
use serde::Deserialize;
use tracing::{debug, info};

/// Browser version information from `/json/version`
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserVersion {
    /// Protocol version
    #[serde(rename = "Protocol-Version", default)]
    pub protocol_version: String,
    /// Product name
    #[serde(rename = "Browser", default)]
    pub product: String,
    /// User agent
    #[serde(rename = "User-Agent", default)]
    pub user_agent: String,
    /// JavaScript engine version
    #[serde(rename = "V8-Version", default)]
    pub js_version: String,
    /// Browser-level debugger URL
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: Option<String>,
}

/// Target information (page, worker, etc.) from `/json/list`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    /// Target ID
    pub id: String,
    /// Target type
    #[serde(rename = "type")]
    pub target_type: String,
    /// Target title
    #[serde(default)]
    pub title: String,
    /// Target URL
    #[serde(default)]
    pub url: String,
    /// Debugger URL; absent while another client is attached
    #[serde(default)]
    pub web_socket_debugger_url: Option<String>,
}

/// Turn any endpoint form into its HTTP base URL
fn http_base(endpoint: &str) -> String {
    let http = if let Some(rest) = endpoint.strip_prefix("ws://") {
        format!("http://{}", rest)
    } else if let Some(rest) = endpoint.strip_prefix("wss://") {
        format!("https://{}", rest)
    } else if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    };

    // Keep only scheme://host:port
    let authority_start = http.find("://").map_or(0, |i| i + 3);
    match http[authority_start..].find('/') {
        Some(slash) => http[..authority_start + slash].to_string(),
        None => http,
    }
}

/// Whether `endpoint` already names a debugger WebSocket
fn is_debugger_url(endpoint: &str) -> bool {
    (endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) && endpoint.contains("/devtools/")
}

/// Resolve `endpoint` to a debugger WebSocket URL, querying `/json/version` if needed
pub async fn resolve_ws_url(endpoint: &str) -> Result<String> {
    if is_debugger_url(endpoint) {
        return Ok(endpoint.to_string());
    }

    let version = fetch_version(endpoint).await?;
    let url = version
        .web_socket_debugger_url
        .ok_or_else(|| Error::discovery("No webSocketDebuggerUrl in /json/version response"))?;

    info!("Resolved {} to {}", endpoint, url);
    Ok(url)
}

/// Fetch browser version info
pub async fn fetch_version(endpoint: &str) -> Result<BrowserVersion> {
    let url = format!("{}/json/version", http_base(endpoint));
    let body = get_text(&url).await?;
    parse_version(&body)
}

/// List all targets (pages, workers, etc.)
pub async fn list_targets(endpoint: &str) -> Result<Vec<TargetInfo>> {
    let url = format!("{}/json/list", http_base(endpoint));
    let body = get_text(&url).await?;
    parse_targets(&body)
}

async fn get_text(url: &str) -> Result<String> {
    debug!("Fetching {}", url);

    let response = reqwest::get(url)
        .await
        .map_err(|e| Error::discovery(format!("Failed to connect to browser at {}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(Error::discovery(format!(
            "{} answered with status {}",
            url,
            response.status()
        )));
    }

    response
        .text()
        .await
        .map_err(|e| Error::discovery(format!("Failed to read response from {}: {}", url, e)))
}

fn parse_version(body: &str) -> Result<BrowserVersion> {
    serde_json::from_str(body)
        .map_err(|e| Error::discovery(format!("Failed to parse version: {}", e)))
}

fn parse_targets(body: &str) -> Result<Vec<TargetInfo>> {
    serde_json::from_str(body)
        .map_err(|e| Error::discovery(format!("Failed to parse targets: {}", e)))
}
