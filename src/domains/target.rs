//! Target domain
//!
//! Target discovery and flat-mode attachment. Attached sessions share the
//! browser connection; their traffic is tagged with the returned `sessionId`.

use super::standing_view;
use crate::cdp::client::{Domain, SessionHandle};
use crate::cdp::hub::EventView;
use crate::cdp::types::{Command, Event, NoParams};
use crate::Result;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;
use tracing::info;

/// Target description as reported over the protocol
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    pub target_id: String,
    pub r#type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub attached: bool,
}

/// `Target.setDiscoverTargets`
#[derive(Debug, Clone, Serialize)]
pub struct SetDiscoverTargets {
    pub discover: bool,
}

impl Command for SetDiscoverTargets {
    const METHOD: &'static str = "Target.setDiscoverTargets";
    type Response = Value;
}

/// `Target.getTargets`
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GetTargets(NoParams);

impl Command for GetTargets {
    const METHOD: &'static str = "Target.getTargets";
    type Response = GetTargetsResult;
}

/// Result of `Target.getTargets`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTargetsResult {
    pub target_infos: Vec<TargetInfo>,
}

/// `Target.attachToTarget`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachToTarget {
    /// Target to attach to
    pub target_id: String,
    /// Use flat session mode (sessionId on every message)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flatten: Option<bool>,
}

impl Command for AttachToTarget {
    const METHOD: &'static str = "Target.attachToTarget";
    type Response = AttachToTargetResult;
}

/// Result of `Target.attachToTarget`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachToTargetResult {
    /// Session id of the new attachment
    pub session_id: String,
}

/// `Target.targetCreated`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetCreated {
    pub target_info: TargetInfo,
}

impl Event for TargetCreated {
    const METHOD: &'static str = "Target.targetCreated";
}

/// `Target.attachedToTarget`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedToTarget {
    pub session_id: String,
    pub target_info: TargetInfo,
    #[serde(default)]
    pub waiting_for_debugger: bool,
}

impl Event for AttachedToTarget {
    const METHOD: &'static str = "Target.attachedToTarget";
}

/// `Target.detachedFromTarget`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachedFromTarget {
    pub session_id: String,
    #[serde(default)]
    pub target_id: Option<String>,
}

impl Event for DetachedFromTarget {
    const METHOD: &'static str = "Target.detachedFromTarget";
}

/// Target domain wrapper
#[derive(Debug)]
pub struct Target {
    session: SessionHandle,
    target_created: OnceLock<EventView<TargetCreated>>,
    attached_to_target: OnceLock<EventView<AttachedToTarget>>,
    detached_from_target: OnceLock<EventView<DetachedFromTarget>>,
}

impl Domain for Target {
    fn attach(session: SessionHandle) -> Self {
        Self {
            session,
            target_created: OnceLock::new(),
            attached_to_target: OnceLock::new(),
            detached_from_target: OnceLock::new(),
        }
    }
}

impl Target {
    /// Turn `Target.targetCreated` and friends on or off
    pub async fn set_discover_targets(&self, discover: bool) -> Result<()> {
        self.session.execute(&SetDiscoverTargets { discover }).await?;
        Ok(())
    }

    /// All targets known to the browser
    pub async fn get_targets(&self) -> Result<Vec<TargetInfo>> {
        let result = self.session.execute(&GetTargets::default()).await?;
        Ok(result.target_infos)
    }

    /// Attach to `target_id` in flat mode and return the new session id
    pub async fn attach_to_target(&self, target_id: &str) -> Result<String> {
        let result = self
            .session
            .execute(&AttachToTarget {
                target_id: target_id.to_string(),
                flatten: Some(true),
            })
            .await?;

        info!("Attached to {} as session {}", target_id, result.session_id);
        Ok(result.session_id)
    }

    pub fn on_target_created(&self) -> BoxStream<'static, TargetCreated> {
        standing_view(&self.target_created, &self.session).subscribe()
    }

    pub fn on_attached_to_target(&self) -> BoxStream<'static, AttachedToTarget> {
        standing_view(&self.attached_to_target, &self.session).subscribe()
    }

    pub fn on_detached_from_target(&self) -> BoxStream<'static, DetachedFromTarget> {
        standing_view(&self.detached_from_target, &self.session).subscribe()
    }
}
