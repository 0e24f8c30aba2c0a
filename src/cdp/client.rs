//! CDP client implementation
//!
//! [`CdpClient`] pairs a session handle with its own domain registry. Domain
//! wrappers talk to the session only through [`SessionHandle`]: sending commands
//! and subscribing to events.

use super::connection::CdpSession;
use super::hub::{EventStream, TypedEventStream};
use super::registry::DomainRegistry;
use super::types::{Command, Event};
use crate::config::Config;
use crate::domains::target::AttachToTarget;
use crate::domains::{Network, Page, Runtime, Target};
use crate::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// A domain wrapper built once per client
pub trait Domain: Send + Sync + 'static {
    /// Build the wrapper over a session handle
    fn attach(session: SessionHandle) -> Self;
}

/// A session plus the target session id commands are routed to
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session: Arc<CdpSession>,
    session_id: Option<String>,
}

impl SessionHandle {
    /// Handle for the top-level session
    pub fn new(session: Arc<CdpSession>) -> Self {
        Self {
            session,
            session_id: None,
        }
    }

    /// Handle routed to an attached target session
    pub fn for_target(session: Arc<CdpSession>, session_id: impl Into<String>) -> Self {
        Self {
            session,
            session_id: Some(session_id.into()),
        }
    }

    /// Underlying session
    pub fn session(&self) -> &Arc<CdpSession> {
        &self.session
    }

    /// Target session id, `None` for the top-level session
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Call a raw CDP method (returns JSON Value)
    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value> {
        self.session
            .send_command_to(method, params, self.session_id())
            .await
    }

    /// Send a typed command
    pub async fn execute<C: Command>(&self, command: &C) -> Result<C::Response> {
        self.session.execute_in(command, self.session_id()).await
    }

    /// Raw events named `method` for this handle's session
    pub fn subscribe(&self, method: &str) -> EventStream {
        self.session.subscribe_session(method, self.session_id())
    }

    /// Typed events for this handle's session
    pub fn events<E: Event>(&self) -> TypedEventStream<E> {
        self.subscribe(E::METHOD).typed()
    }
}

/// CDP client: session handle plus per-client domain cache
#[derive(Debug, Clone)]
pub struct CdpClient {
    handle: SessionHandle,
    domains: Arc<DomainRegistry>,
}

impl CdpClient {
    /// Connect to the configured endpoint
    pub async fn connect(config: &Config) -> Result<Self> {
        let session = CdpSession::connect(config).await?;
        Ok(Self::new(session))
    }

    /// Create a client over an existing session
    pub fn new(session: Arc<CdpSession>) -> Self {
        info!("Creating CDP client");
        Self {
            handle: SessionHandle::new(session),
            domains: Arc::new(DomainRegistry::new()),
        }
    }

    /// Handle commands and subscriptions go through
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Underlying session
    pub fn session(&self) -> &Arc<CdpSession> {
        self.handle.session()
    }

    /// Domain registry of this client
    pub fn domains(&self) -> &DomainRegistry {
        &self.domains
    }

    /// The single instance of domain `D` for this client
    pub fn domain<D: Domain>(&self) -> Result<Arc<D>> {
        let handle = self.handle.clone();
        self.domains.get_or_create(move || D::attach(handle))
    }

    /// Page domain
    pub fn page(&self) -> Result<Arc<Page>> {
        self.domain()
    }

    /// Network domain
    pub fn network(&self) -> Result<Arc<Network>> {
        self.domain()
    }

    /// Runtime domain
    pub fn runtime(&self) -> Result<Arc<Runtime>> {
        self.domain()
    }

    /// Target domain
    pub fn target(&self) -> Result<Arc<Target>> {
        self.domain()
    }

    /// Call a raw CDP method
    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value> {
        self.handle.send_command(method, params).await
    }

    /// Send a typed command
    pub async fn execute<C: Command>(&self, command: &C) -> Result<C::Response> {
        self.handle.execute(command).await
    }

    /// Attach to a target in flat mode.
    ///
    /// The returned client shares this client's transport but routes everything
    /// through the new `sessionId` and has its own domain instances.
    pub async fn attach_to_target(&self, target_id: &str) -> Result<CdpClient> {
        info!("Attaching to target: {}", target_id);

        let attached = self
            .execute(&AttachToTarget {
                target_id: target_id.to_string(),
                flatten: Some(true),
            })
            .await?;

        info!("Attached to {} as session {}", target_id, attached.session_id);

        Ok(Self {
            handle: SessionHandle::for_target(Arc::clone(self.session()), attached.session_id),
            domains: Arc::new(DomainRegistry::new()),
        })
    }

    /// Close the underlying session (affects every client sharing it)
    pub async fn close(&self) -> Result<()> {
        self.session().close().await
    }
}
