//! Pending-call registry
//!
//! Maps each in-flight command id to a single-use completion channel. Every entry
//! is resolved exactly once: by its response, by [`PendingCalls::fail_all`] on
//! teardown, or by removal when the caller stops waiting.

use super::types::ResponseEnvelope;
use crate::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Receiving end handed to the caller of a command
pub type Completion = oneshot::Receiver<Result<Value>>;

/// Pending command response
#[derive(Debug)]
struct PendingCall {
    /// Response channel sender
    sender: oneshot::Sender<Result<Value>>,
    /// Command method (for logging)
    method: String,
    /// When the command was registered
    issued_at: Instant,
}

#[derive(Debug, Default)]
struct Registry {
    calls: HashMap<u64, PendingCall>,
    /// Set once the session has torn down; later registrations are refused with it
    closed: Option<String>,
}

/// Registry of in-flight commands
#[derive(Debug, Default)]
pub struct PendingCalls {
    inner: Mutex<Registry>,
}

impl PendingCalls {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new in-flight command.
    ///
    /// Fails if `id` is already pending, or if the registry was already failed by
    /// [`fail_all`](Self::fail_all).
    pub fn register(&self, id: u64, method: &str) -> Result<Completion> {
        let mut registry = self.registry();

        if let Some(reason) = &registry.closed {
            return Err(Error::transport(reason.clone()));
        }

        if registry.calls.contains_key(&id) {
            return Err(Error::internal(format!("Command id {} is already pending", id)));
        }

        let (sender, receiver) = oneshot::channel();
        registry.calls.insert(
            id,
            PendingCall {
                sender,
                method: method.to_string(),
                issued_at: Instant::now(),
            },
        );

        Ok(receiver)
    }

    /// Complete the entry matching `response.id`.
    ///
    /// Returns `false` when no entry exists; the response is logged and discarded.
    pub fn resolve(&self, response: ResponseEnvelope) -> bool {
        let Some(call) = self.take(response.id) else {
            warn!("Received response for unknown command ID: {}", response.id);
            return false;
        };

        debug!(
            "Resolved command {} ({}) after {:?}",
            response.id,
            call.method,
            call.issued_at.elapsed()
        );

        let outcome = response.outcome.map_err(Error::from);
        if call.sender.send(outcome).is_err() {
            debug!("Caller of command {} stopped waiting", response.id);
        }
        true
    }

    /// Complete the entry for `id` with a failure.
    ///
    /// Returns `false` when no entry exists.
    pub fn reject(&self, id: u64, error: Error) -> bool {
        let Some(call) = self.take(id) else {
            warn!("Dropping failure for unknown command ID {}: {}", id, error);
            return false;
        };

        debug!("Rejected command {} ({}): {}", id, call.method, error);
        let _ = call.sender.send(Err(error));
        true
    }

    /// Drop the entry for `id` without completing it. Used when the caller gives up.
    pub fn remove(&self, id: u64) -> bool {
        self.take(id).is_some()
    }

    /// Fail every outstanding entry with a transport error and refuse new ones.
    ///
    /// Returns the number of entries failed.
    pub fn fail_all(&self, reason: &str) -> usize {
        let calls: Vec<(u64, PendingCall)> = {
            let mut registry = self.registry();
            if registry.closed.is_none() {
                registry.closed = Some(reason.to_string());
            }
            registry.calls.drain().collect()
        };

        let count = calls.len();
        for (id, call) in calls {
            debug!("Failing pending command {} ({}): {}", id, call.method, reason);
            let _ = call.sender.send(Err(Error::transport(reason)));
        }

        if count > 0 {
            warn!("Failed {} pending commands: {}", count, reason);
        }
        count
    }

    /// Number of in-flight commands
    pub fn len(&self) -> usize {
        self.registry().calls.len()
    }

    /// Whether no command is in flight
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take(&self, id: u64) -> Option<PendingCall> {
        self.registry().calls.remove(&id)
    }
}

/// Removes its entry on drop unless the entry was already resolved.
///
/// Held by the caller for the duration of its wait, so a cancelled or timed-out
/// wait never leaves a stale entry behind.
pub(crate) struct PendingGuard<'a> {
    calls: &'a PendingCalls,
    id: u64,
}

impl<'a> PendingGuard<'a> {
    pub(crate) fn new(calls: &'a PendingCalls, id: u64) -> Self {
        Self { calls, id }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.calls.remove(self.id) {
            debug!("Abandoned pending command {}", self.id);
        }
    }
}
