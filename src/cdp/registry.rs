//! Domain registry
//!
//! Per-client cache of domain wrapper instances. Each domain type is built at most
//! once, even under concurrent first access, so its event views subscribe to the
//! hub exactly once.

use crate::{Error, Result};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::debug;

type Instance = Arc<dyn Any + Send + Sync>;

/// Lazily populated map from domain type to its single instance
#[derive(Debug, Default)]
pub struct DomainRegistry {
    slots: Mutex<HashMap<TypeId, Arc<OnceLock<Instance>>>>,
}

impl DomainRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached instance of `D`, building it with `factory` on first access.
    ///
    /// Concurrent first accesses block until the single construction finishes.
    /// `factory` must not request `D` from the same registry.
    pub fn get_or_create<D, F>(&self, factory: F) -> Result<Arc<D>>
    where
        D: Any + Send + Sync,
        F: FnOnce() -> D,
    {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(TypeId::of::<D>()).or_default())
        };

        let instance = slot.get_or_init(|| {
            debug!("Creating domain instance: {}", type_name::<D>());
            Arc::new(factory()) as Instance
        });

        Arc::clone(instance)
            .downcast::<D>()
            .map_err(|_| Error::internal(format!("Domain slot type mismatch for {}", type_name::<D>())))
    }

    /// Whether an instance of `D` has been created
    pub fn contains<D: Any>(&self) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<D>())
            .is_some_and(|slot| slot.get().is_some())
    }

    /// Number of domain instances created so far
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    /// Whether no domain has been created yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
