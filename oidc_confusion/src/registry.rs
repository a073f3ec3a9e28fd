//! Actor instances currently reachable through the dispatcher.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

use crate::actor::ActorInstance;
use crate::types::{RoleSlot, TestId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("No {slot} instance registered for test {test_id}")]
    MissingInstance { test_id: String, slot: RoleSlot },
}

/// Shared map from (test id, role slot) to the live actor instance of the
/// running step.
#[derive(Default)]
pub struct InstanceRegistry {
    instances: RwLock<HashMap<(TestId, RoleSlot), Arc<ActorInstance>>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `instance` under its slot. A previous instance in the same
    /// slot is replaced.
    pub fn register(&self, test_id: &TestId, instance: ActorInstance) -> Arc<ActorInstance> {
        let slot = instance.slot();
        let instance = Arc::new(instance);
        let previous = self
            .instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((test_id.clone(), slot), instance.clone());
        if previous.is_some() {
            tracing::warn!("Replaced {} instance of test {}", slot, test_id);
        }
        tracing::debug!("Registered {} ({}) for test {}", slot, instance.behavior_id(), test_id);
        instance
    }

    pub fn lookup(&self, test_id: &TestId, slot: RoleSlot) -> Result<Arc<ActorInstance>, RegistryError> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(test_id.clone(), slot))
            .cloned()
            .ok_or_else(|| RegistryError::MissingInstance {
                test_id: test_id.to_string(),
                slot,
            })
    }

    /// Remove the instance in `slot`. Returns whether one was registered.
    pub fn unregister(&self, test_id: &TestId, slot: RoleSlot) -> bool {
        let removed = self
            .instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(test_id.clone(), slot))
            .is_some();
        if removed {
            tracing::debug!("Unregistered {} for test {}", slot, test_id);
        }
        removed
    }

    /// Slots currently registered for `test_id`.
    pub fn slots(&self, test_id: &TestId) -> Vec<RoleSlot> {
        let mut slots: Vec<RoleSlot> = self
            .instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|(id, _)| id == test_id)
            .map(|(_, slot)| *slot)
            .collect();
        slots.sort_by_key(|slot| slot.to_string());
        slots
    }

    pub fn len(&self) -> usize {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
