//! Overuse-stats listener registry.
//!
//! Two tables keyed by caller uid: per-uid listeners (only their own uid's
//! stats) and system-wide listeners (every push). Notification is
//! best-effort; a delivery failure is logged, never propagated.

use crate::types::ResourceOveruseStats;
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("listener handle already registered")]
    DuplicateRegistration,
}

pub trait OveruseListener: Send + Sync {
    fn on_overuse(&self, stats: &[ResourceOveruseStats]);
}

struct Entry {
    handle: u64,
    listener: std::sync::Arc<dyn OveruseListener>,
}

#[derive(Default)]
pub struct ListenerRegistry {
    per_uid: HashMap<i32, Vec<Entry>>,
    system: Vec<Entry>,
}

impl ListenerRegistry {
    pub fn add_per_uid(
        &mut self,
        uid: i32,
        handle: u64,
        listener: std::sync::Arc<dyn OveruseListener>,
    ) -> Result<(), ListenerError> {
        let entries = self.per_uid.entry(uid).or_default();
        if entries.iter().any(|e| e.handle == handle) {
            return Err(ListenerError::DuplicateRegistration);
        }
        entries.push(Entry { handle, listener });
        Ok(())
    }

    pub fn add_system(
        &mut self,
        handle: u64,
        listener: std::sync::Arc<dyn OveruseListener>,
    ) -> Result<(), ListenerError> {
        if self.system.iter().any(|e| e.handle == handle) {
            return Err(ListenerError::DuplicateRegistration);
        }
        self.system.push(Entry { handle, listener });
        Ok(())
    }

    pub fn remove(&mut self, handle: u64) {
        for entries in self.per_uid.values_mut() {
            entries.retain(|e| e.handle != handle);
        }
        self.system.retain(|e| e.handle != handle);
    }

    /// Dispatch one package's stats to its per-uid listeners and every
    /// system listener. Never panics on a listener error since
    /// `OveruseListener::on_overuse` is infallible by contract; callers that
    /// need failure visibility should catch_unwind at the boundary they own.
    pub fn dispatch(&self, uid: i32, stats: ResourceOveruseStats) {
        let batch = [stats];
        if let Some(entries) = self.per_uid.get(&uid) {
            for entry in entries {
                entry.listener.on_overuse(&batch);
            }
        }
        for entry in &self.system {
            entry.listener.on_overuse(&batch);
        }
        if self.per_uid.get(&uid).map(Vec::is_empty).unwrap_or(true) && self.system.is_empty() {
            warn!(uid, "overuse stats dispatched to no listeners");
        }
    }
}
