//! Context registry and activation lifecycle.
//!
//! A single exclusive lock covers both `activate` and `deactivate` so that
//! concurrent callers observe consistent `active` state — the same
//! lock-discipline the orchestrator applies to its active-jobs map: acquire
//! only for the duration of the mutation, never across an I/O suspension
//! point.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use ragcore::{Context, ContextFilter, Error, Result};
use std::sync::Arc;

/// Process-wide registry of MCP contexts.
pub struct ContextRegistry {
    contexts: Arc<DashMap<String, Context>>,
    activation_lock: Mutex<()>,
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextRegistry {
    pub fn new() -> Self {
        ContextRegistry {
            contexts: Arc::new(DashMap::new()),
            activation_lock: Mutex::new(()),
        }
    }

    /// Create (or replace) a context, e.g. when an Area is created.
    pub fn upsert(&self, context: Context) {
        self.contexts.insert(context.context_id.clone(), context);
    }

    pub fn get(&self, context_id: &str) -> Option<Context> {
        self.contexts.get(context_id).map(|c| c.clone())
    }

    /// Lock-free snapshot of every context whose `active` flag is set and
    /// that matches `filter`.
    pub fn list_active(&self, filter: Option<&ContextFilter>) -> Vec<Context> {
        self.contexts
            .iter()
            .map(|e| e.value().clone())
            .filter(|c| c.active)
            .filter(|c| filter.is_none_or(|f| f.matches(c)))
            .collect()
    }

    pub fn list_all(&self) -> Vec<Context> {
        self.contexts.iter().map(|e| e.value().clone()).collect()
    }

    /// Activate a context. Idempotent; fails with `NotFound` if the context
    /// was never created (clients are expected to create an Area first).
    pub fn activate(&self, context_id: &str) -> Result<Context> {
        let _guard = self.activation_lock.lock();
        let mut entry = self
            .contexts
            .get_mut(context_id)
            .ok_or_else(|| Error::NotFound(format!("context '{context_id}' not found")))?;
        entry.active = true;
        entry.last_activated = Some(Utc::now());
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    /// Deactivate a context. Idempotent; deactivating a missing context is
    /// also a `NotFound` for symmetry with `activate`.
    pub fn deactivate(&self, context_id: &str) -> Result<Context> {
        let _guard = self.activation_lock.lock();
        let mut entry = self
            .contexts
            .get_mut(context_id)
            .ok_or_else(|| Error::NotFound(format!("context '{context_id}' not found")))?;
        entry.active = false;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activating_unknown_context_fails_not_found() {
        let registry = ContextRegistry::new();
        let err = registry.activate("missing").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn double_activation_leaves_active_list_unchanged() {
        let registry = ContextRegistry::new();
        registry.upsert(Context::new("ctx-A".into(), "Area A".into()));
        registry.activate("ctx-A").unwrap();
        let first = registry.list_active(None);
        registry.activate("ctx-A").unwrap();
        let second = registry.list_active(None);
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].context_id, second[0].context_id);
    }

    #[test]
    fn deactivate_is_idempotent() {
        let registry = ContextRegistry::new();
        registry.upsert(Context::new("ctx-A".into(), "Area A".into()));
        registry.activate("ctx-A").unwrap();
        registry.deactivate("ctx-A").unwrap();
        registry.deactivate("ctx-A").unwrap();
        assert!(registry.list_active(None).is_empty());
    }
}
