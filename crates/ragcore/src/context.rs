//! MCP Context entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named MCP retrieval context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub context_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_activated: Option<DateTime<Utc>>,
}

impl Context {
    pub fn new(context_id: String, name: String) -> Self {
        let now = Utc::now();
        Context {
            context_id,
            name,
            description: None,
            metadata: HashMap::new(),
            active: false,
            created_at: now,
            updated_at: now,
            last_activated: None,
        }
    }

    /// Activate, recording `last_activated`. Idempotent: a second call while
    /// already active still refreshes `last_activated` but leaves `active`
    /// unchanged.
    pub fn activate(&mut self) {
        self.active = true;
        self.last_activated = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// Deactivate; idempotent.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.updated_at = Utc::now();
    }
}

/// Optional filter applied to `list_active`, resolving Open Question (b):
/// both the embedded and HTTP MCP clients accept this same filter shape.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContextFilter {
    pub metadata_type: Option<String>,
}

impl ContextFilter {
    pub fn matches(&self, ctx: &Context) -> bool {
        match &self.metadata_type {
            Some(t) => ctx.metadata.get("type").is_some_and(|v| v == t),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activate_is_idempotent_on_the_active_flag() {
        let mut ctx = Context::new("ctx-A".into(), "Area A".into());
        ctx.activate();
        assert!(ctx.active);
        ctx.activate();
        assert!(ctx.active);
    }

    #[test]
    fn deactivate_is_idempotent() {
        let mut ctx = Context::new("ctx-A".into(), "Area A".into());
        ctx.deactivate();
        assert!(!ctx.active);
        ctx.deactivate();
        assert!(!ctx.active);
    }

    #[test]
    fn filter_matches_on_metadata_type() {
        let mut ctx = Context::new("ctx-A".into(), "Area A".into());
        ctx.metadata.insert("type".into(), "personal".into());
        let filter = ContextFilter {
            metadata_type: Some("personal".into()),
        };
        assert!(filter.matches(&ctx));
        let filter2 = ContextFilter {
            metadata_type: Some("general".into()),
        };
        assert!(!filter2.matches(&ctx));
    }
}
