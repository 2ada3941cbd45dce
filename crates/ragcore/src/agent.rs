//! Agent entity — a named LLM persona with scoped connection access.

use serde::{Deserialize, Serialize};

/// The four named prompt slots an [`Agent`] carries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentPrompts {
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub query_evaluation: String,
    #[serde(default)]
    pub query_generation: String,
    #[serde(default)]
    pub result_formatting: String,
}

/// An admin-managed LLM persona.
///
/// `connection_ids` is a weak reference set: deleting
/// an [`Agent`] cascades to drop its assignments; deleting a `Connection`
/// orphans any assignment that named it, which callers must treat as
/// missing rather than erroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub model: String,
    pub prompts: AgentPrompts,
    #[serde(default)]
    pub example_queries: Vec<String>,
    #[serde(default)]
    pub connection_ids: Vec<String>,
}

impl Agent {
    /// Remove a connection assignment; idempotent if it was never present.
    pub fn unassign_connection(&mut self, connection_id: &str) {
        self.connection_ids.retain(|id| id != connection_id);
    }

    /// Add a connection assignment if not already present.
    pub fn assign_connection(&mut self, connection_id: String) {
        if !self.connection_ids.contains(&connection_id) {
            self.connection_ids.push(connection_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> Agent {
        Agent {
            id: "a1".into(),
            name: "analyst".into(),
            model: "gpt-4o".into(),
            prompts: AgentPrompts::default(),
            example_queries: vec![],
            connection_ids: vec![],
        }
    }

    #[test]
    fn assignment_is_idempotent() {
        let mut a = agent();
        a.assign_connection("c1".into());
        a.assign_connection("c1".into());
        assert_eq!(a.connection_ids, vec!["c1".to_string()]);
    }

    #[test]
    fn unassign_missing_connection_is_noop() {
        let mut a = agent();
        a.unassign_connection("missing");
        assert!(a.connection_ids.is_empty());
    }
}
