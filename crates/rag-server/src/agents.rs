//! Agent CRUD and connection-assignment management.
//!
//! Mirrors `rag_connections::ConnectionRegistry`'s document-store-backed CRUD
//! shape: every mutation loads the current document, applies the change, and
//! upserts it back under the same id.

use ragcore::{Agent, AgentPrompts, DocumentStore, Error, Result};
use std::sync::Arc;
use uuid::Uuid;

const AGENTS_COLLECTION: &str = "agents";

/// Request body to create an [`Agent`].
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NewAgent {
    pub name: String,
    pub model: String,
    #[serde(default)]
    pub prompts: AgentPrompts,
    #[serde(default)]
    pub example_queries: Vec<String>,
}

pub struct AgentRegistry {
    store: Arc<dyn DocumentStore>,
}

impl AgentRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        AgentRegistry { store }
    }

    async fn persist(&self, agent: &Agent) -> Result<()> {
        let value = serde_json::to_value(agent).map_err(|e| Error::Internal(e.to_string()))?;
        self.store.upsert(AGENTS_COLLECTION, &agent.id, value).await
    }

    async fn load(&self, agent_id: &str) -> Result<Agent> {
        let doc = self
            .store
            .get(AGENTS_COLLECTION, agent_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("agent '{agent_id}' not found")))?;
        serde_json::from_value(doc).map_err(|e| Error::Internal(e.to_string()))
    }

    pub async fn create(&self, new: NewAgent) -> Result<Agent> {
        let agent = Agent {
            id: Uuid::new_v4().to_string(),
            name: new.name,
            model: new.model,
            prompts: new.prompts,
            example_queries: new.example_queries,
            connection_ids: Vec::new(),
        };
        self.persist(&agent).await?;
        Ok(agent)
    }

    pub async fn get(&self, agent_id: &str) -> Result<Agent> {
        self.load(agent_id).await
    }

    pub async fn list(&self) -> Result<Vec<Agent>> {
        let docs = self.store.list(AGENTS_COLLECTION).await?;
        docs.into_iter()
            .map(|d| serde_json::from_value(d).map_err(|e| Error::Internal(e.to_string())))
            .collect()
    }

    pub async fn update(&self, agent_id: &str, new: NewAgent) -> Result<Agent> {
        let mut existing = self.load(agent_id).await?;
        existing.name = new.name;
        existing.model = new.model;
        existing.prompts = new.prompts;
        existing.example_queries = new.example_queries;
        self.persist(&existing).await?;
        Ok(existing)
    }

    pub async fn delete(&self, agent_id: &str) -> Result<()> {
        self.store.delete(AGENTS_COLLECTION, agent_id).await
    }

    pub async fn get_prompts(&self, agent_id: &str) -> Result<AgentPrompts> {
        Ok(self.load(agent_id).await?.prompts)
    }

    pub async fn update_prompts(&self, agent_id: &str, prompts: AgentPrompts) -> Result<AgentPrompts> {
        let mut existing = self.load(agent_id).await?;
        existing.prompts = prompts.clone();
        self.persist(&existing).await?;
        Ok(prompts)
    }

    pub async fn assign_connection(&self, agent_id: &str, connection_id: String) -> Result<Agent> {
        let mut existing = self.load(agent_id).await?;
        existing.assign_connection(connection_id);
        self.persist(&existing).await?;
        Ok(existing)
    }

    pub async fn unassign_connection(&self, agent_id: &str, connection_id: &str) -> Result<Agent> {
        let mut existing = self.load(agent_id).await?;
        existing.unassign_connection(connection_id);
        self.persist(&existing).await?;
        Ok(existing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct InMemoryStore {
        data: Mutex<HashMap<(String, String), Value>>,
    }

    #[async_trait]
    impl DocumentStore for InMemoryStore {
        async fn upsert(&self, collection: &str, id: &str, document: Value) -> Result<()> {
            self.data.lock().await.insert((collection.to_string(), id.to_string()), document);
            Ok(())
        }
        async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
            Ok(self.data.lock().await.get(&(collection.to_string(), id.to_string())).cloned())
        }
        async fn find_one_by_field(&self, _collection: &str, _field: &str, _value: &str) -> Result<Option<Value>> {
            Ok(None)
        }
        async fn list(&self, collection: &str) -> Result<Vec<Value>> {
            let data = self.data.lock().await;
            Ok(data.iter().filter(|((c, _), _)| c == collection).map(|(_, v)| v.clone()).collect())
        }
        async fn delete(&self, collection: &str, id: &str) -> Result<()> {
            self.data.lock().await.remove(&(collection.to_string(), id.to_string()));
            Ok(())
        }
    }

    fn registry() -> AgentRegistry {
        AgentRegistry::new(Arc::new(InMemoryStore::default()))
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let registry = registry();
        let created = registry
            .create(NewAgent {
                name: "analyst".into(),
                model: "gpt-4o".into(),
                prompts: AgentPrompts::default(),
                example_queries: vec!["how many orders?".into()],
            })
            .await
            .unwrap();
        let fetched = registry.get(&created.id).await.unwrap();
        assert_eq!(fetched.name, "analyst");
        assert!(fetched.connection_ids.is_empty());
    }

    #[tokio::test]
    async fn deleting_a_connection_assignment_is_idempotent() {
        let registry = registry();
        let created = registry
            .create(NewAgent {
                name: "analyst".into(),
                model: "gpt-4o".into(),
                prompts: AgentPrompts::default(),
                example_queries: vec![],
            })
            .await
            .unwrap();
        registry.assign_connection(&created.id, "c1".into()).await.unwrap();
        let unassigned_once = registry.unassign_connection(&created.id, "c1").await.unwrap();
        assert!(unassigned_once.connection_ids.is_empty());
        let unassigned_twice = registry.unassign_connection(&created.id, "c1").await.unwrap();
        assert!(unassigned_twice.connection_ids.is_empty());
    }

    #[tokio::test]
    async fn update_prompts_replaces_only_the_prompts_field() {
        let registry = registry();
        let created = registry
            .create(NewAgent {
                name: "analyst".into(),
                model: "gpt-4o".into(),
                prompts: AgentPrompts::default(),
                example_queries: vec![],
            })
            .await
            .unwrap();
        let new_prompts = AgentPrompts {
            system: "you are an analyst".into(),
            ..Default::default()
        };
        registry.update_prompts(&created.id, new_prompts.clone()).await.unwrap();
        let fetched = registry.get_prompts(&created.id).await.unwrap();
        assert_eq!(fetched.system, "you are an analyst");
    }
}
