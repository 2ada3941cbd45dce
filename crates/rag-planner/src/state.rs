//! The state object threaded through the GraphRAG node graph.

use ragcore::{GraphPath, Source};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The classification query analysis assigns, driving exploration depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Direct,
    Exploration,
    Analysis,
}

impl Default for QueryType {
    fn default() -> Self {
        QueryType::Direct
    }
}

/// A table identified as relevant to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub schema: Option<String>,
    pub description: Option<String>,
    pub relevance: f32,
}

/// A relation discovered between two entities during graph exploration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    pub from_entity_id: String,
    pub to_entity_id: String,
    pub via_columns: Vec<String>,
}

/// A sub-question generated and answered during planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subquery {
    pub question: String,
    pub answer: String,
}

/// The evolving graph-derived context accumulated across nodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphContext {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
    pub subqueries: Vec<Subquery>,
    pub paths: Vec<GraphPath>,
    pub communities: HashMap<i64, Vec<String>>,
}

impl GraphContext {
    pub fn get_entity_by_id(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    pub fn get_entity_by_name(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name == name)
    }

    pub fn add_entity(&mut self, entity: Entity) {
        if self.get_entity_by_id(&entity.id).is_none() {
            self.entities.push(entity);
        }
    }

    pub fn add_relation(&mut self, relation: Relation) {
        self.relations.push(relation);
    }

    pub fn add_subquery(&mut self, subquery: Subquery) {
        self.subqueries.push(subquery);
    }
}

/// The state object carried through every node of the planner's graph.
#[derive(Debug, Clone, Default)]
pub struct GraphRAGState {
    pub query: String,
    pub connection_id: Option<String>,
    pub user_id: Option<String>,
    pub area_id: Option<String>,
    pub llm_provider_id: Option<String>,

    pub query_type: QueryType,
    pub mentioned_tables: Vec<String>,
    pub exploration_depth: u32,
    /// Floor applied to the LLM-suggested exploration depth; callers that
    /// need deeper graph traversal than the model volunteers set this.
    pub min_exploration_depth: Option<u32>,

    pub original_documents: Vec<Source>,
    pub graph_context: GraphContext,

    pub response: String,
    pub sources: Vec<Source>,
    pub processing_info: HashMap<String, String>,
}

impl GraphRAGState {
    pub fn new(query: String) -> Self {
        GraphRAGState {
            query,
            exploration_depth: 1,
            ..Default::default()
        }
    }
}
