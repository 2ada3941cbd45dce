//! The seven GraphRAG nodes and the two branch predicates that wire them.

use async_trait::async_trait;
use chrono::Utc;
use ragcore::{DocumentStore, GraphStore, QueryRecord, Result, Source, VectorStore};
use rag_llm::{GenerationRequest, LlmDispatcher};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::graph::Node;
use crate::state::{Entity, GraphRAGState, QueryType, Relation, Subquery};

const MAX_PRIMARY_ENTITIES: usize = 3;
const MAX_SECONDARY_PER_ENTITY: usize = 5;
const MAX_PATHS_PER_PAIR: usize = 1;
const MAX_COMMUNITIES: usize = 5;
const MAX_SUBQUERIES: usize = 3;
const SUBQUERY_ROW_LIMIT: usize = 10;

pub struct QueryAnalysisNode {
    pub llm: Arc<LlmDispatcher>,
}

#[derive(Deserialize, Default)]
struct QueryAnalysisJson {
    #[serde(default)]
    query_type: Option<String>,
    #[serde(default)]
    mentioned_tables: Vec<String>,
    #[serde(default)]
    exploration_depth: Option<u32>,
}

#[async_trait]
impl Node<GraphRAGState> for QueryAnalysisNode {
    async fn execute(&self, mut state: GraphRAGState) -> Result<GraphRAGState> {
        let prompt = format!(
            "Classify this database question as one of direct, exploration, analysis; \
             list any table names it mentions; suggest an exploration depth from 1 to 3. \
             Respond as JSON: {{\"query_type\":...,\"mentioned_tables\":[...],\"exploration_depth\":...}}. \
             Question: {}",
            state.query
        );
        let request = GenerationRequest {
            prompt,
            provider_id: state.llm_provider_id.clone(),
            ..Default::default()
        };

        let parsed = match self.llm.generate(request).await {
            Ok(resp) => serde_json::from_str::<QueryAnalysisJson>(&resp.text).unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "query analysis call failed, defaulting to direct");
                QueryAnalysisJson::default()
            }
        };

        state.query_type = match parsed.query_type.as_deref() {
            Some("exploration") => QueryType::Exploration,
            Some("analysis") => QueryType::Analysis,
            _ => QueryType::Direct,
        };
        state.mentioned_tables = parsed.mentioned_tables;
        let suggested = parsed.exploration_depth.unwrap_or(1).clamp(1, 3);
        let floor = state.min_exploration_depth.unwrap_or(1);
        state.exploration_depth = suggested.max(floor).clamp(1, 3);
        state
            .processing_info
            .insert("query_type".into(), format!("{:?}", state.query_type));
        Ok(state)
    }

    fn name(&self) -> &str {
        "query_analysis"
    }
}

pub struct SchemaRetrievalNode {
    pub vector_store: Arc<dyn VectorStore>,
    pub area_connection_lookup: Arc<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

#[async_trait]
impl Node<GraphRAGState> for SchemaRetrievalNode {
    async fn execute(&self, mut state: GraphRAGState) -> Result<GraphRAGState> {
        let mut results = self
            .vector_store
            .similarity_search("general", &state.query, 10, HashMap::new())
            .await
            .unwrap_or_default();

        if let Some(user_id) = &state.user_id {
            let mut filter = HashMap::new();
            filter.insert("owner_id".to_string(), user_id.clone());
            let personal = self
                .vector_store
                .similarity_search("personal", &state.query, 10, filter)
                .await
                .unwrap_or_default();
            results.extend(personal);
        }

        if let Some(area_id) = &state.area_id {
            if state.connection_id.is_none() {
                state.connection_id = (self.area_connection_lookup)(area_id);
            }
        }

        state.original_documents = results.into_iter().map(Source::from).collect();
        Ok(state)
    }

    fn name(&self) -> &str {
        "schema_retrieval"
    }
}

pub struct EntityIdentificationNode {
    pub graph_store: Option<Arc<dyn GraphStore>>,
}

#[async_trait]
impl Node<GraphRAGState> for EntityIdentificationNode {
    async fn execute(&self, mut state: GraphRAGState) -> Result<GraphRAGState> {
        let Some(graph_store) = &self.graph_store else {
            return Ok(state);
        };
        let Some(connection_id) = state.connection_id.clone() else {
            return Ok(state);
        };

        let mut names = Vec::new();
        for mentioned in &state.mentioned_tables {
            let exact = graph_store
                .find_tables_exact(&connection_id, mentioned)
                .await
                .unwrap_or_default();
            if exact.is_empty() {
                let fuzzy = graph_store
                    .find_tables_fuzzy(&connection_id, mentioned)
                    .await
                    .unwrap_or_default();
                names.extend(fuzzy);
            } else {
                names.extend(exact);
            }
        }

        if names.is_empty() {
            if matches!(state.query_type, QueryType::Exploration | QueryType::Analysis) {
                names = graph_store
                    .most_connected_tables(&connection_id, 5)
                    .await
                    .unwrap_or_default();
            } else {
                names = state
                    .original_documents
                    .iter()
                    .take(3)
                    .map(|d| d.metadata.get("name").cloned().unwrap_or_else(|| d.doc_id.clone()))
                    .collect();
            }
        }

        let total = names.len().max(1);
        for (rank, name) in names.into_iter().enumerate() {
            let relevance = 1.0 - (rank as f32 / total as f32) * 0.5;
            state.graph_context.add_entity(Entity {
                id: format!("{connection_id}::{name}"),
                name,
                schema: Some(connection_id.clone()),
                description: None,
                relevance,
            });
        }

        Ok(state)
    }

    fn name(&self) -> &str {
        "entity_identification"
    }
}

/// True iff a graph backend is reachable, a connection is in scope, at
/// least one entity was identified, and the query is not `direct` (or is
/// `direct` with two or more entities).
pub fn should_explore_graph(graph_available: bool) -> impl Fn(&GraphRAGState) -> bool {
    move |state: &GraphRAGState| {
        graph_available
            && state.connection_id.is_some()
            && !state.graph_context.entities.is_empty()
            && (state.query_type != QueryType::Direct || state.graph_context.entities.len() >= 2)
    }
}

pub struct GraphExplorationNode {
    pub graph_store: Arc<dyn GraphStore>,
}

#[async_trait]
impl Node<GraphRAGState> for GraphExplorationNode {
    async fn execute(&self, mut state: GraphRAGState) -> Result<GraphRAGState> {
        let Some(connection_id) = state.connection_id.clone() else {
            return Ok(state);
        };

        let primary: Vec<Entity> = state.graph_context.entities.clone();
        for entity in &primary {
            let outgoing = self
                .graph_store
                .outgoing_relations(&connection_id, &entity.name)
                .await
                .unwrap_or_default();
            for related in outgoing.into_iter().take(MAX_SECONDARY_PER_ENTITY) {
                let secondary_id = format!("{connection_id}::{}", related.table);
                state.graph_context.add_entity(Entity {
                    id: secondary_id.clone(),
                    name: related.table,
                    schema: Some(connection_id.clone()),
                    description: None,
                    relevance: 0.7,
                });
                state.graph_context.add_relation(Relation {
                    from_entity_id: entity.id.clone(),
                    to_entity_id: secondary_id,
                    via_columns: related.via_columns,
                });
            }
        }

        let top: Vec<&Entity> = primary.iter().take(MAX_PRIMARY_ENTITIES).collect();
        for i in 0..top.len() {
            for j in (i + 1)..top.len() {
                let paths = self
                    .graph_store
                    .shortest_paths(&connection_id, &top[i].name, &top[j].name, state.exploration_depth)
                    .await
                    .unwrap_or_default();
                state.graph_context.paths.extend(paths.into_iter().take(MAX_PATHS_PER_PAIR));
            }
        }

        if matches!(state.query_type, QueryType::Analysis) {
            let communities = self
                .graph_store
                .communities(&connection_id, MAX_COMMUNITIES)
                .await
                .unwrap_or_default();
            state.graph_context.communities = communities;
        }

        Ok(state)
    }

    fn name(&self) -> &str {
        "graph_exploration"
    }
}

/// True iff at least two entities and one relation are present, or any
/// path was found.
pub fn should_generate_subqueries(state: &GraphRAGState) -> bool {
    (state.graph_context.entities.len() >= 2 && !state.graph_context.relations.is_empty())
        || !state.graph_context.paths.is_empty()
}

pub struct SubqueryGenerationNode {
    pub llm: Arc<LlmDispatcher>,
    pub graph_store: Option<Arc<dyn GraphStore>>,
}

#[derive(Deserialize, Default)]
struct SubqueriesJson {
    #[serde(default)]
    questions: Vec<String>,
}

#[async_trait]
impl Node<GraphRAGState> for SubqueryGenerationNode {
    async fn execute(&self, mut state: GraphRAGState) -> Result<GraphRAGState> {
        let entity_names: Vec<&str> = state.graph_context.entities.iter().map(|e| e.name.as_str()).collect();
        let prompt = format!(
            "Given the question \"{}\" and the relevant tables {:?}, propose up to three \
             natural-language sub-questions that would help answer it. Respond as JSON: \
             {{\"questions\": [...]}}",
            state.query, entity_names
        );
        let request = GenerationRequest {
            prompt,
            provider_id: state.llm_provider_id.clone(),
            ..Default::default()
        };
        let questions = match self.llm.generate(request).await {
            Ok(resp) => serde_json::from_str::<SubqueriesJson>(&resp.text)
                .unwrap_or_default()
                .questions,
            Err(e) => {
                warn!(error = %e, "sub-query generation call failed, skipping");
                Vec::new()
            }
        };

        for question in questions.into_iter().take(MAX_SUBQUERIES) {
            let answer = self.execute_subquery(&question, state.connection_id.as_deref(), &state).await;
            state.graph_context.add_subquery(Subquery { question, answer });
        }

        Ok(state)
    }

    fn name(&self) -> &str {
        "subquery_generation"
    }
}

impl SubqueryGenerationNode {
    async fn execute_subquery(
        &self,
        question: &str,
        connection_id: Option<&str>,
        state: &GraphRAGState,
    ) -> String {
        let about_schema = self.graph_store.is_some()
            && connection_id.is_some()
            && question.to_lowercase().contains("table");

        if !about_schema {
            let request = GenerationRequest {
                prompt: question.to_string(),
                provider_id: state.llm_provider_id.clone(),
                ..Default::default()
            };
            return self
                .llm
                .generate(request)
                .await
                .map(|r| r.text)
                .unwrap_or_else(|e| format!("unable to answer sub-question: {e}"));
        }

        let Some(graph_store) = &self.graph_store else {
            return "graph backend unavailable".to_string();
        };
        let Some(connection_id) = connection_id else {
            return "no connection in scope".to_string();
        };
        let description = graph_store
            .describe(connection_id)
            .await
            .unwrap_or_else(|e| format!("describe failed: {e}"));
        format_table_rows(&description, SUBQUERY_ROW_LIMIT)
    }
}

fn format_table_rows(text: &str, limit: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= limit {
        return text.to_string();
    }
    let head = lines[..limit].join("\n");
    format!("{head}\n... and {} more", lines.len() - limit)
}

pub struct ContextAggregationNode;

#[async_trait]
impl Node<GraphRAGState> for ContextAggregationNode {
    async fn execute(&self, mut state: GraphRAGState) -> Result<GraphRAGState> {
        let mut blocks = Vec::new();

        if !state.original_documents.is_empty() {
            let snippets: Vec<String> = state.original_documents.iter().map(|s| s.text.clone()).collect();
            blocks.push(snippets.join("\n---\n"));
        }

        if !state.graph_context.entities.is_empty() {
            let mut lines = vec!["Tables:".to_string()];
            for entity in &state.graph_context.entities {
                let incoming: Vec<&Relation> = state
                    .graph_context
                    .relations
                    .iter()
                    .filter(|r| r.to_entity_id == entity.id)
                    .collect();
                let outgoing: Vec<&Relation> = state
                    .graph_context
                    .relations
                    .iter()
                    .filter(|r| r.from_entity_id == entity.id)
                    .collect();
                lines.push(format!(
                    "- {} (incoming: {}, outgoing: {})",
                    entity.name,
                    incoming.len(),
                    outgoing.len()
                ));
            }
            blocks.push(lines.join("\n"));
        }

        if !state.graph_context.paths.is_empty() {
            let mut lines = vec!["Connections between tables:".to_string()];
            for path in &state.graph_context.paths {
                lines.push(format!("- {}", path.tables.join(" -> ")));
            }
            blocks.push(lines.join("\n"));
        }

        if !state.graph_context.subqueries.is_empty() {
            let mut lines = vec!["Additional information:".to_string()];
            for sq in &state.graph_context.subqueries {
                lines.push(format!("Q: {}\nA: {}", sq.question, sq.answer));
            }
            blocks.push(lines.join("\n"));
        }

        if matches!(state.query_type, QueryType::Analysis) && !state.graph_context.communities.is_empty() {
            let mut lines = vec!["Communities:".to_string()];
            for (id, tables) in &state.graph_context.communities {
                lines.push(format!("- community {id}: {}", tables.join(", ")));
            }
            blocks.push(lines.join("\n"));
        }

        state
            .processing_info
            .insert("context_blocks".into(), blocks.len().to_string());
        state.processing_info.insert("aggregated_context".into(), blocks.join("\n\n"));
        Ok(state)
    }

    fn name(&self) -> &str {
        "context_aggregation"
    }
}

pub struct ResponseGenerationNode {
    pub llm: Arc<LlmDispatcher>,
    pub history_store: Option<Arc<dyn DocumentStore>>,
}

const APOLOGY: &str = "I wasn't able to generate an answer for that question. Please try rephrasing it.";

#[async_trait]
impl Node<GraphRAGState> for ResponseGenerationNode {
    async fn execute(&self, mut state: GraphRAGState) -> Result<GraphRAGState> {
        let context = state
            .processing_info
            .get("aggregated_context")
            .cloned()
            .unwrap_or_default();
        let prompt = format!(
            "Answer the question using only the context below.\n\nContext:\n{context}\n\nQuestion: {}",
            state.query
        );
        let request = GenerationRequest {
            prompt,
            provider_id: state.llm_provider_id.clone(),
            ..Default::default()
        };

        match self.llm.generate(request).await {
            Ok(resp) => {
                state.response = resp.text;
                state.sources = state.original_documents.clone();
                ragcore::sort_sources(&mut state.sources);
            }
            Err(e) => {
                warn!(error = %e, "response generation failed");
                state.response = APOLOGY.to_string();
                state.sources = Vec::new();
                state.processing_info.insert("error".into(), e.to_string());
                return Ok(state);
            }
        }

        if let Some(store) = &self.history_store {
            let record = QueryRecord {
                query: state.query.clone(),
                user_id: state.user_id.clone(),
                area_ids: state.area_id.clone().into_iter().collect(),
                include_personal: false,
                provider_id: state.llm_provider_id.clone(),
                answer: state.response.clone(),
                sources: state.sources.clone(),
                processing_time_ms: 0,
                timestamp: Utc::now(),
            };
            let id = format!("{}-{}", state.query.len(), record.timestamp.timestamp_nanos_opt().unwrap_or(0));
            if let Ok(value) = serde_json::to_value(&record) {
                let _ = store.upsert("query_history", &id, value).await;
            }
        }

        Ok(state)
    }

    fn name(&self) -> &str {
        "response_generation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::GraphRAGState;

    #[test]
    fn explore_decision_requires_a_graph_backend_and_a_connection() {
        let mut state = GraphRAGState::new("q".into());
        state.connection_id = Some("c1".into());
        state.graph_context.add_entity(Entity {
            id: "e1".into(),
            name: "orders".into(),
            schema: None,
            description: None,
            relevance: 1.0,
        });
        state.query_type = QueryType::Exploration;
        assert!(should_explore_graph(true)(&state));
        assert!(!should_explore_graph(false)(&state));
    }

    #[test]
    fn explore_decision_requires_at_least_two_entities_for_direct_queries() {
        let mut state = GraphRAGState::new("q".into());
        state.connection_id = Some("c1".into());
        state.query_type = QueryType::Direct;
        state.graph_context.add_entity(Entity {
            id: "e1".into(),
            name: "orders".into(),
            schema: None,
            description: None,
            relevance: 1.0,
        });
        assert!(!should_explore_graph(true)(&state));
        state.graph_context.add_entity(Entity {
            id: "e2".into(),
            name: "customers".into(),
            schema: None,
            description: None,
            relevance: 1.0,
        });
        assert!(should_explore_graph(true)(&state));
    }

    #[test]
    fn subquery_decision_requires_a_relation_or_a_path() {
        let mut state = GraphRAGState::new("q".into());
        assert!(!should_generate_subqueries(&state));
        state.graph_context.paths.push(ragcore::GraphPath {
            tables: vec!["orders".into(), "customers".into()],
            via_columns: vec![],
        });
        assert!(should_generate_subqueries(&state));
    }

    #[test]
    fn format_table_rows_adds_a_marker_past_the_limit() {
        let text = (0..15).map(|i| format!("row{i}")).collect::<Vec<_>>().join("\n");
        let formatted = format_table_rows(&text, 10);
        assert!(formatted.ends_with("... and 5 more"));
    }

    #[test]
    fn format_table_rows_passes_short_text_through_unchanged() {
        let text = "row0\nrow1";
        assert_eq!(format_table_rows(text, 10), text);
    }
}
