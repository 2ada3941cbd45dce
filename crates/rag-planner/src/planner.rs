//! Wires the seven nodes into a compiled graph and runs it, falling back to
//! plain vector RAG — and ultimately to a fixed apology — on any failure.

use ragcore::{DocumentStore, GraphStore, Result, VectorStore};
use rag_llm::{GenerationRequest, LlmDispatcher};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::graph::{CompiledGraph, StateGraph, END};
use crate::nodes::{
    should_explore_graph, should_generate_subqueries, ContextAggregationNode, EntityIdentificationNode,
    GraphExplorationNode, QueryAnalysisNode, ResponseGenerationNode, SchemaRetrievalNode,
    SubqueryGenerationNode,
};
use crate::state::GraphRAGState;

const APOLOGY: &str = "I wasn't able to generate an answer for that question. Please try rephrasing it.";

pub struct GraphRagPlanner {
    llm: Arc<LlmDispatcher>,
    vector_store: Arc<dyn VectorStore>,
    graph_store: Option<Arc<dyn GraphStore>>,
    history_store: Option<Arc<dyn DocumentStore>>,
    area_connection_lookup: Arc<dyn Fn(&str) -> Option<String> + Send + Sync>,
    graph: CompiledGraph<GraphRAGState>,
}

impl GraphRagPlanner {
    pub fn new(
        llm: Arc<LlmDispatcher>,
        vector_store: Arc<dyn VectorStore>,
        graph_store: Option<Arc<dyn GraphStore>>,
        history_store: Option<Arc<dyn DocumentStore>>,
        area_connection_lookup: Arc<dyn Fn(&str) -> Option<String> + Send + Sync>,
    ) -> Result<Self> {
        let graph = build_graph(&llm, &vector_store, &graph_store, &history_store, &area_connection_lookup)?;
        Ok(GraphRagPlanner {
            llm,
            vector_store,
            graph_store,
            history_store,
            area_connection_lookup,
            graph,
        })
    }

    pub async fn process_query(
        &self,
        query: String,
        connection_id: Option<String>,
        user_id: Option<String>,
        area_id: Option<String>,
        llm_provider_id: Option<String>,
    ) -> GraphRAGState {
        self.process_query_with_depth(query, connection_id, user_id, area_id, llm_provider_id, None)
            .await
    }

    /// Same as [`Self::process_query`] but with a floor on the exploration
    /// depth the query-analysis node would otherwise pick on its own.
    pub async fn process_query_with_depth(
        &self,
        query: String,
        connection_id: Option<String>,
        user_id: Option<String>,
        area_id: Option<String>,
        llm_provider_id: Option<String>,
        min_exploration_depth: Option<u32>,
    ) -> GraphRAGState {
        let mut state = GraphRAGState::new(query.clone());
        state.connection_id = connection_id;
        state.user_id = user_id;
        state.area_id = area_id;
        state.llm_provider_id = llm_provider_id.clone();
        state.min_exploration_depth = min_exploration_depth;

        match self.graph.invoke(state).await {
            Ok(final_state) => final_state,
            Err(e) => {
                warn!(error = %e, "graph rag pipeline failed, falling back to vector rag");
                match self.fallback_query(query, llm_provider_id).await {
                    Ok(state) => state,
                    Err(e2) => {
                        warn!(error = %e2, "vector rag fallback also failed, returning apology");
                        let mut state = GraphRAGState::default();
                        state.response = APOLOGY.to_string();
                        state.processing_info.insert("error".into(), e2.to_string());
                        state
                    }
                }
            }
        }
    }

    async fn fallback_query(&self, query: String, llm_provider_id: Option<String>) -> Result<GraphRAGState> {
        let matches = self
            .vector_store
            .similarity_search("general", &query, 10, HashMap::new())
            .await?;
        let mut sources: Vec<ragcore::Source> = matches.into_iter().map(ragcore::Source::from).collect();
        ragcore::sort_sources(&mut sources);

        let context = sources.iter().map(|s| s.text.clone()).collect::<Vec<_>>().join("\n---\n");
        let prompt = format!("Answer the question using only the context below.\n\nContext:\n{context}\n\nQuestion: {query}");
        let response = self
            .llm
            .generate(GenerationRequest {
                prompt,
                provider_id: llm_provider_id,
                ..Default::default()
            })
            .await?;

        let mut state = GraphRAGState::new(query);
        state.response = response.text;
        state.sources = sources;
        state.processing_info.insert("fallback".into(), "vector_rag".into());
        Ok(state)
    }
}

fn build_graph(
    llm: &Arc<LlmDispatcher>,
    vector_store: &Arc<dyn VectorStore>,
    graph_store: &Option<Arc<dyn GraphStore>>,
    history_store: &Option<Arc<dyn DocumentStore>>,
    area_connection_lookup: &Arc<dyn Fn(&str) -> Option<String> + Send + Sync>,
) -> Result<CompiledGraph<GraphRAGState>> {
    let mut graph: StateGraph<GraphRAGState> = StateGraph::new();

    graph.add_node(Arc::new(QueryAnalysisNode { llm: llm.clone() }));
    graph.add_node(Arc::new(SchemaRetrievalNode {
        vector_store: vector_store.clone(),
        area_connection_lookup: area_connection_lookup.clone(),
    }));
    graph.add_node(Arc::new(EntityIdentificationNode {
        graph_store: graph_store.clone(),
    }));
    graph.add_node(Arc::new(ContextAggregationNode));
    graph.add_node(Arc::new(ResponseGenerationNode {
        llm: llm.clone(),
        history_store: history_store.clone(),
    }));
    graph.add_node(Arc::new(SubqueryGenerationNode {
        llm: llm.clone(),
        graph_store: graph_store.clone(),
    }));

    graph.set_entry_point("query_analysis");
    graph.add_edge("query_analysis", "schema_retrieval");
    graph.add_edge("schema_retrieval", "entity_identification");

    let graph_available = graph_store.is_some();
    if let Some(store) = graph_store.clone() {
        graph.add_node(Arc::new(GraphExplorationNode { graph_store: store }));
    }
    graph.add_conditional_edge(
        "entity_identification",
        should_explore_graph(graph_available),
        "graph_exploration",
        "context_aggregation",
    );
    graph.add_conditional_edge(
        "graph_exploration",
        should_generate_subqueries,
        "subquery_generation",
        "context_aggregation",
    );
    graph.add_edge("subquery_generation", "context_aggregation");
    graph.add_edge("context_aggregation", "response_generation");
    graph.add_edge("response_generation", END);

    graph.compile()
}
