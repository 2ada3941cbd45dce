//! Shared application state handed to every route handler.

use rag_connections::ConnectionRegistry;
use rag_mcp::{ContextRegistry, ToolRuntime};
use rag_orchestrator::Orchestrator;
use rag_planner::GraphRagPlanner;
use ragcore::{DocumentStore, GraphStore};
use std::sync::Arc;

use crate::agents::AgentRegistry;
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub connections: Arc<ConnectionRegistry>,
    pub agents: Arc<AgentRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub graph_store: Option<Arc<dyn GraphStore>>,
    pub planner: Arc<GraphRagPlanner>,
    pub history_store: Arc<dyn DocumentStore>,
    pub contexts: Arc<ContextRegistry>,
    pub tools: Arc<ToolRuntime>,
}
