//! GraphRAG query planning: a seven-node state graph blending vector
//! retrieval with graph traversal, falling back to plain vector RAG on
//! failure.

pub mod graph;
pub mod nodes;
pub mod planner;
pub mod state;

pub use planner::GraphRagPlanner;
pub use state::{Entity, GraphContext, GraphRAGState, QueryType, Relation, Subquery};
