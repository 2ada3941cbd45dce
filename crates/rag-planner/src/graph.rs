//! A small state-graph runner: named async nodes wired by edges, with
//! conditional edges deciding between two successors based on the current
//! state. Mirrors the node/edge/compile shape used for every LLM-call graph
//! in this codebase, generalized here to support branching.

use async_trait::async_trait;
use ragcore::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// The sentinel successor name that ends graph execution.
pub const END: &str = "__end__";

/// A single step in the graph. `name` identifies the node for edge wiring
/// and for `processing_info` / tracing correlation.
#[async_trait]
pub trait Node<S: Send>: Send + Sync {
    async fn execute(&self, state: S) -> Result<S>;
    fn name(&self) -> &str;
}

enum Edge<S> {
    Next(String),
    Conditional {
        predicate: Arc<dyn Fn(&S) -> bool + Send + Sync>,
        if_true: String,
        if_false: String,
    },
}

/// An unvalidated graph under construction.
pub struct StateGraph<S> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    edges: HashMap<String, Edge<S>>,
    entry_point: Option<String>,
}

impl<S: Send + 'static> Default for StateGraph<S> {
    fn default() -> Self {
        StateGraph {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry_point: None,
        }
    }
}

impl<S: Send + 'static> StateGraph<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Arc<dyn Node<S>>) {
        self.nodes.insert(node.name().to_string(), node);
    }

    pub fn set_entry_point(&mut self, name: &str) {
        self.entry_point = Some(name.to_string());
    }

    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.edges.insert(from.to_string(), Edge::Next(to.to_string()));
    }

    pub fn add_conditional_edge(
        &mut self,
        from: &str,
        predicate: impl Fn(&S) -> bool + Send + Sync + 'static,
        if_true: &str,
        if_false: &str,
    ) {
        self.edges.insert(
            from.to_string(),
            Edge::Conditional {
                predicate: Arc::new(predicate),
                if_true: if_true.to_string(),
                if_false: if_false.to_string(),
            },
        );
    }

    pub fn compile(self) -> Result<CompiledGraph<S>> {
        let entry_point = self.entry_point.ok_or_else(|| {
            ragcore::Error::Internal("state graph compiled without an entry point".into())
        })?;
        Ok(CompiledGraph {
            nodes: self.nodes,
            edges: self.edges,
            entry_point,
        })
    }
}

pub struct CompiledGraph<S> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    edges: HashMap<String, Edge<S>>,
    entry_point: String,
}

impl<S: Send + 'static> CompiledGraph<S> {
    /// Run from the entry point until a node has no outgoing edge or an
    /// edge resolves to [`END`].
    pub async fn invoke(&self, mut state: S) -> Result<S> {
        let mut current = self.entry_point.clone();
        loop {
            let node = self.nodes.get(&current).ok_or_else(|| {
                ragcore::Error::Internal(format!("state graph has no node named '{current}'"))
            })?;
            state = node.execute(state).await?;

            let next = match self.edges.get(&current) {
                None => break,
                Some(Edge::Next(name)) => name.clone(),
                Some(Edge::Conditional {
                    predicate,
                    if_true,
                    if_false,
                }) => {
                    if predicate(&state) {
                        if_true.clone()
                    } else {
                        if_false.clone()
                    }
                }
            };
            if next == END {
                break;
            }
            current = next;
        }
        Ok(state)
    }
}
