//! Narrow persistence ports.
//!
//! Every store the platform talks to — document metadata, vectors, graph —
//! sits behind one of these traits so that the orchestrator, planner, and
//! MCP runtime never depend on a concrete backend. Implementations live in
//! `rag-connections` (document store), `rag-graph` (graph store), and
//! provider-specific vector store adapters.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::Result;
use crate::query::Source;

/// A generic document-metadata store: one collection per entity kind, keyed
/// by an opaque id. Backs `Connection`, `Agent`, `Schema`, `QueryRecord`, and
/// graph-RAG history persistence.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or replace a document by id within `collection`.
    async fn upsert(&self, collection: &str, id: &str, document: Value) -> Result<()>;

    /// Fetch a document by id, or `None` if absent.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    /// Find at most one document matching `field == value` in `collection`
    /// (used for the unique `connection_id` index on Schema documents).
    async fn find_one_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<Value>>;

    /// List every document in a collection (bounded by the caller's use case;
    /// the platform never stores unbounded collections on this port).
    async fn list(&self, collection: &str) -> Result<Vec<Value>>;

    /// Delete a document by id. Idempotent: deleting an absent id is not an error.
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;
}

/// A single vector record returned by [`VectorStore::similarity_search`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct VectorMatch {
    pub doc_id: String,
    pub score: f64,
    pub text: String,
    pub metadata: HashMap<String, String>,
}

impl From<VectorMatch> for Source {
    fn from(m: VectorMatch) -> Self {
        Source {
            doc_id: m.doc_id,
            score: m.score,
            text: m.text,
            metadata: m.metadata,
        }
    }
}

/// A vector similarity search backend. `database_schemas`, `general`, and
/// `personal` are the three collections the platform writes to.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embed and store `text`, returning the assigned document id.
    async fn add_text(
        &self,
        collection: &str,
        text: &str,
        metadata: HashMap<String, String>,
    ) -> Result<String>;

    /// Store a precomputed vector under an explicit id (used by the
    /// vectorization bridge's `vector_id = schema_<connection_id>_<hash>` scheme).
    async fn add_vector(
        &self,
        collection: &str,
        id: &str,
        embedding: Vec<f32>,
        metadata: HashMap<String, String>,
    ) -> Result<()>;

    /// Similarity search, filtered by optional metadata equality constraints,
    /// returning up to `limit` matches ordered by descending score.
    async fn similarity_search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
        filter: HashMap<String, String>,
    ) -> Result<Vec<VectorMatch>>;
}

/// A graph node kind in the schema projection data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Database,
    Table,
    Column,
}

/// A shortest-path result between two tables, per `GraphStore::shortest_paths`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GraphPath {
    /// Table names along the path, start to end inclusive.
    pub tables: Vec<String>,
    /// The `via_column`/`to_column` annotation for each hop.
    pub via_columns: Vec<String>,
}

/// A table reachable from a seed table within some hop count.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RelatedTable {
    pub table: String,
    pub distance: u32,
    pub via_columns: Vec<String>,
}

/// The graph backend port consumed by `rag-graph` (writes) and `rag-planner`
/// (reads). A `None` implementation (graph backend unreachable) is modeled
/// by the caller holding `Option<Arc<dyn GraphStore>>` and falling back to
/// vector-only retrieval — this trait itself always assumes connectivity.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Ensure uniqueness constraints exist for the three node kinds. Called
    /// once per projection; must be safe to call repeatedly.
    async fn ensure_constraints(&self) -> Result<()>;

    /// Run the full six-step projection for one schema inside a single
    /// backend transaction.
    async fn project_schema(&self, schema: &crate::schema::Schema) -> Result<()>;

    /// Textual summary of the graph for a connection (`describe`).
    async fn describe(&self, connection_id: &str) -> Result<String>;

    /// Up to 5 shortest relational paths between two tables.
    async fn shortest_paths(
        &self,
        connection_id: &str,
        from_table: &str,
        to_table: &str,
        max_depth: u32,
    ) -> Result<Vec<GraphPath>>;

    /// Tables within `max_depth` hops of `table_name`.
    async fn related_tables(
        &self,
        connection_id: &str,
        table_name: &str,
        max_depth: u32,
    ) -> Result<Vec<RelatedTable>>;

    /// Tables by exact name match.
    async fn find_tables_exact(&self, connection_id: &str, name: &str) -> Result<Vec<String>>;

    /// Tables whose name contains `needle` (fuzzy/substring match).
    async fn find_tables_fuzzy(&self, connection_id: &str, needle: &str) -> Result<Vec<String>>;

    /// The `limit` most-connected tables (highest `RELATES_TO` degree).
    async fn most_connected_tables(
        &self,
        connection_id: &str,
        limit: usize,
    ) -> Result<Vec<String>>;

    /// Outgoing `RELATES_TO` targets for a table, with the via-column annotation.
    async fn outgoing_relations(
        &self,
        connection_id: &str,
        table_name: &str,
    ) -> Result<Vec<RelatedTable>>;

    /// Up to `limit` community summaries (table names grouped by community id).
    async fn communities(
        &self,
        connection_id: &str,
        limit: usize,
    ) -> Result<HashMap<i64, Vec<String>>>;
}
