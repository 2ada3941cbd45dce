//! Domain types and storage ports shared by every RAG platform service.
//!
//! This crate has no I/O of its own: it defines the platform's entities and
//! the narrow persistence ports that concrete adapters (`rag-connections`,
//! `rag-graph`, vector store backends) implement. Every other workspace
//! crate depends on `ragcore` rather than on each other's concrete types.

pub mod agent;
pub mod connection;
pub mod context;
pub mod error;
pub mod job;
pub mod ports;
pub mod query;
pub mod schema;

pub use agent::{Agent, AgentPrompts};
pub use connection::{Connection, ConnectionStatus, ConnectionTestResult, ConnectionType, NewConnection};
pub use context::{Context, ContextFilter};
pub use error::{Error, ErrorBody, Result};
pub use job::{Job, JobStatus};
pub use ports::{DocumentStore, GraphPath, GraphStore, NodeKind, RelatedTable, VectorMatch, VectorStore};
pub use query::{sort_sources, QueryRecord, Source};
pub use schema::{
    Column, Schema, SchemaQuerySuggestion, SchemaStatus, Table, MAX_COLUMNS, MAX_IDENTIFIER_LEN, MAX_TABLES,
};
