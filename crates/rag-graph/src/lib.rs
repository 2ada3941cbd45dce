//! Graph projection of discovered schemas and the relational-path reads
//! built on top of it.

pub mod cypher;
pub mod memory_store;
pub mod neo4j_store;

pub use memory_store::InMemoryGraphStore;
pub use neo4j_store::Neo4jGraphStore;
