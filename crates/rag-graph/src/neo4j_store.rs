//! Neo4j-backed [`GraphStore`]. Projection runs every Cypher statement for a
//! schema inside one transaction so a driver error midway leaves prior graph
//! state untouched.

use async_trait::async_trait;
use neo4rs::{Graph, Query};
use ragcore::{Error, GraphPath, GraphStore, RelatedTable, Result, Schema};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cypher;

pub struct Neo4jGraphStore {
    graph: Arc<Graph>,
}

impl Neo4jGraphStore {
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .map_err(|e| Error::Upstream(format!("failed to connect to graph backend: {e}")))?;
        Ok(Neo4jGraphStore {
            graph: Arc::new(graph),
        })
    }

    async fn run_row_query(&self, query: Query) -> Result<Vec<neo4rs::Row>> {
        let mut stream = self
            .graph
            .execute(query)
            .await
            .map_err(|e| Error::Upstream(format!("graph query failed: {e}")))?;
        let mut rows = Vec::new();
        while let Some(row) = stream
            .next()
            .await
            .map_err(|e| Error::Upstream(format!("graph result read failed: {e}")))?
        {
            rows.push(row);
        }
        Ok(rows)
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn ensure_constraints(&self) -> Result<()> {
        for query in cypher::constraint_queries() {
            self.graph
                .run(query)
                .await
                .map_err(|e| Error::Upstream(format!("failed to ensure constraint: {e}")))?;
        }
        Ok(())
    }

    async fn project_schema(&self, schema: &Schema) -> Result<()> {
        let mut txn = self
            .graph
            .start_txn()
            .await
            .map_err(|e| Error::Upstream(format!("failed to start graph transaction: {e}")))?;

        let outcome = async {
            for query in cypher::database_and_contains_queries(schema) {
                txn.run(query)
                    .await
                    .map_err(|e| Error::Upstream(format!("database/contains step failed: {e}")))?;
            }

            for table in &schema.tables {
                for query in cypher::table_and_column_queries(&schema.connection_id, table) {
                    txn.run(query).await.map_err(|e| {
                        Error::Upstream(format!("table/column step failed: {e}"))
                    })?;
                }
                for column in &table.columns {
                    if let Some(query) =
                        cypher::references_query(&schema.connection_id, &table.name, column)
                    {
                        txn.run(query)
                            .await
                            .map_err(|e| Error::Upstream(format!("references step failed: {e}")))?;
                    }
                    if let Some(references) = &column.references {
                        if let Some(target) = cypher::parse_reference(references) {
                            let query = cypher::relates_to_query(
                                &schema.connection_id,
                                &table.name,
                                column,
                                &target,
                            );
                            txn.run(query).await.map_err(|e| {
                                Error::Upstream(format!("relates_to step failed: {e}"))
                            })?;
                        }
                    }
                }
            }

            for (table_name, community_id) in namespace_communities(schema) {
                let query = cypher::community_query(&schema.connection_id, &table_name, community_id);
                txn.run(query)
                    .await
                    .map_err(|e| Error::Upstream(format!("community step failed: {e}")))?;
            }

            Ok::<(), Error>(())
        }
        .await;

        match outcome {
            Ok(()) => {
                txn.commit()
                    .await
                    .map_err(|e| Error::Upstream(format!("graph transaction commit failed: {e}")))?;
                info!(connection_id = %schema.connection_id, "graph projection committed");
                Ok(())
            }
            Err(e) => {
                warn!(connection_id = %schema.connection_id, error = %e, "graph projection failed, rolling back");
                let _ = txn.rollback().await;
                Err(e)
            }
        }
    }

    async fn describe(&self, connection_id: &str) -> Result<String> {
        let rows = self
            .run_row_query(
                Query::new(
                    "MATCH (d:Database {connection_id: $connection_id})-[:CONTAINS]->(t:Table) \
                     RETURN t.name AS name, t.community AS community"
                        .to_string(),
                )
                .param("connection_id", connection_id.to_string()),
            )
            .await?;
        let mut lines = vec![format!("Database graph for connection '{connection_id}':")];
        for row in rows {
            let name: String = row.get("name").unwrap_or_default();
            let community: i64 = row.get("community").unwrap_or(-1);
            lines.push(format!("  - {name} (community {community})"));
        }
        Ok(lines.join("\n"))
    }

    async fn shortest_paths(
        &self,
        connection_id: &str,
        from_table: &str,
        to_table: &str,
        max_depth: u32,
    ) -> Result<Vec<GraphPath>> {
        let query = Query::new(format!(
            "MATCH (from:Table {{table_id: $from_id}}), (to:Table {{table_id: $to_id}}), \
             p = allShortestPaths((from)-[:RELATES_TO*..{max_depth}]-(to)) \
             RETURN p LIMIT 5"
        ))
        .param("from_id", cypher::table_id(connection_id, from_table))
        .param("to_id", cypher::table_id(connection_id, to_table));
        let rows = self.run_row_query(query).await?;
        let mut paths = Vec::new();
        for row in rows {
            if let Ok(path) = row.get::<neo4rs::Path>("p") {
                let tables = path
                    .nodes()
                    .iter()
                    .filter_map(|n| n.get::<String>("name").ok())
                    .collect();
                let via_columns = path
                    .rels()
                    .iter()
                    .filter_map(|r| r.get::<String>("via_columns").ok())
                    .collect();
                paths.push(GraphPath {
                    tables,
                    via_columns,
                });
            }
        }
        Ok(paths)
    }

    async fn related_tables(
        &self,
        connection_id: &str,
        table_name: &str,
        max_depth: u32,
    ) -> Result<Vec<RelatedTable>> {
        let query = Query::new(format!(
            "MATCH (seed:Table {{table_id: $table_id}}), \
             path = (seed)-[:RELATES_TO*1..{max_depth}]-(other:Table) \
             WITH other, length(path) AS distance, relationships(path) AS rels \
             ORDER BY distance ASC \
             RETURN DISTINCT other.name AS name, distance, \
                 [r IN rels | r.via_columns] AS via_columns"
        ))
        .param("table_id", cypher::table_id(connection_id, table_name));
        let rows = self.run_row_query(query).await?;
        let mut related = Vec::new();
        for row in rows {
            let table: String = row.get("name").unwrap_or_default();
            let distance: i64 = row.get("distance").unwrap_or(0);
            let via_columns: Vec<String> = row.get("via_columns").unwrap_or_default();
            related.push(RelatedTable {
                table,
                distance: distance.max(0) as u32,
                via_columns,
            });
        }
        Ok(related)
    }

    async fn find_tables_exact(&self, connection_id: &str, name: &str) -> Result<Vec<String>> {
        let rows = self
            .run_row_query(
                Query::new(
                    "MATCH (d:Database {connection_id: $connection_id})-[:CONTAINS]->(t:Table {name: $name}) \
                     RETURN t.name AS name"
                        .to_string(),
                )
                .param("connection_id", connection_id.to_string())
                .param("name", name.to_string()),
            )
            .await?;
        Ok(rows.into_iter().filter_map(|r| r.get("name").ok()).collect())
    }

    async fn find_tables_fuzzy(&self, connection_id: &str, needle: &str) -> Result<Vec<String>> {
        let rows = self
            .run_row_query(
                Query::new(
                    "MATCH (d:Database {connection_id: $connection_id})-[:CONTAINS]->(t:Table) \
                     WHERE toLower(t.name) CONTAINS toLower($needle) \
                     RETURN t.name AS name"
                        .to_string(),
                )
                .param("connection_id", connection_id.to_string())
                .param("needle", needle.to_string()),
            )
            .await?;
        Ok(rows.into_iter().filter_map(|r| r.get("name").ok()).collect())
    }

    async fn most_connected_tables(
        &self,
        connection_id: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let rows = self
            .run_row_query(
                Query::new(
                    "MATCH (d:Database {connection_id: $connection_id})-[:CONTAINS]->(t:Table)-[r:RELATES_TO]-() \
                     RETURN t.name AS name, count(r) AS degree \
                     ORDER BY degree DESC LIMIT $limit"
                        .to_string(),
                )
                .param("connection_id", connection_id.to_string())
                .param("limit", limit as i64),
            )
            .await?;
        Ok(rows.into_iter().filter_map(|r| r.get("name").ok()).collect())
    }

    async fn outgoing_relations(
        &self,
        connection_id: &str,
        table_name: &str,
    ) -> Result<Vec<RelatedTable>> {
        let rows = self
            .run_row_query(
                Query::new(
                    "MATCH (t:Table {table_id: $table_id})-[r:RELATES_TO]->(target:Table) \
                     RETURN target.name AS name, r.via_columns AS via_columns"
                        .to_string(),
                )
                .param("table_id", cypher::table_id(connection_id, table_name)),
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let table: String = row.get("name").unwrap_or_default();
                let annotation: String = row.get("via_columns").unwrap_or_default();
                RelatedTable {
                    table,
                    distance: 1,
                    via_columns: annotation.split(',').map(str::to_string).collect(),
                }
            })
            .collect())
    }

    async fn communities(
        &self,
        connection_id: &str,
        limit: usize,
    ) -> Result<HashMap<i64, Vec<String>>> {
        let rows = self
            .run_row_query(
                Query::new(
                    "MATCH (d:Database {connection_id: $connection_id})-[:CONTAINS]->(t:Table) \
                     WHERE t.community IS NOT NULL \
                     RETURN t.community AS community, t.name AS name"
                        .to_string(),
                )
                .param("connection_id", connection_id.to_string()),
            )
            .await?;
        let mut communities: HashMap<i64, Vec<String>> = HashMap::new();
        for row in rows {
            let community: i64 = row.get("community").unwrap_or(-1);
            let name: String = row.get("name").unwrap_or_default();
            communities.entry(community).or_default().push(name);
        }
        if communities.len() > limit {
            let mut keys: Vec<i64> = communities.keys().copied().collect();
            keys.sort_unstable();
            for key in keys.into_iter().skip(limit) {
                communities.remove(&key);
            }
        }
        Ok(communities)
    }
}

/// Community-detection fallback: group tables by schema namespace, hashing
/// the namespace name to a stable community id. Used whenever the backend
/// has no native community-detection procedure available.
pub fn namespace_communities(schema: &Schema) -> Vec<(String, i64)> {
    schema
        .tables
        .iter()
        .map(|table| {
            let namespace = table.schema_namespace.as_deref().unwrap_or("default");
            let id = namespace_hash(namespace);
            (table.name.clone(), id)
        })
        .collect()
}

fn namespace_hash(namespace: &str) -> i64 {
    let digest = md5::compute(namespace.as_bytes());
    i64::from_be_bytes(digest.0[0..8].try_into().unwrap_or_default()).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragcore::{SchemaStatus, Table};

    #[test]
    fn namespace_communities_groups_by_namespace_and_is_stable() {
        let schema = Schema {
            connection_id: "c1".into(),
            name: "shop".into(),
            db_type: "postgresql".into(),
            version: None,
            status: SchemaStatus::Completed,
            discovery_date: None,
            vector_id: None,
            error: None,
            vectorization_error: None,
            tables: vec![
                Table {
                    name: "orders".into(),
                    schema_namespace: Some("public".into()),
                    row_count: None,
                    description: None,
                    columns: vec![],
                    community: None,
                },
                Table {
                    name: "accounts".into(),
                    schema_namespace: Some("public".into()),
                    row_count: None,
                    description: None,
                    columns: vec![],
                    community: None,
                },
                Table {
                    name: "logs".into(),
                    schema_namespace: Some("audit".into()),
                    row_count: None,
                    description: None,
                    columns: vec![],
                    community: None,
                },
            ],
            query_suggestions: Vec::new(),
        };
        let communities = namespace_communities(&schema);
        let orders_id = communities.iter().find(|(t, _)| t == "orders").unwrap().1;
        let accounts_id = communities.iter().find(|(t, _)| t == "accounts").unwrap().1;
        let logs_id = communities.iter().find(|(t, _)| t == "logs").unwrap().1;
        assert_eq!(orders_id, accounts_id);
        assert_ne!(orders_id, logs_id);
    }
}
