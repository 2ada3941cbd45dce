//! An in-process [`GraphStore`] backed by `petgraph`, used where a live graph
//! backend is unavailable: tests, and components that want graph reads
//! without standing up Neo4j.

use async_trait::async_trait;
use parking_lot::Mutex;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use ragcore::{Error, GraphPath, GraphStore, RelatedTable, Result, Schema};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::neo4j_store::namespace_communities;

#[derive(Debug, Clone)]
enum Node {
    Database { connection_id: String },
    Table { connection_id: String, name: String, community: Option<i64> },
    Column { name: String },
}

#[derive(Debug, Clone)]
enum Edge {
    Contains,
    HasColumn,
    References,
    RelatesTo { via_columns: Vec<String> },
}

#[derive(Default)]
struct Inner {
    // Stable graph: node removal must not renumber the indices cached below.
    graph: StableDiGraph<Node, Edge>,
    table_ids: HashMap<String, NodeIndex>,
    column_ids: HashMap<String, NodeIndex>,
    databases: HashMap<String, NodeIndex>,
}

pub struct InMemoryGraphStore {
    inner: Mutex<Inner>,
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        InMemoryGraphStore {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn ensure_constraints(&self) -> Result<()> {
        Ok(())
    }

    async fn project_schema(&self, schema: &Schema) -> Result<()> {
        let mut inner = self.inner.lock();

        // Idempotent re-projection: drop the connection's prior subgraph first.
        if let Some(db_idx) = inner.databases.remove(&schema.connection_id) {
            inner.graph.remove_node(db_idx);
        }
        let stale_tables: Vec<String> = inner
            .table_ids
            .keys()
            .filter(|id| id.starts_with(&format!("{}::", schema.connection_id)))
            .cloned()
            .collect();
        for id in stale_tables {
            if let Some(idx) = inner.table_ids.remove(&id) {
                inner.graph.remove_node(idx);
            }
        }
        let stale_columns: Vec<String> = inner
            .column_ids
            .keys()
            .filter(|id| id.starts_with(&format!("{}::", schema.connection_id)))
            .cloned()
            .collect();
        for id in stale_columns {
            if let Some(idx) = inner.column_ids.remove(&id) {
                inner.graph.remove_node(idx);
            }
        }

        let db_idx = inner.graph.add_node(Node::Database {
            connection_id: schema.connection_id.clone(),
        });
        inner.databases.insert(schema.connection_id.clone(), db_idx);

        let communities: HashMap<String, i64> = namespace_communities(schema).into_iter().collect();

        for table in &schema.tables {
            let tid = crate::cypher::table_id(&schema.connection_id, &table.name);
            let table_idx = inner.graph.add_node(Node::Table {
                connection_id: schema.connection_id.clone(),
                name: table.name.clone(),
                community: communities.get(&table.name).copied(),
            });
            inner.table_ids.insert(tid.clone(), table_idx);
            inner.graph.add_edge(db_idx, table_idx, Edge::Contains);

            for column in &table.columns {
                let cid = crate::cypher::column_id(&schema.connection_id, &table.name, &column.name);
                let col_idx = inner.graph.add_node(Node::Column {
                    name: column.name.clone(),
                });
                inner.column_ids.insert(cid, col_idx);
                inner.graph.add_edge(table_idx, col_idx, Edge::HasColumn);
            }
        }

        for table in &schema.tables {
            for column in &table.columns {
                let Some(references) = &column.references else {
                    continue;
                };
                let Some(target) = crate::cypher::parse_reference(references) else {
                    continue;
                };
                let from_cid = crate::cypher::column_id(&schema.connection_id, &table.name, &column.name);
                let to_cid = crate::cypher::column_id(&schema.connection_id, &target.table, &target.column);
                if let (Some(&from_idx), Some(&to_idx)) =
                    (inner.column_ids.get(&from_cid), inner.column_ids.get(&to_cid))
                {
                    inner.graph.add_edge(from_idx, to_idx, Edge::References);
                }

                let from_tid = crate::cypher::table_id(&schema.connection_id, &table.name);
                let to_tid = crate::cypher::table_id(&schema.connection_id, &target.table);
                let annotation = format!("{}->{}", column.name, target.column);
                if let (Some(&from_idx), Some(&to_idx)) =
                    (inner.table_ids.get(&from_tid), inner.table_ids.get(&to_tid))
                {
                    if let Some(edge) = inner
                        .graph
                        .find_edge(from_idx, to_idx)
                        .and_then(|e| inner.graph.edge_weight_mut(e))
                    {
                        if let Edge::RelatesTo { via_columns } = edge {
                            if !via_columns.contains(&annotation) {
                                via_columns.push(annotation);
                            }
                            continue;
                        }
                    }
                    inner.graph.add_edge(
                        from_idx,
                        to_idx,
                        Edge::RelatesTo {
                            via_columns: vec![annotation],
                        },
                    );
                }
            }
        }

        Ok(())
    }

    async fn describe(&self, connection_id: &str) -> Result<String> {
        let inner = self.inner.lock();
        let mut lines = vec![format!("Database graph for connection '{connection_id}':")];
        for (tid, idx) in &inner.table_ids {
            if !tid.starts_with(&format!("{connection_id}::")) {
                continue;
            }
            if let Node::Table { name, community, .. } = &inner.graph[*idx] {
                lines.push(format!(
                    "  - {name} (community {})",
                    community.unwrap_or(-1)
                ));
            }
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
        let inner = self.inner.lock();
        let from_id = crate::cypher::table_id(connection_id, from_table);
        let to_id = crate::cypher::table_id(connection_id, to_table);
        let (Some(&from_idx), Some(&to_idx)) =
            (inner.table_ids.get(&from_id), inner.table_ids.get(&to_id))
        else {
            return Ok(Vec::new());
        };

        let mut queue = VecDeque::new();
        queue.push_back(vec![from_idx]);
        let mut found = Vec::new();
        let mut shortest_len = None;

        while let Some(path) = queue.pop_front() {
            if let Some(limit) = shortest_len {
                if path.len() - 1 > limit {
                    break;
                }
            }
            let &last = path.last().ok_or_else(|| {
                Error::Internal("BFS path unexpectedly empty".into())
            })?;
            if last == to_idx && path.len() > 1 {
                shortest_len = Some(shortest_len.unwrap_or(path.len() - 1));
                found.push(path.clone());
                if found.len() >= 5 {
                    break;
                }
                continue;
            }
            if (path.len() as u32 - 1) >= max_depth {
                continue;
            }
            for edge in inner.graph.edges(last) {
                if matches!(edge.weight(), Edge::RelatesTo { .. }) && !path.contains(&edge.target()) {
                    let mut next = path.clone();
                    next.push(edge.target());
                    queue.push_back(next);
                }
            }
        }

        Ok(found
            .into_iter()
            .map(|indices| {
                let tables = indices
                    .iter()
                    .filter_map(|idx| match &inner.graph[*idx] {
                        Node::Table { name, .. } => Some(name.clone()),
                        _ => None,
                    })
                    .collect();
                let via_columns = indices
                    .windows(2)
                    .filter_map(|pair| {
                        inner.graph.find_edge(pair[0], pair[1]).and_then(|e| {
                            if let Edge::RelatesTo { via_columns } = &inner.graph[e] {
                                Some(via_columns.join(","))
                            } else {
                                None
                            }
                        })
                    })
                    .collect();
                GraphPath {
                    tables,
                    via_columns,
                }
            })
            .collect())
    }

    async fn related_tables(
        &self,
        connection_id: &str,
        table_name: &str,
        max_depth: u32,
    ) -> Result<Vec<RelatedTable>> {
        let inner = self.inner.lock();
        let seed_id = crate::cypher::table_id(connection_id, table_name);
        let Some(&seed_idx) = inner.table_ids.get(&seed_id) else {
            return Ok(Vec::new());
        };

        let mut visited = HashSet::new();
        visited.insert(seed_idx);
        let mut frontier = vec![(seed_idx, Vec::<String>::new())];
        let mut results = Vec::new();

        for distance in 1..=max_depth {
            let mut next_frontier = Vec::new();
            for (idx, via) in &frontier {
                for edge in inner.graph.edges(*idx) {
                    if let Edge::RelatesTo { via_columns } = edge.weight() {
                        let target = edge.target();
                        if visited.insert(target) {
                            let mut via_columns_acc = via.clone();
                            via_columns_acc.extend(via_columns.clone());
                            if let Node::Table { name, .. } = &inner.graph[target] {
                                results.push(RelatedTable {
                                    table: name.clone(),
                                    distance,
                                    via_columns: via_columns_acc.clone(),
                                });
                            }
                            next_frontier.push((target, via_columns_acc));
                        }
                    }
                }
            }
            if next_frontier.is_empty() {
                break;
            }
            frontier = next_frontier;
        }

        Ok(results)
    }

    async fn find_tables_exact(&self, connection_id: &str, name: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock();
        Ok(inner
            .table_ids
            .keys()
            .filter(|id| id.starts_with(&format!("{connection_id}::")))
            .filter_map(|id| inner.table_ids.get(id).map(|idx| (&inner.graph[*idx])))
            .filter_map(|node| match node {
                Node::Table { name: n, .. } if n == name => Some(n.clone()),
                _ => None,
            })
            .collect())
    }

    async fn find_tables_fuzzy(&self, connection_id: &str, needle: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock();
        let needle_lower = needle.to_lowercase();
        Ok(inner
            .table_ids
            .keys()
            .filter(|id| id.starts_with(&format!("{connection_id}::")))
            .filter_map(|id| inner.table_ids.get(id).map(|idx| &inner.graph[*idx]))
            .filter_map(|node| match node {
                Node::Table { name, .. } if name.to_lowercase().contains(&needle_lower) => {
                    Some(name.clone())
                }
                _ => None,
            })
            .collect())
    }

    async fn most_connected_tables(
        &self,
        connection_id: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let inner = self.inner.lock();
        let mut degrees: Vec<(String, usize)> = inner
            .table_ids
            .iter()
            .filter(|(id, _)| id.starts_with(&format!("{connection_id}::")))
            .map(|(_, &idx)| {
                let name = match &inner.graph[idx] {
                    Node::Table { name, .. } => name.clone(),
                    _ => String::new(),
                };
                let degree = inner
                    .graph
                    .edges(idx)
                    .filter(|e| matches!(e.weight(), Edge::RelatesTo { .. }))
                    .count();
                (name, degree)
            })
            .collect();
        degrees.sort_by(|a, b| b.1.cmp(&a.1));
        degrees.truncate(limit);
        Ok(degrees.into_iter().map(|(name, _)| name).collect())
    }

    async fn outgoing_relations(
        &self,
        connection_id: &str,
        table_name: &str,
    ) -> Result<Vec<RelatedTable>> {
        let inner = self.inner.lock();
        let tid = crate::cypher::table_id(connection_id, table_name);
        let Some(&idx) = inner.table_ids.get(&tid) else {
            return Ok(Vec::new());
        };
        Ok(inner
            .graph
            .edges(idx)
            .filter_map(|e| {
                if let Edge::RelatesTo { via_columns } = e.weight() {
                    if let Node::Table { name, .. } = &inner.graph[e.target()] {
                        return Some(RelatedTable {
                            table: name.clone(),
                            distance: 1,
                            via_columns: via_columns.clone(),
                        });
                    }
                }
                None
            })
            .collect())
    }

    async fn communities(
        &self,
        connection_id: &str,
        limit: usize,
    ) -> Result<HashMap<i64, Vec<String>>> {
        let inner = self.inner.lock();
        let mut communities: HashMap<i64, Vec<String>> = HashMap::new();
        for (id, &idx) in &inner.table_ids {
            if !id.starts_with(&format!("{connection_id}::")) {
                continue;
            }
            if let Node::Table { name, community: Some(c), .. } = &inner.graph[idx] {
                communities.entry(*c).or_default().push(name.clone());
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use ragcore::{Column, SchemaStatus, Table};

    fn sample_schema() -> Schema {
        Schema {
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
                    columns: vec![Column {
                        name: "customer_id".into(),
                        data_type: "integer".into(),
                        nullable: false,
                        primary_key: false,
                        foreign_key: true,
                        references: Some("customers.id".into()),
                    }],
                    community: None,
                },
                Table {
                    name: "customers".into(),
                    schema_namespace: Some("public".into()),
                    row_count: None,
                    description: None,
                    columns: vec![Column {
                        name: "id".into(),
                        data_type: "integer".into(),
                        nullable: false,
                        primary_key: true,
                        foreign_key: false,
                        references: None,
                    }],
                    community: None,
                },
            ],
            query_suggestions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn project_then_describe_lists_every_table() {
        let store = InMemoryGraphStore::new();
        store.project_schema(&sample_schema()).await.unwrap();
        let text = store.describe("c1").await.unwrap();
        assert!(text.contains("orders"));
        assert!(text.contains("customers"));
    }

    #[tokio::test]
    async fn related_tables_reaches_referenced_table_within_one_hop() {
        let store = InMemoryGraphStore::new();
        store.project_schema(&sample_schema()).await.unwrap();
        let related = store.related_tables("c1", "orders", 2).await.unwrap();
        assert!(related.iter().any(|r| r.table == "customers" && r.distance == 1));
    }

    #[tokio::test]
    async fn shortest_paths_finds_the_direct_relation() {
        let store = InMemoryGraphStore::new();
        store.project_schema(&sample_schema()).await.unwrap();
        let paths = store
            .shortest_paths("c1", "orders", "customers", 3)
            .await
            .unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].tables, vec!["orders", "customers"]);
    }

    #[tokio::test]
    async fn reprojecting_a_connection_replaces_its_prior_subgraph() {
        let store = InMemoryGraphStore::new();
        store.project_schema(&sample_schema()).await.unwrap();
        let mut second = sample_schema();
        second.tables.truncate(1);
        store.project_schema(&second).await.unwrap();
        let text = store.describe("c1").await.unwrap();
        assert!(text.contains("orders"));
        assert!(!text.contains("customers"));
    }
}
