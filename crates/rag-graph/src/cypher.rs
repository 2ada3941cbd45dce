//! Builds the Cypher statements for schema projection and reads. Kept
//! separate from the Neo4j transport so the construction logic is testable
//! without a live database.

use neo4rs::Query;
use ragcore::{Column, Schema, Table};

/// A parsed `references` pointer: `[schema.]table.column`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceTarget {
    pub schema_namespace: Option<String>,
    pub table: String,
    pub column: String,
}

/// Parse a column's `references` string. Returns `None` when the string has
/// fewer than two dotted components, per the projection's skip rule.
pub fn parse_reference(references: &str) -> Option<ReferenceTarget> {
    let parts: Vec<&str> = references.split('.').collect();
    match parts.as_slice() {
        [table, column] => Some(ReferenceTarget {
            schema_namespace: None,
            table: (*table).to_string(),
            column: (*column).to_string(),
        }),
        [schema_namespace, table, column] => Some(ReferenceTarget {
            schema_namespace: Some((*schema_namespace).to_string()),
            table: (*table).to_string(),
            column: (*column).to_string(),
        }),
        _ => None,
    }
}

pub fn table_id(connection_id: &str, table_name: &str) -> String {
    format!("{connection_id}::{table_name}")
}

pub fn column_id(connection_id: &str, table_name: &str, column_name: &str) -> String {
    format!("{connection_id}::{table_name}::{column_name}")
}

/// Step 1: uniqueness constraints, safe to run repeatedly.
pub fn constraint_queries() -> Vec<Query> {
    vec![
        Query::new(
            "CREATE CONSTRAINT database_connection_id IF NOT EXISTS \
             FOR (d:Database) REQUIRE d.connection_id IS UNIQUE"
                .to_string(),
        ),
        Query::new(
            "CREATE CONSTRAINT table_id IF NOT EXISTS \
             FOR (t:Table) REQUIRE t.table_id IS UNIQUE"
                .to_string(),
        ),
        Query::new(
            "CREATE CONSTRAINT column_id IF NOT EXISTS \
             FOR (c:Column) REQUIRE c.column_id IS UNIQUE"
                .to_string(),
        ),
    ]
}

/// Step 2: upsert the Database node and its `CONTAINS` edges to each table.
pub fn database_and_contains_queries(schema: &Schema) -> Vec<Query> {
    let mut queries = vec![Query::new(
        "MERGE (d:Database {connection_id: $connection_id}) \
         SET d.name = $name, d.db_type = $db_type"
            .to_string(),
    )
    .param("connection_id", schema.connection_id.clone())
    .param("name", schema.name.clone())
    .param("db_type", schema.db_type.clone())];

    for table in &schema.tables {
        queries.push(
            Query::new(
                "MATCH (d:Database {connection_id: $connection_id}) \
                 MERGE (t:Table {table_id: $table_id}) \
                 MERGE (d)-[:CONTAINS]->(t)"
                    .to_string(),
            )
            .param("connection_id", schema.connection_id.clone())
            .param("table_id", table_id(&schema.connection_id, &table.name)),
        );
    }
    queries
}

/// Step 3: upsert each table's properties and its `HAS_COLUMN` edges.
pub fn table_and_column_queries(connection_id: &str, table: &Table) -> Vec<Query> {
    let tid = table_id(connection_id, &table.name);
    let mut queries = vec![Query::new(
        "MATCH (t:Table {table_id: $table_id}) \
         SET t.name = $name, t.schema_namespace = $schema_namespace, t.row_count = $row_count"
            .to_string(),
    )
    .param("table_id", tid.clone())
    .param("name", table.name.clone())
    .param(
        "schema_namespace",
        table.schema_namespace.clone().unwrap_or_default(),
    )
    .param("row_count", table.row_count.unwrap_or(0) as i64)];

    for column in &table.columns {
        queries.push(column_query(connection_id, &table.name, column));
    }
    queries
}

fn column_query(connection_id: &str, table_name: &str, column: &Column) -> Query {
    let tid = table_id(connection_id, table_name);
    let cid = column_id(connection_id, table_name, &column.name);
    Query::new(
        "MATCH (t:Table {table_id: $table_id}) \
         MERGE (c:Column {column_id: $column_id}) \
         SET c.name = $name, c.data_type = $data_type, c.nullable = $nullable, \
             c.primary_key = $primary_key, c.foreign_key = $foreign_key \
         MERGE (t)-[:HAS_COLUMN]->(c)"
            .to_string(),
    )
    .param("table_id", tid)
    .param("column_id", cid)
    .param("name", column.name.clone())
    .param("data_type", column.data_type.clone())
    .param("nullable", column.nullable)
    .param("primary_key", column.primary_key)
    .param("foreign_key", column.foreign_key)
}

/// Step 4: `REFERENCES` edge from a column to its foreign-key target column.
pub fn references_query(connection_id: &str, table_name: &str, column: &Column) -> Option<Query> {
    let target = parse_reference(column.references.as_ref()?)?;
    let from_id = column_id(connection_id, table_name, &column.name);
    let to_id = column_id(connection_id, &target.table, &target.column);
    Some(
        Query::new(
            "MATCH (from:Column {column_id: $from_id}) \
             MATCH (to:Column {column_id: $to_id}) \
             MERGE (from)-[:REFERENCES]->(to)"
                .to_string(),
        )
        .param("from_id", from_id)
        .param("to_id", to_id),
    )
}

/// Step 5: `RELATES_TO` edge between the owning tables, merging the
/// via-column/to-column annotation onto existing edges rather than
/// replacing it.
pub fn relates_to_query(
    connection_id: &str,
    from_table: &str,
    column: &Column,
    target: &ReferenceTarget,
) -> Query {
    let from_id = table_id(connection_id, from_table);
    let to_id = table_id(connection_id, &target.table);
    let annotation = format!("{}->{}", column.name, target.column);
    Query::new(
        "MATCH (from:Table {table_id: $from_id}) \
         MATCH (to:Table {table_id: $to_id}) \
         MERGE (from)-[r:RELATES_TO]->(to) \
         SET r.via_columns = CASE \
             WHEN r.via_columns IS NULL THEN $annotation \
             WHEN r.via_columns CONTAINS $annotation THEN r.via_columns \
             ELSE r.via_columns + ',' + $annotation END"
            .to_string(),
    )
    .param("from_id", from_id)
    .param("to_id", to_id)
    .param("annotation", annotation)
}

/// Step 6 fallback: persist a namespace-derived community id on every table.
pub fn community_query(connection_id: &str, table_name: &str, community_id: i64) -> Query {
    Query::new(
        "MATCH (t:Table {table_id: $table_id}) SET t.community = $community_id".to_string(),
    )
    .param("table_id", table_id(connection_id, table_name))
    .param("community_id", community_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reference_accepts_two_and_three_part_pointers() {
        assert_eq!(
            parse_reference("orders.id"),
            Some(ReferenceTarget {
                schema_namespace: None,
                table: "orders".into(),
                column: "id".into(),
            })
        );
        assert_eq!(
            parse_reference("public.orders.id"),
            Some(ReferenceTarget {
                schema_namespace: Some("public".into()),
                table: "orders".into(),
                column: "id".into(),
            })
        );
    }

    #[test]
    fn parse_reference_rejects_bare_identifiers() {
        assert_eq!(parse_reference("id"), None);
    }

    #[test]
    fn table_and_column_ids_are_namespaced_by_connection() {
        assert_eq!(table_id("c1", "orders"), "c1::orders");
        assert_eq!(column_id("c1", "orders", "id"), "c1::orders::id");
    }

    #[test]
    fn database_queries_include_one_contains_edge_per_table() {
        let schema = Schema {
            connection_id: "c1".into(),
            name: "shop".into(),
            db_type: "postgresql".into(),
            version: None,
            status: ragcore::SchemaStatus::Completed,
            discovery_date: None,
            vector_id: None,
            error: None,
            vectorization_error: None,
            tables: vec![
                Table {
                    name: "orders".into(),
                    schema_namespace: None,
                    row_count: None,
                    description: None,
                    columns: vec![],
                    community: None,
                },
                Table {
                    name: "customers".into(),
                    schema_namespace: None,
                    row_count: None,
                    description: None,
                    columns: vec![],
                    community: None,
                },
            ],
            query_suggestions: Vec::new(),
        };
        let queries = database_and_contains_queries(&schema);
        assert_eq!(queries.len(), 3);
    }
}
