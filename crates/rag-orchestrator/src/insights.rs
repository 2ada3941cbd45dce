//! Post-discovery insight pass: scans a completed [`Schema`] for
//! foreign-key relationships and proposes a JOIN query for each one.

use rag_graph::cypher::parse_reference;
use ragcore::{Schema, SchemaQuerySuggestion};

/// Builds one suggestion per foreign key found across the schema's tables.
/// A column's `references` pointer that doesn't resolve to another table in
/// this same schema is skipped — the suggestion would reference a table we
/// never discovered.
pub fn suggest_queries(schema: &Schema) -> Vec<SchemaQuerySuggestion> {
    let mut suggestions = Vec::new();
    for table in &schema.tables {
        for column in &table.columns {
            if !column.foreign_key {
                continue;
            }
            let Some(references) = &column.references else { continue };
            let Some(target) = parse_reference(references) else { continue };
            if !schema.tables.iter().any(|t| t.name == target.table) {
                continue;
            }
            suggestions.push(SchemaQuerySuggestion {
                description: format!(
                    "Join {} to {} via {}.{} = {}.{}",
                    table.name, target.table, table.name, column.name, target.table, target.column
                ),
                sql: format!(
                    "SELECT * FROM {} JOIN {} ON {}.{} = {}.{}",
                    table.name, target.table, table.name, column.name, target.table, target.column
                ),
                tables: vec![table.name.clone(), target.table.clone()],
            });
        }
    }
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragcore::{Column, SchemaStatus, Table};

    fn schema_with_fk() -> Schema {
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
                    schema_namespace: None,
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
                    schema_namespace: None,
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

    #[test]
    fn suggests_a_join_for_each_foreign_key() {
        let suggestions = suggest_queries(&schema_with_fk());
        assert_eq!(suggestions.len(), 1);
        let suggestion = &suggestions[0];
        assert!(suggestion.sql.contains("JOIN customers ON orders.customer_id = customers.id"));
        assert_eq!(suggestion.tables, vec!["orders".to_string(), "customers".to_string()]);
    }

    #[test]
    fn skips_references_to_tables_not_in_the_schema() {
        let mut schema = schema_with_fk();
        schema.tables[0].columns[0].references = Some("archived_customers.id".into());
        assert!(suggest_queries(&schema).is_empty());
    }

    #[test]
    fn skips_columns_not_marked_as_foreign_keys() {
        let mut schema = schema_with_fk();
        schema.tables[0].columns[0].foreign_key = false;
        assert!(suggest_queries(&schema).is_empty());
    }
}
