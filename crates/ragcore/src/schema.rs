//! Schema entity — structural metadata captured by discovery.
//!
//! Enforces fixed size invariants: at most 500 tables per schema, at most
//! 300 columns per table, identifiers truncated at 100 characters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Maximum tables (or collections) retained per schema.
pub const MAX_TABLES: usize = 500;
/// Maximum columns (or fields) retained per table.
pub const MAX_COLUMNS: usize = 300;
/// Maximum identifier length before truncation.
pub const MAX_IDENTIFIER_LEN: usize = 100;

/// Lifecycle status of a [`Schema`], mirrored onto its owning [`crate::Job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// A column within a [`Table`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub foreign_key: bool,
    /// `[schema.]table.column` pointer, parsed by `rag-graph`'s projection step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
}

/// A table (or collection) within a [`Schema`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    #[serde(default)]
    pub schema_namespace: Option<String>,
    #[serde(default)]
    pub row_count: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
    pub columns: Vec<Column>,
    /// Community id assigned by graph projection's community-detection step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community: Option<i64>,
}

/// A query the insight pass derived from a foreign-key relationship,
/// surfaced by `GET /schema/{connection_id}/analyze`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaQuerySuggestion {
    pub description: String,
    pub sql: String,
    pub tables: Vec<String>,
}

/// The discovered structure of a target database, keyed by `connection_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub connection_id: String,
    pub name: String,
    pub db_type: String,
    #[serde(default)]
    pub version: Option<String>,
    pub status: SchemaStatus,
    #[serde(default)]
    pub discovery_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vectorization_error: Option<String>,
    pub tables: Vec<Table>,
    /// Populated by the post-discovery insight pass when discovery was run
    /// with `analyze: true`; the `/analyze` route computes it on demand
    /// otherwise.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query_suggestions: Vec<SchemaQuerySuggestion>,
}

impl Schema {
    /// A `pending` placeholder synthesized by `get_schema` when no discovery
    /// has run yet for `connection_id`.
    pub fn pending_placeholder(connection_id: &str, db_type: &str) -> Self {
        Schema {
            connection_id: connection_id.to_string(),
            name: connection_id.to_string(),
            db_type: db_type.to_string(),
            version: None,
            status: SchemaStatus::Pending,
            discovery_date: None,
            vector_id: None,
            error: None,
            vectorization_error: None,
            tables: Vec::new(),
            query_suggestions: Vec::new(),
        }
    }

    /// Enforce the memory caps in place, logging a structured warning
    /// for every truncation so the drop is observable without failing the job.
    pub fn enforce_caps(&mut self) {
        if self.tables.len() > MAX_TABLES {
            warn!(
                connection_id = %self.connection_id,
                original_count = self.tables.len(),
                truncated_count = MAX_TABLES,
                "schema exceeded max table count, dropping excess"
            );
            self.tables.truncate(MAX_TABLES);
        }
        for table in &mut self.tables {
            truncate_identifier(&mut table.name, &self.connection_id, "table");
            if table.columns.len() > MAX_COLUMNS {
                warn!(
                    connection_id = %self.connection_id,
                    table = %table.name,
                    original_count = table.columns.len(),
                    truncated_count = MAX_COLUMNS,
                    "table exceeded max column count, dropping excess"
                );
                table.columns.truncate(MAX_COLUMNS);
            }
            for column in &mut table.columns {
                truncate_identifier(&mut column.name, &self.connection_id, "column");
            }
        }
    }

    /// True when the invariants `status=completed ⇒ discovery_date set` and
    /// `status=failed ⇒ error set` hold.
    pub fn is_well_formed(&self) -> bool {
        match self.status {
            SchemaStatus::Completed => self.discovery_date.is_some(),
            SchemaStatus::Failed => self.error.is_some(),
            _ => true,
        }
    }
}

fn truncate_identifier(name: &mut String, connection_id: &str, kind: &str) {
    if name.chars().count() > MAX_IDENTIFIER_LEN {
        let original = name.clone();
        let truncated: String = name.chars().take(MAX_IDENTIFIER_LEN - 1).collect();
        *name = format!("{truncated}\u{2026}");
        warn!(
            connection_id = %connection_id,
            kind = kind,
            original = %original,
            truncated = %name,
            "identifier exceeded max length, truncated with marker"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str) -> Column {
        Column {
            name: name.to_string(),
            data_type: "text".into(),
            nullable: true,
            primary_key: false,
            foreign_key: false,
            references: None,
        }
    }

    #[test]
    fn enforce_caps_drops_excess_tables() {
        let mut schema = Schema {
            connection_id: "c1".into(),
            name: "db".into(),
            db_type: "postgresql".into(),
            version: None,
            status: SchemaStatus::Completed,
            discovery_date: Some(Utc::now()),
            vector_id: None,
            error: None,
            vectorization_error: None,
            tables: (0..MAX_TABLES + 10)
                .map(|i| Table {
                    name: format!("t{i}"),
                    schema_namespace: None,
                    row_count: None,
                    description: None,
                    columns: vec![],
                    community: None,
                })
                .collect(),
            query_suggestions: Vec::new(),
        };
        schema.enforce_caps();
        assert_eq!(schema.tables.len(), MAX_TABLES);
    }

    #[test]
    fn enforce_caps_drops_excess_columns() {
        let mut schema = Schema {
            connection_id: "c1".into(),
            name: "db".into(),
            db_type: "postgresql".into(),
            version: None,
            status: SchemaStatus::Completed,
            discovery_date: Some(Utc::now()),
            vector_id: None,
            error: None,
            vectorization_error: None,
            tables: vec![Table {
                name: "t".into(),
                schema_namespace: None,
                row_count: None,
                description: None,
                columns: (0..MAX_COLUMNS + 5)
                    .map(|i| column(&format!("c{i}")))
                    .collect(),
                community: None,
            }],
            query_suggestions: Vec::new(),
        };
        schema.enforce_caps();
        assert_eq!(schema.tables[0].columns.len(), MAX_COLUMNS);
    }

    #[test]
    fn enforce_caps_truncates_long_identifiers_with_marker() {
        let long_name = "x".repeat(150);
        let mut schema = Schema {
            connection_id: "c1".into(),
            name: "db".into(),
            db_type: "postgresql".into(),
            version: None,
            status: SchemaStatus::Completed,
            discovery_date: Some(Utc::now()),
            vector_id: None,
            error: None,
            vectorization_error: None,
            tables: vec![Table {
                name: long_name,
                schema_namespace: None,
                row_count: None,
                description: None,
                columns: vec![],
                community: None,
            }],
            query_suggestions: Vec::new(),
        };
        schema.enforce_caps();
        assert!(schema.tables[0].name.chars().count() <= MAX_IDENTIFIER_LEN);
        assert!(schema.tables[0].name.ends_with('\u{2026}'));
    }

    #[test]
    fn well_formed_requires_discovery_date_when_completed() {
        let mut schema = Schema::pending_placeholder("c1", "postgresql");
        schema.status = SchemaStatus::Completed;
        assert!(!schema.is_well_formed());
        schema.discovery_date = Some(Utc::now());
        assert!(schema.is_well_formed());
    }

    #[test]
    fn well_formed_requires_error_when_failed() {
        let mut schema = Schema::pending_placeholder("c1", "postgresql");
        schema.status = SchemaStatus::Failed;
        assert!(!schema.is_well_formed());
        schema.error = Some("boom".into());
        assert!(schema.is_well_formed());
    }
}
