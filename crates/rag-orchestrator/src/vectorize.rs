//! Vectorization bridge: turns a discovered [`Schema`] into a canonical text
//! description and hands it to a vector store or a remote embedder.

use async_trait::async_trait;
use ragcore::{Error, Result, Schema, VectorStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const DESCRIPTION_CHAR_CAP: usize = 100_000;
const MAX_ATTEMPTS: u32 = 3;
const INITIAL_TIMEOUT_SECS: u64 = 120;
const TIMEOUT_STEP_SECS: u64 = 60;

/// Produces an embedding vector for a text description. Implementations
/// either call a locally loaded model or a sibling embeddings service.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Posts text to a remote embeddings service over HTTP.
pub struct HttpEmbedder {
    http: reqwest::Client,
    base_url: String,
}

impl HttpEmbedder {
    pub fn new(base_url: String) -> Self {
        HttpEmbedder {
            http: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embed", self.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("embeddings service unreachable: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::Upstream(format!(
                "embeddings service returned {}",
                resp.status()
            )));
        }
        let body: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("embeddings response malformed: {e}")))?;
        Ok(body.vector)
    }
}

#[derive(serde::Deserialize)]
struct EmbedResponse {
    vector: Vec<f32>,
}

/// Render a schema into the canonical text description fed to the embedder:
/// a database header, then one block per table listing columns with their
/// PRIMARY KEY / FOREIGN KEY / NOT NULL flags and reference targets.
pub fn describe_schema(schema: &Schema) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Database: {} ({})\n",
        schema.name, schema.db_type
    ));
    for table in &schema.tables {
        out.push_str(&format!("\nTable: {}\n", table.name));
        if let Some(desc) = &table.description {
            out.push_str(&format!("  Description: {desc}\n"));
        }
        for column in &table.columns {
            let mut flags = Vec::new();
            if column.primary_key {
                flags.push("PRIMARY KEY".to_string());
            }
            if column.foreign_key {
                flags.push("FOREIGN KEY".to_string());
            }
            if let Some(reference) = &column.references {
                flags.push(format!("-> {reference}"));
            }
            if !column.nullable {
                flags.push("NOT NULL".to_string());
            }
            let flag_str = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            };
            out.push_str(&format!(
                "  - {} {}{}\n",
                column.name, column.data_type, flag_str
            ));
        }
    }

    if out.chars().count() > DESCRIPTION_CHAR_CAP {
        warn!(
            connection_id = %schema.connection_id,
            original_len = out.chars().count(),
            cap = DESCRIPTION_CHAR_CAP,
            "schema description exceeded cap, truncating"
        );
        let truncated: String = out.chars().take(DESCRIPTION_CHAR_CAP).collect();
        format!("{truncated}\n…[truncated]")
    } else {
        out
    }
}

pub fn vector_id_for(connection_id: &str, description: &str) -> String {
    let digest = md5::compute(description.as_bytes());
    format!("schema_{connection_id}_{digest:x}")
}

/// Write a schema's description into the `database_schemas` collection,
/// retrying up to three times with increasing per-attempt timeouts. Each
/// attempt re-embeds and re-writes, since a partial embed carries no partial
/// state worth resuming from.
pub async fn vectorize_schema(
    store: &Arc<dyn VectorStore>,
    embedder: &Arc<dyn Embedder>,
    schema: &Schema,
) -> Result<String> {
    let description = describe_schema(schema);
    let vector_id = vector_id_for(&schema.connection_id, &description);

    let mut metadata = HashMap::new();
    metadata.insert("connection_id".to_string(), schema.connection_id.clone());
    metadata.insert("db_type".to_string(), schema.db_type.clone());
    metadata.insert("name".to_string(), schema.name.clone());
    metadata.insert(
        "schema_hash".to_string(),
        vector_id
            .trim_start_matches(&format!("schema_{}_", schema.connection_id))
            .to_string(),
    );
    metadata.insert("tables_count".to_string(), schema.tables.len().to_string());

    let mut last_err = None;
    for attempt in 0..MAX_ATTEMPTS {
        let timeout = Duration::from_secs(INITIAL_TIMEOUT_SECS + TIMEOUT_STEP_SECS * attempt as u64);
        let fut = async {
            let vector = embedder.embed(&description).await?;
            store
                .add_vector("database_schemas", &vector_id, vector, metadata.clone())
                .await
        };
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(())) => return Ok(vector_id),
            Ok(Err(e)) => {
                warn!(connection_id = %schema.connection_id, attempt, error = %e, "vectorization attempt failed");
                last_err = Some(e);
            }
            Err(_) => {
                warn!(connection_id = %schema.connection_id, attempt, "vectorization attempt timed out");
                last_err = Some(Error::Timeout(format!("vectorization exceeded {timeout:?}")));
            }
        }
    }
    Err(last_err.unwrap_or_else(|| Error::Internal("vectorization failed with no recorded error".into())))
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
            discovery_date: Some(chrono::Utc::now()),
            vector_id: None,
            error: None,
            vectorization_error: None,
            tables: vec![Table {
                name: "orders".into(),
                schema_namespace: Some("public".into()),
                row_count: Some(10),
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
            }],
            query_suggestions: Vec::new(),
        }
    }

    #[test]
    fn description_includes_table_and_flags() {
        let description = describe_schema(&sample_schema());
        assert!(description.contains("Table: orders"));
        assert!(description.contains("PRIMARY KEY"));
        assert!(description.contains("NOT NULL"));
    }

    #[test]
    fn vector_id_is_deterministic_for_the_same_description() {
        let schema = sample_schema();
        let description = describe_schema(&schema);
        let a = vector_id_for(&schema.connection_id, &description);
        let b = vector_id_for(&schema.connection_id, &description);
        assert_eq!(a, b);
        assert!(a.starts_with("schema_c1_"));
    }

    #[test]
    fn long_description_is_truncated_with_a_marker() {
        let mut schema = sample_schema();
        schema.tables[0].description = Some("x".repeat(DESCRIPTION_CHAR_CAP * 2));
        let description = describe_schema(&schema);
        assert!(description.chars().count() <= DESCRIPTION_CHAR_CAP + 20);
        assert!(description.ends_with("…[truncated]"));
    }
}
