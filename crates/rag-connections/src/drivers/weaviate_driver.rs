//! Weaviate driver. Weaviate has no relational schema; `get_schema`
//! projects its classes onto the same `Table`/`Column` shape so the rest of
//! the platform (graph projection, vectorization) can treat it uniformly.

use async_trait::async_trait;
use ragcore::{Column, ConnectionStatus, ConnectionTestResult, Error, Result, Schema, Table};
use serde_json::Value;
use std::time::Instant;

use super::{elapsed_ms, ConnectionDriver, DiscoveryOptions, QueryParams};

#[derive(Default)]
pub struct WeaviateDriver {
    http: reqwest::Client,
}

impl WeaviateDriver {
    pub fn new() -> Self {
        WeaviateDriver {
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ConnectionDriver for WeaviateDriver {
    async fn test(&self, _connection_id: &str, dsn: &str) -> Result<ConnectionTestResult> {
        let start = Instant::now();
        let url = format!("{}/v1/.well-known/ready", dsn.trim_end_matches('/'));
        let result = self.http.get(&url).send().await;
        let elapsed = elapsed_ms(start);
        Ok(match result {
            Ok(resp) if resp.status().is_success() => ConnectionTestResult {
                status: ConnectionStatus::Active,
                elapsed_ms: elapsed,
                error: None,
            },
            Ok(resp) => ConnectionTestResult {
                status: ConnectionStatus::Error,
                elapsed_ms: elapsed,
                error: Some(format!("weaviate not ready: {}", resp.status())),
            },
            Err(e) => ConnectionTestResult {
                status: ConnectionStatus::Error,
                elapsed_ms: elapsed,
                error: Some(e.to_string()),
            },
        })
    }

    async fn execute_query(
        &self,
        _connection_id: &str,
        dsn: &str,
        statement: &str,
        params: QueryParams,
    ) -> Result<(Value, u64)> {
        let start = Instant::now();
        let url = format!("{}/v1/graphql", dsn.trim_end_matches('/'));
        let timeout = params.timeout.unwrap_or(std::time::Duration::from_secs(30));
        let fut = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "query": statement }))
            .send();
        let resp = tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| Error::Timeout(format!("weaviate GraphQL query exceeded {timeout:?}")))?
            .map_err(|e| Error::Upstream(format!("weaviate request failed: {e}")))?;
        let value: Value = resp
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("weaviate response not JSON: {e}")))?;
        Ok((value, elapsed_ms(start)))
    }

    async fn get_schema(
        &self,
        connection_id: &str,
        dsn: &str,
        _options: DiscoveryOptions,
    ) -> Result<Schema> {
        let url = format!("{}/v1/schema", dsn.trim_end_matches('/'));
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("weaviate schema request failed: {e}")))?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("weaviate schema response not JSON: {e}")))?;

        let mut tables = Vec::new();
        if let Some(classes) = body.get("classes").and_then(Value::as_array) {
            for class in classes {
                let name = class
                    .get("class")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string();
                let mut columns = Vec::new();
                if let Some(props) = class.get("properties").and_then(Value::as_array) {
                    for prop in props {
                        let pname = prop.get("name").and_then(Value::as_str).unwrap_or("field");
                        let data_type = prop
                            .get("dataType")
                            .and_then(Value::as_array)
                            .and_then(|a| a.first())
                            .and_then(Value::as_str)
                            .unwrap_or("text");
                        columns.push(Column {
                            name: pname.to_string(),
                            data_type: data_type.to_string(),
                            nullable: true,
                            primary_key: false,
                            foreign_key: false,
                            references: None,
                        });
                    }
                }
                tables.push(Table {
                    name,
                    schema_namespace: None,
                    row_count: None,
                    description: None,
                    columns,
                    community: None,
                });
            }
        }

        let mut schema = Schema {
            connection_id: connection_id.to_string(),
            name: connection_id.to_string(),
            db_type: "weaviate".to_string(),
            version: None,
            status: ragcore::SchemaStatus::Completed,
            discovery_date: Some(chrono::Utc::now()),
            vector_id: None,
            error: None,
            vectorization_error: None,
            tables,
            query_suggestions: Vec::new(),
        };
        schema.enforce_caps();
        Ok(schema)
    }
}
