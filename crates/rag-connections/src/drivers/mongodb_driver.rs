//! MongoDB driver. Collections stand in for tables; fields are
//! sampled from up to `sample_size` documents per collection, since Mongo
//! has no static schema to introspect.

use async_trait::async_trait;
use dashmap::DashMap;
use mongodb::bson::{doc, Document};
use mongodb::{Client, Database};
use ragcore::{Column, ConnectionStatus, ConnectionTestResult, Error, Result, Schema, Table};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Instant;

use super::{elapsed_ms, ConnectionDriver, DiscoveryOptions, QueryParams};

#[derive(Default)]
pub struct MongoDriver {
    clients: DashMap<String, Client>,
}

impl MongoDriver {
    pub fn new() -> Self {
        Self::default()
    }

    async fn client_for(&self, connection_id: &str, dsn: &str) -> Result<Client> {
        if let Some(client) = self.clients.get(connection_id) {
            return Ok(client.clone());
        }
        let client = Client::with_uri_str(dsn)
            .await
            .map_err(|e| Error::Upstream(format!("mongodb connect failed: {e}")))?;
        self.clients.insert(connection_id.to_string(), client.clone());
        Ok(client)
    }
}

fn bson_type_name(value: &mongodb::bson::Bson) -> &'static str {
    use mongodb::bson::Bson;
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::Int32(_) => "int32",
        Bson::Int64(_) => "int64",
        Bson::DateTime(_) => "date",
        Bson::ObjectId(_) => "objectId",
        _ => "unknown",
    }
}

#[async_trait]
impl ConnectionDriver for MongoDriver {
    async fn test(&self, connection_id: &str, dsn: &str) -> Result<ConnectionTestResult> {
        let start = Instant::now();
        let result = async {
            let client = self.client_for(connection_id, dsn).await?;
            client
                .database("admin")
                .run_command(doc! {"ping": 1})
                .await
                .map_err(|e| Error::Upstream(format!("mongodb ping failed: {e}")))?;
            Ok::<(), Error>(())
        }
        .await;
        let elapsed = elapsed_ms(start);
        Ok(match result {
            Ok(()) => ConnectionTestResult {
                status: ConnectionStatus::Active,
                elapsed_ms: elapsed,
                error: None,
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
        connection_id: &str,
        dsn: &str,
        statement: &str,
        params: QueryParams,
    ) -> Result<(Value, u64)> {
        let start = Instant::now();
        let client = self.client_for(connection_id, dsn).await?;
        let json_value: Value = serde_json::from_str(statement)
            .map_err(|e| Error::Validation(format!("mongodb statement must be a JSON command document: {e}")))?;
        let command: Document = mongodb::bson::to_document(&json_value)
            .map_err(|e| Error::Validation(format!("mongodb statement is not a valid command document: {e}")))?;
        let timeout = params.timeout.unwrap_or(std::time::Duration::from_secs(30));

        let db: Database = client.default_database().unwrap_or_else(|| client.database("admin"));
        let fut = db.run_command(command);
        let doc = tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| Error::Timeout(format!("query on '{connection_id}' exceeded {timeout:?}")))?
            .map_err(|e| Error::Upstream(format!("mongodb command failed: {e}")))?;
        let value: Value = mongodb::bson::from_document(doc)
            .map_err(|e| Error::Internal(format!("bson to json conversion failed: {e}")))?;
        Ok((value, elapsed_ms(start)))
    }

    async fn get_schema(
        &self,
        connection_id: &str,
        dsn: &str,
        options: DiscoveryOptions,
    ) -> Result<Schema> {
        let client = self.client_for(connection_id, dsn).await?;
        let db_name = options
            .database
            .clone()
            .ok_or_else(|| Error::Validation("mongodb discovery requires 'database' option".into()))?;
        let db = client.database(&db_name);
        let sample_size = options.sample_size.unwrap_or(50).min(1000) as i64;

        let collection_names = db
            .list_collection_names()
            .await
            .map_err(|e| Error::Upstream(format!("mongodb list collections failed: {e}")))?;

        let mut tables = Vec::new();
        for name in collection_names {
            if options.excluded_collections.contains(&name) {
                continue;
            }
            let coll = db.collection::<Document>(&name);
            let mut cursor = coll
                .find(doc! {})
                .limit(sample_size)
                .await
                .map_err(|e| Error::Upstream(format!("mongodb sample failed: {e}")))?;

            let mut field_types: BTreeMap<String, &'static str> = BTreeMap::new();
            use futures::TryStreamExt;
            while let Some(sample) = cursor
                .try_next()
                .await
                .map_err(|e| Error::Upstream(format!("mongodb cursor error: {e}")))?
            {
                for (key, value) in sample.iter() {
                    field_types.entry(key.clone()).or_insert_with(|| bson_type_name(value));
                }
            }

            let columns = field_types
                .into_iter()
                .map(|(name, data_type)| Column {
                    primary_key: name == "_id",
                    name,
                    data_type: data_type.to_string(),
                    nullable: true,
                    foreign_key: false,
                    references: None,
                })
                .collect();

            tables.push(Table {
                name,
                schema_namespace: Some(db_name.clone()),
                row_count: None,
                description: None,
                columns,
                community: None,
            });
        }

        let mut schema = Schema {
            connection_id: connection_id.to_string(),
            name: db_name,
            db_type: "mongodb".to_string(),
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
