//! Schema Discovery Orchestrator: job lifecycle, retries, timeouts, memory
//! caps, and the hand-off to vectorization.

use chrono::{Duration as ChronoDuration, Utc};
use rag_connections::{ConnectionRegistry, DiscoveryOptions};
use ragcore::{DocumentStore, Error, GraphStore, Job, JobStatus, Result, Schema, SchemaStatus, VectorStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::job_store::JobStore;
use crate::vectorize::{vectorize_schema, Embedder};

const SCHEMAS_COLLECTION: &str = "schemas";
const MAX_RETRIES: u32 = 3;

pub struct Orchestrator {
    schema_store: Arc<dyn DocumentStore>,
    jobs: Arc<JobStore>,
    connections: Arc<ConnectionRegistry>,
    graph_store: Option<Arc<dyn GraphStore>>,
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    schema_discovery_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        schema_store: Arc<dyn DocumentStore>,
        connections: Arc<ConnectionRegistry>,
        graph_store: Option<Arc<dyn GraphStore>>,
        vector_store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        schema_discovery_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Orchestrator {
            schema_store,
            jobs: Arc::new(JobStore::new()),
            connections,
            graph_store,
            vector_store,
            embedder,
            schema_discovery_timeout,
        })
    }

    async fn load_schema(&self, connection_id: &str) -> Result<Option<Schema>> {
        let doc = self.schema_store.get(SCHEMAS_COLLECTION, connection_id).await?;
        doc.map(|v| serde_json::from_value(v).map_err(|e| Error::Internal(e.to_string())))
            .transpose()
    }

    async fn persist_schema(&self, schema: &Schema) -> Result<()> {
        let value = serde_json::to_value(schema).map_err(|e| Error::Internal(e.to_string()))?;
        self.schema_store
            .upsert(SCHEMAS_COLLECTION, &schema.connection_id, value)
            .await
    }

    /// Return the current schema, or synthesize a `pending` placeholder and
    /// enqueue discovery without blocking the caller.
    pub async fn get_schema(self: &Arc<Self>, connection_id: &str) -> Result<Schema> {
        if let Some(schema) = self.load_schema(connection_id).await? {
            return Ok(schema);
        }
        let connection = self.connections.get(connection_id).await?;
        let placeholder = Schema::pending_placeholder(connection_id, &connection.kind.to_string());
        self.persist_schema(&placeholder).await?;
        self.start_discovery(connection_id, DiscoveryOptions::default()).await?;
        Ok(placeholder)
    }

    /// Accept a discovery request, returning a job snapshot synchronously
    /// while the extraction runs as a background task.
    pub async fn start_discovery(self: &Arc<Self>, connection_id: &str, options: DiscoveryOptions) -> Result<Job> {
        let job_id = Uuid::new_v4().to_string();
        let mut job = Job::new(job_id.clone(), connection_id.to_string());
        job.estimated_completion = Some(Utc::now() + ChronoDuration::seconds(60));
        self.jobs.insert(job.clone());

        let orchestrator = Arc::clone(self);
        let connection_id = connection_id.to_string();
        tokio::spawn(async move {
            orchestrator.run_discovery(job_id, connection_id, options).await;
        });

        Ok(job)
    }

    /// Return the in-memory snapshot of a job, failing with `NotFound` once
    /// its retention window has elapsed.
    pub fn job_status(&self, job_id: &str) -> Result<Job> {
        let job = self.jobs.get(job_id)?;
        if job.is_expired(Utc::now()) {
            return Err(Error::NotFound(format!("job '{job_id}' not found")));
        }
        Ok(job)
    }

    /// Remove expired terminal jobs; intended to run on a periodic tick.
    pub fn run_janitor(&self) -> usize {
        self.jobs.sweep_expired()
    }

    /// Jobs currently in a non-terminal state, for metrics reporting.
    pub fn active_job_count(&self) -> usize {
        self.jobs.list_active().len()
    }

    /// Mark every in-flight job failed and return, for orderly shutdown.
    pub fn shutdown(&self) {
        self.jobs.fail_all_in_flight("shutdown");
    }

    async fn run_discovery(self: Arc<Self>, job_id: String, connection_id: String, options: DiscoveryOptions) {
        let _ = self.jobs.update(&job_id, |job| {
            job.status = JobStatus::InProgress;
            job.initial_memory = Some(estimate_memory_bytes(0));
        });

        let mut retry_count = 0u32;
        let outcome: Result<Schema> = loop {
            let timeout = self.schema_discovery_timeout + Duration::from_secs(120);
            let attempt = tokio::time::timeout(
                timeout,
                self.connections.get_schema(&connection_id, options.clone()),
            )
            .await;

            // A failure retries only if it is transient (a timeout counts as
            // transient) and retries remain; anything else ends the loop.
            let error = match attempt {
                Ok(Ok(schema)) => break Ok(schema),
                Ok(Err(e)) if e.is_transient() => e,
                Ok(Err(e)) => break Err(e),
                Err(_) => Error::Timeout(format!("discovery exceeded {timeout:?}")),
            };
            if retry_count >= MAX_RETRIES {
                break Err(error);
            }
            retry_count += 1;
            let backoff = 2u64.pow(retry_count);
            warn!(connection_id = %connection_id, retry_count, error = %error, "discovery attempt failed, retrying");
            let _ = self.jobs.update(&job_id, |job| {
                job.status = JobStatus::Retrying;
                job.retry_count = retry_count;
            });
            tokio::time::sleep(Duration::from_secs(backoff)).await;
            let _ = self.jobs.update(&job_id, |job| job.status = JobStatus::InProgress);
        };

        match outcome {
            Ok(mut schema) => {
                schema.enforce_caps();
                schema.status = SchemaStatus::Completed;
                schema.discovery_date = Some(Utc::now());
                if options.analyze {
                    schema.query_suggestions = crate::insights::suggest_queries(&schema);
                }
                if let Some(graph_store) = &self.graph_store {
                    if let Err(e) = graph_store.project_schema(&schema).await {
                        warn!(connection_id = %connection_id, error = %e, "graph projection failed, schema remains completed");
                    }
                }
                if let Err(e) = self.persist_schema(&schema).await {
                    warn!(connection_id = %connection_id, error = %e, "failed to persist completed schema");
                }
                let _ = self.jobs.update(&job_id, |job| {
                    job.status = JobStatus::Vectorizing;
                });
                match vectorize_schema(&self.vector_store, &self.embedder, &schema).await {
                    Ok(vector_id) => {
                        schema.vector_id = Some(vector_id);
                        let _ = self.persist_schema(&schema).await;
                    }
                    Err(e) => {
                        warn!(connection_id = %connection_id, error = %e, "vectorization failed, schema stays completed");
                        schema.vectorization_error = Some(e.to_string());
                        let _ = self.persist_schema(&schema).await;
                    }
                }
                info!(connection_id = %connection_id, job_id = %job_id, "discovery completed");
                let _ = self.jobs.update(&job_id, |job| {
                    job.status = JobStatus::Completed;
                    job.final_memory = Some(estimate_memory_bytes(schema.tables.len()));
                    job.finished_at = Some(Utc::now());
                });
            }
            Err(e) => {
                let terminal_status = if matches!(e, Error::Timeout(_)) {
                    JobStatus::Timeout
                } else {
                    JobStatus::Failed
                };
                warn!(connection_id = %connection_id, job_id = %job_id, error = %e, "discovery failed");
                let mut failed_schema = Schema::pending_placeholder(&connection_id, "unknown");
                failed_schema.status = SchemaStatus::Failed;
                failed_schema.error = Some(e.to_string());
                let _ = self.persist_schema(&failed_schema).await;
                let _ = self.jobs.update(&job_id, |job| {
                    job.status = terminal_status;
                    job.error = Some(e.to_string());
                    job.finished_at = Some(Utc::now());
                });
            }
        }
    }
}

/// Rough proxy for the memory observed during extraction: proportional to
/// the number of tables materialized so far. Real measurement would hook
/// into the process's allocator; this keeps `initial_memory`/`final_memory`
/// populated for the janitor's retention calculation without that
/// dependency.
fn estimate_memory_bytes(table_count: usize) -> u64 {
    1024 + (table_count as u64 * 256)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragcore::{ConnectionType, NewConnection, VectorMatch};
    use std::collections::HashMap as StdHashMap;
    use tokio::sync::Mutex as TokioMutex;

    #[derive(Default)]
    struct InMemoryStore {
        data: TokioMutex<StdHashMap<(String, String), serde_json::Value>>,
    }

    #[async_trait]
    impl DocumentStore for InMemoryStore {
        async fn upsert(&self, collection: &str, id: &str, document: serde_json::Value) -> Result<()> {
            self.data.lock().await.insert((collection.to_string(), id.to_string()), document);
            Ok(())
        }
        async fn get(&self, collection: &str, id: &str) -> Result<Option<serde_json::Value>> {
            Ok(self.data.lock().await.get(&(collection.to_string(), id.to_string())).cloned())
        }
        async fn find_one_by_field(&self, _collection: &str, _field: &str, _value: &str) -> Result<Option<serde_json::Value>> {
            Ok(None)
        }
        async fn list(&self, collection: &str) -> Result<Vec<serde_json::Value>> {
            let data = self.data.lock().await;
            Ok(data.iter().filter(|((c, _), _)| c == collection).map(|(_, v)| v.clone()).collect())
        }
        async fn delete(&self, collection: &str, id: &str) -> Result<()> {
            self.data.lock().await.remove(&(collection.to_string(), id.to_string()));
            Ok(())
        }
    }

    struct NullVectorStore;

    #[async_trait]
    impl VectorStore for NullVectorStore {
        async fn add_text(&self, _collection: &str, _text: &str, _metadata: StdHashMap<String, String>) -> Result<String> {
            Ok("doc1".into())
        }
        async fn add_vector(&self, _collection: &str, _id: &str, _embedding: Vec<f32>, _metadata: StdHashMap<String, String>) -> Result<()> {
            Ok(())
        }
        async fn similarity_search(&self, _collection: &str, _query: &str, _limit: usize, _filter: StdHashMap<String, String>) -> Result<Vec<VectorMatch>> {
            Ok(vec![])
        }
    }

    struct NullEmbedder;

    #[async_trait]
    impl Embedder for NullEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32])
        }
    }

    async fn orchestrator_with_connection() -> (Arc<Orchestrator>, String) {
        let document_store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::default());
        let connections = Arc::new(ConnectionRegistry::new(Arc::clone(&document_store), "secret", Duration::from_secs(5)));
        let created = connections
            .create(NewConnection {
                kind: ConnectionType::Postgresql,
                host: "db".into(),
                port: 5432,
                database: "x".into(),
                username: "u".into(),
                password: "p".into(),
                ssl: false,
            })
            .await
            .unwrap();
        let orchestrator = Orchestrator::new(
            document_store,
            connections,
            None,
            Arc::new(NullVectorStore),
            Arc::new(NullEmbedder),
            Duration::from_secs(5),
        );
        (orchestrator, created.id)
    }

    #[tokio::test]
    async fn get_schema_synthesizes_a_pending_placeholder_for_a_new_connection() {
        let (orchestrator, connection_id) = orchestrator_with_connection().await;
        // the postgres driver will fail to connect in this test environment,
        // so only the synchronous placeholder behaviour is under test here.
        let schema = orchestrator.get_schema(&connection_id).await.unwrap();
        assert_eq!(schema.status, SchemaStatus::Pending);
        assert_eq!(schema.connection_id, connection_id);
    }

    #[tokio::test]
    async fn job_status_reports_not_found_for_unknown_job() {
        let (orchestrator, _connection_id) = orchestrator_with_connection().await;
        assert!(orchestrator.job_status("missing").is_err());
    }

    #[tokio::test]
    async fn start_discovery_returns_an_accepted_job_snapshot() {
        let (orchestrator, connection_id) = orchestrator_with_connection().await;
        let job = orchestrator
            .start_discovery(&connection_id, DiscoveryOptions::default())
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Accepted);
        assert_eq!(job.connection_id, connection_id);
    }
}
