//! The MCP tool-call plane: `store_document` and `find_relevant`.

use ragcore::{sort_sources, Error, Result, Source, VectorStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Which per-tenant vector pool a call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingType {
    General,
    Personal,
}

impl EmbeddingType {
    fn collection(self) -> &'static str {
        match self {
            EmbeddingType::General => "general",
            EmbeddingType::Personal => "personal",
        }
    }
}

impl Default for EmbeddingType {
    fn default() -> Self {
        EmbeddingType::General
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreDocumentRequest {
    pub information: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub embedding_type: EmbeddingType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreDocumentAck {
    pub doc_id: String,
    pub collection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindRelevantRequest {
    pub query: String,
    #[serde(default)]
    pub embedding_type: EmbeddingType,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub area_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindRelevantResponse {
    pub results: Vec<Source>,
}

/// Implements the two canonical MCP tools over a [`VectorStore`] handle.
///
/// `active_context_id` is read at call time and attached as metadata on
/// `store_document`.
pub struct ToolRuntime {
    vector_store: Arc<dyn VectorStore>,
}

impl ToolRuntime {
    pub fn new(vector_store: Arc<dyn VectorStore>) -> Self {
        ToolRuntime { vector_store }
    }

    pub async fn store_document(
        &self,
        req: StoreDocumentRequest,
        active_context_id: Option<&str>,
    ) -> Result<StoreDocumentAck> {
        if req.information.trim().is_empty() {
            return Err(Error::Validation(
                "store_document requires non-empty 'information'".into(),
            ));
        }
        let mut metadata = req.metadata;
        if let Some(ctx) = active_context_id {
            metadata.insert("context_id".to_string(), ctx.to_string());
        }
        let collection = req.embedding_type.collection();
        let doc_id = self
            .vector_store
            .add_text(collection, &req.information, metadata)
            .await?;
        Ok(StoreDocumentAck {
            doc_id,
            collection: collection.to_string(),
        })
    }

    pub async fn find_relevant(&self, req: FindRelevantRequest) -> Result<FindRelevantResponse> {
        let collection = req.embedding_type.collection();
        let mut filter = HashMap::new();
        if let Some(owner_id) = &req.owner_id {
            filter.insert("owner_id".to_string(), owner_id.clone());
        }
        if let Some(area_id) = &req.area_id {
            filter.insert("area_id".to_string(), area_id.clone());
        }
        let matches = self
            .vector_store
            .similarity_search(collection, &req.query, req.limit, filter)
            .await?;
        let mut sources: Vec<Source> = matches.into_iter().map(Source::from).collect();
        sort_sources(&mut sources);
        sources.truncate(req.limit);
        Ok(FindRelevantResponse { results: sources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragcore::VectorMatch;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeStore {
        counter: AtomicUsize,
    }

    #[async_trait]
    impl VectorStore for FakeStore {
        async fn add_text(
            &self,
            _collection: &str,
            _text: &str,
            _metadata: HashMap<String, String>,
        ) -> Result<String> {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(format!("doc-{n}"))
        }

        async fn add_vector(
            &self,
            _collection: &str,
            _id: &str,
            _embedding: Vec<f32>,
            _metadata: HashMap<String, String>,
        ) -> Result<()> {
            Ok(())
        }

        async fn similarity_search(
            &self,
            _collection: &str,
            _query: &str,
            _limit: usize,
            _filter: HashMap<String, String>,
        ) -> Result<Vec<VectorMatch>> {
            Ok(vec![
                VectorMatch {
                    doc_id: "b".into(),
                    score: 0.4,
                    text: "low".into(),
                    metadata: HashMap::new(),
                },
                VectorMatch {
                    doc_id: "a".into(),
                    score: 0.9,
                    text: "high".into(),
                    metadata: HashMap::new(),
                },
            ])
        }
    }

    #[tokio::test]
    async fn store_document_attaches_active_context_metadata() {
        let runtime = ToolRuntime::new(Arc::new(FakeStore {
            counter: AtomicUsize::new(0),
        }));
        let ack = runtime
            .store_document(
                StoreDocumentRequest {
                    information: "hello".into(),
                    metadata: HashMap::new(),
                    embedding_type: EmbeddingType::General,
                },
                Some("ctx-A"),
            )
            .await
            .unwrap();
        assert_eq!(ack.doc_id, "doc-0");
        assert_eq!(ack.collection, "general");
    }

    #[tokio::test]
    async fn store_document_rejects_empty_information() {
        let runtime = ToolRuntime::new(Arc::new(FakeStore {
            counter: AtomicUsize::new(0),
        }));
        let err = runtime
            .store_document(
                StoreDocumentRequest {
                    information: "   ".into(),
                    metadata: HashMap::new(),
                    embedding_type: EmbeddingType::General,
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn find_relevant_orders_results_by_descending_score() {
        let runtime = ToolRuntime::new(Arc::new(FakeStore {
            counter: AtomicUsize::new(0),
        }));
        let resp = runtime
            .find_relevant(FindRelevantRequest {
                query: "q".into(),
                embedding_type: EmbeddingType::General,
                owner_id: None,
                area_id: None,
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(resp.results[0].doc_id, "a");
        assert_eq!(resp.results[1].doc_id, "b");
    }
}
