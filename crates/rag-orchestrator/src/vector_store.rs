//! HTTP-backed [`VectorStore`]: embeds text through an [`Embedder`] and
//! stores/searches vectors against a REST vector backend (Weaviate's
//! objects/graphql surface).

use async_trait::async_trait;
use ragcore::{Error, Result, VectorMatch, VectorStore};
use std::collections::HashMap;
use std::sync::Arc;

use crate::vectorize::Embedder;

pub struct HttpVectorStore {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    embedder: Arc<dyn Embedder>,
}

impl HttpVectorStore {
    pub fn new(base_url: String, api_key: Option<String>, embedder: Arc<dyn Embedder>) -> Self {
        HttpVectorStore {
            http: reqwest::Client::new(),
            base_url,
            api_key,
            embedder,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.base_url.trim_end_matches('/'));
        let mut builder = self.http.request(method, url);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }
}

#[async_trait]
impl VectorStore for HttpVectorStore {
    async fn add_text(&self, collection: &str, text: &str, metadata: HashMap<String, String>) -> Result<String> {
        let embedding = self.embedder.embed(text).await?;
        let id = uuid::Uuid::new_v4().to_string();
        self.add_vector(collection, &id, embedding, metadata).await?;
        Ok(id)
    }

    async fn add_vector(
        &self,
        collection: &str,
        id: &str,
        embedding: Vec<f32>,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        let body = serde_json::json!({
            "id": id,
            "class": collection,
            "vector": embedding,
            "properties": metadata,
        });
        let resp = self
            .request(reqwest::Method::POST, "/v1/objects")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("vector store unreachable: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::Upstream(format!("vector store returned {}", resp.status())));
        }
        Ok(())
    }

    async fn similarity_search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
        filter: HashMap<String, String>,
    ) -> Result<Vec<VectorMatch>> {
        let embedding = self.embedder.embed(query).await?;
        let body = serde_json::json!({
            "class": collection,
            "vector": embedding,
            "limit": limit,
            "filter": filter,
        });
        let resp = self
            .request(reqwest::Method::POST, "/v1/objects/search")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("vector store unreachable: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::Upstream(format!("vector store returned {}", resp.status())));
        }
        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("vector store response malformed: {e}")))?;
        Ok(parsed
            .results
            .into_iter()
            .map(|r| VectorMatch {
                doc_id: r.id,
                score: r.score,
                text: r.properties.get("text").cloned().unwrap_or_default(),
                metadata: r.properties,
            })
            .collect())
    }
}

#[derive(serde::Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(serde::Deserialize)]
struct SearchResult {
    id: String,
    score: f64,
    #[serde(default)]
    properties: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    #[tokio::test]
    async fn add_text_embeds_then_posts_a_vector_object() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/v1/objects"))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let store = HttpVectorStore::new(server.uri(), None, Arc::new(FixedEmbedder));
        let id = store.add_text("general", "hello", HashMap::new()).await.unwrap();
        assert!(!id.is_empty());
    }
}
