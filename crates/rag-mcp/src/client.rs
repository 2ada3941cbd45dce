//! The embedded/HTTP client duality.
//!
//! Both implementations expose the same surface, including `list_active`
//! with the same filter shape — an HTTP caller can do everything an
//! in-process caller can.

use async_trait::async_trait;
use ragcore::{Context, ContextFilter, Error, Result};
use std::sync::Arc;

use crate::registry::ContextRegistry;
use crate::tools::{FindRelevantRequest, FindRelevantResponse, StoreDocumentAck, StoreDocumentRequest, ToolRuntime};

/// A tagged response envelope so integration tests (and callers) can pin
/// which transport handled a call.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Tagged<T> {
    pub client_type: &'static str,
    #[serde(flatten)]
    pub body: T,
}

/// Interface implemented identically by the embedded and HTTP clients.
#[async_trait]
pub trait McpClient: Send + Sync {
    fn client_type(&self) -> &'static str;

    async fn store_document(
        &self,
        req: StoreDocumentRequest,
        active_context_id: Option<&str>,
    ) -> Result<Tagged<StoreDocumentAck>>;

    async fn find_relevant(&self, req: FindRelevantRequest) -> Result<Tagged<FindRelevantResponse>>;

    async fn activate_context(&self, context_id: &str) -> Result<Tagged<Context>>;

    async fn deactivate_context(&self, context_id: &str) -> Result<Tagged<Context>>;

    async fn list_active(&self, filter: Option<ContextFilter>) -> Result<Tagged<Vec<Context>>>;
}

/// In-process client talking directly to the registry and tool runtime.
pub struct EmbeddedMcpClient {
    registry: Arc<ContextRegistry>,
    tools: Arc<ToolRuntime>,
}

impl EmbeddedMcpClient {
    pub fn new(registry: Arc<ContextRegistry>, tools: Arc<ToolRuntime>) -> Self {
        EmbeddedMcpClient { registry, tools }
    }
}

#[async_trait]
impl McpClient for EmbeddedMcpClient {
    fn client_type(&self) -> &'static str {
        "native"
    }

    async fn store_document(
        &self,
        req: StoreDocumentRequest,
        active_context_id: Option<&str>,
    ) -> Result<Tagged<StoreDocumentAck>> {
        let body = self.tools.store_document(req, active_context_id).await?;
        Ok(Tagged {
            client_type: self.client_type(),
            body,
        })
    }

    async fn find_relevant(&self, req: FindRelevantRequest) -> Result<Tagged<FindRelevantResponse>> {
        let body = self.tools.find_relevant(req).await?;
        Ok(Tagged {
            client_type: self.client_type(),
            body,
        })
    }

    async fn activate_context(&self, context_id: &str) -> Result<Tagged<Context>> {
        let body = self.registry.activate(context_id)?;
        Ok(Tagged {
            client_type: self.client_type(),
            body,
        })
    }

    async fn deactivate_context(&self, context_id: &str) -> Result<Tagged<Context>> {
        let body = self.registry.deactivate(context_id)?;
        Ok(Tagged {
            client_type: self.client_type(),
            body,
        })
    }

    async fn list_active(&self, filter: Option<ContextFilter>) -> Result<Tagged<Vec<Context>>> {
        let body = self.registry.list_active(filter.as_ref());
        Ok(Tagged {
            client_type: self.client_type(),
            body,
        })
    }
}

/// HTTP fallback client, talking to another process's `rag-mcp` HTTP routes.
pub struct HttpMcpClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpMcpClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpMcpClient {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn send_upstream_err(&self, resp: reqwest::Response) -> Error {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if status.as_u16() == 404 {
            Error::NotFound(text)
        } else {
            Error::Upstream(format!("mcp http call failed ({status}): {text}"))
        }
    }
}

#[async_trait]
impl McpClient for HttpMcpClient {
    fn client_type(&self) -> &'static str {
        "http"
    }

    async fn store_document(
        &self,
        req: StoreDocumentRequest,
        active_context_id: Option<&str>,
    ) -> Result<Tagged<StoreDocumentAck>> {
        let mut url = format!("{}/mcp/tools/store-document", self.base_url);
        if let Some(ctx) = active_context_id {
            url = format!("{url}?active_context_id={ctx}");
        }
        let resp = self
            .http
            .post(url)
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(self.send_upstream_err(resp).await);
        }
        let body: StoreDocumentAck = resp.json().await.map_err(|e| Error::Upstream(e.to_string()))?;
        Ok(Tagged {
            client_type: self.client_type(),
            body,
        })
    }

    async fn find_relevant(&self, req: FindRelevantRequest) -> Result<Tagged<FindRelevantResponse>> {
        let url = format!("{}/mcp/tools/find-relevant", self.base_url);
        let resp = self
            .http
            .post(url)
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(self.send_upstream_err(resp).await);
        }
        let body: FindRelevantResponse = resp.json().await.map_err(|e| Error::Upstream(e.to_string()))?;
        Ok(Tagged {
            client_type: self.client_type(),
            body,
        })
    }

    async fn activate_context(&self, context_id: &str) -> Result<Tagged<Context>> {
        let url = format!("{}/contexts/{context_id}/activate", self.base_url);
        let resp = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(self.send_upstream_err(resp).await);
        }
        let body: Context = resp.json().await.map_err(|e| Error::Upstream(e.to_string()))?;
        Ok(Tagged {
            client_type: self.client_type(),
            body,
        })
    }

    async fn deactivate_context(&self, context_id: &str) -> Result<Tagged<Context>> {
        let url = format!("{}/contexts/{context_id}/deactivate", self.base_url);
        let resp = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(self.send_upstream_err(resp).await);
        }
        let body: Context = resp.json().await.map_err(|e| Error::Upstream(e.to_string()))?;
        Ok(Tagged {
            client_type: self.client_type(),
            body,
        })
    }

    async fn list_active(&self, filter: Option<ContextFilter>) -> Result<Tagged<Vec<Context>>> {
        let mut url = format!("{}/mcp/active-contexts", self.base_url);
        if let Some(f) = filter.and_then(|f| f.metadata_type) {
            url = format!("{url}?metadata_type={f}");
        }
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(self.send_upstream_err(resp).await);
        }
        let body: Vec<Context> = resp.json().await.map_err(|e| Error::Upstream(e.to_string()))?;
        Ok(Tagged {
            client_type: self.client_type(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragcore::VectorStore;
    use std::collections::HashMap;

    struct EmptyStore;

    #[async_trait]
    impl VectorStore for EmptyStore {
        async fn add_text(
            &self,
            _collection: &str,
            _text: &str,
            _metadata: HashMap<String, String>,
        ) -> Result<String> {
            Ok("doc-0".into())
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
        ) -> Result<Vec<ragcore::VectorMatch>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn embedded_client_tags_responses_native() {
        let registry = Arc::new(ContextRegistry::new());
        registry.upsert(Context::new("ctx-A".into(), "Area A".into()));
        let tools = Arc::new(ToolRuntime::new(Arc::new(EmptyStore)));
        let client = EmbeddedMcpClient::new(registry, tools);
        let tagged = client.activate_context("ctx-A").await.unwrap();
        assert_eq!(tagged.client_type, "native");
        assert!(tagged.body.active);
    }
}
