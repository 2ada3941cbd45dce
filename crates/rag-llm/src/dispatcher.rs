//! Stateless generation dispatch over the registered provider set: selection,
//! rate limiting, MCP context pass-through, and retry — a single dispatch
//! function switching on `ProviderKind` rather than a trait object per
//! provider, since the variants differ only in request shape.

use dashmap::DashMap;
use parking_lot::RwLock;
use ragcore::{Context as McpContext, Error, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::{error, warn};

use crate::provider::{ProviderConfig, ProviderKind};
use crate::rate_limit::RateLimiter;

const MAX_ATTEMPTS: u32 = 3;

/// A generation request. `area_provider_id`, when set, wins over
/// `provider_id` as the per-call provider selection; the registered
/// default is the last resort.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub provider_id: Option<String>,
    pub area_provider_id: Option<String>,
    pub active_contexts: Vec<McpContext>,
}

#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    pub provider_id: String,
}

pub struct LlmDispatcher {
    providers: DashMap<String, ProviderConfig>,
    default_provider_id: RwLock<Option<String>>,
    rate_limiter: RateLimiter,
    http: reqwest::Client,
}

impl Default for LlmDispatcher {
    fn default() -> Self {
        LlmDispatcher {
            providers: DashMap::new(),
            default_provider_id: RwLock::new(None),
            rate_limiter: RateLimiter::new(),
            http: reqwest::Client::new(),
        }
    }
}

impl LlmDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_provider(&self, config: ProviderConfig) {
        if config.is_default {
            *self.default_provider_id.write() = Some(config.id.clone());
        }
        self.providers.insert(config.id.clone(), config);
    }

    fn select_provider(
        &self,
        provider_id: Option<&str>,
        area_provider_id: Option<&str>,
    ) -> Result<ProviderConfig> {
        let chosen_id = area_provider_id
            .or(provider_id)
            .map(str::to_string)
            .or_else(|| self.default_provider_id.read().clone())
            .ok_or_else(|| Error::Validation("no provider selected and no default registered".into()))?;

        self.providers
            .get(&chosen_id)
            .map(|p| p.clone())
            .ok_or_else(|| Error::NotFound(format!("provider '{chosen_id}' not registered")))
    }

    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        let provider = self.select_provider(
            request.provider_id.as_deref(),
            request.area_provider_id.as_deref(),
        )?;

        self.rate_limiter
            .check_and_increment(&provider.id, provider.rate_limit_per_hour)?;

        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            match self.call_once(&provider, &request).await {
                Ok(text) => {
                    return Ok(GenerationResponse {
                        text,
                        provider_id: provider.id.clone(),
                    })
                }
                Err(e) if is_retriable(&e) && attempt + 1 < MAX_ATTEMPTS => {
                    warn!(provider_id = %provider.id, attempt, error = %e, "generation attempt failed, retrying");
                    tokio::time::sleep(Duration::from_secs(2u64.pow(attempt + 1))).await;
                    last_err = Some(e);
                }
                Err(e) => {
                    error!(provider_id = %provider.id, error = %e, "generation failed");
                    return Err(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Internal("generation failed with no recorded error".into())))
    }

    async fn call_once(&self, provider: &ProviderConfig, request: &GenerationRequest) -> Result<String> {
        let (url, body) = build_request_body(provider, request);
        let mut builder = self.http.post(&url).json(&body);
        builder = match provider.kind {
            ProviderKind::Anthropic => builder
                .header("x-api-key", &provider.api_key)
                .header("anthropic-version", "2023-06-01"),
            ProviderKind::Google => builder,
            ProviderKind::Ollama => builder,
            ProviderKind::OpenAi | ProviderKind::AzureOpenAi => {
                builder.bearer_auth(&provider.api_key)
            }
        };

        let resp = builder
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("provider '{}' unreachable: {e}", provider.id)))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                return Err(Error::RateLimited { retry_after_secs: 30 });
            }
            return Err(Error::Upstream(format!(
                "provider '{}' returned {status}: {body_text}",
                provider.id
            )));
        }

        let parsed: Value = resp
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("provider '{}' response malformed: {e}", provider.id)))?;
        extract_text(provider.kind, &parsed)
    }
}

fn is_retriable(error: &Error) -> bool {
    matches!(error, Error::Timeout(_) | Error::RateLimited { .. }) || error.is_transient()
}

/// Build the `(url, body)` pair for a provider call, attaching
/// `active_contexts` in the provider's native shape only when it declares
/// native MCP support; otherwise the caller has already inlined retrieved
/// context into the prompt and contexts are dropped at this layer.
fn build_request_body(provider: &ProviderConfig, request: &GenerationRequest) -> (String, Value) {
    let endpoint = provider.endpoint.clone().unwrap_or_default();
    let attach_contexts = provider.kind.supports_mcp_natively() && !request.active_contexts.is_empty();

    match provider.kind {
        ProviderKind::OpenAi | ProviderKind::AzureOpenAi => {
            let mut messages = Vec::new();
            if let Some(system) = &request.system {
                messages.push(serde_json::json!({"role": "system", "content": system}));
            }
            messages.push(serde_json::json!({"role": "user", "content": request.prompt}));
            let mut body = serde_json::json!({
                "messages": messages,
                "max_tokens": request.max_tokens,
                "temperature": request.temperature,
            });
            if attach_contexts {
                body["metadata"] = serde_json::json!({
                    "active_contexts": context_ids(request),
                });
            }
            (format!("{endpoint}/chat/completions"), body)
        }
        ProviderKind::Anthropic => {
            let mut body = serde_json::json!({
                "model": provider.metadata.get("model").cloned().unwrap_or_default(),
                "max_tokens": request.max_tokens.unwrap_or(1024),
                "system": request.system,
                "messages": [{"role": "user", "content": request.prompt}],
            });
            if attach_contexts {
                body["tool_use"] = serde_json::json!({"active_contexts": context_ids(request)});
            }
            (format!("{endpoint}/v1/messages"), body)
        }
        ProviderKind::Google => (
            format!("{endpoint}/v1/models/gemini:generateContent?key={}", provider.api_key),
            serde_json::json!({
                "contents": [{"parts": [{"text": request.prompt}]}],
            }),
        ),
        ProviderKind::Ollama => (
            format!("{endpoint}/api/generate"),
            serde_json::json!({
                "model": provider.metadata.get("model").cloned().unwrap_or_default(),
                "prompt": request.prompt,
                "stream": false,
            }),
        ),
    }
}

fn context_ids(request: &GenerationRequest) -> Vec<String> {
    request
        .active_contexts
        .iter()
        .map(|c| c.context_id.clone())
        .collect()
}

fn extract_text(kind: ProviderKind, body: &Value) -> Result<String> {
    let text = match kind {
        ProviderKind::OpenAi | ProviderKind::AzureOpenAi => body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str),
        ProviderKind::Anthropic => body.pointer("/content/0/text").and_then(Value::as_str),
        ProviderKind::Google => body
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str),
        ProviderKind::Ollama => body.pointer("/response").and_then(Value::as_str),
    };
    text.map(str::to_string)
        .ok_or_else(|| Error::Upstream("provider response missing expected text field".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(kind: ProviderKind, id: &str) -> ProviderConfig {
        ProviderConfig {
            id: id.to_string(),
            kind,
            api_key: "sk-aaaaaaaaaaaaaaaaaaaaaaaa".into(),
            endpoint: Some("http://localhost".into()),
            is_default: false,
            rate_limit_per_hour: 100,
            metadata: Default::default(),
        }
    }

    #[test]
    fn selection_prefers_area_provider_over_explicit_and_default() {
        let dispatcher = LlmDispatcher::new();
        let mut default_provider = provider(ProviderKind::OpenAi, "default");
        default_provider.is_default = true;
        dispatcher.register_provider(default_provider);
        dispatcher.register_provider(provider(ProviderKind::OpenAi, "explicit"));
        dispatcher.register_provider(provider(ProviderKind::OpenAi, "area-preferred"));

        let chosen = dispatcher
            .select_provider(Some("explicit"), Some("area-preferred"))
            .unwrap();
        assert_eq!(chosen.id, "area-preferred");
    }

    #[test]
    fn selection_falls_back_to_the_registered_default() {
        let dispatcher = LlmDispatcher::new();
        let mut default_provider = provider(ProviderKind::Ollama, "default");
        default_provider.is_default = true;
        dispatcher.register_provider(default_provider);

        let chosen = dispatcher.select_provider(None, None).unwrap();
        assert_eq!(chosen.id, "default");
    }

    #[test]
    fn openai_response_text_is_extracted_from_choices() {
        let body = serde_json::json!({"choices": [{"message": {"content": "hi"}}]});
        assert_eq!(extract_text(ProviderKind::OpenAi, &body).unwrap(), "hi");
    }

    #[test]
    fn mcp_contexts_are_attached_only_for_natively_supporting_providers() {
        let req = GenerationRequest {
            prompt: "q".into(),
            active_contexts: vec![McpContext::new("ctx-A".into(), "Area A".into())],
            ..Default::default()
        };
        let (_, openai_body) = build_request_body(&provider(ProviderKind::OpenAi, "p"), &req);
        assert!(openai_body.get("metadata").is_some());
        let (_, ollama_body) = build_request_body(&provider(ProviderKind::Ollama, "p"), &req);
        assert!(ollama_body.get("metadata").is_none());
    }
}
