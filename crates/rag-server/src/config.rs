//! Layered configuration: built-in defaults, then an optional `config.toml`,
//! then `RAGP_`-prefixed environment variables applied last so they win.
//! Composition never panics; a missing required value surfaces as a
//! `Validation` error naming the key.

use ragcore::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;

/// One entry under `[providers.<id>]` in `config.toml`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProviderEntry {
    pub kind: String,
    pub api_key: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FileConfig {
    document_store_uri: Option<String>,
    document_store_database: Option<String>,
    embedder_url: Option<String>,
    vector_store_url: Option<String>,
    vector_store_api_key: Option<String>,
    graph_store_uri: Option<String>,
    graph_store_user: Option<String>,
    graph_store_password: Option<String>,
    schema_discovery_timeout: Option<u64>,
    max_document_size_mb: Option<u64>,
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
    cors_allowed_origins: Option<Vec<String>>,
    use_mcp_tools: Option<bool>,
    prefer_direct_mcp: Option<bool>,
    credential_secret: Option<String>,
    bind_addr: Option<String>,
    #[serde(default)]
    providers: HashMap<String, ProviderEntry>,
}

impl FileConfig {
    fn defaults() -> Self {
        FileConfig {
            document_store_uri: None,
            document_store_database: Some("ragplatform".into()),
            embedder_url: Some("http://localhost:8090".into()),
            vector_store_url: Some("http://localhost:8080".into()),
            vector_store_api_key: None,
            graph_store_uri: None,
            graph_store_user: None,
            graph_store_password: None,
            schema_discovery_timeout: Some(60),
            max_document_size_mb: Some(10),
            chunk_size: Some(1000),
            chunk_overlap: Some(200),
            cors_allowed_origins: Some(Vec::new()),
            use_mcp_tools: Some(true),
            prefer_direct_mcp: Some(true),
            credential_secret: None,
            bind_addr: Some("0.0.0.0:8000".into()),
            providers: HashMap::new(),
        }
    }

    fn merge_from(&mut self, other: FileConfig) {
        macro_rules! take {
            ($field:ident) => {
                if other.$field.is_some() {
                    self.$field = other.$field;
                }
            };
        }
        take!(document_store_uri);
        take!(document_store_database);
        take!(embedder_url);
        take!(vector_store_url);
        take!(vector_store_api_key);
        take!(graph_store_uri);
        take!(graph_store_user);
        take!(graph_store_password);
        take!(schema_discovery_timeout);
        take!(max_document_size_mb);
        take!(chunk_size);
        take!(chunk_overlap);
        take!(cors_allowed_origins);
        take!(use_mcp_tools);
        take!(prefer_direct_mcp);
        take!(credential_secret);
        take!(bind_addr);
        for (id, entry) in other.providers {
            self.providers.insert(id, entry);
        }
    }

    fn apply_env(&mut self) {
        if let Ok(v) = env::var("RAGP_DOCUMENT_STORE_URI") {
            self.document_store_uri = Some(v);
        }
        if let Ok(v) = env::var("RAGP_DOCUMENT_STORE_DATABASE") {
            self.document_store_database = Some(v);
        }
        if let Ok(v) = env::var("RAGP_EMBEDDER_URL") {
            self.embedder_url = Some(v);
        }
        if let Ok(v) = env::var("RAGP_VECTOR_STORE_URL") {
            self.vector_store_url = Some(v);
        }
        if let Ok(v) = env::var("RAGP_VECTOR_STORE_API_KEY") {
            self.vector_store_api_key = Some(v);
        }
        if let Ok(v) = env::var("RAGP_GRAPH_STORE_URI") {
            self.graph_store_uri = Some(v);
        }
        if let Ok(v) = env::var("RAGP_GRAPH_STORE_USER") {
            self.graph_store_user = Some(v);
        }
        if let Ok(v) = env::var("RAGP_GRAPH_STORE_PASSWORD") {
            self.graph_store_password = Some(v);
        }
        if let Ok(v) = env::var("RAGP_SCHEMA_DISCOVERY_TIMEOUT") {
            if let Ok(n) = v.parse() {
                self.schema_discovery_timeout = Some(n);
            }
        }
        if let Ok(v) = env::var("RAGP_MAX_DOCUMENT_SIZE_MB") {
            if let Ok(n) = v.parse() {
                self.max_document_size_mb = Some(n);
            }
        }
        if let Ok(v) = env::var("RAGP_CHUNK_SIZE") {
            if let Ok(n) = v.parse() {
                self.chunk_size = Some(n);
            }
        }
        if let Ok(v) = env::var("RAGP_CHUNK_OVERLAP") {
            if let Ok(n) = v.parse() {
                self.chunk_overlap = Some(n);
            }
        }
        if let Ok(v) = env::var("RAGP_CORS_ALLOWED_ORIGINS") {
            self.cors_allowed_origins = Some(v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect());
        }
        if let Ok(v) = env::var("RAGP_USE_MCP_TOOLS") {
            self.use_mcp_tools = Some(v == "true" || v == "1");
        }
        if let Ok(v) = env::var("RAGP_PREFER_DIRECT_MCP") {
            self.prefer_direct_mcp = Some(v == "true" || v == "1");
        }
        if let Ok(v) = env::var("RAGP_CREDENTIAL_SECRET") {
            self.credential_secret = Some(v);
        }
        if let Ok(v) = env::var("RAGP_BIND_ADDR") {
            self.bind_addr = Some(v);
        }
    }
}

/// Fully composed, validated configuration the server runs with.
#[derive(Debug, Clone)]
pub struct Config {
    pub document_store_uri: String,
    pub document_store_database: String,
    pub embedder_url: String,
    pub vector_store_url: String,
    pub vector_store_api_key: Option<String>,
    pub graph_store_uri: Option<String>,
    pub graph_store_user: Option<String>,
    pub graph_store_password: Option<String>,
    pub schema_discovery_timeout_secs: u64,
    pub max_document_size_mb: u64,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub cors_allowed_origins: Vec<String>,
    pub use_mcp_tools: bool,
    pub prefer_direct_mcp: bool,
    pub credential_secret: String,
    pub bind_addr: String,
    pub providers: HashMap<String, ProviderEntry>,
}

/// Compose configuration: defaults, then `config_path` (explicit or
/// `RAGP_CONFIG`) if present, then `RAGP_*` environment overrides.
pub fn load(config_path: Option<String>) -> Result<Config> {
    let mut file_config = FileConfig::defaults();

    let resolved_path = config_path.or_else(|| env::var("RAGP_CONFIG").ok());
    if let Some(path) = resolved_path {
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| Error::Validation(format!("cannot read config file '{path}': {e}")))?;
        let loaded: FileConfig = toml::from_str(&contents)
            .map_err(|e| Error::Validation(format!("malformed config file '{path}': {e}")))?;
        file_config.merge_from(loaded);
    }

    file_config.apply_env();

    let document_store_uri = file_config
        .document_store_uri
        .ok_or_else(|| Error::Validation("missing required configuration key 'document_store_uri'".into()))?;

    let credential_secret = file_config.credential_secret.unwrap_or_else(|| {
        tracing::warn!("no credential_secret configured, using an insecure development default");
        "development-secret-change-me".to_string()
    });

    Ok(Config {
        document_store_uri,
        document_store_database: file_config.document_store_database.unwrap_or_default(),
        embedder_url: file_config.embedder_url.unwrap_or_default(),
        vector_store_url: file_config.vector_store_url.unwrap_or_default(),
        vector_store_api_key: file_config.vector_store_api_key,
        graph_store_uri: file_config.graph_store_uri,
        graph_store_user: file_config.graph_store_user,
        graph_store_password: file_config.graph_store_password,
        schema_discovery_timeout_secs: file_config.schema_discovery_timeout.unwrap_or(60),
        max_document_size_mb: file_config.max_document_size_mb.unwrap_or(10),
        chunk_size: file_config.chunk_size.unwrap_or(1000),
        chunk_overlap: file_config.chunk_overlap.unwrap_or(200),
        cors_allowed_origins: file_config.cors_allowed_origins.unwrap_or_default(),
        use_mcp_tools: file_config.use_mcp_tools.unwrap_or(true),
        prefer_direct_mcp: file_config.prefer_direct_mcp.unwrap_or(true),
        credential_secret,
        bind_addr: file_config.bind_addr.unwrap_or_else(|| "0.0.0.0:8000".to_string()),
        providers: file_config.providers,
    })
}

/// Load `config.toml` from disk into a [`FileConfig`]-shaped value for test
/// assertions without needing a running process.
#[cfg(test)]
fn parse_toml(contents: &str) -> FileConfig {
    toml::from_str(contents).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_document_store_uri_is_a_validation_error_not_a_panic() {
        std::env::remove_var("RAGP_DOCUMENT_STORE_URI");
        std::env::remove_var("RAGP_CONFIG");
        let err = load(None).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn env_override_wins_over_config_file_default() {
        std::env::set_var("RAGP_DOCUMENT_STORE_URI", "mongodb://env-wins/db");
        let config = load(None).unwrap();
        assert_eq!(config.document_store_uri, "mongodb://env-wins/db");
        std::env::remove_var("RAGP_DOCUMENT_STORE_URI");
    }

    #[test]
    fn provider_table_parses_into_provider_entries() {
        let parsed = parse_toml(
            r#"
            document_store_uri = "mongodb://localhost/db"

            [providers.primary]
            kind = "openai"
            api_key = "sk-test-0000000000000000"
            is_default = true
            "#,
        );
        let entry = parsed.providers.get("primary").unwrap();
        assert_eq!(entry.kind, "openai");
        assert!(entry.is_default);
    }
}
