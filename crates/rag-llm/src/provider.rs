//! Provider registration: the `ProviderKind` alias resolution, config shape,
//! and API-key shape validation run at registration time.

use ragcore::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// The provider families the dispatcher speaks to. Deserializes from and
/// `FromStr`-parses the lowercase string form (`"ollama"`), so a provider
/// tagged either way in configuration resolves to the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    AzureOpenAi,
    Anthropic,
    Google,
    Ollama,
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "azureopenai" | "azure-openai" | "azure_openai" => Ok(ProviderKind::AzureOpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "google" | "gemini" => Ok(ProviderKind::Google),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(Error::Validation(format!("unknown provider kind '{other}'"))),
        }
    }
}

impl ProviderKind {
    pub fn default_rate_limit_per_hour(self) -> u32 {
        match self {
            ProviderKind::OpenAi | ProviderKind::AzureOpenAi | ProviderKind::Anthropic => 100,
            ProviderKind::Google => 60,
            ProviderKind::Ollama => 1000,
        }
    }

    pub fn supports_mcp_natively(self) -> bool {
        matches!(
            self,
            ProviderKind::OpenAi | ProviderKind::AzureOpenAi | ProviderKind::Anthropic
        )
    }

    /// Validate that `api_key` has this provider's expected prefix and
    /// minimum length. Ollama runs unauthenticated, so an empty key passes.
    pub fn validate_api_key(self, api_key: &str) -> Result<()> {
        match self {
            ProviderKind::Ollama => Ok(()),
            ProviderKind::OpenAi | ProviderKind::AzureOpenAi if api_key.starts_with("sk-") => {
                check_min_len(api_key, 20)
            }
            ProviderKind::Anthropic if api_key.starts_with("sk-ant-") => check_min_len(api_key, 20),
            ProviderKind::Google if api_key.starts_with("AIza") => check_min_len(api_key, 20),
            _ => Err(Error::Validation(format!(
                "api key shape does not match provider '{self:?}'"
            ))),
        }
    }
}

fn check_min_len(api_key: &str, min_len: usize) -> Result<()> {
    if api_key.len() < min_len {
        return Err(Error::Validation("api key is shorter than expected".into()));
    }
    Ok(())
}

/// A registered provider instance: one id, one kind, its own credentials
/// and rate-limit cap.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    pub api_key: String,
    pub endpoint: Option<String>,
    pub is_default: bool,
    pub rate_limit_per_hour: u32,
    pub metadata: HashMap<String, String>,
}

impl ProviderConfig {
    pub fn new(id: String, kind: ProviderKind, api_key: String) -> Result<Self> {
        kind.validate_api_key(&api_key)?;
        Ok(ProviderConfig {
            id,
            kind,
            api_key,
            endpoint: None,
            is_default: false,
            rate_limit_per_hour: kind.default_rate_limit_per_hour(),
            metadata: HashMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercase_string_and_enum_resolve_to_the_same_kind() {
        assert_eq!(ProviderKind::from_str("ollama").unwrap(), ProviderKind::Ollama);
        assert_eq!(ProviderKind::from_str("OLLAMA").unwrap(), ProviderKind::Ollama);
    }

    #[test]
    fn openai_key_must_have_sk_prefix_and_min_length() {
        assert!(ProviderConfig::new("p1".into(), ProviderKind::OpenAi, "sk-short".into()).is_err());
        assert!(ProviderConfig::new(
            "p1".into(),
            ProviderKind::OpenAi,
            "sk-aaaaaaaaaaaaaaaaaaaaaaaa".into()
        )
        .is_ok());
    }

    #[test]
    fn ollama_accepts_an_empty_key() {
        assert!(ProviderConfig::new("p1".into(), ProviderKind::Ollama, String::new()).is_ok());
    }

    #[test]
    fn anthropic_requires_its_own_prefix_not_the_bare_openai_one() {
        assert!(ProviderKind::Anthropic
            .validate_api_key("sk-aaaaaaaaaaaaaaaaaaaaaaaa")
            .is_err());
        assert!(ProviderKind::Anthropic
            .validate_api_key("sk-ant-REDACTED")
            .is_ok());
    }
}
