//! Provider-neutral LLM dispatch: registration, rate limiting, MCP
//! pass-through, and retry over a tagged set of provider kinds.

pub mod dispatcher;
pub mod provider;
pub mod rate_limit;

pub use dispatcher::{GenerationRequest, GenerationResponse, LlmDispatcher};
pub use provider::{ProviderConfig, ProviderKind};
pub use rate_limit::RateLimiter;
