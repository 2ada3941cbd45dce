//! The MCP Context Runtime: context registry, tool dispatch, HTTP
//! transport, and the embedded/HTTP client duality.

pub mod client;
pub mod http;
pub mod registry;
pub mod tools;

pub use client::{EmbeddedMcpClient, HttpMcpClient, McpClient, Tagged};
pub use http::{router, McpHttpState};
pub use registry::ContextRegistry;
pub use tools::{EmbeddingType, FindRelevantRequest, FindRelevantResponse, StoreDocumentAck, StoreDocumentRequest, ToolRuntime};
