//! Canonical error kinds shared by every service in the platform.
//!
//! Adapters (database drivers, HTTP clients, store backends) translate
//! backend-specific failures into one of these kinds at the earliest point
//! they cross into core code. Nothing downstream of an adapter should ever
//! see a foreign error type.

use serde::Serialize;

/// Platform-wide error type.
///
/// Each variant carries only what a caller needs to react (an id, a message)
/// — never raw credentials or provider payloads.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed input or a violated precondition.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation conflicts with existing state (duplicate, wrong state).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The requested capability (db type, tool name, provider) is not registered.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// An explicit deadline elapsed before the operation completed.
    #[error("timed out: {0}")]
    Timeout(String),

    /// A sibling service returned a server error or could not be reached.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// The caller exceeded a rate limit; `retry_after_secs` is a hint.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the caller is expected to be able to retry.
        retry_after_secs: u64,
    },

    /// An invariant was violated that should never happen in correct code.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The HTTP status code this kind maps to at the service boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::NotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::Unsupported(_) => 422,
            Error::Timeout(_) => 504,
            Error::Upstream(_) => 502,
            Error::RateLimited { .. } => 429,
            Error::Internal(_) => 500,
        }
    }

    /// A short machine-readable tag for the kind, used in JSON error bodies.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::Unsupported(_) => "unsupported",
            Error::Timeout(_) => "timeout",
            Error::Upstream(_) => "upstream",
            Error::RateLimited { .. } => "rate_limited",
            Error::Internal(_) => "internal",
        }
    }

    /// Whether this failure is transient and worth retrying (message
    /// contains any of timeout/connection/unavailable/temporary).
    pub fn is_transient(&self) -> bool {
        const MARKERS: [&str; 4] = ["timeout", "connection", "unavailable", "temporary"];
        let text = self.to_string().to_lowercase();
        matches!(self, Error::Timeout(_)) || MARKERS.iter().any(|m| text.contains(m))
    }
}

/// JSON error body returned by every HTTP endpoint on failure.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error kind tag.
    pub error: &'static str,
    /// Short human sentence describing the failure.
    pub message: String,
    /// The offending entity id, when the error names one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        ErrorBody {
            error: err.kind_tag(),
            message: err.to_string(),
            id: None,
        }
    }
}

/// Platform-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification_detects_known_markers() {
        assert!(Error::Upstream("connection refused".into()).is_transient());
        assert!(Error::Upstream("temporary failure in name resolution".into()).is_transient());
        assert!(Error::Timeout("deadline exceeded".into()).is_transient());
        assert!(!Error::Validation("bad field".into()).is_transient());
    }

    #[test]
    fn status_codes_map_each_error_kind() {
        assert_eq!(Error::Validation("x".into()).status_code(), 400);
        assert_eq!(Error::NotFound("x".into()).status_code(), 404);
        assert_eq!(Error::Conflict("x".into()).status_code(), 409);
        assert_eq!(Error::Unsupported("x".into()).status_code(), 422);
        assert_eq!(
            Error::RateLimited {
                retry_after_secs: 5
            }
            .status_code(),
            429
        );
        assert_eq!(Error::Upstream("x".into()).status_code(), 502);
        assert_eq!(Error::Internal("x".into()).status_code(), 500);
    }
}
