//! Connection entity — credentials for a target database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of target database a [`Connection`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Postgresql,
    Mysql,
    Mongodb,
    Weaviate,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionType::Postgresql => "postgresql",
            ConnectionType::Mysql => "mysql",
            ConnectionType::Mongodb => "mongodb",
            ConnectionType::Weaviate => "weaviate",
        };
        f.write_str(s)
    }
}

impl FromStr for ConnectionType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(ConnectionType::Postgresql),
            "mysql" => Ok(ConnectionType::Mysql),
            "mongodb" | "mongo" => Ok(ConnectionType::Mongodb),
            "weaviate" => Ok(ConnectionType::Weaviate),
            other => Err(crate::Error::Unsupported(format!(
                "unknown connection type '{other}'"
            ))),
        }
    }
}

/// Derived health of a [`Connection`], refreshed by `test()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Active,
    Error,
    Unknown,
}

/// A stored connection to a target database.
///
/// Invariant: `password_ciphertext` is always ciphertext under the service's
/// key, and is never serialized back out on a read path — see
/// [`Connection::redacted`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ConnectionType,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    /// AES-GCM ciphertext (nonce || tag || bytes), base64-encoded. Never
    /// included in any read-path response.
    #[serde(skip_serializing)]
    pub password_ciphertext: String,
    pub ssl: bool,
    pub status: ConnectionStatus,
    pub last_checked: Option<DateTime<Utc>>,
}

impl Connection {
    /// A copy of this connection with the ciphertext field cleared, for
    /// callers who serialize the struct wholesale (e.g. for debugging) but
    /// must still uphold the no-credential-echo invariant.
    pub fn redacted(&self) -> Connection {
        Connection {
            password_ciphertext: String::new(),
            ..self.clone()
        }
    }
}

/// Request body to create a [`Connection`] — carries the plaintext password,
/// which the registry encrypts before persisting.
#[derive(Debug, Clone, Deserialize)]
pub struct NewConnection {
    #[serde(rename = "type")]
    pub kind: ConnectionType,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub ssl: bool,
}

/// Outcome of [`crate::ports::ConnectionDriver::test`].
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionTestResult {
    pub status: ConnectionStatus,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_type_aliases_ollama_style_lowercase_strings() {
        assert_eq!(
            ConnectionType::from_str("postgres").unwrap(),
            ConnectionType::Postgresql
        );
        assert_eq!(
            ConnectionType::from_str("POSTGRESQL").unwrap(),
            ConnectionType::Postgresql
        );
        assert!(ConnectionType::from_str("oracle").is_err());
    }

    #[test]
    fn redacted_clears_ciphertext() {
        let c = Connection {
            id: "c1".into(),
            kind: ConnectionType::Postgresql,
            host: "db".into(),
            port: 5432,
            database: "x".into(),
            username: "u".into(),
            password_ciphertext: "secret-cipher".into(),
            ssl: false,
            status: ConnectionStatus::Unknown,
            last_checked: None,
        };
        assert_eq!(c.redacted().password_ciphertext, "");
    }

    #[test]
    fn serialization_never_includes_password_field() {
        let c = Connection {
            id: "c1".into(),
            kind: ConnectionType::Postgresql,
            host: "db".into(),
            port: 5432,
            database: "x".into(),
            username: "u".into(),
            password_ciphertext: "secret-cipher".into(),
            ssl: false,
            status: ConnectionStatus::Unknown,
            last_checked: None,
        };
        let json = serde_json::to_string(&c).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("secret-cipher"));
    }
}
