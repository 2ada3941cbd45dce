//! Connection CRUD and the `test`/`execute_query` operations.

use async_trait::async_trait;
use chrono::Utc;
use ragcore::{
    Connection, ConnectionStatus, ConnectionTestResult, ConnectionType, DocumentStore, Error,
    NewConnection, Result,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::crypto::CredentialCipher;
use crate::drivers::{ConnectionDriver, DiscoveryOptions, MongoDriver, MySqlDriver, PostgresDriver, QueryParams, WeaviateDriver};
use crate::security::{self, StatementClass};

const CONNECTIONS_COLLECTION: &str = "connections";

/// Resolves credentials and drives the type-specific connector behind a
/// uniform CRUD + test/execute surface.
pub struct ConnectionRegistry {
    store: Arc<dyn DocumentStore>,
    cipher: CredentialCipher,
    drivers: HashMap<ConnectionType, Arc<dyn ConnectionDriver>>,
    default_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new(store: Arc<dyn DocumentStore>, secret: &str, default_timeout: Duration) -> Self {
        let mut drivers: HashMap<ConnectionType, Arc<dyn ConnectionDriver>> = HashMap::new();
        drivers.insert(ConnectionType::Postgresql, Arc::new(PostgresDriver::new()));
        drivers.insert(ConnectionType::Mysql, Arc::new(MySqlDriver::new()));
        drivers.insert(ConnectionType::Mongodb, Arc::new(MongoDriver::new()));
        drivers.insert(ConnectionType::Weaviate, Arc::new(WeaviateDriver::new()));
        ConnectionRegistry {
            store,
            cipher: CredentialCipher::from_secret(secret),
            drivers,
            default_timeout,
        }
    }

    fn driver_for(&self, kind: ConnectionType) -> Result<Arc<dyn ConnectionDriver>> {
        self.drivers
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::Unsupported(format!("no driver registered for '{kind}'")))
    }

    fn dsn_for(&self, conn: &Connection, password: &str) -> String {
        match conn.kind {
            ConnectionType::Postgresql => format!(
                "postgres://{}:{}@{}:{}/{}{}",
                conn.username,
                password,
                conn.host,
                conn.port,
                conn.database,
                if conn.ssl { "?sslmode=require" } else { "" }
            ),
            ConnectionType::Mysql => format!(
                "mysql://{}:{}@{}:{}/{}",
                conn.username, password, conn.host, conn.port, conn.database
            ),
            ConnectionType::Mongodb => format!(
                "mongodb://{}:{}@{}:{}/{}",
                conn.username, password, conn.host, conn.port, conn.database
            ),
            ConnectionType::Weaviate => format!("http://{}:{}", conn.host, conn.port),
        }
    }

    pub async fn create(&self, new: NewConnection) -> Result<Connection> {
        let ciphertext = self.cipher.encrypt(&new.password)?;
        let conn = Connection {
            id: Uuid::new_v4().to_string(),
            kind: new.kind,
            host: new.host,
            port: new.port,
            database: new.database,
            username: new.username,
            password_ciphertext: ciphertext,
            ssl: new.ssl,
            status: ConnectionStatus::Unknown,
            last_checked: None,
        };
        self.persist(&conn).await?;
        Ok(conn.redacted())
    }

    async fn persist(&self, conn: &Connection) -> Result<()> {
        let value = serde_json::to_value(conn).map_err(|e| Error::Internal(e.to_string()))?;
        self.store.upsert(CONNECTIONS_COLLECTION, &conn.id, value).await
    }

    async fn load(&self, connection_id: &str) -> Result<Connection> {
        let doc = self
            .store
            .get(CONNECTIONS_COLLECTION, connection_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("connection '{connection_id}' not found")))?;
        serde_json::from_value(doc).map_err(|e| Error::Internal(e.to_string()))
    }

    pub async fn get(&self, connection_id: &str) -> Result<Connection> {
        Ok(self.load(connection_id).await?.redacted())
    }

    pub async fn list(&self) -> Result<Vec<Connection>> {
        let docs = self.store.list(CONNECTIONS_COLLECTION).await?;
        docs.into_iter()
            .map(|d| {
                serde_json::from_value::<Connection>(d)
                    .map(|c| c.redacted())
                    .map_err(|e| Error::Internal(e.to_string()))
            })
            .collect()
    }

    pub async fn update(&self, connection_id: &str, new: NewConnection) -> Result<Connection> {
        let mut existing = self.load(connection_id).await?;
        existing.kind = new.kind;
        existing.host = new.host;
        existing.port = new.port;
        existing.database = new.database;
        existing.username = new.username;
        existing.ssl = new.ssl;
        if !new.password.is_empty() {
            existing.password_ciphertext = self.cipher.encrypt(&new.password)?;
        }
        self.persist(&existing).await?;
        Ok(existing.redacted())
    }

    pub async fn delete(&self, connection_id: &str) -> Result<()> {
        self.store.delete(CONNECTIONS_COLLECTION, connection_id).await
    }

    /// Resolve credentials, invoke the driver's `test`, and persist
    /// `status`/`last_checked` from both the `Ok` and `Err` arms before
    /// re-propagating any failure.
    pub async fn test(&self, connection_id: &str) -> Result<ConnectionTestResult> {
        let mut conn = self.load(connection_id).await?;
        let password = self.cipher.decrypt(&conn.password_ciphertext)?;
        let driver = self.driver_for(conn.kind)?;
        let dsn = self.dsn_for(&conn, &password);

        let outcome = driver.test(connection_id, &dsn).await;
        let result = match &outcome {
            Ok(r) => r.clone(),
            Err(e) => ConnectionTestResult {
                status: ConnectionStatus::Error,
                elapsed_ms: 0,
                error: Some(e.to_string()),
            },
        };
        conn.status = result.status;
        conn.last_checked = Some(Utc::now());
        self.persist(&conn).await?;

        outcome
    }

    /// Execute a statement after Security classification, bounded by
    /// `timeout` (or the registry default). Exactly one of `params`
    /// (positional) or `named` should be populated; the driver rewrites
    /// named placeholders to the target dialect's positional syntax.
    pub async fn execute_query(
        &self,
        connection_id: &str,
        statement: &str,
        params: Vec<Value>,
        named: HashMap<String, Value>,
        timeout: Option<Duration>,
        permitted: &[StatementClass],
    ) -> Result<(Value, u64)> {
        security::validate(statement, permitted)?;
        let conn = self.load(connection_id).await?;
        let password = self.cipher.decrypt(&conn.password_ciphertext)?;
        let driver = self.driver_for(conn.kind)?;
        let dsn = self.dsn_for(&conn, &password);
        driver
            .execute_query(
                connection_id,
                &dsn,
                statement,
                QueryParams {
                    params,
                    named,
                    timeout: Some(timeout.unwrap_or(self.default_timeout)),
                },
            )
            .await
    }

    /// Drive the type-specific connector's schema extraction, used by the
    /// orchestrator rather than called directly over HTTP.
    pub async fn get_schema(
        &self,
        connection_id: &str,
        options: DiscoveryOptions,
    ) -> Result<ragcore::Schema> {
        let conn = self.load(connection_id).await?;
        let password = self.cipher.decrypt(&conn.password_ciphertext)?;
        let driver = self.driver_for(conn.kind)?;
        let dsn = self.dsn_for(&conn, &password);
        driver.get_schema(connection_id, &dsn, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct InMemoryStore {
        data: Mutex<HashMap<(String, String), Value>>,
    }

    #[async_trait]
    impl DocumentStore for InMemoryStore {
        async fn upsert(&self, collection: &str, id: &str, document: Value) -> Result<()> {
            self.data
                .lock()
                .await
                .insert((collection.to_string(), id.to_string()), document);
            Ok(())
        }

        async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
            Ok(self
                .data
                .lock()
                .await
                .get(&(collection.to_string(), id.to_string()))
                .cloned())
        }

        async fn find_one_by_field(
            &self,
            collection: &str,
            field: &str,
            value: &str,
        ) -> Result<Option<Value>> {
            let data = self.data.lock().await;
            Ok(data
                .iter()
                .filter(|((c, _), _)| c == collection)
                .map(|(_, v)| v)
                .find(|v| v.get(field).and_then(Value::as_str) == Some(value))
                .cloned())
        }

        async fn list(&self, collection: &str) -> Result<Vec<Value>> {
            let data = self.data.lock().await;
            Ok(data
                .iter()
                .filter(|((c, _), _)| c == collection)
                .map(|(_, v)| v.clone())
                .collect())
        }

        async fn delete(&self, collection: &str, id: &str) -> Result<()> {
            self.data
                .lock()
                .await
                .remove(&(collection.to_string(), id.to_string()));
            Ok(())
        }
    }

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::new(
            Arc::new(InMemoryStore::default()),
            "test-secret",
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn create_then_get_never_echoes_password() {
        let registry = registry();
        let created = registry
            .create(NewConnection {
                kind: ConnectionType::Postgresql,
                host: "db".into(),
                port: 5432,
                database: "x".into(),
                username: "u".into(),
                password: "p".into(),
                ssl: false,
            })
            .await
            .unwrap();
        let fetched = registry.get(&created.id).await.unwrap();
        assert_eq!(fetched.password_ciphertext, "");
        let json = serde_json::to_string(&fetched).unwrap();
        assert!(!json.contains("\"p\""));
    }

    #[tokio::test]
    async fn list_redacts_every_connection() {
        let registry = registry();
        registry
            .create(NewConnection {
                kind: ConnectionType::Mysql,
                host: "db".into(),
                port: 3306,
                database: "x".into(),
                username: "u".into(),
                password: "p".into(),
                ssl: false,
            })
            .await
            .unwrap();
        let all = registry.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].password_ciphertext, "");
    }

    #[tokio::test]
    async fn execute_query_rejects_statement_outside_permitted_classes() {
        let registry = registry();
        let created = registry
            .create(NewConnection {
                kind: ConnectionType::Postgresql,
                host: "db".into(),
                port: 5432,
                database: "x".into(),
                username: "u".into(),
                password: "p".into(),
                ssl: false,
            })
            .await
            .unwrap();
        let err = registry
            .execute_query(
                &created.id,
                "DELETE FROM orders",
                vec![],
                HashMap::new(),
                None,
                &[StatementClass::Read],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
