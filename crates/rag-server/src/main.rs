// Panicking on startup failures is acceptable here: this is a launcher
// binary, not library code, and a bad config should fail loudly on boot.
#![allow(clippy::expect_used, clippy::unwrap_used)]
#![allow(clippy::clone_on_ref_ptr)]

//! CLI launcher: loads configuration, wires every store and service, and
//! serves the HTTP surface.

mod agents;
mod config;
mod http;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use rag_connections::{ConnectionRegistry, MongoDocumentStore};
use rag_graph::Neo4jGraphStore;
use rag_llm::{LlmDispatcher, ProviderConfig, ProviderKind};
use rag_mcp::{ContextRegistry, ToolRuntime};
use rag_orchestrator::{HttpEmbedder, HttpVectorStore, Orchestrator};
use rag_planner::GraphRagPlanner;
use ragcore::{DocumentStore, GraphStore, VectorStore};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "rag-server", author, version = env!("CARGO_PKG_VERSION"), about = "HTTP surface for the RAG platform", long_about = None)]
struct Cli {
    /// Path to a config.toml; falls back to RAGP_CONFIG, then built-in defaults.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load(cli.config).context("failed to load configuration")?;

    let document_store: Arc<dyn DocumentStore> =
        Arc::new(MongoDocumentStore::connect(&config.document_store_uri, &config.document_store_database).await?);

    let embedder = Arc::new(HttpEmbedder::new(config.embedder_url.clone()));
    let vector_store: Arc<dyn VectorStore> = Arc::new(HttpVectorStore::new(
        config.vector_store_url.clone(),
        config.vector_store_api_key.clone(),
        embedder.clone(),
    ));

    let graph_store: Option<Arc<dyn GraphStore>> = match &config.graph_store_uri {
        Some(uri) => {
            let user = config.graph_store_user.as_deref().unwrap_or("neo4j");
            let password = config.graph_store_password.as_deref().unwrap_or_default();
            match Neo4jGraphStore::connect(uri, user, password).await {
                Ok(store) => Some(Arc::new(store) as Arc<dyn GraphStore>),
                Err(e) => {
                    warn!(error = %e, "graph backend configured but unreachable, running without it");
                    None
                }
            }
        }
        None => {
            info!("no graph_store_uri configured, running vector-only");
            None
        }
    };

    let connections = Arc::new(ConnectionRegistry::new(
        document_store.clone(),
        &config.credential_secret,
        Duration::from_secs(30),
    ));

    let orchestrator = Orchestrator::new(
        document_store.clone(),
        connections.clone(),
        graph_store.clone(),
        vector_store.clone(),
        embedder.clone(),
        Duration::from_secs(config.schema_discovery_timeout_secs),
    );

    let llm = Arc::new(LlmDispatcher::new());
    for (id, entry) in &config.providers {
        let kind = match ProviderKind::from_str(&entry.kind) {
            Ok(k) => k,
            Err(e) => {
                warn!(provider_id = %id, error = %e, "skipping provider with unknown kind");
                continue;
            }
        };
        match ProviderConfig::new(id.clone(), kind, entry.api_key.clone()) {
            Ok(mut provider) => {
                provider.endpoint = entry.endpoint.clone();
                provider.is_default = entry.is_default;
                llm.register_provider(provider);
            }
            Err(e) => warn!(provider_id = %id, error = %e, "skipping provider with invalid credentials"),
        }
    }

    let contexts = Arc::new(ContextRegistry::new());
    let tools = Arc::new(ToolRuntime::new(vector_store.clone()));
    let agents = Arc::new(agents::AgentRegistry::new(document_store.clone()));

    let area_lookup_contexts = contexts.clone();
    let area_connection_lookup = Arc::new(move |area_id: &str| {
        area_lookup_contexts
            .get(area_id)
            .and_then(|ctx| ctx.metadata.get("connection_id").cloned())
    });

    let planner = Arc::new(
        GraphRagPlanner::new(
            llm.clone(),
            vector_store.clone(),
            graph_store.clone(),
            Some(document_store.clone()),
            area_connection_lookup,
        )
        .context("failed to build the query planning graph")?,
    );

    let state = http::AppState {
        config: Arc::new(config.clone()),
        connections,
        agents,
        orchestrator: orchestrator.clone(),
        graph_store,
        planner,
        history_store: document_store,
        contexts,
        tools,
    };

    let janitor_orchestrator = orchestrator.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            janitor_orchestrator.run_janitor();
            metrics::set_active_jobs(janitor_orchestrator.active_job_count() as i64);
        }
    });

    let app = http::router(state);
    let addr: SocketAddr = config.bind_addr.parse().context("invalid bind_addr")?;
    let listener = tokio::net::TcpListener::bind(addr).await.context("failed to bind listener")?;
    info!(%addr, "rag-server listening");

    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    orchestrator.shutdown();
    if let Err(e) = serve_result {
        error!(error = %e, "server exited with an error");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
