//! Corpora Annotation Engine - Main Entry Point
//!
//! Composition root: wires the SQLite store and the clock into the JSON-RPC
//! server and runs until interrupted.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use corpora_api_rpc::server::RpcServerConfig;
use corpora_api_rpc::RpcServer;
use corpora_core::port::SystemTimeProvider;
use corpora_infra_sqlite::{create_pool, run_migrations, SqliteEngineStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_DB_PATH: &str = "corpora.db";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let log_format = std::env::var("CORPORA_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .expect("Failed to create env filter");

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            // Development: pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("Corpora Annotation Engine v{} starting...", VERSION);

    // 2. Load configuration
    let db_path =
        std::env::var("CORPORA_DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());

    let rpc_host =
        std::env::var("CORPORA_RPC_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let rpc_port: u16 = std::env::var("CORPORA_RPC_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8754);

    info!(db_path = %db_path, "Initializing database...");

    // 3. Initialize database
    let pool = create_pool(&db_path)
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. Setup dependencies (DI wiring)
    let store = Arc::new(SqliteEngineStore::new(pool));
    let time_provider = Arc::new(SystemTimeProvider);

    // 5. Start the RPC server
    let server = RpcServer::new(
        RpcServerConfig {
            host: rpc_host,
            port: rpc_port,
        },
        store.clone(),
        store,
        time_provider,
    );
    let handle = server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server failed to start: {}", e))?;

    info!("Corpora is ready to serve units");

    // 6. Run until interrupted
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping...");

    handle.stop().map_err(|e| anyhow::anyhow!("{e}"))?;
    handle.stopped().await;

    info!("Bye");
    Ok(())
}
