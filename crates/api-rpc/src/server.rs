//! JSON-RPC Server
//!
//! Serves the engine over TCP on localhost; anything public-facing sits
//! behind a reverse proxy that terminates auth.

use std::sync::Arc;

use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use tracing::info;

use corpora_core::port::{EngineStore, TimeProvider, TransactionalStore};

use crate::handler::RpcHandler;
use crate::types::{
    AnnotationsParams, CreateJobParams, DebriefingParams, GetUnitParams, PostAnnotationParams,
    ProgressParams,
};

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 8754;

/// RPC Server Configuration
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(
        config: RpcServerConfig,
        store: Arc<dyn EngineStore>,
        tx_store: Arc<dyn TransactionalStore>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(store, tx_store, time_provider)),
        }
    }

    /// Start the JSON-RPC server
    pub async fn start(self) -> Result<ServerHandle, String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!(
            host = %self.config.host,
            port = %self.config.port,
            "Starting JSON-RPC server"
        );

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;

        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("job.create.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: CreateJobParams = params.parse()?;
                    handler.create_job(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("unit.get.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: GetUnitParams = params.parse()?;
                    handler.get_unit(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("annotation.post.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: PostAnnotationParams = params.parse()?;
                    handler.post_annotation(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("job.progress.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: ProgressParams = params.parse()?;
                    handler.progress(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("job.debriefing.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: DebriefingParams = params.parse()?;
                    handler.debriefing(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("job.annotations.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: AnnotationsParams = params.parse()?;
                    handler.annotations(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        info!("JSON-RPC server started successfully");

        let handle = server.start(module);
        Ok(handle)
    }
}
