//! RPC Method Handlers
//!
//! Bridges the JSON-RPC methods to the engine's application services.

use std::sync::Arc;

use jsonrpsee::types::ErrorObjectOwned;
use tracing::debug;

use corpora_core::application::{annotate, create_job, debriefing, progress, unit_server};
use corpora_core::domain::{AnnotationStatus, User};
use corpora_core::error::AppError;
use corpora_core::port::{AnnotationExport, EngineStore, TimeProvider, TransactionalStore};

use crate::error::to_rpc_error;
use crate::types::{
    AnnotationsParams, CreateJobParams, CreateJobResponse, DebriefingParams, GetUnitParams,
    GetUnitResponse, PostAnnotationParams, ProgressParams,
};

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    store: Arc<dyn EngineStore>,
    tx_store: Arc<dyn TransactionalStore>,
    time_provider: Arc<dyn TimeProvider>,
}

impl RpcHandler {
    pub fn new(
        store: Arc<dyn EngineStore>,
        tx_store: Arc<dyn TransactionalStore>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            store,
            tx_store,
            time_provider,
        }
    }

    async fn require_user(&self, id: i64) -> Result<User, ErrorObjectOwned> {
        self.store
            .user(id)
            .await
            .map_err(to_rpc_error)?
            .ok_or_else(|| to_rpc_error(AppError::NotFound(format!("user {id}"))))
    }

    /// job.create.v1
    pub async fn create_job(
        &self,
        params: CreateJobParams,
    ) -> Result<CreateJobResponse, ErrorObjectOwned> {
        let creator = self.require_user(params.admin_id).await?;
        let id = create_job::create_job(
            self.tx_store.as_ref(),
            self.time_provider.as_ref(),
            &creator,
            params.job,
        )
        .await
        .map_err(to_rpc_error)?;
        Ok(CreateJobResponse { id })
    }

    /// unit.get.v1
    pub async fn get_unit(
        &self,
        params: GetUnitParams,
    ) -> Result<GetUnitResponse, ErrorObjectOwned> {
        let coder = self.require_user(params.coder_id).await?;
        let served = unit_server::serve_unit(
            self.tx_store.as_ref(),
            self.time_provider.as_ref(),
            params.job_id,
            &coder,
            params.index,
        )
        .await
        .map_err(to_rpc_error)?;

        debug!(
            job_id = params.job_id,
            coder_id = params.coder_id,
            index = served.index,
            unit = ?served.unit.as_ref().map(|u| u.id),
            "unit served"
        );

        Ok(GetUnitResponse {
            id: served.unit.as_ref().map(|u| u.id),
            unit: served.unit.map(|u| u.content),
            index: served.index,
            annotation: served.annotation,
            status: served.status,
            report: served.report,
        })
    }

    /// annotation.post.v1
    pub async fn post_annotation(
        &self,
        params: PostAnnotationParams,
    ) -> Result<annotate::AnnotationReport, ErrorObjectOwned> {
        let coder = self.require_user(params.coder_id).await?;
        let status: AnnotationStatus = params
            .status
            .parse()
            .map_err(|e: corpora_core::domain::DomainError| to_rpc_error(AppError::Domain(e)))?;

        annotate::submit_annotation(
            self.tx_store.as_ref(),
            self.time_provider.as_ref(),
            params.job_id,
            params.unit_id,
            &coder,
            params.annotation,
            status,
        )
        .await
        .map_err(to_rpc_error)
    }

    /// job.progress.v1
    pub async fn progress(
        &self,
        params: ProgressParams,
    ) -> Result<progress::Progress, ErrorObjectOwned> {
        let coder = self.require_user(params.coder_id).await?;
        progress::get_progress(self.tx_store.as_ref(), params.job_id, &coder)
            .await
            .map_err(to_rpc_error)
    }

    /// job.debriefing.v1
    pub async fn debriefing(
        &self,
        params: DebriefingParams,
    ) -> Result<serde_json::Value, ErrorObjectOwned> {
        let coder = self.require_user(params.coder_id).await?;
        debriefing::get_debriefing(self.tx_store.as_ref(), params.job_id, &coder)
            .await
            .map_err(to_rpc_error)
    }

    /// job.annotations.v1
    pub async fn annotations(
        &self,
        params: AnnotationsParams,
    ) -> Result<Vec<AnnotationExport>, ErrorObjectOwned> {
        let admin = self.require_user(params.admin_id).await?;
        if !admin.is_admin {
            return Err(to_rpc_error(AppError::AuthorizationDenied(
                "only admins can export annotations".to_string(),
            )));
        }
        if self
            .store
            .job(params.job_id)
            .await
            .map_err(to_rpc_error)?
            .is_none()
        {
            return Err(to_rpc_error(AppError::NotFound(format!(
                "coding job {}",
                params.job_id
            ))));
        }
        self.store
            .job_annotations(params.job_id)
            .await
            .map_err(to_rpc_error)
    }
}
