// Read-side store port, used outside of transactions (identity lookups and
// researcher exports). Everything on the serve/submit/bind paths goes
// through the transaction port instead.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::{AnnotationStatus, AnnotationValue, CodingJob, Unit, User};
use crate::error::Result;

/// One row of the researcher-facing annotation export.
#[derive(Debug, Clone, Serialize)]
pub struct AnnotationExport {
    pub jobset: String,
    /// The uploader-chosen unit id.
    pub unit_id: String,
    pub coder: String,
    pub annotation: Vec<AnnotationValue>,
    pub status: AnnotationStatus,
}

#[async_trait]
pub trait EngineStore: Send + Sync {
    /// Find user by id
    async fn user(&self, id: i64) -> Result<Option<User>>;

    /// Find user by email
    async fn user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Find coding job by id
    async fn job(&self, id: i64) -> Result<Option<CodingJob>>;

    /// Find unit by id
    async fn unit(&self, id: i64) -> Result<Option<Unit>>;

    /// All annotations of a job, for analysis
    async fn job_annotations(&self, job_id: i64) -> Result<Vec<AnnotationExport>>;
}
