//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use corpora_core::application::create_job::CreateJobRequest;
use corpora_core::domain::{AnnotationStatus, AnnotationValue, Evaluation};

/// job.create.v1 - Create a coding job
#[derive(Debug, Deserialize)]
pub struct CreateJobParams {
    pub admin_id: i64,
    pub job: CreateJobRequest,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateJobResponse {
    pub id: i64,
}

/// unit.get.v1 - Serve the next unit, or a specific ordinal
#[derive(Debug, Deserialize)]
pub struct GetUnitParams {
    pub job_id: i64,
    pub coder_id: i64,
    #[serde(default)]
    pub index: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetUnitResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<Value>,
    pub index: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<Vec<AnnotationValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AnnotationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<Evaluation>,
}

/// annotation.post.v1 - Submit an annotation for a served unit
#[derive(Debug, Deserialize)]
pub struct PostAnnotationParams {
    pub job_id: i64,
    pub unit_id: i64,
    pub coder_id: i64,
    pub annotation: Vec<AnnotationValue>,
    pub status: String,
}

/// job.progress.v1 - Progress report for (job, coder)
#[derive(Debug, Deserialize)]
pub struct ProgressParams {
    pub job_id: i64,
    pub coder_id: i64,
}

/// job.debriefing.v1 - Debriefing once the job is finished
#[derive(Debug, Deserialize)]
pub struct DebriefingParams {
    pub job_id: i64,
    pub coder_id: i64,
}

/// job.annotations.v1 - Researcher export of all annotations of a job
#[derive(Debug, Deserialize)]
pub struct AnnotationsParams {
    pub admin_id: i64,
    pub job_id: i64,
}
