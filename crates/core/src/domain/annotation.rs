// Annotation entity: one row per (unit, coder), created the first time a
// unit is served and mutated in place on every submission.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnnotationStatus {
    InProgress,
    Done,
    Retry,
}

impl fmt::Display for AnnotationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationStatus::InProgress => write!(f, "IN_PROGRESS"),
            AnnotationStatus::Done => write!(f, "DONE"),
            AnnotationStatus::Retry => write!(f, "RETRY"),
        }
    }
}

impl FromStr for AnnotationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_PROGRESS" => Ok(AnnotationStatus::InProgress),
            "DONE" => Ok(AnnotationStatus::Done),
            "RETRY" => Ok(AnnotationStatus::Retry),
            other => Err(DomainError::InvalidStatus(other.to_string())),
        }
    }
}

/// One tagged value of an annotation payload. `field`/`offset`/`length`
/// locate span annotations; question answers carry only variable + value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationValue {
    pub variable: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<i64>,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub id: i64,
    pub codingjob_id: i64,
    pub unit_id: i64,
    pub coder_id: i64,
    pub jobset_id: i64,
    /// Coder-specific ordinal at which this unit was served.
    pub unit_index: i64,
    pub status: AnnotationStatus,
    pub modified: i64, // epoch ms
    pub annotation: Vec<AnnotationValue>,
    /// Damage attributed to this annotation by the conditional evaluator.
    pub damage: f64,
    pub report: Option<Value>,
}

impl Annotation {
    /// Fresh IN_PROGRESS row written when a unit is served for the first
    /// time. The `(unit_id, coder_id)` uniqueness of this row is what makes
    /// concurrent serves safe.
    pub fn reserve(
        codingjob_id: i64,
        unit_id: i64,
        coder_id: i64,
        jobset_id: i64,
        unit_index: i64,
        now_millis: i64,
    ) -> Self {
        Self {
            id: 0,
            codingjob_id,
            unit_id,
            coder_id,
            jobset_id,
            unit_index,
            status: AnnotationStatus::InProgress,
            modified: now_millis,
            annotation: Vec::new(),
            damage: 0.0,
            report: None,
        }
    }
}
