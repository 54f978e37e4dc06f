// Annotation submission: stores the coder's answer, runs the conditional
// checks, and settles the damage bookkeeping - all in one transaction.

use serde::Serialize;
use tracing::debug;

use crate::domain::{conditional, AnnotationStatus, AnnotationValue, Evaluation, FeedbackAction, User};
use crate::error::{AppError, Result};
use crate::port::{TimeProvider, TransactionalStore};

/// Damage summary for the coder, only populated when the jobset shows
/// damage to coders.
#[derive(Debug, Clone, Serialize)]
pub struct DamageReport {
    pub damage: f64,
    pub total_damage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_damage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_over: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnotationReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub damage: Option<DamageReport>,
    pub evaluation: Evaluation,
}

/// Apply a submitted annotation for (job, unit, coder).
///
/// The unit must have been served to this coder before (the serve path
/// creates the row); submissions for unknown rows are rejected. A retry or
/// block verdict from the conditionals overrides the submitted status with
/// RETRY, so the scheduler keeps re-serving the unit.
pub async fn submit_annotation(
    store: &dyn TransactionalStore,
    time: &dyn TimeProvider,
    job_id: i64,
    unit_id: i64,
    coder: &User,
    payload: Vec<AnnotationValue>,
    status: AnnotationStatus,
) -> Result<AnnotationReport> {
    if status == AnnotationStatus::Retry {
        return Err(AppError::BadRequest(
            "status has to be 'DONE' or 'IN_PROGRESS'".to_string(),
        ));
    }

    let mut tx = store.begin().await?;

    let job = tx
        .job(job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("coding job {job_id}")))?;
    if job.archived {
        return Err(AppError::AuthorizationDenied(
            "coding job is archived".to_string(),
        ));
    }

    let unit = tx
        .unit(unit_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("unit {unit_id}")))?;
    if unit.codingjob_id != job_id {
        return Err(AppError::NotFound(format!(
            "unit {unit_id} does not belong to job {job_id}"
        )));
    }

    let mut annotation = tx.annotation(unit_id, coder.id).await?.ok_or_else(|| {
        AppError::NotFound(format!(
            "unit {unit_id} was never served to coder {}",
            coder.id
        ))
    })?;

    let jobset = tx.jobset(annotation.jobset_id).await?.ok_or_else(|| {
        AppError::Internal(format!(
            "annotation {} references missing jobset",
            annotation.id
        ))
    })?;
    let rules = &jobset.rules;

    let (damage_delta, evaluation) = match &unit.conditionals {
        Some(conditionals) => conditional::evaluate(
            unit.unit_type,
            conditionals,
            &payload,
            status == AnnotationStatus::Done,
            true,
        ),
        None => (0.0, Evaluation::new()),
    };

    // A failed retry/block conditional pins the unit: the coder cannot
    // progress until the answer clears.
    let mut new_status = status;
    for entry in evaluation.values() {
        if matches!(
            entry.action,
            Some(FeedbackAction::Retry) | Some(FeedbackAction::Block)
        ) {
            new_status = AnnotationStatus::Retry;
        }
    }

    // Damage is monotonic per annotation unless healing is enabled, so
    // resubmitting a corrected answer cannot wash out a gold-test penalty.
    let new_damage = if rules.heal_damage {
        damage_delta
    } else {
        damage_delta.max(annotation.damage)
    };

    annotation.annotation = payload;
    annotation.status = new_status;
    annotation.modified = time.now_millis();
    annotation.damage = new_damage;
    annotation.report = if evaluation.is_empty() {
        None
    } else {
        Some(serde_json::to_value(&evaluation)?)
    };
    tx.update_annotation(&annotation).await?;

    let total_damage = tx.sum_damage(annotation.jobset_id, coder.id).await?;
    if let Some(job_user) = tx.job_user(coder.id, job_id).await? {
        tx.set_job_user_damage(job_user.id, total_damage).await?;
    }

    tx.commit().await?;

    debug!(
        job_id,
        unit_id,
        coder_id = coder.id,
        status = %annotation.status,
        damage = annotation.damage,
        "annotation stored"
    );

    let damage_report = rules.show_damage.then(|| DamageReport {
        damage: annotation.damage,
        total_damage,
        max_damage: rules.max_damage,
        game_over: rules.max_damage.map(|max| total_damage > max),
    });

    Ok(AnnotationReport {
        damage: damage_report,
        evaluation,
    })
}
