// Jobset assignment: a coder's first interaction with a job binds them to
// exactly one jobset, so A/B designs get an even spread of coders.

use tracing::debug;

use crate::domain::{CodingJob, JobSet, JobUser, User};
use crate::error::{AppError, Result};
use crate::port::StoreTransaction;

/// Resolve the jobset for (job, coder), authorizing access on the way.
/// With `bind`, the choice is persisted: a JobUser row is created if
/// missing, or its empty jobset slot is filled.
///
/// First-time coders are routed round-robin: the k-th coder to join lands
/// on jobset `k mod n`, which spreads coders evenly without a global
/// counter and is deterministic given the prior joins.
pub async fn resolve_jobset(
    tx: &mut dyn StoreTransaction,
    job: &CodingJob,
    coder: &User,
    bind: bool,
) -> Result<JobSet> {
    if let Some(restricted_to) = coder.restricted_job {
        if restricted_to != job.id {
            return Err(AppError::AuthorizationDenied(format!(
                "user {} may only code job {}",
                coder.id, restricted_to
            )));
        }
    }

    let job_user = tx.job_user(coder.id, job.id).await?;

    // A job-token user is scoped to this job and bypasses the invite gate.
    let invited_only = job.restricted && coder.restricted_job.is_none();
    match &job_user {
        None if invited_only => {
            return Err(AppError::AuthorizationDenied(
                "coding job is restricted to invited coders".to_string(),
            ));
        }
        Some(ju) if invited_only && !ju.can_code => {
            return Err(AppError::AuthorizationDenied(
                "coding job access has been revoked".to_string(),
            ));
        }
        _ => {}
    }

    if let Some(ju) = &job_user {
        if let Some(jobset_id) = ju.jobset_id {
            return tx.jobset(jobset_id).await?.ok_or_else(|| {
                AppError::Internal(format!("job user {} references missing jobset", ju.id))
            });
        }
    }

    let jobsets = tx.jobsets(job.id).await?;
    let n_jobsets = jobsets.len();
    if n_jobsets == 0 {
        return Err(AppError::Internal(format!("job {} has no jobsets", job.id)));
    }

    let pick = if n_jobsets == 1 {
        0
    } else {
        let prior_coders = tx.count_job_users(job.id).await?;
        prior_coders as usize % n_jobsets
    };
    let jobset = jobsets
        .into_iter()
        .nth(pick)
        .ok_or_else(|| AppError::Internal("jobset pick out of range".to_string()))?;

    if bind {
        match &job_user {
            Some(ju) => tx.set_job_user_jobset(ju.id, jobset.id).await?,
            None => {
                let ju = JobUser::new(coder.id, job.id, Some(jobset.id));
                tx.insert_job_user(&ju).await?;
            }
        }
        debug!(
            job_id = job.id,
            coder_id = coder.id,
            jobset_id = jobset.id,
            "bound coder to jobset"
        );
    }

    Ok(jobset)
}
