// Progress reporting: counts, seek permissions and the damage state for a
// coder on a job. Read-only; never binds the coder to a jobset.

use serde::Serialize;

use crate::application::jobset::resolve_jobset;
use crate::application::unit_server::UnitServer;
use crate::domain::User;
use crate::error::{AppError, Result};
use crate::port::TransactionalStore;

#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub n_total: i64,
    pub n_coded: i64,
    pub seek_backwards: bool,
    pub seek_forwards: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub damage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_damage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_over: Option<bool>,
}

pub async fn get_progress(
    store: &dyn TransactionalStore,
    job_id: i64,
    coder: &User,
) -> Result<Progress> {
    let mut tx = store.begin().await?;

    let job = tx
        .job(job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("coding job {job_id}")))?;

    // peeking at progress must not assign the coder to a jobset
    let jobset = resolve_jobset(&mut *tx, &job, coder, false).await?;
    let rules = jobset.rules.clone();

    let mut server = UnitServer::new(&mut *tx, &jobset, coder);
    let n_total = server.n_total().await?;

    let n_coded = tx.count_coded(jobset.id, coder.id).await?;
    let last_modified = tx.last_modified(jobset.id, coder.id).await?;
    let total_damage = tx.sum_damage(jobset.id, coder.id).await?;
    tx.commit().await?;

    Ok(Progress {
        n_total,
        n_coded,
        seek_backwards: rules.can_seek_backwards,
        seek_forwards: rules.can_seek_forwards,
        last_modified,
        damage: rules.show_damage.then_some(total_damage),
        max_damage: if rules.show_damage {
            rules.max_damage
        } else {
            None
        },
        // the lockout signal is needed even when damage itself is hidden
        game_over: rules.max_damage.map(|max| total_damage > max),
    })
}
