// Debriefing retrieval: only once the coder has finished their jobset, so
// a debriefing can safely contain completion codes for crowd platforms.

use serde_json::Value;

use crate::application::jobset::resolve_jobset;
use crate::application::unit_server::UnitServer;
use crate::domain::User;
use crate::error::{AppError, Result};
use crate::port::TransactionalStore;

pub async fn get_debriefing(
    store: &dyn TransactionalStore,
    job_id: i64,
    coder: &User,
) -> Result<Value> {
    let mut tx = store.begin().await?;

    let job = tx
        .job(job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("coding job {job_id}")))?;
    let jobset = resolve_jobset(&mut *tx, &job, coder, false).await?;

    let mut server = UnitServer::new(&mut *tx, &jobset, coder);
    let n_total = server.n_total().await?;
    let n_coded = tx.count_coded(jobset.id, coder.id).await?;
    tx.commit().await?;

    if n_coded < n_total {
        return Err(AppError::NotFound(
            "debriefing is only available once the job is finished".to_string(),
        ));
    }
    jobset
        .debriefing
        .ok_or_else(|| AppError::NotFound("this job has no debriefing".to_string()))
}
