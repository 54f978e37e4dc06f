// Unit scheduling: decides which unit a coder sees next, or resolves a
// specific ordinal. The strategy (fixed order vs. crowd-driven) comes from
// the jobset rules; pre/post units are pinned through fixed indices either
// way. Serving a fresh unit reserves an IN_PROGRESS annotation row in the
// same transaction, which is what keeps concurrent coders from piling onto
// the same unit.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use tracing::debug;

use crate::application::jobset::resolve_jobset;
use crate::domain::{
    conditional, Annotation, AnnotationStatus, AnnotationValue, Evaluation, JobSet, Ruleset, Unit,
    User,
};
use crate::error::{AppError, Result};
use crate::port::{StoreTransaction, TimeProvider, TransactionalStore};

#[cfg(test)]
#[path = "unit_server_test.rs"]
mod unit_server_test;

/// What a serve hands to the transport layer. `unit` is None once the coder
/// is finished (or locked out by damage); `index` is always meaningful.
#[derive(Debug, Clone, Serialize)]
pub struct ServedUnit {
    pub unit: Option<Unit>,
    pub index: i64,
    pub annotation: Option<Vec<AnnotationValue>>,
    pub status: Option<AnnotationStatus>,
    pub report: Option<Evaluation>,
}

/// Serve a unit for (job, coder): the next one, or the given ordinal.
///
/// Runs in a single transaction. The one benign race - two requests of the
/// same coder reserving the same unit - surfaces as a Conflict from the
/// unique `(unit_id, coder_id)` constraint and is retried once; the retry
/// observes the reserved row and converges.
pub async fn serve_unit(
    store: &dyn TransactionalStore,
    time: &dyn TimeProvider,
    job_id: i64,
    coder: &User,
    index: Option<i64>,
) -> Result<ServedUnit> {
    match serve_attempt(store, time, job_id, coder, index).await {
        Err(AppError::Conflict(reason)) => {
            debug!(job_id, coder_id = coder.id, %reason, "serve conflict, retrying once");
            serve_attempt(store, time, job_id, coder, index).await
        }
        other => other,
    }
}

async fn serve_attempt(
    store: &dyn TransactionalStore,
    time: &dyn TimeProvider,
    job_id: i64,
    coder: &User,
    index: Option<i64>,
) -> Result<ServedUnit> {
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

    let jobset = resolve_jobset(&mut *tx, &job, coder, true).await?;

    let mut server = UnitServer::new(&mut *tx, &jobset, coder);

    // Damage lockout: past the cap, no further units are assigned. The
    // progress report carries the game_over signal.
    if let Some(max_damage) = jobset.rules.max_damage {
        let damage = server.tx.sum_damage(jobset.id, coder.id).await?;
        if damage > max_damage {
            let at = server.tx.count_started(jobset.id, coder.id).await?;
            tx.commit().await?;
            return Ok(ServedUnit {
                unit: None,
                index: at,
                annotation: None,
                status: None,
                report: None,
            });
        }
    }

    let (unit, unit_index) = match index {
        Some(i) => server.seek_unit(i).await?,
        None => server.next_unit().await?,
    };

    let mut served = ServedUnit {
        unit: None,
        index: unit_index,
        annotation: None,
        status: None,
        report: None,
    };

    if let Some(unit) = unit {
        match tx.annotation(unit.id, coder.id).await? {
            Some(existing) => {
                // Re-run the checks on a RETRY unit so the coder sees the
                // feedback immediately when the unit reopens.
                if existing.status == AnnotationStatus::Retry {
                    if let Some(conditionals) = &unit.conditionals {
                        let (_, evaluation) = conditional::evaluate(
                            unit.unit_type,
                            conditionals,
                            &existing.annotation,
                            true,
                            false,
                        );
                        served.report = Some(evaluation);
                    }
                }
                served.annotation = Some(existing.annotation);
                served.status = Some(existing.status);
            }
            None => {
                let reservation = Annotation::reserve(
                    job.id,
                    unit.id,
                    coder.id,
                    jobset.id,
                    unit_index,
                    time.now_millis(),
                );
                tx.insert_annotation(&reservation).await?;
                served.status = Some(AnnotationStatus::InProgress);
            }
        }
        served.unit = Some(unit);
    }

    tx.commit().await?;
    Ok(served)
}

/// Scheduler over one (jobset, coder) pair within a transaction.
pub(crate) struct UnitServer<'a> {
    pub(crate) tx: &'a mut dyn StoreTransaction,
    jobset: &'a JobSet,
    coder: &'a User,
}

impl<'a> UnitServer<'a> {
    pub(crate) fn new(
        tx: &'a mut dyn StoreTransaction,
        jobset: &'a JobSet,
        coder: &'a User,
    ) -> Self {
        Self { tx, jobset, coder }
    }

    /// Total units this coder can code. For crowd jobsets this shrinks with
    /// blocked units (except ones the coder already started) and is capped
    /// by `units_per_coder`.
    pub(crate) async fn n_total(&mut self) -> Result<i64> {
        match self.jobset.rules.ruleset {
            Ruleset::Fixedset { .. } => self.tx.count_units(self.jobset.id).await,
            Ruleset::Crowdcoding { units_per_coder } => {
                let n = self
                    .tx
                    .count_servable_units(self.jobset.id, self.coder.id)
                    .await?;
                Ok(match units_per_coder {
                    Some(cap) => n.min(cap),
                    None => n,
                })
            }
        }
    }

    /// The next unit for this coder, with its ordinal.
    pub(crate) async fn next_unit(&mut self) -> Result<(Option<Unit>, i64)> {
        // (1) an unfinished unit always comes back first
        if let Some(active) = self
            .tx
            .active_annotation(self.jobset.id, self.coder.id)
            .await?
        {
            let unit = self.require_unit(active.unit_id).await?;
            return Ok((Some(unit), active.unit_index));
        }

        // (2) the sequence pointer is how many units were ever served
        let unit_index = self.tx.count_started(self.jobset.id, self.coder.id).await?;
        let n_total = self.n_total().await?;

        // (3) past the end: the client shows the finished view
        if unit_index >= n_total {
            return Ok((None, unit_index));
        }

        // (4) pinned slots (pre/post units) win over the strategy
        if let Some(unit) = self.fixed_slot(unit_index, n_total).await? {
            return Ok((Some(unit), unit_index));
        }

        // (5) strategy pick
        let unit = match self.jobset.rules.ruleset {
            Ruleset::Fixedset { randomize } => self.linear_unit(unit_index, randomize).await?,
            Ruleset::Crowdcoding { .. } => {
                self.tx
                    .least_coded_unit(self.jobset.id, self.coder.id)
                    .await?
            }
        };
        Ok((unit, unit_index))
    }

    /// Look up a specific ordinal, honoring the seek permissions.
    pub(crate) async fn seek_unit(&mut self, index: i64) -> Result<(Option<Unit>, i64)> {
        let seek_forwards = self.jobset.rules.can_seek_forwards
            && matches!(self.jobset.rules.ruleset, Ruleset::Fixedset { .. });

        let coded = self.tx.count_coded(self.jobset.id, self.coder.id).await?;
        if index < 0 || (index >= coded && !seek_forwards) {
            return self.next_unit().await;
        }

        let n_total = self.n_total().await?;
        if index >= n_total {
            return Ok((None, index));
        }

        if let Some(unit) = self.started_unit(index).await? {
            return Ok((Some(unit), index));
        }
        if !seek_forwards {
            return Ok((None, index));
        }

        // forward seek serves whatever would sit at that ordinal
        if let Some(unit) = self.fixed_slot(index, n_total).await? {
            return Ok((Some(unit), index));
        }
        let randomize = matches!(
            self.jobset.rules.ruleset,
            Ruleset::Fixedset { randomize: true }
        );
        Ok((self.linear_unit(index, randomize).await?, index))
    }

    /// Pre/post slots: an exact fixed index, or a negative one counted from
    /// the end of the sequence.
    async fn fixed_slot(&mut self, unit_index: i64, n_total: i64) -> Result<Option<Unit>> {
        if let Some(unit) = self.tx.fixed_index_unit(self.jobset.id, unit_index).await? {
            return Ok(Some(unit));
        }
        self.tx
            .fixed_index_unit(self.jobset.id, unit_index - n_total)
            .await
    }

    /// Fixed-order pick: the unpinned members in insertion order, privately
    /// permuted per coder when randomize is on. Pinned slots keep their
    /// place either way.
    async fn linear_unit(&mut self, unit_index: i64, randomize: bool) -> Result<Option<Unit>> {
        let front = self.tx.count_pinned_front(self.jobset.id).await?;
        let members = self.tx.unpositioned_unit_ids(self.jobset.id).await?;

        let slot = unit_index - front;
        if slot < 0 || slot as usize >= members.len() {
            return Ok(None);
        }
        let pick = if randomize {
            random_indices(self.coder.id as u64, members.len())[slot as usize]
        } else {
            slot as usize
        };
        Ok(Some(self.require_unit(members[pick]).await?))
    }

    /// A unit the coder already started, by its ordinal. Anything before
    /// the newest started unit needs the backward-seek permission.
    async fn started_unit(&mut self, index: i64) -> Result<Option<Unit>> {
        let Some(annotation) = self
            .tx
            .annotation_at_index(self.jobset.id, self.coder.id, index)
            .await?
        else {
            return Ok(None);
        };
        let newest = self.tx.count_started(self.jobset.id, self.coder.id).await? - 1;
        if index < newest && !self.jobset.rules.can_seek_backwards {
            return Ok(None);
        }
        Ok(Some(self.require_unit(annotation.unit_id).await?))
    }

    async fn require_unit(&mut self, unit_id: i64) -> Result<Unit> {
        self.tx.unit(unit_id).await?.ok_or_else(|| {
            AppError::Internal(format!("jobset {} references missing unit {unit_id}", self.jobset.id))
        })
    }
}

/// Deterministic permutation of `0..n`, seeded per coder so every coder
/// keeps one private order across sessions.
pub fn random_indices(seed: u64, n: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    indices
}
