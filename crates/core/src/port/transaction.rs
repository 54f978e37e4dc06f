// Transaction port for the serve / submit / bind paths. Every mutation of
// engine state happens through one of these transactions so the invariants
// (one annotation per unit+coder, damage totals, prefix unit indices) hold
// under concurrent coders.

use async_trait::async_trait;

use crate::domain::{Annotation, CodingJob, JobSet, JobSetUnit, JobUser, Unit, User};
use crate::error::Result;

/// Transaction lifecycle: commit or roll back atomically.
#[async_trait]
pub trait Transaction: Send {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Store capable of opening transactions.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;
}

/// Engine store operations within a transaction.
#[async_trait]
pub trait StoreTransaction: Transaction {
    // --- jobs & jobsets ---

    async fn job(&mut self, job_id: i64) -> Result<Option<CodingJob>>;

    /// Jobsets of a job in insertion order
    async fn jobsets(&mut self, job_id: i64) -> Result<Vec<JobSet>>;

    async fn jobset(&mut self, jobset_id: i64) -> Result<Option<JobSet>>;

    // --- coder bindings ---

    async fn job_user(&mut self, user_id: i64, job_id: i64) -> Result<Option<JobUser>>;

    async fn count_job_users(&mut self, job_id: i64) -> Result<i64>;

    async fn insert_job_user(&mut self, job_user: &JobUser) -> Result<i64>;

    async fn set_job_user_jobset(&mut self, id: i64, jobset_id: i64) -> Result<()>;

    async fn set_job_user_damage(&mut self, id: i64, damage: f64) -> Result<()>;

    async fn set_job_user_can_code(&mut self, id: i64, can_code: bool) -> Result<()>;

    // --- units & jobset membership ---

    async fn unit(&mut self, unit_id: i64) -> Result<Option<Unit>>;

    async fn unit_id_by_external(
        &mut self,
        job_id: i64,
        external_id: &str,
    ) -> Result<Option<i64>>;

    /// Unit pinned at a fixed ordinal (positive from the start, negative
    /// from the end) in a jobset
    async fn fixed_index_unit(&mut self, jobset_id: i64, fixed_index: i64)
        -> Result<Option<Unit>>;

    /// Unit ids of the unpinned members of a jobset, in insertion order
    async fn unpositioned_unit_ids(&mut self, jobset_id: i64) -> Result<Vec<i64>>;

    async fn count_units(&mut self, jobset_id: i64) -> Result<i64>;

    /// Number of members pinned to the front (fixed_index >= 0)
    async fn count_pinned_front(&mut self, jobset_id: i64) -> Result<i64>;

    /// Crowd-servable members: not blocked, or already started by this
    /// coder (blocking a unit never shrinks the sequence of a coder who
    /// already has it)
    async fn count_servable_units(&mut self, jobset_id: i64, coder_id: i64) -> Result<i64>;

    /// The unit this coder has not touched with the fewest annotations by
    /// anyone, ties broken by membership id
    async fn least_coded_unit(&mut self, jobset_id: i64, coder_id: i64) -> Result<Option<Unit>>;

    // --- annotations ---

    async fn annotation(&mut self, unit_id: i64, coder_id: i64) -> Result<Option<Annotation>>;

    /// The coder's IN_PROGRESS or RETRY annotation in a jobset, if any
    async fn active_annotation(
        &mut self,
        jobset_id: i64,
        coder_id: i64,
    ) -> Result<Option<Annotation>>;

    async fn annotation_at_index(
        &mut self,
        jobset_id: i64,
        coder_id: i64,
        unit_index: i64,
    ) -> Result<Option<Annotation>>;

    /// Annotations of any status for (jobset, coder): the coder's sequence
    /// pointer
    async fn count_started(&mut self, jobset_id: i64, coder_id: i64) -> Result<i64>;

    /// Annotations with status != IN_PROGRESS for (jobset, coder)
    async fn count_coded(&mut self, jobset_id: i64, coder_id: i64) -> Result<i64>;

    async fn insert_annotation(&mut self, annotation: &Annotation) -> Result<i64>;

    async fn update_annotation(&mut self, annotation: &Annotation) -> Result<()>;

    async fn sum_damage(&mut self, jobset_id: i64, coder_id: i64) -> Result<f64>;

    async fn last_modified(&mut self, jobset_id: i64, coder_id: i64) -> Result<Option<i64>>;

    // --- job creation ---

    async fn insert_job(&mut self, job: &CodingJob) -> Result<i64>;

    async fn insert_unit(&mut self, unit: &Unit) -> Result<i64>;

    async fn insert_jobset(&mut self, jobset: &JobSet) -> Result<i64>;

    async fn insert_jobset_unit(&mut self, member: &JobSetUnit) -> Result<i64>;

    async fn user_by_email(&mut self, email: &str) -> Result<Option<User>>;

    async fn insert_user(&mut self, user: &User) -> Result<i64>;
}
