// SQLite Transaction Implementation

use async_trait::async_trait;
use sqlx::{Sqlite, Transaction as SqlxTransaction};

use corpora_core::domain::{Annotation, CodingJob, JobSet, JobSetUnit, JobUser, Unit, User};
use corpora_core::error::{AppError, Result};
use corpora_core::port::{StoreTransaction, Transaction};

use crate::rows::{
    map_sqlx_error, AnnotationRow, CodingJobRow, JobSetRow, JobUserRow, UnitRow, UserRow,
};

pub struct SqliteStoreTransaction {
    tx: SqlxTransaction<'static, Sqlite>,
}

impl SqliteStoreTransaction {
    pub fn new(tx: SqlxTransaction<'static, Sqlite>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Transaction for SqliteStoreTransaction {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for SqliteStoreTransaction {
    // --- jobs & jobsets ---

    async fn job(&mut self, job_id: i64) -> Result<Option<CodingJob>> {
        let row = sqlx::query_as::<_, CodingJobRow>("SELECT * FROM codingjobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(CodingJob::from))
    }

    async fn jobsets(&mut self, job_id: i64) -> Result<Vec<JobSet>> {
        let rows = sqlx::query_as::<_, JobSetRow>(
            "SELECT * FROM jobsets WHERE codingjob_id = ? ORDER BY id",
        )
        .bind(job_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        rows.into_iter().map(JobSet::try_from).collect()
    }

    async fn jobset(&mut self, jobset_id: i64) -> Result<Option<JobSet>> {
        let row = sqlx::query_as::<_, JobSetRow>("SELECT * FROM jobsets WHERE id = ?")
            .bind(jobset_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        row.map(JobSet::try_from).transpose()
    }

    // --- coder bindings ---

    async fn job_user(&mut self, user_id: i64, job_id: i64) -> Result<Option<JobUser>> {
        let row = sqlx::query_as::<_, JobUserRow>(
            "SELECT * FROM job_users WHERE user_id = ? AND codingjob_id = ?",
        )
        .bind(user_id)
        .bind(job_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(JobUser::from))
    }

    async fn count_job_users(&mut self, job_id: i64) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM job_users WHERE codingjob_id = ?")
            .bind(job_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)
    }

    async fn insert_job_user(&mut self, job_user: &JobUser) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO job_users (user_id, codingjob_id, jobset_id, can_code, can_edit, damage, status)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job_user.user_id)
        .bind(job_user.codingjob_id)
        .bind(job_user.jobset_id)
        .bind(job_user.can_code)
        .bind(job_user.can_edit)
        .bind(job_user.damage)
        .bind(&job_user.status)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.last_insert_rowid())
    }

    async fn set_job_user_jobset(&mut self, id: i64, jobset_id: i64) -> Result<()> {
        sqlx::query("UPDATE job_users SET jobset_id = ? WHERE id = ?")
            .bind(jobset_id)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn set_job_user_damage(&mut self, id: i64, damage: f64) -> Result<()> {
        sqlx::query("UPDATE job_users SET damage = ? WHERE id = ?")
            .bind(damage)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn set_job_user_can_code(&mut self, id: i64, can_code: bool) -> Result<()> {
        sqlx::query("UPDATE job_users SET can_code = ? WHERE id = ?")
            .bind(can_code)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    // --- units & jobset membership ---

    async fn unit(&mut self, unit_id: i64) -> Result<Option<Unit>> {
        let row = sqlx::query_as::<_, UnitRow>("SELECT * FROM units WHERE id = ?")
            .bind(unit_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        row.map(Unit::try_from).transpose()
    }

    async fn unit_id_by_external(
        &mut self,
        job_id: i64,
        external_id: &str,
    ) -> Result<Option<i64>> {
        sqlx::query_scalar("SELECT id FROM units WHERE codingjob_id = ? AND external_id = ?")
            .bind(job_id)
            .bind(external_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)
    }

    async fn fixed_index_unit(
        &mut self,
        jobset_id: i64,
        fixed_index: i64,
    ) -> Result<Option<Unit>> {
        let row = sqlx::query_as::<_, UnitRow>(
            r#"
            SELECT u.* FROM units u
            JOIN jobset_units jsu ON jsu.unit_id = u.id
            WHERE jsu.jobset_id = ? AND jsu.fixed_index = ?
            "#,
        )
        .bind(jobset_id)
        .bind(fixed_index)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        row.map(Unit::try_from).transpose()
    }

    async fn unpositioned_unit_ids(&mut self, jobset_id: i64) -> Result<Vec<i64>> {
        sqlx::query_scalar(
            "SELECT unit_id FROM jobset_units WHERE jobset_id = ? AND fixed_index IS NULL ORDER BY id",
        )
        .bind(jobset_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)
    }

    async fn count_units(&mut self, jobset_id: i64) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM jobset_units WHERE jobset_id = ?")
            .bind(jobset_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)
    }

    async fn count_pinned_front(&mut self, jobset_id: i64) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobset_units WHERE jobset_id = ? AND fixed_index >= 0",
        )
        .bind(jobset_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)
    }

    async fn count_servable_units(&mut self, jobset_id: i64, coder_id: i64) -> Result<i64> {
        // blocked units stay in the count for coders who already hold them,
        // so a coder's sequence never shrinks below their pointer
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM jobset_units jsu
            WHERE jsu.jobset_id = ?
              AND (jsu.blocked = 0
                   OR jsu.unit_id IN (
                       SELECT unit_id FROM annotations WHERE jobset_id = ? AND coder_id = ?))
            "#,
        )
        .bind(jobset_id)
        .bind(jobset_id)
        .bind(coder_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)
    }

    async fn least_coded_unit(&mut self, jobset_id: i64, coder_id: i64) -> Result<Option<Unit>> {
        let row = sqlx::query_as::<_, UnitRow>(
            r#"
            SELECT u.* FROM jobset_units jsu
            JOIN units u ON u.id = jsu.unit_id
            LEFT JOIN annotations a
              ON a.unit_id = jsu.unit_id AND a.jobset_id = jsu.jobset_id
            WHERE jsu.jobset_id = ?
              AND jsu.blocked = 0
              AND jsu.unit_id NOT IN (
                  SELECT unit_id FROM annotations WHERE jobset_id = ? AND coder_id = ?)
            GROUP BY jsu.id
            ORDER BY COUNT(a.id) ASC, jsu.id ASC
            LIMIT 1
            "#,
        )
        .bind(jobset_id)
        .bind(jobset_id)
        .bind(coder_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        row.map(Unit::try_from).transpose()
    }

    // --- annotations ---

    async fn annotation(&mut self, unit_id: i64, coder_id: i64) -> Result<Option<Annotation>> {
        let row = sqlx::query_as::<_, AnnotationRow>(
            "SELECT * FROM annotations WHERE unit_id = ? AND coder_id = ?",
        )
        .bind(unit_id)
        .bind(coder_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        row.map(Annotation::try_from).transpose()
    }

    async fn active_annotation(
        &mut self,
        jobset_id: i64,
        coder_id: i64,
    ) -> Result<Option<Annotation>> {
        let row = sqlx::query_as::<_, AnnotationRow>(
            r#"
            SELECT * FROM annotations
            WHERE jobset_id = ? AND coder_id = ? AND status IN ('IN_PROGRESS', 'RETRY')
            ORDER BY id LIMIT 1
            "#,
        )
        .bind(jobset_id)
        .bind(coder_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        row.map(Annotation::try_from).transpose()
    }

    async fn annotation_at_index(
        &mut self,
        jobset_id: i64,
        coder_id: i64,
        unit_index: i64,
    ) -> Result<Option<Annotation>> {
        let row = sqlx::query_as::<_, AnnotationRow>(
            "SELECT * FROM annotations WHERE jobset_id = ? AND coder_id = ? AND unit_index = ?",
        )
        .bind(jobset_id)
        .bind(coder_id)
        .bind(unit_index)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        row.map(Annotation::try_from).transpose()
    }

    async fn count_started(&mut self, jobset_id: i64, coder_id: i64) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM annotations WHERE jobset_id = ? AND coder_id = ?")
            .bind(jobset_id)
            .bind(coder_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)
    }

    async fn count_coded(&mut self, jobset_id: i64, coder_id: i64) -> Result<i64> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM annotations
            WHERE jobset_id = ? AND coder_id = ? AND status != 'IN_PROGRESS'
            "#,
        )
        .bind(jobset_id)
        .bind(coder_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)
    }

    async fn insert_annotation(&mut self, annotation: &Annotation) -> Result<i64> {
        let payload = serde_json::to_string(&annotation.annotation)?;
        let report = annotation.report.as_ref().map(ToString::to_string);

        let result = sqlx::query(
            r#"
            INSERT INTO annotations (
                codingjob_id, unit_id, coder_id, jobset_id, unit_index,
                status, modified, annotation, damage, report
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(annotation.codingjob_id)
        .bind(annotation.unit_id)
        .bind(annotation.coder_id)
        .bind(annotation.jobset_id)
        .bind(annotation.unit_index)
        .bind(annotation.status.to_string())
        .bind(annotation.modified)
        .bind(payload)
        .bind(annotation.damage)
        .bind(report)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.last_insert_rowid())
    }

    async fn update_annotation(&mut self, annotation: &Annotation) -> Result<()> {
        let payload = serde_json::to_string(&annotation.annotation)?;
        let report = annotation.report.as_ref().map(ToString::to_string);

        sqlx::query(
            r#"
            UPDATE annotations
            SET annotation = ?, status = ?, modified = ?, damage = ?, report = ?
            WHERE id = ?
            "#,
        )
        .bind(payload)
        .bind(annotation.status.to_string())
        .bind(annotation.modified)
        .bind(annotation.damage)
        .bind(report)
        .bind(annotation.id)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn sum_damage(&mut self, jobset_id: i64, coder_id: i64) -> Result<f64> {
        sqlx::query_scalar(
            "SELECT COALESCE(SUM(damage), 0.0) FROM annotations WHERE jobset_id = ? AND coder_id = ?",
        )
        .bind(jobset_id)
        .bind(coder_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)
    }

    async fn last_modified(&mut self, jobset_id: i64, coder_id: i64) -> Result<Option<i64>> {
        sqlx::query_scalar(
            "SELECT MAX(modified) FROM annotations WHERE jobset_id = ? AND coder_id = ?",
        )
        .bind(jobset_id)
        .bind(coder_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)
    }

    // --- job creation ---

    async fn insert_job(&mut self, job: &CodingJob) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO codingjobs (title, creator_id, restricted, archived, created)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.title)
        .bind(job.creator_id)
        .bind(job.restricted)
        .bind(job.archived)
        .bind(job.created)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.last_insert_rowid())
    }

    async fn insert_unit(&mut self, unit: &Unit) -> Result<i64> {
        let content = unit.content.to_string();
        let conditionals = unit
            .conditionals
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let gold = unit.gold.as_ref().map(ToString::to_string);

        let result = sqlx::query(
            r#"
            INSERT INTO units (codingjob_id, external_id, content, conditionals, unit_type, position, gold)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(unit.codingjob_id)
        .bind(&unit.external_id)
        .bind(content)
        .bind(conditionals)
        .bind(unit.unit_type.to_string())
        .bind(unit.position.map(|p| p.to_string()))
        .bind(gold)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.last_insert_rowid())
    }

    async fn insert_jobset(&mut self, jobset: &JobSet) -> Result<i64> {
        let codebook = jobset.codebook.to_string();
        let rules = serde_json::to_string(&jobset.rules)?;
        let debriefing = jobset.debriefing.as_ref().map(ToString::to_string);

        let result = sqlx::query(
            r#"
            INSERT INTO jobsets (codingjob_id, name, codebook, rules, debriefing)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(jobset.codingjob_id)
        .bind(&jobset.name)
        .bind(codebook)
        .bind(rules)
        .bind(debriefing)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.last_insert_rowid())
    }

    async fn insert_jobset_unit(&mut self, member: &JobSetUnit) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobset_units (jobset_id, unit_id, fixed_index, has_conditionals, blocked)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(member.jobset_id)
        .bind(member.unit_id)
        .bind(member.fixed_index)
        .bind(member.has_conditionals)
        .bind(member.blocked)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.last_insert_rowid())
    }

    async fn user_by_email(&mut self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(User::from))
    }

    async fn insert_user(&mut self, user: &User) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (name, email, is_admin, restricted_job, password)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.is_admin)
        .bind(user.restricted_job)
        .bind(&user.password)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.last_insert_rowid())
    }
}
