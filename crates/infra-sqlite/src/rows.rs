// Row structs for sqlx and their conversions into domain entities. JSON
// columns are stored as TEXT and parsed on the way out; enum columns are
// stored in their display form.

use corpora_core::domain::{Annotation, CodingJob, JobSet, JobUser, Unit, User};
use corpora_core::error::{AppError, Result};

#[derive(sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub is_admin: bool,
    pub restricted_job: Option<i64>,
    pub password: Option<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            name: row.name,
            email: row.email,
            is_admin: row.is_admin,
            restricted_job: row.restricted_job,
            password: row.password,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct CodingJobRow {
    pub id: i64,
    pub title: String,
    pub creator_id: i64,
    pub restricted: bool,
    pub archived: bool,
    pub created: i64,
}

impl From<CodingJobRow> for CodingJob {
    fn from(row: CodingJobRow) -> Self {
        CodingJob {
            id: row.id,
            title: row.title,
            creator_id: row.creator_id,
            restricted: row.restricted,
            archived: row.archived,
            created: row.created,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct JobSetRow {
    pub id: i64,
    pub codingjob_id: i64,
    pub name: String,
    pub codebook: String,
    pub rules: String,
    pub debriefing: Option<String>,
}

impl TryFrom<JobSetRow> for JobSet {
    type Error = AppError;

    fn try_from(row: JobSetRow) -> Result<Self> {
        Ok(JobSet {
            id: row.id,
            codingjob_id: row.codingjob_id,
            name: row.name,
            codebook: serde_json::from_str(&row.codebook)?,
            rules: serde_json::from_str(&row.rules)?,
            debriefing: row
                .debriefing
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct UnitRow {
    pub id: i64,
    pub codingjob_id: i64,
    pub external_id: String,
    pub content: String,
    pub conditionals: Option<String>,
    pub unit_type: String,
    pub position: Option<String>,
    pub gold: Option<String>,
}

impl TryFrom<UnitRow> for Unit {
    type Error = AppError;

    fn try_from(row: UnitRow) -> Result<Self> {
        Ok(Unit {
            id: row.id,
            codingjob_id: row.codingjob_id,
            external_id: row.external_id,
            content: serde_json::from_str(&row.content)?,
            conditionals: row
                .conditionals
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            unit_type: row.unit_type.parse().map_err(AppError::Domain)?,
            position: row
                .position
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(AppError::Domain)?,
            gold: row.gold.as_deref().map(serde_json::from_str).transpose()?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct JobUserRow {
    pub id: i64,
    pub user_id: i64,
    pub codingjob_id: i64,
    pub jobset_id: Option<i64>,
    pub can_code: bool,
    pub can_edit: bool,
    pub damage: f64,
    pub status: String,
}

impl From<JobUserRow> for JobUser {
    fn from(row: JobUserRow) -> Self {
        JobUser {
            id: row.id,
            user_id: row.user_id,
            codingjob_id: row.codingjob_id,
            jobset_id: row.jobset_id,
            can_code: row.can_code,
            can_edit: row.can_edit,
            damage: row.damage,
            status: row.status,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct AnnotationRow {
    pub id: i64,
    pub codingjob_id: i64,
    pub unit_id: i64,
    pub coder_id: i64,
    pub jobset_id: i64,
    pub unit_index: i64,
    pub status: String,
    pub modified: i64,
    pub annotation: String,
    pub damage: f64,
    pub report: Option<String>,
}

impl TryFrom<AnnotationRow> for Annotation {
    type Error = AppError;

    fn try_from(row: AnnotationRow) -> Result<Self> {
        Ok(Annotation {
            id: row.id,
            codingjob_id: row.codingjob_id,
            unit_id: row.unit_id,
            coder_id: row.coder_id,
            jobset_id: row.jobset_id,
            unit_index: row.unit_index,
            status: row.status.parse().map_err(AppError::Domain)?,
            modified: row.modified,
            annotation: serde_json::from_str(&row.annotation)?,
            damage: row.damage,
            report: row.report.as_deref().map(serde_json::from_str).transpose()?,
        })
    }
}

/// Map sqlx errors onto the engine's tagged error kinds. Unique-constraint
/// violations become Conflict: the `(unit_id, coder_id)` constraint is the
/// double-serve safety net and the engine retries on it.
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();
                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => {
                        AppError::Conflict(format!(
                            "Unique constraint violation: {} ({})",
                            db_err.message(),
                            code_str
                        ))
                    }
                    "787" | "3850" => AppError::Database(format!(
                        "Foreign key constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "5" => AppError::Database(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => AppError::Database(format!("Database full: {}", db_err.message())),
                    _ => AppError::Database(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        other => AppError::Database(other.to_string()),
    }
}
