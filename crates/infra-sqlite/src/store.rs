// SQLite EngineStore Implementation

use async_trait::async_trait;
use sqlx::SqlitePool;

use corpora_core::domain::{CodingJob, Unit, User};
use corpora_core::error::{AppError, Result};
use corpora_core::port::{AnnotationExport, EngineStore, StoreTransaction, TransactionalStore};

use crate::rows::{map_sqlx_error, CodingJobRow, UnitRow, UserRow};
use crate::transaction::SqliteStoreTransaction;

pub struct SqliteEngineStore {
    pool: SqlitePool,
}

impl SqliteEngineStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionalStore for SqliteEngineStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(SqliteStoreTransaction::new(tx)))
    }
}

#[async_trait]
impl EngineStore for SqliteEngineStore {
    async fn user(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(User::from))
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(User::from))
    }

    async fn job(&self, id: i64) -> Result<Option<CodingJob>> {
        let row = sqlx::query_as::<_, CodingJobRow>("SELECT * FROM codingjobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(CodingJob::from))
    }

    async fn unit(&self, id: i64) -> Result<Option<Unit>> {
        let row = sqlx::query_as::<_, UnitRow>("SELECT * FROM units WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(Unit::try_from).transpose()
    }

    async fn job_annotations(&self, job_id: i64) -> Result<Vec<AnnotationExport>> {
        #[derive(sqlx::FromRow)]
        struct ExportRow {
            jobset: String,
            unit_id: String,
            coder: String,
            annotation: String,
            status: String,
        }

        let rows = sqlx::query_as::<_, ExportRow>(
            r#"
            SELECT js.name AS jobset, u.external_id AS unit_id, usr.name AS coder,
                   a.annotation AS annotation, a.status AS status
            FROM annotations a
            JOIN units u ON u.id = a.unit_id
            JOIN users usr ON usr.id = a.coder_id
            JOIN jobsets js ON js.id = a.jobset_id
            WHERE a.codingjob_id = ?
            ORDER BY a.id
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(AnnotationExport {
                    jobset: row.jobset,
                    unit_id: row.unit_id,
                    coder: row.coder,
                    annotation: serde_json::from_str(&row.annotation)?,
                    status: row.status.parse().map_err(AppError::Domain)?,
                })
            })
            .collect()
    }
}
