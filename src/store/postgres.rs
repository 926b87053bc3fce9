//! Postgres-backed `JobStore`: atomic single-winner claim via a conditional
//! `UPDATE` with an `INSERT ... ON CONFLICT DO NOTHING` fallback, and
//! retried terminal-state writes on transient failure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use tokio::time::{sleep, Duration};
use tracing::warn;

use crate::error::{Result, WorkerError};
use crate::model::{Job, JobStatus};

use super::{JobSnapshot, JobStore};

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_job(row: sqlx::postgres::PgRow) -> Result<Job> {
    let status_str: String = row.try_get("status")?;
    let status = JobStatus::from_str(&status_str).map_err(WorkerError::Other)?;
    Ok(Job {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        mode: row.try_get("mode")?,
        responses: row.try_get("responses")?,
        user_data: row.try_get("user_data")?,
        status,
        worker_id: row.try_get("worker_id")?,
        error: row.try_get("error")?,
        batch_id: row.try_get("batch_id")?,
        file_name: row.try_get("file_name")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

const SELECT_COLUMNS: &str = "id, session_id, mode, responses, user_data, status, worker_id, \
     error, batch_id, file_name, created_at, updated_at, completed_at";

#[async_trait]
impl JobStore for PgJobStore {
    async fn fetch_queued(&self, limit: i64, mode_filter: Option<&str>) -> Result<Vec<Job>> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM jobs \
             WHERE status = 'queued' AND batch_id IS NULL \
             AND ($1::text IS NULL OR mode = $1) \
             ORDER BY created_at ASC LIMIT $2"
        );
        let rows = sqlx::query(&query)
            .bind(mode_filter)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_job).collect()
    }

    async fn fetch_batch_queued(&self, limit: i64, mode_filter: Option<&str>) -> Result<Vec<Job>> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM jobs \
             WHERE status = 'queued' AND batch_id IS NOT NULL \
             AND ($1::text IS NULL OR mode = $1) \
             ORDER BY created_at ASC LIMIT $2"
        );
        let rows = sqlx::query(&query)
            .bind(mode_filter)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_job).collect()
    }

    async fn claim_job(&self, job_id: &str, snapshot: &JobSnapshot, worker_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE jobs SET status = 'processing', worker_id = $1, updated_at = now() \
             WHERE id = $2 AND status = 'queued' AND worker_id IS NULL",
        )
        .bind(worker_id)
        .bind(job_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 1 {
            tx.commit().await?;
            return Ok(true);
        }

        // Either the row doesn't exist yet locally, or it's owned / not
        // queued. Try to insert from the snapshot; ON CONFLICT DO NOTHING
        // means a concurrent winner's insert will make ours a no-op.
        let inserted = sqlx::query(
            "INSERT INTO jobs (id, session_id, mode, responses, user_data, status, worker_id, \
             batch_id, file_name, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, 'processing', $6, $7, $8, $9, now()) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(&snapshot.id)
        .bind(&snapshot.session_id)
        .bind(&snapshot.mode)
        .bind(&snapshot.responses)
        .bind(&snapshot.user_data)
        .bind(worker_id)
        .bind(&snapshot.batch_id)
        .bind(&snapshot.file_name)
        .bind(snapshot.created_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(inserted == 1)
    }

    async fn mark_terminal(
        &self,
        job_id: &str,
        status: JobStatus,
        error_message: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        let backoffs = [Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)];
        let mut attempt = 0;
        loop {
            let result = sqlx::query(
                "UPDATE jobs SET status = $1, error = $2, completed_at = $3, updated_at = now() \
                 WHERE id = $4",
            )
            .bind(status.to_string())
            .bind(error_message)
            .bind(completed_at)
            .bind(job_id)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => return Ok(()),
                Err(e) if attempt < backoffs.len() => {
                    warn!(job_id, attempt, error = %e, "mark_terminal failed, retrying");
                    sleep(backoffs[attempt]).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn touch(&self, job_id: &str) -> Result<()> {
        sqlx::query("UPDATE jobs SET updated_at = now() WHERE id = $1 AND status = 'processing'")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_stuck_processing(&self, older_than: DateTime<Utc>) -> Result<Vec<Job>> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM jobs WHERE status = 'processing' AND updated_at < $1"
        );
        let rows = sqlx::query(&query)
            .bind(older_than)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_job).collect()
    }

    async fn reset_to_queued(&self, job_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'queued', worker_id = NULL, updated_at = now() WHERE id = $1",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn has_completed_execution(&self, job_id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM executions WHERE job_id = $1 AND status = 'completed' AND failed_steps = 0",
        )
        .bind(job_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn get_flag(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM system_flags WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn delete_flag(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM system_flags WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_active(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status IN ('queued', 'processing')")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
