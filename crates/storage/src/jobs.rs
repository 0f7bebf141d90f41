use chrono::{DateTime, Utc};
use fins_core::{Job, JobId, JobPayload, OwnerId, Stage};

use crate::db::{DbPool, StorageError};

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    owner_id: String,
    stage: String,
    progress: i64,
    message: String,
    error: Option<String>,
    payload: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

fn job_from_row(r: JobRow) -> Result<Job, StorageError> {
    let id: JobId = r.id.parse().map_err(|e| StorageError::Corrupt(format!("job id: {e}")))?;
    let stage: Stage = r.stage.parse().map_err(StorageError::Corrupt)?;
    let payload: JobPayload =
        serde_json::from_str(&r.payload).map_err(|e| StorageError::Corrupt(format!("job payload: {e}")))?;

    Ok(Job {
        id,
        owner_id: OwnerId(r.owner_id),
        stage,
        progress: r.progress.clamp(0, 100) as u8,
        message: r.message,
        error: r.error,
        payload,
        created_at: r.created_at,
        updated_at: r.updated_at,
        completed_at: r.completed_at,
    })
}

fn payload_json(job: &Job) -> Result<String, StorageError> {
    serde_json::to_string(&job.payload).map_err(|e| StorageError::Corrupt(format!("job payload: {e}")))
}

pub async fn insert_job(pool: &DbPool, job: &Job) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO jobs (id, owner_id, stage, progress, message, error, payload, created_at, updated_at, completed_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(job.id.to_string())
    .bind(job.owner_id.as_str())
    .bind(job.stage.as_str())
    .bind(job.progress as i64)
    .bind(&job.message)
    .bind(&job.error)
    .bind(payload_json(job)?)
    .bind(job.created_at)
    .bind(job.updated_at)
    .bind(job.completed_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn load_job(pool: &DbPool, id: JobId) -> Result<Option<Job>, StorageError> {
    let row = sqlx::query_as::<_, JobRow>(
        "SELECT id, owner_id, stage, progress, message, error, payload, created_at, updated_at, completed_at \
         FROM jobs WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(job_from_row).transpose()
}

/// Persists the whole job record.
pub async fn save_job(pool: &DbPool, job: &Job) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE jobs SET stage = ?, progress = ?, message = ?, error = ?, payload = ?, \
         updated_at = ?, completed_at = ? WHERE id = ?",
    )
    .bind(job.stage.as_str())
    .bind(job.progress as i64)
    .bind(&job.message)
    .bind(&job.error)
    .bind(payload_json(job)?)
    .bind(job.updated_at)
    .bind(job.completed_at)
    .bind(job.id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Persists `job` only if the stored row is still at `expected_stage` and
/// `expected_progress`.
///
/// Returns `false` when another writer moved the job first; the stored row is
/// then left untouched.
pub async fn save_job_guarded(
    pool: &DbPool,
    job: &Job,
    expected_stage: Stage,
    expected_progress: u8,
) -> Result<bool, StorageError> {
    let result = sqlx::query(
        "UPDATE jobs SET stage = ?, progress = ?, message = ?, error = ?, payload = ?, \
         updated_at = ?, completed_at = ? WHERE id = ? AND stage = ? AND progress = ?",
    )
    .bind(job.stage.as_str())
    .bind(job.progress as i64)
    .bind(&job.message)
    .bind(&job.error)
    .bind(payload_json(job)?)
    .bind(job.updated_at)
    .bind(job.completed_at)
    .bind(job.id.to_string())
    .bind(expected_stage.as_str())
    .bind(expected_progress as i64)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Jobs that were mid-flight when the process stopped, oldest first.
pub async fn list_unfinished_jobs(pool: &DbPool) -> Result<Vec<Job>, StorageError> {
    let rows = sqlx::query_as::<_, JobRow>(
        "SELECT id, owner_id, stage, progress, message, error, payload, created_at, updated_at, completed_at \
         FROM jobs WHERE stage NOT IN ('completed', 'failed', 'awaiting_confirmation') ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(job_from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_db;
    use fins_core::{SourceFile, SourceFormat};
    use std::path::PathBuf;

    async fn pool() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("fins.db")).await.unwrap();
        (dir, pool)
    }

    fn job() -> Job {
        Job::new(
            JobId::new(),
            OwnerId::new("u1"),
            SourceFile {
                path: PathBuf::from("/tmp/x.csv"),
                format: SourceFormat::Csv,
                original_name: "x.csv".into(),
                sha256: "00".into(),
                size_bytes: 2,
            },
        )
    }

    #[tokio::test]
    async fn insert_load_save_roundtrip() {
        let (_dir, pool) = pool().await;
        let mut job = job();
        insert_job(&pool, &job).await.unwrap();

        let loaded = load_job(&pool, job.id).await.unwrap().unwrap();
        assert_eq!(loaded.stage, Stage::Uploading);
        assert_eq!(loaded.payload, job.payload);

        job.advance(Stage::Parsing, 10, "Parsing file...").unwrap();
        save_job(&pool, &job).await.unwrap();
        let loaded = load_job(&pool, job.id).await.unwrap().unwrap();
        assert_eq!(loaded.stage, Stage::Parsing);
        assert_eq!(loaded.progress, 10);

        assert_eq!(list_unfinished_jobs(&pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_job_is_none() {
        let (_dir, pool) = pool().await;
        assert!(load_job(&pool, JobId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn conditional_save_only_wins_once() {
        let (_dir, pool) = pool().await;
        let mut job = job();
        job.advance(Stage::AwaitingConfirmation, 60, "Waiting").unwrap();
        insert_job(&pool, &job).await.unwrap();

        let mut winner = job.clone();
        winner.advance(Stage::ExtractingTransactions, 60, "Confirmed").unwrap();
        assert!(save_job_guarded(&pool, &winner, Stage::AwaitingConfirmation, 60).await.unwrap());

        let mut loser = job.clone();
        loser.advance(Stage::ExtractingTransactions, 60, "Confirmed").unwrap();
        assert!(!save_job_guarded(&pool, &loser, Stage::AwaitingConfirmation, 60).await.unwrap());

        let mut claim = winner.clone();
        claim.advance(Stage::ExtractingTransactions, 65, "Extracting").unwrap();
        assert!(save_job_guarded(&pool, &claim, Stage::ExtractingTransactions, 60).await.unwrap());
        assert!(!save_job_guarded(&pool, &claim, Stage::ExtractingTransactions, 60).await.unwrap());
    }
}
