//! libSQL storage layer for jobs and contact snapshots.
//!
//! The [`Storage`] struct wraps a libSQL database holding the job table and
//! the raw/cleaned contact snapshots. The job pipeline is the sole writer;
//! job rows are mutated only at stage boundaries, contact rows are written
//! once and never updated.

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use uuid::Uuid;

use contactscrub_shared::{ContactScrubError, Job, JobId, JobStatus, JobSummary, Record, Result};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ContactScrubError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| ContactScrubError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| ContactScrubError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    ContactScrubError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Job operations
    // -----------------------------------------------------------------------

    /// Create a new job in `pending` status for an accepted source file.
    pub async fn create_job(&self, filename: &str) -> Result<Job> {
        let job = Job {
            id: JobId::new(),
            filename: filename.to_string(),
            status: JobStatus::Pending,
            total_rows: 0,
            processed: 0,
            result: None,
            error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.conn
            .execute(
                "INSERT INTO jobs (id, filename, status, total_rows, processed, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 0, 0, ?4, ?5)",
                params![
                    job.id.to_string(),
                    filename,
                    job.status.as_str(),
                    job.created_at.to_rfc3339(),
                    job.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| ContactScrubError::Storage(e.to_string()))?;
        Ok(job)
    }

    /// Get a job by ID.
    pub async fn get_job(&self, id: &JobId) -> Result<Option<Job>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, filename, status, total_rows, processed, result_json, error,
                        created_at, updated_at
                 FROM jobs WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| ContactScrubError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_job(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(ContactScrubError::Storage(e.to_string())),
        }
    }

    /// List all jobs, newest first.
    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, filename, status, total_rows, processed, result_json, error,
                        created_at, updated_at
                 FROM jobs ORDER BY created_at DESC",
                params![],
            )
            .await
            .map_err(|e| ContactScrubError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_job(&row)?);
        }
        Ok(results)
    }

    /// Update a job's lifecycle status.
    pub async fn set_job_status(&self, id: &JobId, status: JobStatus) -> Result<()> {
        self.conn
            .execute(
                "UPDATE jobs SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), Utc::now().to_rfc3339(), id.to_string()],
            )
            .await
            .map_err(|e| ContactScrubError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Record the source row count, set once after the source is read.
    pub async fn set_job_total_rows(&self, id: &JobId, total_rows: u64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE jobs SET total_rows = ?1, updated_at = ?2 WHERE id = ?3",
                params![total_rows as i64, Utc::now().to_rfc3339(), id.to_string()],
            )
            .await
            .map_err(|e| ContactScrubError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Transition a job to terminal `completed` with its success summary.
    pub async fn complete_job(
        &self,
        id: &JobId,
        processed: u64,
        summary: &JobSummary,
    ) -> Result<()> {
        let result_json = serde_json::to_string(summary)
            .map_err(|e| ContactScrubError::Storage(e.to_string()))?;
        self.conn
            .execute(
                "UPDATE jobs SET status = ?1, processed = ?2, result_json = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    JobStatus::Completed.as_str(),
                    processed as i64,
                    result_json.as_str(),
                    Utc::now().to_rfc3339(),
                    id.to_string(),
                ],
            )
            .await
            .map_err(|e| ContactScrubError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Transition a job to terminal `failed` with a human-readable message.
    ///
    /// A failed job must carry a non-empty error, so a blank message is
    /// replaced with a placeholder.
    pub async fn fail_job(&self, id: &JobId, error: &str) -> Result<()> {
        let error = if error.trim().is_empty() {
            "unknown error"
        } else {
            error
        };
        self.conn
            .execute(
                "UPDATE jobs SET status = ?1, error = ?2, updated_at = ?3 WHERE id = ?4",
                params![
                    JobStatus::Failed.as_str(),
                    error,
                    Utc::now().to_rfc3339(),
                    id.to_string(),
                ],
            )
            .await
            .map_err(|e| ContactScrubError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Contact snapshot operations
    // -----------------------------------------------------------------------

    /// Append a pre-cleaning snapshot of one source record.
    pub async fn append_raw_contact(
        &self,
        job_id: &JobId,
        seq: u64,
        record: &Record,
    ) -> Result<()> {
        self.append_contact("raw_contacts", job_id, seq, record).await
    }

    /// Append one enriched output record.
    pub async fn append_cleaned_contact(
        &self,
        job_id: &JobId,
        seq: u64,
        record: &Record,
    ) -> Result<()> {
        self.append_contact("cleaned_contacts", job_id, seq, record)
            .await
    }

    async fn append_contact(
        &self,
        table: &str,
        job_id: &JobId,
        seq: u64,
        record: &Record,
    ) -> Result<()> {
        let data_json = serde_json::to_string(record)
            .map_err(|e| ContactScrubError::Storage(e.to_string()))?;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {table} (id, job_id, seq, data_json) VALUES (?1, ?2, ?3, ?4)"
                ),
                params![
                    Uuid::now_v7().to_string(),
                    job_id.to_string(),
                    seq as i64,
                    data_json.as_str(),
                ],
            )
            .await
            .map_err(|e| ContactScrubError::Storage(e.to_string()))?;
        Ok(())
    }

    /// List a job's raw snapshots in source order.
    pub async fn list_raw_contacts(&self, job_id: &JobId) -> Result<Vec<Record>> {
        self.list_contacts("raw_contacts", job_id).await
    }

    /// List a job's cleaned records in processing order.
    pub async fn list_cleaned_contacts(&self, job_id: &JobId) -> Result<Vec<Record>> {
        self.list_contacts("cleaned_contacts", job_id).await
    }

    async fn list_contacts(&self, table: &str, job_id: &JobId) -> Result<Vec<Record>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT data_json FROM {table} WHERE job_id = ?1 ORDER BY seq"
                ),
                params![job_id.to_string()],
            )
            .await
            .map_err(|e| ContactScrubError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let data_json: String = row
                .get(0)
                .map_err(|e| ContactScrubError::Storage(e.to_string()))?;
            let record: Record = serde_json::from_str(&data_json)
                .map_err(|e| ContactScrubError::Storage(format!("invalid snapshot: {e}")))?;
            results.push(record);
        }
        Ok(results)
    }
}

/// Convert a database row to a [`Job`].
fn row_to_job(row: &libsql::Row) -> Result<Job> {
    let status_str: String = row
        .get(2)
        .map_err(|e| ContactScrubError::Storage(e.to_string()))?;
    let status: JobStatus = status_str
        .parse()
        .map_err(|e: String| ContactScrubError::Storage(e))?;

    let result: Option<JobSummary> = match row.get::<String>(5) {
        Ok(json) => Some(
            serde_json::from_str(&json)
                .map_err(|e| ContactScrubError::Storage(format!("invalid result: {e}")))?,
        ),
        Err(_) => None,
    };

    Ok(Job {
        id: {
            let s: String = row
                .get(0)
                .map_err(|e| ContactScrubError::Storage(e.to_string()))?;
            s.parse()
                .map_err(|e| ContactScrubError::Storage(format!("invalid job id: {e}")))?
        },
        filename: row
            .get::<String>(1)
            .map_err(|e| ContactScrubError::Storage(e.to_string()))?,
        status,
        total_rows: row.get::<i64>(3).unwrap_or(0) as u64,
        processed: row.get::<i64>(4).unwrap_or(0) as u64,
        result,
        error: row.get::<String>(6).ok(),
        created_at: parse_timestamp(row, 7)?,
        updated_at: parse_timestamp(row, 8)?,
    })
}

fn parse_timestamp(row: &libsql::Row, idx: i32) -> Result<chrono::DateTime<Utc>> {
    let s: String = row
        .get(idx)
        .map_err(|e| ContactScrubError::Storage(e.to_string()))?;
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ContactScrubError::Storage(format!("invalid date: {e}")))
}
