//! Batch job records and their persistent store.
//!
//! A job is created once per commit or rollback, mutated only by the
//! background continuation that owns it, and never deleted. Callers poll it
//! by ID or list the most recent ones.

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::catalog::Collection;

const JOBS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("batch_jobs");

/// How many jobs a listing returns.
pub const RECENT_JOBS_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobMode {
    Query,
    Paste,
    Rollback,
}

/// Running counters for one job. `matched` is fixed at commit start; the
/// rest only ever grow while the job runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    pub matched: u64,
    pub written: u64,
    pub skipped: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub mode: JobMode,
    pub collection: Collection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub counts: JobCounters,
    /// File name of this job's backup snapshot within the backup directory.
    /// Rollback jobs carry the original job's file.
    pub backup_file: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<JobError>>,
    /// Set on rollback jobs: the job whose backup is being replayed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_job_id: Option<String>,
}

impl Job {
    /// Create a pending job record.
    pub fn new(mode: JobMode, collection: Collection, backup_file: String, matched: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: JobStatus::Pending,
            mode,
            collection,
            note: None,
            counts: JobCounters {
                matched,
                ..JobCounters::default()
            },
            backup_file,
            started_at: Utc::now(),
            finished_at: None,
            errors: None,
            original_job_id: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum JobStoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persistent job store backed by redb.
pub struct JobStore {
    db: Arc<RwLock<Database>>,
}

impl JobStore {
    /// Create or open a job store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, JobStoreError> {
        let db = Database::create(path).map_err(|e| JobStoreError::Database(e.to_string()))?;
        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    /// Insert or overwrite a job record.
    pub async fn put_job(&self, job: &Job) -> Result<(), JobStoreError> {
        let json = serde_json::to_string(job)?;

        let db = self.db.write().await;
        let write_txn = db
            .begin_write()
            .map_err(|e| JobStoreError::Database(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(JOBS_TABLE)
                .map_err(|e| JobStoreError::Database(e.to_string()))?;
            table
                .insert(job.id.as_str(), json.as_str())
                .map_err(|e| JobStoreError::Database(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| JobStoreError::Database(e.to_string()))?;

        Ok(())
    }

    /// Get a job by ID.
    pub async fn get_job(&self, id: &str) -> Result<Option<Job>, JobStoreError> {
        let db = self.db.read().await;
        let read_txn = db
            .begin_read()
            .map_err(|e| JobStoreError::Database(e.to_string()))?;

        let table = match read_txn.open_table(JOBS_TABLE) {
            Ok(t) => t,
            Err(_) => return Ok(None), // Table doesn't exist yet
        };

        let Some(json) = table
            .get(id)
            .map_err(|e| JobStoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        Ok(Some(serde_json::from_str(json.value())?))
    }

    /// List the most recently started jobs, newest first.
    pub async fn recent_jobs(&self, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        let db = self.db.read().await;
        let read_txn = db
            .begin_read()
            .map_err(|e| JobStoreError::Database(e.to_string()))?;

        let table = match read_txn.open_table(JOBS_TABLE) {
            Ok(t) => t,
            Err(_) => return Ok(Vec::new()),
        };

        let mut jobs = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| JobStoreError::Database(e.to_string()))?
        {
            let (_, value) = entry.map_err(|e| JobStoreError::Database(e.to_string()))?;
            match serde_json::from_str::<Job>(value.value()) {
                Ok(job) => jobs.push(job),
                Err(e) => tracing::warn!("Skipping unreadable job record: {}", e),
            }
        }

        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        jobs.truncate(limit);
        Ok(jobs)
    }
}
