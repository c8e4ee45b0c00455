//! Batch service layer.
//!
//! Orchestrates the pipeline: preview (dry run), commit (backup + job +
//! detached write phase), rollback (replay a backup as a new job), job
//! queries and the export helpers. HTTP concerns stay in `crate::api`.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::backup::{backup_file_name, read_backup, write_backup, BackupError};
use crate::catalog::{CatalogError, CatalogStore, Collection, NativeQuery};
use crate::executor::JobRunner;
use crate::jobs::{Job, JobMode, JobStore, JobStoreError, RECENT_JOBS_LIMIT};
use crate::preview::{build_preview, BatchRequest, Preview, PreviewError, RowData};

/// Errors that can occur in batch operations.
#[derive(Error, Debug)]
pub enum BatchError {
    /// Job or document not found
    #[error("Not found")]
    NotFound,

    /// Invalid request shape or values
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Commit resolved to zero rows; user error, no job is created
    #[error("No rows selected for update")]
    EmptySelection,

    /// Store or filesystem failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<PreviewError> for BatchError {
    fn from(e: PreviewError) -> Self {
        match e {
            PreviewError::InvalidFilter(_) | PreviewError::TooManyRows(_) => {
                BatchError::InvalidInput(e.to_string())
            }
            PreviewError::Catalog(e) => BatchError::Internal(e.to_string()),
        }
    }
}

impl From<CatalogError> for BatchError {
    fn from(e: CatalogError) -> Self {
        BatchError::Internal(e.to_string())
    }
}

impl From<JobStoreError> for BatchError {
    fn from(e: JobStoreError) -> Self {
        BatchError::Internal(e.to_string())
    }
}

impl From<BackupError> for BatchError {
    fn from(e: BackupError) -> Self {
        BatchError::Internal(e.to_string())
    }
}

/// A flattened catalog row for spreadsheet round-tripping.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExportRow {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Tags comma-joined into a single cell
    pub tags: String,
}

/// Service for the admin batch pipeline.
pub struct BatchService {
    catalog: Arc<dyn CatalogStore>,
    jobs: Arc<JobStore>,
    backup_dir: PathBuf,
}

impl BatchService {
    pub fn new(catalog: Arc<dyn CatalogStore>, jobs: Arc<JobStore>, backup_dir: PathBuf) -> Self {
        Self {
            catalog,
            jobs,
            backup_dir,
        }
    }

    /// Dry run: compute what a commit would change. No writes.
    pub async fn preview(&self, req: &BatchRequest) -> Result<Preview, BatchError> {
        Ok(build_preview(self.catalog.as_ref(), req).await?)
    }

    /// Commit: re-derive the preview, snapshot every matched row to a backup
    /// file, create a pending job, and detach the chunked write phase. The
    /// returned job is still `pending`; callers poll for the outcome.
    pub async fn commit(
        &self,
        req: &BatchRequest,
        select_ids: Option<&[String]>,
        note: Option<String>,
    ) -> Result<Job, BatchError> {
        // Never trust a client-held preview; recompute against live data
        let preview = build_preview(self.catalog.as_ref(), req).await?;
        let matched = preview.rows.len() as u64;

        let selected: Vec<RowData> = match select_ids {
            Some(ids) => {
                let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
                preview
                    .rows
                    .iter()
                    .filter(|row| wanted.contains(row.id.as_str()))
                    .cloned()
                    .collect()
            }
            None => preview.rows.clone(),
        };
        if selected.is_empty() {
            return Err(BatchError::EmptySelection);
        }

        // Backup covers every matched row, selected or not, and must be on
        // disk before the first live write
        let file_name = backup_file_name();
        let backup_path = self.backup_dir.join(&file_name);
        write_backup(&backup_path, &preview.rows).await?;

        let mut job = Job::new(req.job_mode(), req.collection(), file_name, matched);
        job.note = note;
        self.jobs.put_job(&job).await?;

        tracing::info!(
            "Batch commit accepted: job {} ({} matched, {} selected)",
            job.id,
            matched,
            selected.len()
        );

        JobRunner::new(self.catalog.clone(), self.jobs.clone()).spawn(job.clone(), selected);
        Ok(job)
    }

    /// Replay a job's backup snapshot as a new job, writing the pre-mutation
    /// values back verbatim.
    pub async fn rollback(&self, job_id: &str) -> Result<Job, BatchError> {
        let original = self
            .jobs
            .get_job(job_id)
            .await?
            .ok_or(BatchError::NotFound)?;

        let backup_path = self.backup_dir.join(&original.backup_file);
        let backup_rows = read_backup(&backup_path).await.map_err(|e| {
            BatchError::Internal(format!(
                "Failed to read backup {}: {}",
                original.backup_file, e
            ))
        })?;

        let rows: Vec<RowData> = backup_rows
            .iter()
            .map(|b| RowData {
                id: b.id.clone(),
                name: b.name.clone(),
                current: b.row_state(),
                proposed: b.row_state(),
            })
            .collect();
        if rows.is_empty() {
            return Err(BatchError::EmptySelection);
        }

        let mut job = Job::new(
            JobMode::Rollback,
            original.collection,
            original.backup_file.clone(),
            rows.len() as u64,
        );
        job.original_job_id = Some(original.id.clone());
        self.jobs.put_job(&job).await?;

        tracing::info!(
            "Rollback accepted: job {} replays backup of job {}",
            job.id,
            original.id
        );

        JobRunner::new(self.catalog.clone(), self.jobs.clone()).spawn(job.clone(), rows);
        Ok(job)
    }

    /// Get one job by ID.
    pub async fn get_job(&self, id: &str) -> Result<Job, BatchError> {
        self.jobs.get_job(id).await?.ok_or(BatchError::NotFound)
    }

    /// The 20 most recently started jobs, newest first.
    pub async fn recent_jobs(&self) -> Result<Vec<Job>, BatchError> {
        Ok(self.jobs.recent_jobs(RECENT_JOBS_LIMIT).await?)
    }

    /// Flattened rows for external tooling.
    pub async fn export_rows(&self, collection: Collection) -> Result<Vec<ExportRow>, BatchError> {
        let docs = self
            .catalog
            .query(collection, &NativeQuery::All, None)
            .await?;
        Ok(docs
            .into_iter()
            .map(|doc| ExportRow {
                id: doc.id,
                name: doc.name.unwrap_or_default(),
                description: doc.description.unwrap_or_default(),
                tags: doc.tags.join(", "),
            })
            .collect())
    }
}
