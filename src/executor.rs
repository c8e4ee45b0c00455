//! Chunked commit executor and the background job continuation.
//!
//! Writes happen in bounded atomic batches, strictly sequentially, so the
//! persisted counters are always a prefix of the full write set. A chunk
//! failure stops the job; completed chunks stay applied and recovery is the
//! explicit rollback flow.

use chrono::Utc;
use std::sync::Arc;

use crate::catalog::{CatalogError, CatalogStore, RowState};
use crate::jobs::{Job, JobError, JobStatus, JobStore};
use crate::preview::RowData;

/// Writes per atomic batch. The document store caps a batch at 500 write
/// operations; 450 leaves headroom.
pub const CHUNK_SIZE: usize = 450;

/// Apply the proposed patches in fixed-size atomic batches, bumping
/// `written` after each successful batch and checkpointing the job record
/// when a job store is given.
///
/// A failed batch propagates immediately; earlier batches remain committed.
pub async fn update_docs_in_chunks(
    catalog: &dyn CatalogStore,
    jobs: Option<&JobStore>,
    job: &mut Job,
    rows: &[RowData],
) -> Result<(), CatalogError> {
    for chunk in rows.chunks(CHUNK_SIZE) {
        let patches: Vec<(String, RowState)> = chunk
            .iter()
            .map(|row| (row.id.clone(), row.proposed.clone()))
            .collect();
        catalog.apply_patches(job.collection, &patches).await?;
        job.counts.written += chunk.len() as u64;

        if let Some(jobs) = jobs {
            // Checkpoint failures don't fail the write; the final persist
            // will catch the record up
            if let Err(e) = jobs.put_job(job).await {
                tracing::warn!("Failed to checkpoint job {}: {}", job.id, e);
            }
        }
    }
    Ok(())
}

/// Owns the write phase of a job: the only writer of its record once the
/// commit handler has returned.
pub struct JobRunner {
    catalog: Arc<dyn CatalogStore>,
    jobs: Arc<JobStore>,
}

impl JobRunner {
    pub fn new(catalog: Arc<dyn CatalogStore>, jobs: Arc<JobStore>) -> Self {
        Self { catalog, jobs }
    }

    /// Detach the write phase. The commit handler returns to the client
    /// while this runs; callers poll the job store for the outcome.
    pub fn spawn(self, job: Job, rows: Vec<RowData>) {
        tokio::spawn(async move {
            self.run(job, rows).await;
        });
    }

    /// pending → in_progress → done | failed.
    pub async fn run(&self, mut job: Job, rows: Vec<RowData>) {
        job.status = JobStatus::InProgress;
        if let Err(e) = self.jobs.put_job(&job).await {
            tracing::error!("Failed to mark job {} in progress: {}", job.id, e);
        }

        tracing::info!(
            "Batch job {} started: {} rows against {}",
            job.id,
            rows.len(),
            job.collection
        );

        match update_docs_in_chunks(self.catalog.as_ref(), Some(&self.jobs), &mut job, &rows).await
        {
            Ok(()) => {
                job.status = JobStatus::Done;
                job.finished_at = Some(Utc::now());
                tracing::info!("Batch job {} done: {} written", job.id, job.counts.written);
            }
            Err(e) => {
                job.status = JobStatus::Failed;
                job.counts.errors += 1;
                job.errors = Some(vec![JobError {
                    message: e.to_string(),
                }]);
                job.finished_at = Some(Utc::now());
                tracing::error!(
                    "Batch job {} failed after {} writes: {}",
                    job.id,
                    job.counts.written,
                    e
                );
            }
        }

        if let Err(e) = self.jobs.put_job(&job).await {
            tracing::error!("Failed to persist final state of job {}: {}", job.id, e);
        }
    }
}
