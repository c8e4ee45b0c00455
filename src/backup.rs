//! Backup snapshots: the pre-mutation state of every matched row, written to
//! disk before any live document is touched. Rollback replays these files.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs;

use crate::catalog::RowState;
use crate::preview::RowData;

/// One row of a backup file. `description`/`tags` are the document's values
/// at commit time, with empty defaults so rollback always writes both fields
/// back explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRow {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl BackupRow {
    pub fn from_row(row: &RowData) -> Self {
        Self {
            id: row.id.clone(),
            name: row.name.clone(),
            description: row.current.description.clone().unwrap_or_default(),
            tags: row.current.tags.clone().unwrap_or_default(),
        }
    }

    /// The row state rollback writes back: the snapshot, verbatim.
    pub fn row_state(&self) -> RowState {
        RowState {
            description: Some(self.description.clone()),
            tags: Some(self.tags.clone()),
        }
    }
}

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Derive a backup file name from the current time: whole-second UTC
/// timestamp with colons swapped for dashes (filesystem safety).
pub fn backup_file_name() -> String {
    format!("batch_{}.json", Utc::now().format("%Y-%m-%dT%H-%M-%S"))
}

/// Write the pre-mutation snapshot for a job. Creates the parent directory
/// if needed. Must complete before the first live write of the job.
pub async fn write_backup(path: &Path, rows: &[RowData]) -> Result<(), BackupError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let backup_rows: Vec<BackupRow> = rows.iter().map(BackupRow::from_row).collect();
    let json = serde_json::to_string_pretty(&backup_rows)?;
    fs::write(path, json).await?;
    Ok(())
}

/// Load a backup file for rollback.
pub async fn read_backup(path: &Path) -> Result<Vec<BackupRow>, BackupError> {
    let json = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&json)?)
}
