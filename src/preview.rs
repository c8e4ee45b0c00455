//! Preview builder: the dry-run half of the pipeline.
//!
//! Given a selection (a server-side filter or a pasted row list), computes
//! per candidate document its current state, the proposed state after the
//! operation, and a skip/include decision. Never writes. Commit re-runs this
//! same computation rather than trusting a client-held preview.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::catalog::{CatalogError, CatalogStore, Collection, RowState};
use crate::filter::{FilterSpec, InvalidFilter};
use crate::jobs::JobMode;
use crate::ops::{apply_operation, Operation};
use crate::tags::{parse_tags_cell, TagsCell};

/// Response-size cap on preview rows, and the paste-mode input ceiling.
pub const MAX_PREVIEW_ROWS: usize = 1000;

/// Prefix marking descriptions produced by the initial data import.
pub const PLACEHOLDER_PREFIX: &str = "Imported ingredient";

/// One candidate document: its state at preview time and the proposed patch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowData {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub current: RowState,
    pub proposed: RowState,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Restrict the pool to rows whose current description is empty or still
    /// carries the import placeholder prefix.
    #[serde(default, rename = "onlyImportedPlaceholders")]
    pub only_imported_placeholders: bool,
    /// Skip rows where applying the operation changes nothing.
    #[serde(default = "default_true", rename = "skipIfSame")]
    pub skip_if_same: bool,
}

fn default_true() -> bool {
    true
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            only_imported_placeholders: false,
            skip_if_same: true,
        }
    }
}

/// A pasted row: caller-supplied proposed values for one document ID.
#[derive(Debug, Clone, Deserialize)]
pub struct PasteRow {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub proposed: PastePatch,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PastePatch {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<TagsCell>,
}

/// The discriminated preview/commit request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum BatchRequest {
    Query {
        collection: Collection,
        filters: FilterSpec,
        operation: Operation,
        #[serde(default)]
        options: BatchOptions,
    },
    Paste {
        collection: Collection,
        rows: Vec<PasteRow>,
        #[serde(default)]
        options: BatchOptions,
    },
}

impl BatchRequest {
    pub fn collection(&self) -> Collection {
        match self {
            BatchRequest::Query { collection, .. } => *collection,
            BatchRequest::Paste { collection, .. } => *collection,
        }
    }

    pub fn job_mode(&self) -> JobMode {
        match self {
            BatchRequest::Query { .. } => JobMode::Query,
            BatchRequest::Paste { .. } => JobMode::Paste,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PreviewWarnings {
    pub duplicates: u64,
}

/// Result of a preview computation. `rows` is truncated to
/// [`MAX_PREVIEW_ROWS`]; `will_update`, `skipped` and `missing` reflect the
/// full candidate set.
#[derive(Debug, Clone)]
pub struct Preview {
    pub rows: Vec<RowData>,
    pub will_update: usize,
    pub skipped: u64,
    pub missing: Vec<String>,
    pub warnings: PreviewWarnings,
}

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error(transparent)]
    InvalidFilter(#[from] InvalidFilter),

    #[error("Too many pasted rows: {0} (max {MAX_PREVIEW_ROWS})")]
    TooManyRows(usize),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Decide whether a row is excluded from the commit set. Either condition
/// alone skips the row.
fn should_skip(current: &RowState, proposed: &RowState, options: &BatchOptions) -> bool {
    if options.only_imported_placeholders {
        if let Some(description) = &current.description {
            if !description.is_empty() && !description.starts_with(PLACEHOLDER_PREFIX) {
                return true;
            }
        }
    }
    if options.skip_if_same && proposed.merged_over(current) == *current {
        return true;
    }
    false
}

/// Run the preview computation for a request. Read-only.
pub async fn build_preview(
    catalog: &dyn CatalogStore,
    req: &BatchRequest,
) -> Result<Preview, PreviewError> {
    match req {
        BatchRequest::Query {
            collection,
            filters,
            operation,
            options,
        } => build_query_preview(catalog, *collection, filters, operation, options).await,
        BatchRequest::Paste {
            collection,
            rows,
            options,
        } => build_paste_preview(catalog, *collection, rows, options).await,
    }
}

async fn build_query_preview(
    catalog: &dyn CatalogStore,
    collection: Collection,
    filters: &FilterSpec,
    operation: &Operation,
    options: &BatchOptions,
) -> Result<Preview, PreviewError> {
    filters.validate()?;

    let snapshot = catalog
        .query(collection, &filters.to_native(), filters.limit)
        .await?;

    let mut rows = Vec::new();
    let mut skipped = 0u64;
    for doc in snapshot {
        // Residual predicate for modes the store couldn't evaluate natively.
        // Failing documents are dropped from the candidate set entirely, not
        // counted as skipped.
        if !filters.matches(&doc) {
            continue;
        }
        let current = doc.row_state();
        let proposed = apply_operation(&current, operation);
        if should_skip(&current, &proposed, options) {
            skipped += 1;
            continue;
        }
        rows.push(RowData {
            id: doc.id,
            name: doc.name,
            current,
            proposed,
        });
    }

    let will_update = rows.len();
    rows.truncate(MAX_PREVIEW_ROWS);

    Ok(Preview {
        rows,
        will_update,
        skipped,
        missing: Vec::new(),
        warnings: PreviewWarnings::default(),
    })
}

async fn build_paste_preview(
    catalog: &dyn CatalogStore,
    collection: Collection,
    pasted: &[PasteRow],
    options: &BatchOptions,
) -> Result<Preview, PreviewError> {
    if pasted.len() > MAX_PREVIEW_ROWS {
        return Err(PreviewError::TooManyRows(pasted.len()));
    }

    // Dedupe by ID: first occurrence fixes the position, last occurrence
    // wins the data.
    let mut order: Vec<&str> = Vec::new();
    let mut by_id: HashMap<&str, &PasteRow> = HashMap::new();
    let mut duplicates = 0u64;
    for row in pasted {
        if by_id.insert(row.id.as_str(), row).is_some() {
            duplicates += 1;
        } else {
            order.push(row.id.as_str());
        }
    }

    let mut rows = Vec::new();
    let mut skipped = 0u64;
    let mut missing = Vec::new();
    for id in order {
        let Some(row) = by_id.get(id) else { continue };
        let Some(doc) = catalog.get(collection, id).await? else {
            missing.push(id.to_string());
            continue;
        };
        let current = doc.row_state();
        let proposed = RowState {
            description: row.proposed.description.clone(),
            tags: row.proposed.tags.as_ref().map(parse_tags_cell),
        };
        if should_skip(&current, &proposed, options) {
            skipped += 1;
            continue;
        }
        rows.push(RowData {
            id: doc.id,
            name: row.name.clone().or(doc.name),
            current,
            proposed,
        });
    }

    let will_update = rows.len();
    rows.truncate(MAX_PREVIEW_ROWS);

    Ok(Preview {
        rows,
        will_update,
        skipped,
        missing,
        warnings: PreviewWarnings { duplicates },
    })
}
