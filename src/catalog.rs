//! Catalog document model and store abstraction.
//!
//! The batch pipeline never talks to a concrete database directly; it goes
//! through [`CatalogStore`], a minimal get/query/batch-write interface. The
//! server wires in the redb-backed store (`crate::store::RedbCatalog`);
//! tests use [`MemoryCatalog`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// The two document collections the pipeline operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Cocktails,
    Ingredients,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Cocktails => "cocktails",
            Collection::Ingredients => "ingredients",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A catalog document as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDoc {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `None` means the field is absent on the document, distinct from `""`.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CatalogDoc {
    /// Snapshot the fields the batch pipeline operates on.
    pub fn row_state(&self) -> RowState {
        RowState {
            description: self.description.clone(),
            tags: Some(self.tags.clone()),
        }
    }
}

/// A partial view of a document's mutable fields.
///
/// Doubles as the patch shape for batch writes: an unset field means "leave
/// the stored value alone", never "clear it".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl RowState {
    /// Resolve unset fields from `current`, producing the state a document
    /// would end up in if this patch were applied to it.
    pub fn merged_over(&self, current: &RowState) -> RowState {
        RowState {
            description: self
                .description
                .clone()
                .or_else(|| current.description.clone()),
            tags: self.tags.clone().or_else(|| current.tags.clone()),
        }
    }

    /// True when no field would change.
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.tags.is_none()
    }
}

/// The subset of predicates the document store can evaluate natively.
/// Everything else is a post-fetch filter (see `crate::filter`).
#[derive(Debug, Clone, PartialEq)]
pub enum NativeQuery {
    /// Full collection snapshot.
    All,
    /// Description equality: `Some(value)` matches `== value` (including the
    /// empty string); `None` matches documents with no description at all.
    DescriptionEq(Option<String>),
    /// Documents whose tag array contains at least one of these values.
    TagsAny(Vec<String>),
}

impl NativeQuery {
    pub fn matches(&self, doc: &CatalogDoc) -> bool {
        match self {
            NativeQuery::All => true,
            NativeQuery::DescriptionEq(value) => doc.description == *value,
            NativeQuery::TagsAny(values) => values.iter().any(|v| doc.tags.contains(v)),
        }
    }
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A batch write addressed a document that does not exist. The whole
    /// batch fails without applying.
    #[error("Document not found: {0}")]
    NotFound(String),
}

/// Store interface the batch pipeline is written against.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Fetch one document by ID.
    async fn get(&self, collection: Collection, id: &str)
        -> Result<Option<CatalogDoc>, CatalogError>;

    /// Run a native query, bounded by `limit` when given. Results are
    /// ordered by document ID.
    async fn query(
        &self,
        collection: Collection,
        query: &NativeQuery,
        limit: Option<usize>,
    ) -> Result<Vec<CatalogDoc>, CatalogError>;

    /// Apply field-level patches as one atomic batch. Fails without applying
    /// anything if a patch addresses a missing document.
    async fn apply_patches(
        &self,
        collection: Collection,
        patches: &[(String, RowState)],
    ) -> Result<(), CatalogError>;
}

/// In-memory catalog store used by tests and local experiments.
pub struct MemoryCatalog {
    collections: RwLock<HashMap<Collection, HashMap<String, CatalogDoc>>>,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace a document. Not part of [`CatalogStore`]; the batch
    /// pipeline itself never creates documents.
    pub async fn insert(&self, collection: Collection, doc: CatalogDoc) {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection)
            .or_default()
            .insert(doc.id.clone(), doc);
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn get(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<CatalogDoc>, CatalogError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn query(
        &self,
        collection: Collection,
        query: &NativeQuery,
        limit: Option<usize>,
    ) -> Result<Vec<CatalogDoc>, CatalogError> {
        let collections = self.collections.read().await;
        let mut docs: Vec<CatalogDoc> = collections
            .get(&collection)
            .map(|docs| docs.values().filter(|d| query.matches(d)).cloned().collect())
            .unwrap_or_default();
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(limit) = limit {
            docs.truncate(limit);
        }
        Ok(docs)
    }

    async fn apply_patches(
        &self,
        collection: Collection,
        patches: &[(String, RowState)],
    ) -> Result<(), CatalogError> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection).or_default();

        // Validate the whole batch before touching anything
        for (id, _) in patches {
            if !docs.contains_key(id) {
                return Err(CatalogError::NotFound(id.clone()));
            }
        }

        for (id, patch) in patches {
            if let Some(doc) = docs.get_mut(id) {
                if let Some(description) = &patch.description {
                    doc.description = Some(description.clone());
                }
                if let Some(tags) = &patch.tags {
                    doc.tags = tags.clone();
                }
            }
        }
        Ok(())
    }
}
