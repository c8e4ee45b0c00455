//! Redb-backed catalog store.
//!
//! One table per collection, document JSON keyed by ID. Batch writes run in
//! a single write transaction, which gives the executor its atomic-chunk
//! guarantee.

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::catalog::{CatalogDoc, CatalogError, CatalogStore, Collection, NativeQuery, RowState};

const COCKTAILS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("cocktails");
const INGREDIENTS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("ingredients");

fn table_for(collection: Collection) -> TableDefinition<'static, &'static str, &'static str> {
    match collection {
        Collection::Cocktails => COCKTAILS_TABLE,
        Collection::Ingredients => INGREDIENTS_TABLE,
    }
}

pub struct RedbCatalog {
    db: Arc<RwLock<Database>>,
}

impl RedbCatalog {
    /// Create or open a catalog database at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let db = Database::create(path).map_err(|e| CatalogError::Database(e.to_string()))?;
        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    /// Insert or replace a document. Used by import tooling and tests; the
    /// batch pipeline itself only patches existing documents.
    pub async fn upsert(&self, collection: Collection, doc: &CatalogDoc) -> Result<(), CatalogError> {
        let json = serde_json::to_string(doc)?;

        let db = self.db.write().await;
        let write_txn = db
            .begin_write()
            .map_err(|e| CatalogError::Database(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(table_for(collection))
                .map_err(|e| CatalogError::Database(e.to_string()))?;
            table
                .insert(doc.id.as_str(), json.as_str())
                .map_err(|e| CatalogError::Database(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| CatalogError::Database(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for RedbCatalog {
    async fn get(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<CatalogDoc>, CatalogError> {
        let db = self.db.read().await;
        let read_txn = db
            .begin_read()
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let table = match read_txn.open_table(table_for(collection)) {
            Ok(t) => t,
            Err(_) => return Ok(None), // Table doesn't exist yet
        };

        let Some(json) = table
            .get(id)
            .map_err(|e| CatalogError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        Ok(Some(serde_json::from_str(json.value())?))
    }

    async fn query(
        &self,
        collection: Collection,
        query: &NativeQuery,
        limit: Option<usize>,
    ) -> Result<Vec<CatalogDoc>, CatalogError> {
        let db = self.db.read().await;
        let read_txn = db
            .begin_read()
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let table = match read_txn.open_table(table_for(collection)) {
            Ok(t) => t,
            Err(_) => return Ok(Vec::new()),
        };

        // Keys are document IDs, so iteration order is already sorted by ID
        let mut docs = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| CatalogError::Database(e.to_string()))?
        {
            let (_, value) = entry.map_err(|e| CatalogError::Database(e.to_string()))?;
            let doc: CatalogDoc = serde_json::from_str(value.value())?;
            if query.matches(&doc) {
                docs.push(doc);
                if let Some(limit) = limit {
                    if docs.len() >= limit {
                        break;
                    }
                }
            }
        }
        Ok(docs)
    }

    async fn apply_patches(
        &self,
        collection: Collection,
        patches: &[(String, RowState)],
    ) -> Result<(), CatalogError> {
        let db = self.db.write().await;
        let write_txn = db
            .begin_write()
            .map_err(|e| CatalogError::Database(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(table_for(collection))
                .map_err(|e| CatalogError::Database(e.to_string()))?;

            for (id, patch) in patches {
                let mut doc: CatalogDoc = {
                    let Some(json) = table
                        .get(id.as_str())
                        .map_err(|e| CatalogError::Database(e.to_string()))?
                    else {
                        // Dropping the uncommitted transaction discards any
                        // updates already staged in this batch
                        return Err(CatalogError::NotFound(id.clone()));
                    };
                    serde_json::from_str(json.value())?
                };

                if let Some(description) = &patch.description {
                    doc.description = Some(description.clone());
                }
                if let Some(tags) = &patch.tags {
                    doc.tags = tags.clone();
                }

                let json = serde_json::to_string(&doc)?;
                table
                    .insert(id.as_str(), json.as_str())
                    .map_err(|e| CatalogError::Database(e.to_string()))?;
            }
        }
        write_txn
            .commit()
            .map_err(|e| CatalogError::Database(e.to_string()))?;
        Ok(())
    }
}
