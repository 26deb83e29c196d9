// In memory implementation of the Store port.
//
// Purpose
// - Back projector tests and the sample host without a database.
//
// Responsibilities
// - Keep committed documents per (collection, key).
// - Stage writes per transaction and apply them atomically on commit.
// - Enforce optional unique indexes at commit time.
// - Simulate an unavailable backend through an offline toggle.

use crate::shared::infrastructure::store::{Store, StoreError, StoreTransaction};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};

type DocumentKey = (String, String);
type Documents = HashMap<DocumentKey, Value>;
type StagedChanges = HashMap<DocumentKey, Option<Value>>;

#[derive(Debug, Clone)]
struct UniqueIndex {
    collection: String,
    field: String,
}

#[derive(Default)]
pub struct InMemoryStore {
    documents: Arc<RwLock<Documents>>,
    unique_indexes: Arc<Vec<UniqueIndex>>,
    offline: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects commits that leave two documents of `collection` with the same
    /// non-null value for `field`.
    pub fn with_unique_index(mut self, collection: impl Into<String>, field: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.unique_indexes).push(UniqueIndex {
            collection: collection.into(),
            field: field.into(),
        });
        self
    }

    pub fn toggle_offline(&self) {
        self.offline.fetch_xor(true, Ordering::SeqCst);
    }

    /// Committed document, bypassing any transaction.
    pub async fn document(&self, collection: &str, key: &str) -> Option<Value> {
        self.documents
            .read()
            .await
            .get(&(collection.to_string(), key.to_string()))
            .cloned()
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.documents
            .read()
            .await
            .keys()
            .filter(|(c, _)| c == collection)
            .count()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Arc<dyn StoreTransaction>, StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("Store offline".into()));
        }
        Ok(Arc::new(InMemoryTransaction {
            documents: self.documents.clone(),
            unique_indexes: self.unique_indexes.clone(),
            offline: self.offline.clone(),
            staged: Mutex::new(Some(StagedChanges::new())),
        }))
    }
}

pub struct InMemoryTransaction {
    documents: Arc<RwLock<Documents>>,
    unique_indexes: Arc<Vec<UniqueIndex>>,
    offline: Arc<AtomicBool>,
    staged: Mutex<Option<StagedChanges>>,
}

impl InMemoryTransaction {
    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Backend("Store offline".into()))
        } else {
            Ok(())
        }
    }

    async fn stage(&self, key: DocumentKey, change: Option<Value>) -> Result<(), StoreError> {
        self.ensure_online()?;
        let mut staged = self.staged.lock().await;
        let changes = staged.as_mut().ok_or(StoreError::Completed)?;
        changes.insert(key, change);
        Ok(())
    }

    fn check_unique_indexes(&self, documents: &Documents) -> Result<(), StoreError> {
        for index in self.unique_indexes.iter() {
            let mut seen = HashSet::new();
            for ((collection, key), document) in documents {
                if collection != &index.collection {
                    continue;
                }
                let Some(value) = document.get(&index.field).filter(|v| !v.is_null()) else {
                    continue;
                };
                if !seen.insert(value.to_string()) {
                    return Err(StoreError::ConstraintViolation(format!(
                        "duplicate value {} for {}.{} (key {})",
                        value, collection, index.field, key
                    )));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn load_document(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<Value>, StoreError> {
        self.ensure_online()?;
        let staged = self.staged.lock().await;
        let changes = staged.as_ref().ok_or(StoreError::Completed)?;
        let key = (collection.to_string(), key.to_string());
        if let Some(change) = changes.get(&key) {
            return Ok(change.clone());
        }
        Ok(self.documents.read().await.get(&key).cloned())
    }

    async fn save_document(
        &self,
        collection: &str,
        key: &str,
        document: Value,
    ) -> Result<(), StoreError> {
        self.stage((collection.to_string(), key.to_string()), Some(document))
            .await
    }

    async fn delete_document(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        self.stage((collection.to_string(), key.to_string()), None)
            .await
    }

    async fn list_documents(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        self.ensure_online()?;
        let staged = self.staged.lock().await;
        let changes = staged.as_ref().ok_or(StoreError::Completed)?;
        let mut merged: BTreeMap<String, Value> = self
            .documents
            .read()
            .await
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|((_, k), v)| (k.clone(), v.clone()))
            .collect();
        for ((c, k), change) in changes.iter() {
            if c != collection {
                continue;
            }
            match change {
                Some(document) => {
                    merged.insert(k.clone(), document.clone());
                }
                None => {
                    merged.remove(k);
                }
            }
        }
        Ok(merged.into_values().collect())
    }

    async fn commit(&self) -> Result<(), StoreError> {
        self.ensure_online()?;
        let changes = self
            .staged
            .lock()
            .await
            .take()
            .ok_or(StoreError::Completed)?;
        let mut documents = self.documents.write().await;
        let mut next = documents.clone();
        for (key, change) in changes {
            match change {
                Some(document) => {
                    next.insert(key, document);
                }
                None => {
                    next.remove(&key);
                }
            }
        }
        self.check_unique_indexes(&next)?;
        *documents = next;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), StoreError> {
        self.staged
            .lock()
            .await
            .take()
            .map(|_| ())
            .ok_or(StoreError::Completed)
    }
}
