use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("transaction already completed")]
    Completed,

    #[error("failed to (de)serialize a document in {collection}: {source}")]
    Serialization {
        collection: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Opens units of work against the backing store.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Arc<dyn StoreTransaction>, StoreError>;
}

/// A single unit of work. Writes stay invisible to other transactions until
/// [`StoreTransaction::commit`] succeeds; after commit or rollback every
/// further call fails with [`StoreError::Completed`].
#[async_trait]
pub trait StoreTransaction: Send + Sync {
    async fn load_document(&self, collection: &str, key: &str)
    -> Result<Option<Value>, StoreError>;

    async fn save_document(
        &self,
        collection: &str,
        key: &str,
        document: Value,
    ) -> Result<(), StoreError>;

    async fn delete_document(&self, collection: &str, key: &str) -> Result<(), StoreError>;

    async fn list_documents(&self, collection: &str) -> Result<Vec<Value>, StoreError>;

    async fn commit(&self) -> Result<(), StoreError>;

    async fn rollback(&self) -> Result<(), StoreError>;
}

impl dyn StoreTransaction {
    pub async fn get<R: DeserializeOwned>(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<R>, StoreError> {
        match self.load_document(collection, key).await? {
            Some(document) => serde_json::from_value(document)
                .map(Some)
                .map_err(|source| StoreError::Serialization {
                    collection: collection.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    pub async fn save<R: Serialize + Sync>(
        &self,
        collection: &str,
        key: &str,
        record: &R,
    ) -> Result<(), StoreError> {
        let document =
            serde_json::to_value(record).map_err(|source| StoreError::Serialization {
                collection: collection.to_string(),
                source,
            })?;
        self.save_document(collection, key, document).await
    }

    pub async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        self.delete_document(collection, key).await
    }

    pub async fn list<R: DeserializeOwned>(&self, collection: &str) -> Result<Vec<R>, StoreError> {
        self.list_documents(collection)
            .await?
            .into_iter()
            .map(|document| {
                serde_json::from_value(document).map_err(|source| StoreError::Serialization {
                    collection: collection.to_string(),
                    source,
                })
            })
            .collect()
    }
}

pub mod in_memory;
