use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// A read model record maintained by a projector.
pub trait Projection: Serialize + DeserializeOwned + Send + Sync + 'static {
    type Key: Clone + Eq + Hash + fmt::Display + fmt::Debug + Send + Sync + 'static;

    /// Store collection the records live in.
    const COLLECTION: &'static str;

    /// A fresh record carrying only its identity.
    fn with_key(key: Self::Key) -> Self;

    fn key(&self) -> Self::Key;
}

/// Shared, mutable reference to a projection. Every holder (cache, map, tests)
/// observes the same instance.
pub struct ProjectionHandle<P: Projection> {
    key: P::Key,
    state: Arc<Mutex<P>>,
}

impl<P: Projection> ProjectionHandle<P> {
    pub fn new(projection: P) -> Self {
        Self {
            key: projection.key(),
            state: Arc::new(Mutex::new(projection)),
        }
    }

    pub fn key(&self) -> &P::Key {
        &self.key
    }

    pub async fn lock(&self) -> MutexGuard<'_, P> {
        self.state.lock().await
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl<P: Projection> Clone for ProjectionHandle<P> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            state: self.state.clone(),
        }
    }
}

impl<P: Projection> fmt::Debug for ProjectionHandle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectionHandle")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
