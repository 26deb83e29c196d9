use crate::shared::core::primitives::Checkpoint;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Durable progress of a projector, stored under the projector's state key in
/// the same storage transaction as the projections it wrote.
pub trait ProjectorState: Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: &'static str = "projector_state";

    fn with_id(id: &str) -> Self;

    fn checkpoint(&self) -> Checkpoint;

    fn set_checkpoint(&mut self, checkpoint: Checkpoint);

    fn set_last_update_utc(&mut self, at: DateTime<Utc>);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectorStateRecord {
    pub id: String,
    pub checkpoint: Checkpoint,
    pub last_update_utc: DateTime<Utc>,
}

impl ProjectorState for ProjectorStateRecord {
    fn with_id(id: &str) -> Self {
        Self {
            id: id.to_string(),
            checkpoint: 0,
            last_update_utc: DateTime::<Utc>::default(),
        }
    }

    fn checkpoint(&self) -> Checkpoint {
        self.checkpoint
    }

    fn set_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.checkpoint = checkpoint;
    }

    fn set_last_update_utc(&mut self, at: DateTime<Utc>) {
        self.last_update_utc = at;
    }
}
