use crate::modules::projections::core::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// When the projector state (checkpoint) is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistStateBehavior {
    /// After every batch.
    #[default]
    EveryBatch,
    /// Only after batches that handled at least one event, and after the last batch.
    DirtyBatch,
}

impl FromStr for PersistStateBehavior {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "every_batch" => Ok(Self::EveryBatch),
            "dirty_batch" => Ok(Self::DirtyBatch),
            other => Err(ConfigError::InvalidEnvironment {
                name: "PROJECTOR_PERSIST_STATE".into(),
                value: other.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectorOptions {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Identity of the projector state record. Defaults to the projection type name.
    #[serde(default)]
    pub state_key: Option<String>,
    #[serde(default)]
    pub persist_state: PersistStateBehavior,
}

fn default_batch_size() -> usize {
    1
}

impl Default for ProjectorOptions {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            state_key: None,
            persist_state: PersistStateBehavior::default(),
        }
    }
}

impl ProjectorOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_state_key(mut self, state_key: impl Into<String>) -> Self {
        self.state_key = Some(state_key.into());
        self
    }

    pub fn with_persist_state(mut self, persist_state: PersistStateBehavior) -> Self {
        self.persist_state = persist_state;
        self
    }

    /// Reads `PROJECTOR_BATCH_SIZE`, `PROJECTOR_STATE_KEY` and
    /// `PROJECTOR_PERSIST_STATE`, falling back to the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let options = Self {
            batch_size: env_var("PROJECTOR_BATCH_SIZE")?.unwrap_or_else(default_batch_size),
            state_key: env_var("PROJECTOR_STATE_KEY")?,
            persist_state: match std::env::var("PROJECTOR_PERSIST_STATE") {
                Ok(value) => value.parse()?,
                Err(_) => PersistStateBehavior::default(),
            },
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size < 1 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }
        if self.state_key.as_deref().is_some_and(|key| key.trim().is_empty()) {
            return Err(ConfigError::MissingStateKey);
        }
        Ok(())
    }
}

/// Parses an optional environment variable.
pub(crate) fn env_var<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvironment {
                name: name.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}
