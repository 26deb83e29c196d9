// Projection engine for one projection type.
//
// Purpose
// - Turn an ordered list of committed transactions into projection writes, exactly once.
//
// Responsibilities
// - Skip transactions at or below the persisted checkpoint.
// - Project transactions in batches, one storage transaction per batch.
// - Persist the projector state with the last checkpoint of each committed batch.
// - Clear caches and enrich the error whenever a batch fails.
// - Consult the exception policy and ignore, abort, retry or retry individually.
// - Stop between transactions when cancelled, without committing the running batch.

use crate::modules::projections::core::batches::{Batch, in_batches_of};
use crate::modules::projections::core::context::ProjectionContext;
use crate::modules::projections::core::errors::{
    BATCH_FAILED, CHECKPOINT_FAILED, ConfigError, ProjectionError, ProjectorError,
};
use crate::modules::projections::core::projection::Projection;
use crate::modules::projections::core::projector_state::{ProjectorState, ProjectorStateRecord};
use crate::modules::projections::core::resolution::{
    AlwaysAbort, ExceptionPolicy, ExceptionResolution,
};
use crate::modules::projections::core::transaction::Transaction;
use crate::modules::projections::use_cases::project_transactions::mapper::EventMapProjector;
use crate::modules::projections::use_cases::project_transactions::options::{
    PersistStateBehavior, ProjectorOptions,
};
use crate::shared::core::primitives::{Checkpoint, short_type_name};
use crate::shared::infrastructure::cancellation::CancellationToken;
use crate::shared::infrastructure::store::{Store, StoreError, StoreTransaction};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub type EnrichState<S> = Arc<dyn Fn(&mut S, &Transaction) -> anyhow::Result<()> + Send + Sync>;

/// Inbound port for anything that delivers transactions, such as a subscription.
#[async_trait]
pub trait TransactionHandler: Send + Sync {
    async fn handle(
        &self,
        transactions: &[Transaction],
        cancellation: &CancellationToken,
    ) -> Result<(), ProjectorError>;
}

enum BatchOutcome {
    Committed,
    Cancelled,
}

enum PolicyOutcome {
    Completed,
    RetryIndividually { attempts: u32 },
}

pub struct Projector<P: Projection, S: ProjectorState = ProjectorStateRecord> {
    store: Arc<dyn Store>,
    mapper: EventMapProjector<P>,
    batch_size: usize,
    state_key: String,
    persist_state: PersistStateBehavior,
    exception_policy: Arc<dyn ExceptionPolicy>,
    enrich_state: EnrichState<S>,
}

impl<P: Projection, S: ProjectorState> Projector<P, S> {
    pub fn new(
        store: Arc<dyn Store>,
        mapper: EventMapProjector<P>,
        options: ProjectorOptions,
    ) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self {
            store,
            mapper,
            batch_size: options.batch_size,
            state_key: options
                .state_key
                .unwrap_or_else(|| short_type_name::<P>().to_string()),
            persist_state: options.persist_state,
            exception_policy: Arc::new(AlwaysAbort),
            enrich_state: Arc::new(|_: &mut S, _: &Transaction| -> anyhow::Result<()> { Ok(()) }),
        })
    }

    pub fn with_exception_policy(mut self, policy: impl ExceptionPolicy + 'static) -> Self {
        self.exception_policy = Arc::new(policy);
        self
    }

    /// Lets the projector store extra information in its state, next to the checkpoint.
    pub fn with_enrich_state(
        mut self,
        enrich: impl Fn(&mut S, &Transaction) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.enrich_state = Arc::new(enrich);
        self
    }

    pub fn state_key(&self) -> &str {
        &self.state_key
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn mapper(&self) -> &EventMapProjector<P> {
        &self.mapper
    }

    /// Reads the committed projection from its own session. The engine's cache is
    /// bypassed, since it may hold writes of a batch that is still running.
    pub async fn find(&self, key: &P::Key) -> Result<Option<P>, ProjectorError> {
        let session = self.store.begin().await.map_err(ProjectorError::State)?;
        let found = session.get::<P>(P::COLLECTION, &key.to_string()).await;
        self.release(&session).await;
        found.map_err(ProjectorError::State)
    }

    pub async fn get_state(&self) -> Result<Option<S>, ProjectorError> {
        let session = self.store.begin().await.map_err(ProjectorError::State)?;
        let state = session.get::<S>(S::COLLECTION, &self.state_key).await;
        self.release(&session).await;
        state.map_err(ProjectorError::State)
    }

    /// Checkpoint of the last committed batch, `None` when nothing was ever committed.
    pub async fn get_last_checkpoint(&self) -> Result<Option<Checkpoint>, ProjectorError> {
        Ok(self.get_state().await?.map(|state| state.checkpoint()))
    }

    /// Projects `transactions` in order. Callers must not run two `handle`
    /// calls on the same projector concurrently.
    pub async fn handle(
        &self,
        transactions: &[Transaction],
        cancellation: &CancellationToken,
    ) -> Result<(), ProjectorError> {
        let last_checkpoint = self.get_last_checkpoint().await?;
        let pending: Vec<Transaction> = transactions
            .iter()
            .filter(|transaction| {
                last_checkpoint.is_none_or(|checkpoint| transaction.checkpoint > checkpoint)
            })
            .cloned()
            .collect();
        if pending.len() < transactions.len() {
            debug!(
                projector = %self.state_key,
                skipped = transactions.len() - pending.len(),
                "skipping already projected transactions"
            );
        }

        for batch in in_batches_of(pending, self.batch_size) {
            self.project_under_policy(&batch, cancellation).await?;
            if cancellation.is_cancelled() {
                info!(projector = %self.state_key, "projection cancelled");
                break;
            }
        }
        Ok(())
    }

    async fn project_under_policy(
        &self,
        batch: &Batch<Transaction>,
        cancellation: &CancellationToken,
    ) -> Result<(), ProjectorError> {
        let outcome = self
            .project_with_retries(batch.items(), batch.is_last(), 0, false, cancellation)
            .await?;
        let PolicyOutcome::RetryIndividually { attempts } = outcome else {
            return Ok(());
        };

        let count = batch.len();
        for (index, transaction) in batch.items().iter().enumerate() {
            let is_last = batch.is_last() && index + 1 == count;
            self.project_with_retries(
                std::slice::from_ref(transaction),
                is_last,
                attempts,
                true,
                cancellation,
            )
            .await?;
        }
        Ok(())
    }

    async fn project_with_retries(
        &self,
        transactions: &[Transaction],
        is_last: bool,
        mut attempts: u32,
        individual: bool,
        cancellation: &CancellationToken,
    ) -> Result<PolicyOutcome, ProjectorError> {
        loop {
            attempts = attempts.saturating_add(1);
            let error = match self
                .project_transaction_batch(transactions, is_last, cancellation)
                .await
            {
                Ok(_) => return Ok(PolicyOutcome::Completed),
                Err(error) => error,
            };

            let resolution = tokio::select! {
                biased;
                _ = cancellation.cancelled() => return Err(ProjectorError::Cancelled),
                resolution = self.exception_policy.resolve(&error, attempts, cancellation) => resolution,
            };
            warn!(
                projector = %self.state_key,
                attempts,
                ?resolution,
                error = %error,
                "failed to project transaction batch"
            );

            match resolution {
                ExceptionResolution::Ignore => return Ok(PolicyOutcome::Completed),
                ExceptionResolution::Retry => continue,
                ExceptionResolution::Abort => {
                    error!(projector = %self.state_key, error = %error, "aborting projection");
                    return Err(ProjectorError::Projection(error));
                }
                ExceptionResolution::RetryIndividual if individual => {
                    return Err(ProjectorError::NestedIndividualRetry(error));
                }
                ExceptionResolution::RetryIndividual => {
                    return Ok(PolicyOutcome::RetryIndividually { attempts });
                }
            }
        }
    }

    async fn project_transaction_batch(
        &self,
        transactions: &[Transaction],
        is_last: bool,
        cancellation: &CancellationToken,
    ) -> Result<BatchOutcome, ProjectionError> {
        match self
            .try_project_transaction_batch(transactions, is_last, cancellation)
            .await
        {
            Ok(BatchOutcome::Committed) => Ok(BatchOutcome::Committed),
            Ok(BatchOutcome::Cancelled) => {
                self.mapper.clear_caches().await;
                Ok(BatchOutcome::Cancelled)
            }
            Err(error) => {
                self.mapper.clear_caches().await;
                Err(error.in_batch(std::any::type_name::<P>(), transactions))
            }
        }
    }

    async fn try_project_transaction_batch(
        &self,
        transactions: &[Transaction],
        is_last: bool,
        cancellation: &CancellationToken,
    ) -> Result<BatchOutcome, ProjectionError> {
        let session = self
            .store
            .begin()
            .await
            .map_err(|error| ProjectionError::storage(BATCH_FAILED, error))?;

        let mut handled = false;
        for transaction in transactions {
            if cancellation.is_cancelled() {
                self.release(&session).await;
                return Ok(BatchOutcome::Cancelled);
            }
            match self.project_transaction(transaction, &session).await {
                Ok(transaction_handled) => handled |= transaction_handled,
                Err(error) => {
                    self.release(&session).await;
                    return Err(error);
                }
            }
        }

        let persist = match self.persist_state {
            PersistStateBehavior::EveryBatch => true,
            PersistStateBehavior::DirtyBatch => handled || is_last,
        };
        if let Some(last) = transactions.last().filter(|_| persist) {
            if let Err(error) = self.store_last_checkpoint(&session, last).await {
                self.release(&session).await;
                return Err(error);
            }
        }

        if let Err(error) = session.commit().await {
            self.release(&session).await;
            return Err(ProjectionError::storage(BATCH_FAILED, error));
        }
        debug!(
            projector = %self.state_key,
            transactions = transactions.len(),
            checkpoint = transactions.last().map(|t| t.checkpoint),
            "committed transaction batch"
        );
        Ok(BatchOutcome::Committed)
    }

    async fn project_transaction(
        &self,
        transaction: &Transaction,
        session: &Arc<dyn StoreTransaction>,
    ) -> Result<bool, ProjectionError> {
        let mut handled = false;
        for envelope in &transaction.events {
            let context = ProjectionContext::for_event(transaction, envelope, session.clone());
            handled |= self
                .mapper
                .project_event(envelope, &context)
                .await
                .map_err(|error| error.at_event(&transaction.id, envelope))?;
        }
        Ok(handled)
    }

    async fn store_last_checkpoint(
        &self,
        session: &Arc<dyn StoreTransaction>,
        transaction: &Transaction,
    ) -> Result<(), ProjectionError> {
        let existing = session
            .get::<S>(S::COLLECTION, &self.state_key)
            .await
            .map_err(|error| ProjectionError::checkpoint(CHECKPOINT_FAILED, error))?;
        let mut state = existing.unwrap_or_else(|| S::with_id(&self.state_key));
        state.set_checkpoint(transaction.checkpoint);
        state.set_last_update_utc(Utc::now());
        (self.enrich_state)(&mut state, transaction)
            .map_err(|error| ProjectionError::checkpoint(CHECKPOINT_FAILED, error))?;
        session
            .save(S::COLLECTION, &self.state_key, &state)
            .await
            .map_err(|error| ProjectionError::checkpoint(CHECKPOINT_FAILED, error))
    }

    async fn release(&self, session: &Arc<dyn StoreTransaction>) {
        if let Err(error) = session.rollback().await.or_else(|error| match error {
            StoreError::Completed => Ok(()),
            other => Err(other),
        }) {
            warn!(projector = %self.state_key, error = %error, "failed to roll back storage transaction");
        }
    }
}

#[async_trait]
impl<P: Projection, S: ProjectorState> TransactionHandler for Projector<P, S> {
    async fn handle(
        &self,
        transactions: &[Transaction],
        cancellation: &CancellationToken,
    ) -> Result<(), ProjectorError> {
        Projector::handle(self, transactions, cancellation).await
    }
}
