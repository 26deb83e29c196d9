// In memory source of committed transactions.
//
// Purpose
// - Drive projectors in tests and local development without an event store.
//
// Responsibilities
// - Keep every written transaction in checkpoint order.
// - Catch a new subscriber up on history after its last checkpoint.
// - Deliver new transactions to live subscribers, returning their failures to the writer.

use crate::modules::projections::core::errors::ProjectorError;
use crate::modules::projections::core::transaction::{EventEnvelope, Transaction};
use crate::modules::projections::use_cases::project_transactions::handler::TransactionHandler;
use crate::shared::core::primitives::{Checkpoint, Headers};
use crate::shared::infrastructure::cancellation::CancellationToken;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

struct Subscriber {
    handler: Arc<dyn TransactionHandler>,
    cancellation: CancellationToken,
}

#[derive(Default)]
struct SourceState {
    history: Vec<Transaction>,
    subscribers: Vec<Subscriber>,
}

#[derive(Default)]
pub struct InMemoryEventSource {
    state: Mutex<SourceState>,
}

impl InMemoryEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers the history after `last_checkpoint` to `handler`, then every
    /// transaction written afterwards until `cancellation` fires.
    pub async fn subscribe(
        &self,
        last_checkpoint: Option<Checkpoint>,
        handler: Arc<dyn TransactionHandler>,
        cancellation: CancellationToken,
    ) -> Result<(), ProjectorError> {
        let mut state = self.state.lock().await;
        let backlog: Vec<Transaction> = state
            .history
            .iter()
            .filter(|t| last_checkpoint.is_none_or(|checkpoint| t.checkpoint > checkpoint))
            .cloned()
            .collect();
        if !backlog.is_empty() {
            handler.handle(&backlog, &cancellation).await?;
        }
        state.subscribers.push(Subscriber {
            handler,
            cancellation,
        });
        Ok(())
    }

    /// Commits `events` as one transaction of `stream_id` with the next checkpoint.
    pub async fn write(
        &self,
        stream_id: &str,
        events: Vec<EventEnvelope>,
    ) -> Result<Transaction, ProjectorError> {
        let mut state = self.state.lock().await;
        let transaction = Transaction {
            id: Uuid::now_v7().to_string(),
            stream_id: stream_id.to_string(),
            timestamp_utc: Utc::now(),
            checkpoint: state.history.last().map_or(1, |last| last.checkpoint + 1),
            events,
            headers: Headers::new(),
        };
        Self::append(&mut state, vec![transaction.clone()]).await?;
        Ok(transaction)
    }

    /// Commits prepared transactions as they are, checkpoints included.
    pub async fn write_transactions(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<(), ProjectorError> {
        let mut state = self.state.lock().await;
        Self::append(&mut state, transactions).await
    }

    pub async fn last_checkpoint(&self) -> Option<Checkpoint> {
        self.state.lock().await.history.last().map(|t| t.checkpoint)
    }

    async fn append(
        state: &mut SourceState,
        transactions: Vec<Transaction>,
    ) -> Result<(), ProjectorError> {
        state.history.extend(transactions.iter().cloned());
        state
            .subscribers
            .retain(|subscriber| !subscriber.cancellation.is_cancelled());
        for subscriber in &state.subscribers {
            subscriber
                .handler
                .handle(&transactions, &subscriber.cancellation)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod in_memory_event_source_tests {
    use super::*;
    use crate::shared::infrastructure::cancellation::CancellationSource;
    use crate::shell::catalog::ProductAdded;
    use crate::tests::fixtures::transactions::TransactionBuilder;
    use async_trait::async_trait;
    use rstest::{fixture, rstest};

    #[derive(Default)]
    struct RecordingHandler {
        received: std::sync::Mutex<Vec<Checkpoint>>,
        failing: bool,
    }

    impl RecordingHandler {
        fn received(&self) -> Vec<Checkpoint> {
            self.received.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TransactionHandler for RecordingHandler {
        async fn handle(
            &self,
            transactions: &[Transaction],
            _cancellation: &CancellationToken,
        ) -> Result<(), ProjectorError> {
            if self.failing {
                return Err(ProjectorError::Cancelled);
            }
            self.received
                .lock()
                .unwrap()
                .extend(transactions.iter().map(|t| t.checkpoint));
            Ok(())
        }
    }

    fn added(key: &str) -> EventEnvelope {
        EventEnvelope::new(ProductAdded {
            product_key: key.into(),
            category: "Hybrid".into(),
        })
    }

    #[fixture]
    fn before_each() -> (InMemoryEventSource, Arc<RecordingHandler>) {
        (InMemoryEventSource::new(), Arc::new(RecordingHandler::default()))
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_assign_increasing_checkpoints(
        before_each: (InMemoryEventSource, Arc<RecordingHandler>),
    ) {
        let (source, _) = before_each;
        let first = source.write("stream-1", vec![added("c350E")]).await.unwrap();
        let second = source.write("stream-1", vec![added("c400E")]).await.unwrap();

        assert_eq!(first.checkpoint, 1);
        assert_eq!(second.checkpoint, 2);
        assert_ne!(first.id, second.id);
        assert_eq!(source.last_checkpoint().await, Some(2));
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_catch_up_after_the_last_checkpoint_and_then_follow(
        before_each: (InMemoryEventSource, Arc<RecordingHandler>),
    ) {
        let (source, handler) = before_each;
        source.write("stream-1", vec![added("a")]).await.unwrap();
        source.write("stream-1", vec![added("b")]).await.unwrap();
        source.write("stream-1", vec![added("c")]).await.unwrap();

        source
            .subscribe(Some(1), handler.clone(), CancellationToken::none())
            .await
            .unwrap();
        source.write("stream-1", vec![added("d")]).await.unwrap();

        assert_eq!(handler.received(), vec![2, 3, 4]);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_stop_delivering_once_cancelled(
        before_each: (InMemoryEventSource, Arc<RecordingHandler>),
    ) {
        let (source, handler) = before_each;
        let cancellation = CancellationSource::new();
        source
            .subscribe(None, handler.clone(), cancellation.token())
            .await
            .unwrap();

        source.write("stream-1", vec![added("a")]).await.unwrap();
        cancellation.cancel();
        source.write("stream-1", vec![added("b")]).await.unwrap();

        assert_eq!(handler.received(), vec![1]);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_keep_the_checkpoints_of_prepared_transactions(
        before_each: (InMemoryEventSource, Arc<RecordingHandler>),
    ) {
        let (source, handler) = before_each;
        source
            .subscribe(None, handler.clone(), CancellationToken::none())
            .await
            .unwrap();

        source
            .write_transactions(vec![
                TransactionBuilder::new().with_checkpoint(10).build(),
                TransactionBuilder::new().with_checkpoint(20).build(),
            ])
            .await
            .unwrap();

        assert_eq!(handler.received(), vec![10, 20]);
        assert_eq!(source.last_checkpoint().await, Some(20));
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_return_handler_failures_to_the_writer() {
        let source = InMemoryEventSource::new();
        let handler = Arc::new(RecordingHandler {
            failing: true,
            ..RecordingHandler::default()
        });
        source
            .subscribe(None, handler, CancellationToken::none())
            .await
            .unwrap();

        let result = source.write("stream-1", vec![added("a")]).await;

        assert!(matches!(result, Err(ProjectorError::Cancelled)));
    }
}
