// Cooperative cancellation shared by the projector, the cache loaders and the exception policies.
//
// Purpose
// - Let a host stop a running projection between transactions and interrupt a waiting policy.
//
// Responsibilities
// - Broadcast a single cancelled flag to any number of tokens.
// - Offer both a synchronous check and an awaitable signal.

use std::sync::Arc;
use tokio::sync::watch;

/// Owner side of a cancellation signal. Cancelling is idempotent.
#[derive(Debug, Clone)]
pub struct CancellationSource {
    sender: Arc<watch::Sender<bool>>,
}

impl CancellationSource {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            receiver: Some(self.sender.subscribe()),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct CancellationToken {
    receiver: Option<watch::Receiver<bool>>,
}

impl CancellationToken {
    /// A token that is never cancelled.
    pub fn none() -> Self {
        Self { receiver: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.receiver
            .as_ref()
            .is_some_and(|receiver| *receiver.borrow())
    }

    /// Resolves once the source is cancelled. Pends forever for [`CancellationToken::none`]
    /// or when the source is dropped without cancelling.
    pub async fn cancelled(&self) {
        let Some(receiver) = &self.receiver else {
            return std::future::pending().await;
        };
        let mut receiver = receiver.clone();
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::none()
    }
}
