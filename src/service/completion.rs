//! One-shot completion results, observable any number of times.

use tokio::sync::watch;

use crate::document::MigrationKey;
use crate::error::MigrationError;

/// Final outcome of one migration instance.
pub type MigrationResult = Result<(), MigrationError>;

/// Read side of an instance's completion result.
///
/// The value resolves exactly once; every observer, on any task, sees the
/// same value no matter when it asks.
#[derive(Clone)]
pub struct CompletionHandle {
    key: MigrationKey,
    rx: watch::Receiver<Option<MigrationResult>>,
}

impl CompletionHandle {
    pub fn migration_key(&self) -> MigrationKey {
        self.key
    }

    /// Wait for the result. Returns immediately once resolved.
    pub async fn result(&self) -> MigrationResult {
        let mut rx = self.rx.clone();
        let outcome = rx.wait_for(|outcome| outcome.is_some()).await;
        match outcome {
            Ok(outcome) => outcome.clone().unwrap_or(Err(MigrationError::Interrupted)),
            // Resolver dropped without resolving: the owning task was
            // torn down mid-flight.
            Err(_) => Err(MigrationError::Interrupted),
        }
    }

    /// The result if already resolved, without waiting.
    pub fn try_result(&self) -> Option<MigrationResult> {
        self.rx.borrow().clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

/// Write side. Held by the instance; the first `resolve` wins.
pub(crate) struct CompletionResolver {
    tx: watch::Sender<Option<MigrationResult>>,
}

impl CompletionResolver {
    pub(crate) fn new_pair(key: MigrationKey) -> (Self, CompletionHandle) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, CompletionHandle { key, rx })
    }

    /// Resolve the result. Returns false if already resolved; the stored
    /// value never changes after the first call.
    pub(crate) fn resolve(&self, result: MigrationResult) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(result);
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_resolution_wins_and_repeats_for_every_observer() {
        let key = MigrationKey::generate();
        let (resolver, handle) = CompletionResolver::new_pair(key);
        assert!(!handle.is_resolved());

        assert!(resolver.resolve(Err(MigrationError::Interrupted)));
        assert!(!resolver.resolve(Ok(())));

        assert_eq!(handle.result().await, Err(MigrationError::Interrupted));
        assert_eq!(handle.result().await, Err(MigrationError::Interrupted));
        let second = handle.clone();
        assert_eq!(second.result().await, Err(MigrationError::Interrupted));
        assert_eq!(handle.migration_key(), key);
    }

    #[tokio::test]
    async fn waiters_block_until_resolution() {
        let (resolver, handle) = CompletionResolver::new_pair(MigrationKey::generate());
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.result().await })
        };
        assert!(!waiter.is_finished());
        resolver.resolve(Ok(()));
        assert_eq!(waiter.await.expect("waiter"), Ok(()));
    }
}
