//! The per-migration recipient workflow.
//!
//! One instance wraps exactly one state document, owns two donor
//! connections, and resolves one completion result. Its workflow runs as
//! an independently scheduled task; every remote or durable step is a
//! suspension point raced against cooperative cancellation.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::document::{MigrationKey, StateDocument, TerminalStatus};
use crate::donor::address::ReplicaSetAddress;
use crate::donor::connection::{ConnectionInfo, DonorConnection};
use crate::donor::resolver::resolve_connection;
use crate::donor::timeline;
use crate::error::MigrationError;
use crate::service::completion::{CompletionHandle, CompletionResolver, MigrationResult};
use crate::service::context::RecipientContext;

/// Gate checked after the initial document persists durably.
pub const PAUSE_AFTER_PERSISTING_STATE_DOCUMENT: &str = "pause_after_persisting_state_document";
/// Gate checked once both donor connections are established.
pub const PAUSE_AFTER_CONNECTING: &str = "pause_after_connecting";
/// Gate checked between the transaction-table scan and the second
/// top-of-log read, so harnesses can land a write in the window.
pub const PAUSE_AFTER_READING_TRANSACTION_TABLE: &str = "pause_after_reading_transaction_table";
/// Gate checked after both start positions are durably recorded.
pub const PAUSE_AFTER_RECORDING_START_POSITIONS: &str = "pause_after_recording_start_positions";

#[derive(Default)]
struct ConnectionSlots {
    client: Option<Arc<dyn DonorConnection>>,
    tail_client: Option<Arc<dyn DonorConnection>>,
}

/// One live migration. Ephemeral; the state document outlives it.
pub struct RecipientInstance {
    key: MigrationKey,
    term: i64,
    context: Arc<RecipientContext>,
    doc: Mutex<StateDocument>,
    connections: Mutex<ConnectionSlots>,
    cancel: CancellationToken,
    completion: CompletionResolver,
    handle: CompletionHandle,
}

impl RecipientInstance {
    pub(crate) fn new(
        context: Arc<RecipientContext>,
        initial: StateDocument,
        term: i64,
    ) -> Arc<Self> {
        let key = initial.key;
        let (completion, handle) = CompletionResolver::new_pair(key);
        Arc::new(Self {
            key,
            term,
            context,
            doc: Mutex::new(initial),
            connections: Mutex::new(ConnectionSlots::default()),
            cancel: CancellationToken::new(),
            completion,
            handle,
        })
    }

    pub fn migration_key(&self) -> MigrationKey {
        self.key
    }

    /// Primary term this instance is bound to. Durable writes from any
    /// other term are fenced by the store.
    pub fn term(&self) -> i64 {
        self.term
    }

    pub fn completion_handle(&self) -> CompletionHandle {
        self.handle.clone()
    }

    /// Snapshot of the in-memory state document.
    pub fn state_document(&self) -> StateDocument {
        self.doc.lock().expect("state document poisoned").clone()
    }

    /// Snapshots of the general-purpose and log-tailing connections, in
    /// that order. `None` until connected and again after teardown.
    pub fn connection_info(&self) -> (Option<ConnectionInfo>, Option<ConnectionInfo>) {
        let slots = self.connections.lock().expect("connection slots poisoned");
        (
            slots.client.as_deref().map(ConnectionInfo::of),
            slots.tail_client.as_deref().map(ConnectionInfo::of),
        )
    }

    /// Cooperative cancellation: the workflow stops issuing new remote
    /// operations and resolves `Interrupted`. The document is untouched.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub(crate) async fn run(&self) {
        info!(key = %self.key, term = self.term, "migration instance starting");
        let outcome = self.execute().await;
        self.teardown_connections();
        match &outcome {
            Ok(()) => info!(key = %self.key, "migration instance completed"),
            Err(err) => warn!(key = %self.key, error = %err, "migration instance failed"),
        }
        self.completion.resolve(outcome);
    }

    async fn execute(&self) -> MigrationResult {
        // Persist the initial document, then adopt whatever durable copy
        // won the insert so a resumed migration keeps its original
        // parameters instead of the caller's fresh ones.
        let initial = self.state_document();
        self.checked(async {
            self.context
                .store
                .insert_if_absent(&initial, self.term)
                .await
                .map_err(MigrationError::from)
        })
        .await?;
        self.refresh_from_store().await?;
        self.gate(PAUSE_AFTER_PERSISTING_STATE_DOCUMENT).await?;

        let doc = self.state_document();
        let address = ReplicaSetAddress::parse(&doc.donor_address)?;
        let cluster = self.context.donors.cluster(&address).ok_or_else(|| {
            MigrationError::Unsatisfiable {
                preference: doc.read_preference.mode,
                timeout_ms: self.context.config.donor_selection_timeout.as_millis() as u64,
            }
        })?;

        let client: Arc<dyn DonorConnection> = Arc::from(
            resolve_connection(
                cluster.as_ref(),
                &doc.read_preference,
                &self.context.config,
                &self.cancel,
            )
            .await?,
        );
        let tail_client: Arc<dyn DonorConnection> = Arc::from(
            resolve_connection(
                cluster.as_ref(),
                &doc.read_preference,
                &self.context.config,
                &self.cancel,
            )
            .await?,
        );
        info!(
            key = %self.key,
            client = %client.server_address(),
            tail_client = %tail_client.server_address(),
            "connected to donor"
        );
        {
            let mut slots = self.connections.lock().expect("connection slots poisoned");
            slots.client = Some(client.clone());
            slots.tail_client = Some(tail_client);
        }
        self.gate(PAUSE_AFTER_CONNECTING).await?;

        if !doc.has_start_positions() {
            self.determine_start_positions(client.as_ref()).await?;
        }
        self.gate(PAUSE_AFTER_RECORDING_START_POSITIONS).await?;

        // Downstream fetch/apply phases take over from the recorded
        // positions; nothing further gates completion here.
        self.checked(async {
            self.context
                .store
                .record_terminal_status(self.key, TerminalStatus::Completed, self.term)
                .await
                .map_err(MigrationError::from)
        })
        .await?;
        self.refresh_from_store().await?;
        Ok(())
    }

    /// Pick and durably record the positions the fetch and apply phases
    /// will start from, such that no committed donor write is lost and
    /// none is replayed twice across a transaction that was already open
    /// when the migration began.
    async fn determine_start_positions(
        &self,
        client: &dyn DonorConnection,
    ) -> Result<(), MigrationError> {
        let top_of_log = self
            .checked(async {
                timeline::latest_position(client)
                    .await
                    .map_err(MigrationError::from)
            })
            .await?;
        let records = self
            .checked(async {
                timeline::in_progress_transactions(client)
                    .await
                    .map_err(MigrationError::from)
            })
            .await?;
        let earliest = timeline::earliest_open_transaction(&records);
        self.gate(PAUSE_AFTER_READING_TRANSACTION_TABLE).await?;

        let (fetching, applying) = match earliest {
            Some(start) if start < top_of_log => {
                // Writes may have landed while the transaction table scan
                // ran; a stale first read here would let the apply phase
                // skip operations the fetch phase has not captured yet.
                let advanced_top = self
                    .checked(async {
                        timeline::latest_position(client)
                            .await
                            .map_err(MigrationError::from)
                    })
                    .await?;
                (start, advanced_top)
            }
            _ => (top_of_log, top_of_log),
        };
        debug_assert!(fetching <= applying);
        debug!(
            key = %self.key,
            fetching = %fetching,
            applying = %applying,
            "start positions determined"
        );
        self.checked(async {
            self.context
                .store
                .record_start_positions(self.key, fetching, applying, self.term)
                .await
                .map_err(MigrationError::from)
        })
        .await?;
        self.refresh_from_store().await
    }

    /// Replace the in-memory document with the durable copy so the two
    /// never drift after a write.
    async fn refresh_from_store(&self) -> Result<(), MigrationError> {
        let durable = self
            .checked(async {
                self.context
                    .store
                    .load(self.key)
                    .await
                    .map_err(MigrationError::from)
            })
            .await?;
        if let Some(durable) = durable {
            *self.doc.lock().expect("state document poisoned") = durable;
        }
        Ok(())
    }

    /// Race a workflow step against cancellation. A step already in
    /// flight when cancellation lands gets a bounded grace window to
    /// settle; its result is discarded either way.
    async fn checked<T, F>(&self, fut: F) -> Result<T, MigrationError>
    where
        F: std::future::Future<Output = Result<T, MigrationError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(MigrationError::Interrupted);
        }
        tokio::pin!(fut);
        tokio::select! {
            result = &mut fut => result,
            _ = self.cancel.cancelled() => {
                let _ = tokio::time::timeout(self.context.config.shutdown_grace, &mut fut).await;
                Err(MigrationError::Interrupted)
            }
        }
    }

    /// Check a named pause gate, if a gate registry was injected.
    async fn gate(&self, name: &str) -> Result<(), MigrationError> {
        let Some(gates) = self.context.gates.as_ref() else {
            return Ok(());
        };
        let gate = gates.find(name);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(MigrationError::Interrupted),
            _ = gate.enter() => Ok(()),
        }
    }

    fn teardown_connections(&self) {
        let mut slots = self.connections.lock().expect("connection slots poisoned");
        for conn in [slots.client.take(), slots.tail_client.take()]
            .into_iter()
            .flatten()
        {
            conn.close();
        }
    }
}
