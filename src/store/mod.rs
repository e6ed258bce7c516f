//! Durable state-document store contract.
//!
//! The storage engine itself is an external collaborator; this module
//! fixes the contract the workflow depends on: keyed insert-if-absent,
//! write-once position updates, write-once terminal status, and writes
//! fenced by the writer's bound primary term. Every write is
//! all-or-nothing.

use async_trait::async_trait;
use thiserror::Error;

use crate::document::{MigrationKey, StateDocument, TerminalStatus};
use crate::optime::OpTime;

pub mod fault;
pub mod memory;

/// Why a store operation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("local node is not primary")]
    NotPrimary,
    #[error("write from stale term {attempted} fenced by current term {current}")]
    TermFenced { attempted: i64, current: i64 },
    #[error("write durability could not be satisfied: {0}")]
    DurabilityUnsatisfied(String),
    #[error("no state document for key {0}")]
    UnknownKey(MigrationKey),
    #[error("start positions already recorded for key {0}")]
    PositionsAlreadyRecorded(MigrationKey),
    #[error("terminal status already recorded for key {0}")]
    TerminalAlreadyRecorded(MigrationKey),
}

/// Durable, keyed, crash-safe record store for migration progress.
///
/// Writers pass the primary term their instance is bound to; a store must
/// reject writes from any term other than the current one, which is what
/// keeps a stale-term instance from driving a migration after failover.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Prepare backing storage (collections, indexes). Idempotent.
    async fn ensure_ready(&self) -> Result<(), StoreError>;

    /// Insert `doc` unless a document with its key already exists. The
    /// existing durable document always wins; inserting over it is not an
    /// error.
    async fn insert_if_absent(&self, doc: &StateDocument, term: i64) -> Result<(), StoreError>;

    async fn load(&self, key: MigrationKey) -> Result<Option<StateDocument>, StoreError>;

    /// Every document not yet carrying a terminal status.
    async fn load_active(&self) -> Result<Vec<StateDocument>, StoreError>;

    /// Record both start positions in one write. Write-once: re-recording
    /// the same pair is a no-op, a different pair is an error.
    async fn record_start_positions(
        &self,
        key: MigrationKey,
        fetching: OpTime,
        applying: OpTime,
        term: i64,
    ) -> Result<(), StoreError>;

    /// Record the terminal status. Write-once with the same idempotency
    /// rule as position recording.
    async fn record_terminal_status(
        &self,
        key: MigrationKey,
        status: TerminalStatus,
        term: i64,
    ) -> Result<(), StoreError>;
}
