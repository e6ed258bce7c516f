//! Fault-injecting wrapper around the in-memory store, for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::document::{MigrationKey, StateDocument, TerminalStatus};
use crate::optime::OpTime;
use crate::store::memory::MemoryStateStore;
use crate::store::{StateStore, StoreError};

/// Store that can be told to fail specific write paths while counting
/// calls, so harnesses can assert both the failure and that the write was
/// actually attempted.
#[derive(Clone)]
pub struct FaultInjectingStore {
    inner: MemoryStateStore,
    fail_insert: Arc<AtomicBool>,
    fail_record_positions: Arc<AtomicBool>,
    insert_calls: Arc<AtomicUsize>,
    record_position_calls: Arc<AtomicUsize>,
}

impl FaultInjectingStore {
    pub fn new(inner: MemoryStateStore) -> Self {
        Self {
            inner,
            fail_insert: Arc::new(AtomicBool::new(false)),
            fail_record_positions: Arc::new(AtomicBool::new(false)),
            insert_calls: Arc::new(AtomicUsize::new(0)),
            record_position_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_insert_failures(inner: MemoryStateStore) -> Self {
        let store = Self::new(inner);
        store.fail_insert.store(true, AtomicOrdering::SeqCst);
        store
    }

    pub fn set_fail_insert(&self, fail: bool) {
        self.fail_insert.store(fail, AtomicOrdering::SeqCst);
    }

    pub fn set_fail_record_positions(&self, fail: bool) {
        self.fail_record_positions.store(fail, AtomicOrdering::SeqCst);
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(AtomicOrdering::SeqCst)
    }

    pub fn record_position_calls(&self) -> usize {
        self.record_position_calls.load(AtomicOrdering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryStateStore {
        &self.inner
    }
}

#[async_trait]
impl StateStore for FaultInjectingStore {
    async fn ensure_ready(&self) -> Result<(), StoreError> {
        self.inner.ensure_ready().await
    }

    async fn insert_if_absent(&self, doc: &StateDocument, term: i64) -> Result<(), StoreError> {
        self.insert_calls.fetch_add(1, AtomicOrdering::SeqCst);
        if self.fail_insert.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::DurabilityUnsatisfied(
                "injected insert failure".to_string(),
            ));
        }
        self.inner.insert_if_absent(doc, term).await
    }

    async fn load(&self, key: MigrationKey) -> Result<Option<StateDocument>, StoreError> {
        self.inner.load(key).await
    }

    async fn load_active(&self) -> Result<Vec<StateDocument>, StoreError> {
        self.inner.load_active().await
    }

    async fn record_start_positions(
        &self,
        key: MigrationKey,
        fetching: OpTime,
        applying: OpTime,
        term: i64,
    ) -> Result<(), StoreError> {
        self.record_position_calls.fetch_add(1, AtomicOrdering::SeqCst);
        if self.fail_record_positions.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::DurabilityUnsatisfied(
                "injected position write failure".to_string(),
            ));
        }
        self.inner
            .record_start_positions(key, fetching, applying, term)
            .await
    }

    async fn record_terminal_status(
        &self,
        key: MigrationKey,
        status: TerminalStatus,
        term: i64,
    ) -> Result<(), StoreError> {
        self.inner.record_terminal_status(key, status, term).await
    }
}
