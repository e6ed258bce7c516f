//! In-memory state store for tests or local runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use crate::document::{MigrationKey, StateDocument, TerminalStatus};
use crate::optime::OpTime;
use crate::store::{StateStore, StoreError};

#[derive(Debug, Clone, Copy)]
struct RoleState {
    primary: bool,
    term: i64,
}

/// Handle on the local node's replication role as the store sees it.
///
/// The harness (or, in a real deployment, the replication layer) flips
/// this on role transitions; the store consults it on every write so
/// `PrimaryLost` and term fencing are observable behavior rather than
/// stubbed-out assumptions.
#[derive(Clone)]
pub struct LocalRole {
    state: Arc<Mutex<RoleState>>,
}

impl Default for LocalRole {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(RoleState {
                primary: false,
                term: 0,
            })),
        }
    }
}

impl LocalRole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step_up(&self, term: i64) {
        let mut state = self.state.lock().expect("local role poisoned");
        state.primary = true;
        state.term = term;
    }

    pub fn step_down(&self) {
        self.state.lock().expect("local role poisoned").primary = false;
    }

    pub fn term(&self) -> i64 {
        self.state.lock().expect("local role poisoned").term
    }

    pub fn is_primary(&self) -> bool {
        self.state.lock().expect("local role poisoned").primary
    }

    fn check_write(&self, term: i64) -> Result<(), StoreError> {
        let state = *self.state.lock().expect("local role poisoned");
        if !state.primary {
            return Err(StoreError::NotPrimary);
        }
        if term != state.term {
            return Err(StoreError::TermFenced {
                attempted: term,
                current: state.term,
            });
        }
        Ok(())
    }
}

/// State store backed by a process-local map.
#[derive(Clone)]
pub struct MemoryStateStore {
    role: LocalRole,
    documents: Arc<Mutex<HashMap<MigrationKey, StateDocument>>>,
}

impl MemoryStateStore {
    pub fn new(role: LocalRole) -> Self {
        Self {
            role,
            documents: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Synchronous read of one durable document, for assertions.
    pub fn document(&self, key: MigrationKey) -> Option<StateDocument> {
        self.documents
            .lock()
            .expect("state documents poisoned")
            .get(&key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().expect("state documents poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn ensure_ready(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_if_absent(&self, doc: &StateDocument, term: i64) -> Result<(), StoreError> {
        self.role.check_write(term)?;
        let mut documents = self.documents.lock().expect("state documents poisoned");
        documents.entry(doc.key).or_insert_with(|| doc.clone());
        Ok(())
    }

    async fn load(&self, key: MigrationKey) -> Result<Option<StateDocument>, StoreError> {
        Ok(self.document(key))
    }

    async fn load_active(&self) -> Result<Vec<StateDocument>, StoreError> {
        let documents = self.documents.lock().expect("state documents poisoned");
        Ok(documents
            .values()
            .filter(|doc| !doc.is_terminal())
            .cloned()
            .collect())
    }

    async fn record_start_positions(
        &self,
        key: MigrationKey,
        fetching: OpTime,
        applying: OpTime,
        term: i64,
    ) -> Result<(), StoreError> {
        self.role.check_write(term)?;
        let mut documents = self.documents.lock().expect("state documents poisoned");
        let doc = documents.get_mut(&key).ok_or(StoreError::UnknownKey(key))?;
        if doc.has_start_positions() {
            if doc.start_fetching_position == Some(fetching)
                && doc.start_applying_position == Some(applying)
            {
                return Ok(());
            }
            return Err(StoreError::PositionsAlreadyRecorded(key));
        }
        doc.start_fetching_position = Some(fetching);
        doc.start_applying_position = Some(applying);
        doc.last_updated = Utc::now();
        Ok(())
    }

    async fn record_terminal_status(
        &self,
        key: MigrationKey,
        status: TerminalStatus,
        term: i64,
    ) -> Result<(), StoreError> {
        self.role.check_write(term)?;
        let mut documents = self.documents.lock().expect("state documents poisoned");
        let doc = documents.get_mut(&key).ok_or(StoreError::UnknownKey(key))?;
        match doc.terminal_status {
            Some(existing) if existing == status => Ok(()),
            Some(_) => Err(StoreError::TerminalAlreadyRecorded(key)),
            None => {
                doc.terminal_status = Some(status);
                doc.last_updated = Utc::now();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ReadPreferenceMode, ReadPreferencePolicy};
    use crate::optime::Timestamp;

    fn primary_role() -> LocalRole {
        let role = LocalRole::new();
        role.step_up(1);
        role
    }

    fn doc() -> StateDocument {
        StateDocument::new(
            MigrationKey::generate(),
            "donorSet/a:27017",
            "tenantA",
            ReadPreferencePolicy::new(ReadPreferenceMode::PrimaryOnly),
        )
    }

    #[tokio::test]
    async fn insert_is_idempotent_and_keeps_the_durable_copy() {
        let store = MemoryStateStore::new(primary_role());
        let first = doc();
        store.insert_if_absent(&first, 1).await.expect("insert");

        let mut second = first.clone();
        second.tenant_id = "tenantB".to_string();
        store.insert_if_absent(&second, 1).await.expect("reinsert");

        let durable = store.document(first.key).expect("document");
        assert_eq!(durable.tenant_id, "tenantA");
    }

    #[tokio::test]
    async fn writes_require_primary_role() {
        let role = LocalRole::new();
        let store = MemoryStateStore::new(role.clone());
        let err = store.insert_if_absent(&doc(), 0).await.expect_err("not primary");
        assert_eq!(err, StoreError::NotPrimary);

        role.step_up(3);
        store.insert_if_absent(&doc(), 3).await.expect("primary now");
    }

    #[tokio::test]
    async fn stale_term_writes_are_fenced() {
        let role = primary_role();
        let store = MemoryStateStore::new(role.clone());
        let document = doc();
        store.insert_if_absent(&document, 1).await.expect("insert");

        role.step_up(2);
        let err = store
            .record_start_positions(
                document.key,
                OpTime::new(Timestamp::new(3, 1), 1),
                OpTime::new(Timestamp::new(5, 1), 1),
                1,
            )
            .await
            .expect_err("stale term");
        assert_eq!(
            err,
            StoreError::TermFenced {
                attempted: 1,
                current: 2
            }
        );
    }

    #[tokio::test]
    async fn start_positions_are_write_once() {
        let store = MemoryStateStore::new(primary_role());
        let document = doc();
        store.insert_if_absent(&document, 1).await.expect("insert");

        let fetching = OpTime::new(Timestamp::new(3, 1), 1);
        let applying = OpTime::new(Timestamp::new(5, 1), 1);
        store
            .record_start_positions(document.key, fetching, applying, 1)
            .await
            .expect("record");

        // Same pair: no-op.
        store
            .record_start_positions(document.key, fetching, applying, 1)
            .await
            .expect("idempotent");

        // Different pair: rejected.
        let err = store
            .record_start_positions(
                document.key,
                fetching,
                OpTime::new(Timestamp::new(6, 1), 1),
                1,
            )
            .await
            .expect_err("revision");
        assert_eq!(err, StoreError::PositionsAlreadyRecorded(document.key));
    }

    #[tokio::test]
    async fn terminal_status_is_write_once() {
        let store = MemoryStateStore::new(primary_role());
        let document = doc();
        store.insert_if_absent(&document, 1).await.expect("insert");

        store
            .record_terminal_status(document.key, TerminalStatus::Completed, 1)
            .await
            .expect("record");
        store
            .record_terminal_status(document.key, TerminalStatus::Completed, 1)
            .await
            .expect("idempotent");
        let err = store
            .record_terminal_status(document.key, TerminalStatus::Aborted, 1)
            .await
            .expect_err("revision");
        assert_eq!(err, StoreError::TerminalAlreadyRecorded(document.key));
    }

    #[tokio::test]
    async fn load_active_skips_terminal_documents() {
        let store = MemoryStateStore::new(primary_role());
        let active = doc();
        let finished = doc();
        store.insert_if_absent(&active, 1).await.expect("insert");
        store.insert_if_absent(&finished, 1).await.expect("insert");
        store
            .record_terminal_status(finished.key, TerminalStatus::Completed, 1)
            .await
            .expect("terminal");

        let loaded = store.load_active().await.expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].key, active.key);
    }
}
