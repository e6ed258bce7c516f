//! In-memory donor replica set for tests and local runs.
//!
//! Nodes carry their own copy of the log and the session-transaction
//! table; harnesses mutate them mid-flight to stage failover and
//! concurrent-write scenarios.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::donor::address::ReplicaSetAddress;
use crate::donor::connection::{ConnectionId, DonorConnection, QueryError};
use crate::donor::timeline::{TransactionRecord, TransactionState};
use crate::donor::topology::{DonorCluster, DonorDirectory, MemberView, TopologyView};
use crate::optime::OpTime;

#[derive(Debug)]
struct NodeState {
    alive: bool,
    is_primary: bool,
    tags: BTreeMap<String, String>,
    oplog: Vec<OpTime>,
    transactions: Vec<TransactionRecord>,
}

#[derive(Debug)]
struct MockNode {
    address: String,
    state: Mutex<NodeState>,
}

/// A donor replica set held entirely in memory.
///
/// Clones share node state, so a harness can keep one handle for staging
/// while a directory hands another to the resolver.
#[derive(Clone)]
pub struct MockReplicaSet {
    set_name: String,
    nodes: Vec<Arc<MockNode>>,
}

impl MockReplicaSet {
    /// Build a set with `members` nodes named `<set>-<i>.mock:27017`.
    /// With `has_primary`, the first node starts as primary.
    pub fn new(set_name: &str, members: usize, has_primary: bool) -> Self {
        let nodes = (0..members)
            .map(|i| {
                Arc::new(MockNode {
                    address: format!("{set_name}-{i}.mock:27017"),
                    state: Mutex::new(NodeState {
                        alive: true,
                        is_primary: has_primary && i == 0,
                        tags: BTreeMap::new(),
                        oplog: Vec::new(),
                        transactions: Vec::new(),
                    }),
                })
            })
            .collect();
        Self {
            set_name: set_name.to_string(),
            nodes,
        }
    }

    pub fn set_name(&self) -> &str {
        &self.set_name
    }

    /// Member addresses in topology order.
    pub fn hosts(&self) -> Vec<String> {
        self.nodes.iter().map(|node| node.address.clone()).collect()
    }

    /// The `set/host,host` descriptor for this set.
    pub fn connection_string(&self) -> String {
        format!("{}/{}", self.set_name, self.hosts().join(","))
    }

    fn node(&self, address: &str) -> Option<&Arc<MockNode>> {
        self.nodes.iter().find(|node| node.address == address)
    }

    fn with_node_state(&self, address: &str, f: impl FnOnce(&mut NodeState)) {
        if let Some(node) = self.node(address) {
            f(&mut node.state.lock().expect("mock node poisoned"));
        }
    }

    /// Take the member down. Existing connections to it go dead too.
    pub fn kill(&self, address: &str) {
        self.with_node_state(address, |state| state.alive = false);
    }

    pub fn restore(&self, address: &str) {
        self.with_node_state(address, |state| state.alive = true);
    }

    /// Promote the member, demoting whoever else was primary.
    pub fn step_up(&self, address: &str) {
        for node in &self.nodes {
            let mut state = node.state.lock().expect("mock node poisoned");
            state.is_primary = node.address == address;
        }
    }

    pub fn tag_member(&self, address: &str, key: &str, value: &str) {
        self.with_node_state(address, |state| {
            state.tags.insert(key.to_string(), value.to_string());
        });
    }

    /// Replace every member's log with a single entry at `position`.
    pub fn set_top_of_log(&self, position: OpTime) {
        for node in &self.nodes {
            let mut state = node.state.lock().expect("mock node poisoned");
            state.oplog.clear();
            state.oplog.push(position);
        }
    }

    /// Append an entry to every member's log.
    pub fn append_log(&self, position: OpTime) {
        for node in &self.nodes {
            let mut state = node.state.lock().expect("mock node poisoned");
            state.oplog.push(position);
        }
    }

    /// Insert a session-transaction record on every member.
    pub fn insert_transaction(&self, record: TransactionRecord) {
        for node in &self.nodes {
            let mut state = node.state.lock().expect("mock node poisoned");
            state.transactions.push(record.clone());
        }
    }
}

#[async_trait]
impl DonorCluster for MockReplicaSet {
    async fn topology(&self) -> Result<TopologyView, QueryError> {
        let members = self
            .nodes
            .iter()
            .map(|node| {
                let state = node.state.lock().expect("mock node poisoned");
                MemberView {
                    address: node.address.clone(),
                    is_primary: state.is_primary,
                    reachable: state.alive,
                    tags: state.tags.clone(),
                }
            })
            .collect();
        Ok(TopologyView {
            set_name: self.set_name.clone(),
            members,
        })
    }

    async fn connect(&self, address: &str) -> Result<Box<dyn DonorConnection>, QueryError> {
        let node = self
            .node(address)
            .ok_or_else(|| QueryError::Unreachable(address.to_string()))?;
        if !node.state.lock().expect("mock node poisoned").alive {
            return Err(QueryError::Unreachable(address.to_string()));
        }
        Ok(Box::new(MockConnection {
            id: ConnectionId::generate(),
            closed: AtomicBool::new(false),
            node: node.clone(),
        }))
    }
}

struct MockConnection {
    id: ConnectionId,
    closed: AtomicBool,
    node: Arc<MockNode>,
}

impl MockConnection {
    fn check_link(&self) -> Result<(), QueryError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueryError::Unreachable(self.node.address.clone()));
        }
        if !self.node.state.lock().expect("mock node poisoned").alive {
            return Err(QueryError::Unreachable(self.node.address.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl DonorConnection for MockConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn server_address(&self) -> String {
        self.node.address.clone()
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
            && self.node.state.lock().expect("mock node poisoned").alive
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    async fn latest_log_position(&self) -> Result<OpTime, QueryError> {
        self.check_link()?;
        let state = self.node.state.lock().expect("mock node poisoned");
        state
            .oplog
            .iter()
            .max()
            .copied()
            .ok_or_else(|| QueryError::EmptyLog(self.node.address.clone()))
    }

    async fn transactions_in_state(
        &self,
        txn_state: TransactionState,
    ) -> Result<Vec<TransactionRecord>, QueryError> {
        self.check_link()?;
        let state = self.node.state.lock().expect("mock node poisoned");
        Ok(state
            .transactions
            .iter()
            .filter(|record| record.state == txn_state)
            .cloned()
            .collect())
    }
}

/// Directory over a fixed set of mock replica sets, keyed by set name.
#[derive(Default)]
pub struct MockDonorDirectory {
    sets: Mutex<HashMap<String, Arc<MockReplicaSet>>>,
}

impl MockDonorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, set: &MockReplicaSet) {
        let mut sets = self.sets.lock().expect("mock directory poisoned");
        sets.insert(set.set_name().to_string(), Arc::new(set.clone()));
    }
}

impl DonorDirectory for MockDonorDirectory {
    fn cluster(&self, address: &ReplicaSetAddress) -> Option<Arc<dyn DonorCluster>> {
        let sets = self.sets.lock().expect("mock directory poisoned");
        sets.get(&address.set_name)
            .map(|set| set.clone() as Arc<dyn DonorCluster>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optime::Timestamp;

    #[tokio::test]
    async fn topology_reflects_kills_and_step_up() {
        let set = MockReplicaSet::new("donorSet", 3, true);
        let hosts = set.hosts();

        let view = set.topology().await.expect("topology");
        assert_eq!(view.primary().map(|m| m.address.clone()), Some(hosts[0].clone()));
        assert!(view.members.iter().all(|m| m.reachable));

        set.kill(&hosts[0]);
        set.step_up(&hosts[2]);
        let view = set.topology().await.expect("topology");
        assert!(!view.members[0].reachable);
        assert_eq!(view.primary().map(|m| m.address.clone()), Some(hosts[2].clone()));
    }

    #[tokio::test]
    async fn connect_to_dead_member_fails() {
        let set = MockReplicaSet::new("donorSet", 2, true);
        let hosts = set.hosts();
        set.kill(&hosts[1]);
        let err = set.connect(&hosts[1]).await.err().expect("dead member");
        assert!(matches!(err, QueryError::Unreachable(_)));
    }

    #[tokio::test]
    async fn connections_are_distinct_objects() {
        let set = MockReplicaSet::new("donorSet", 1, true);
        let hosts = set.hosts();
        let a = set.connect(&hosts[0]).await.expect("connect");
        let b = set.connect(&hosts[0]).await.expect("connect");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.server_address(), b.server_address());
    }

    #[tokio::test]
    async fn latest_position_is_log_maximum_and_empty_log_errors() {
        let set = MockReplicaSet::new("donorSet", 1, true);
        let hosts = set.hosts();
        let conn = set.connect(&hosts[0]).await.expect("connect");

        let err = conn.latest_log_position().await.expect_err("empty log");
        assert!(matches!(err, QueryError::EmptyLog(_)));

        set.append_log(OpTime::new(Timestamp::new(5, 1), 1));
        set.append_log(OpTime::new(Timestamp::new(6, 1), 1));
        let top = conn.latest_log_position().await.expect("top");
        assert_eq!(top, OpTime::new(Timestamp::new(6, 1), 1));
    }

    #[tokio::test]
    async fn closed_connection_goes_dead() {
        let set = MockReplicaSet::new("donorSet", 1, true);
        let conn = set.connect(&set.hosts()[0]).await.expect("connect");
        assert!(conn.is_connected());
        conn.close();
        assert!(!conn.is_connected());
        assert!(conn.latest_log_position().await.is_err());
    }
}
