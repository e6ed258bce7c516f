//! Donor topology snapshots and the cluster/directory seams.
//!
//! Topology discovery internals live behind [`DonorCluster`]; the rest of
//! the crate only ever sees point-in-time [`TopologyView`] snapshots and
//! asks for a fresh one on every selection attempt, so donor-side
//! failover during connection establishment is transparent.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::donor::address::ReplicaSetAddress;
use crate::donor::connection::{DonorConnection, QueryError};

/// One member in a topology snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberView {
    pub address: String,
    pub is_primary: bool,
    pub reachable: bool,
    pub tags: BTreeMap<String, String>,
}

/// Point-in-time view of a donor replica set's membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyView {
    pub set_name: String,
    /// Members in topology order. Selection tie-breaks use this order.
    pub members: Vec<MemberView>,
}

impl TopologyView {
    pub fn primary(&self) -> Option<&MemberView> {
        self.members.iter().find(|member| member.is_primary)
    }
}

/// A donor replica set the resolver can observe and connect into.
#[async_trait]
pub trait DonorCluster: Send + Sync {
    /// A fresh membership snapshot. Called once per selection attempt.
    async fn topology(&self) -> Result<TopologyView, QueryError>;

    /// Open a brand-new connection to the named member. Every call yields
    /// a distinct connection object.
    async fn connect(&self, address: &str) -> Result<Box<dyn DonorConnection>, QueryError>;
}

/// Maps a parsed replica-set address to a live cluster handle.
///
/// This replaces a process-wide monitor registry: whoever builds the
/// recipient context decides what a set name resolves to.
pub trait DonorDirectory: Send + Sync {
    fn cluster(&self, address: &ReplicaSetAddress) -> Option<Arc<dyn DonorCluster>>;
}
