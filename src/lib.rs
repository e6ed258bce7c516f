//! Tidemark - resumable migration control plane for tenant data streams.
//!
//! A recipient node copies a tenant's data stream from a donor
//! replication cluster. This crate implements the control logic that has
//! to be correct before any data moves: a primary-only service framework
//! (keyed, resumable instances driven by node role transitions), donor
//! member selection under a read preference, and the start-position
//! computation that guarantees no operation is lost or double-applied
//! across a transaction that predates the migration.
//!
//! The durable store, the donor clusters, and the test-control gates are
//! all injected through [`RecipientContext`]; there is no process-wide
//! state.

pub mod config;
pub mod document;
pub mod donor;
pub mod error;
pub mod failgate;
pub mod optime;
pub mod service;
pub mod store;

pub use config::RecipientConfig;
pub use document::{
    MigrationKey, ReadPreferenceMode, ReadPreferencePolicy, StateDocument, TerminalStatus,
};
pub use donor::address::{AddressParseError, HostPort, ReplicaSetAddress};
pub use donor::connection::{ConnectionId, ConnectionInfo, DonorConnection, QueryError};
pub use donor::mock::{MockDonorDirectory, MockReplicaSet};
pub use donor::resolver::{resolve_connection, select_member};
pub use donor::timeline::{TransactionRecord, TransactionState};
pub use donor::topology::{DonorCluster, DonorDirectory, MemberView, TopologyView};
pub use error::MigrationError;
pub use failgate::{FailGate, FailGateRegistry, GateMode};
pub use optime::{OpTime, Timestamp};
pub use service::completion::{CompletionHandle, MigrationResult};
pub use service::context::RecipientContext;
pub use service::instance::{
    RecipientInstance, PAUSE_AFTER_CONNECTING, PAUSE_AFTER_PERSISTING_STATE_DOCUMENT,
    PAUSE_AFTER_READING_TRANSACTION_TABLE, PAUSE_AFTER_RECORDING_START_POSITIONS,
};
pub use service::registry::{RegistryError, ServiceRegistry};
pub use service::service::{RecipientService, Service, RECIPIENT_SERVICE_NAME};
pub use store::fault::FaultInjectingStore;
pub use store::memory::{LocalRole, MemoryStateStore};
pub use store::{StateStore, StoreError};
