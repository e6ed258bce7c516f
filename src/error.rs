//! Terminal error taxonomy for migration instances.
//!
//! Every variant here is terminal for the in-memory instance that hits it.
//! The completion handle resolves with the error exactly once; durable
//! state documents are never deleted on an error path.

use thiserror::Error;

use crate::document::ReadPreferenceMode;

/// A terminal migration failure.
///
/// Cloneable so a resolved completion value can be observed by any number
/// of waiters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MigrationError {
    /// The donor address did not denote a replica set. Raised before any
    /// network or directory lookup happens.
    #[error("donor address is not a replica set descriptor: {0}")]
    Parse(String),

    /// No donor member satisfied the read preference within the selection
    /// timeout. The state document is retained for an external retry
    /// decision.
    #[error("no donor member satisfied {preference} within {timeout_ms}ms")]
    Unsatisfiable {
        preference: ReadPreferenceMode,
        timeout_ms: u64,
    },

    /// A durable write was rejected because the local node is no longer
    /// the primary of the term this instance is bound to, or durability
    /// could not be satisfied.
    #[error("durable write rejected, local primary role lost: {0}")]
    PrimaryLost(String),

    /// Cooperative cancellation from a local step-down. Terminal for the
    /// in-memory instance only; the document survives.
    #[error("migration interrupted by local step-down")]
    Interrupted,

    /// A donor-side log or transaction-table read failed or was unusable.
    #[error("donor timeline query failed: {0}")]
    RemoteQuery(String),
}

impl From<crate::donor::address::AddressParseError> for MigrationError {
    fn from(err: crate::donor::address::AddressParseError) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<crate::store::StoreError> for MigrationError {
    fn from(err: crate::store::StoreError) -> Self {
        Self::PrimaryLost(err.to_string())
    }
}

impl From<crate::donor::connection::QueryError> for MigrationError {
    fn from(err: crate::donor::connection::QueryError) -> Self {
        Self::RemoteQuery(err.to_string())
    }
}
