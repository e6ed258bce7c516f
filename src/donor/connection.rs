//! Connections to individual donor members.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::donor::timeline::{TransactionRecord, TransactionState};
use crate::optime::OpTime;

/// Why a donor-side read or connect failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("donor member {0} is unreachable")]
    Unreachable(String),
    #[error("donor log at {0} has no entries")]
    EmptyLog(String),
}

/// Identity of one connection object. Two connections to the same logical
/// node still carry distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A live connection to one donor member.
///
/// Owned exclusively by the instance that resolved it and torn down on
/// any terminal transition.
#[async_trait]
pub trait DonorConnection: Send + Sync {
    fn id(&self) -> ConnectionId;

    /// Address of the member this connection resolved to.
    fn server_address(&self) -> String;

    fn is_connected(&self) -> bool;

    /// Drop the link to the member. Reads after this fail.
    fn close(&self);

    /// The donor's newest log position as seen over this connection.
    async fn latest_log_position(&self) -> Result<OpTime, QueryError>;

    /// Session-transaction records currently in `state`.
    async fn transactions_in_state(
        &self,
        state: TransactionState,
    ) -> Result<Vec<TransactionRecord>, QueryError>;
}

/// Point-in-time snapshot of a connection, for inspection by callers that
/// must not touch the connection itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub address: String,
    pub connected: bool,
}

impl ConnectionInfo {
    pub fn of(conn: &dyn DonorConnection) -> Self {
        Self {
            id: conn.id(),
            address: conn.server_address(),
            connected: conn.is_connected(),
        }
    }
}
