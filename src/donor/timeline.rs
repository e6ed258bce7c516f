//! Point-in-time reads against a donor's timeline: the newest log
//! position and the session-transaction table.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::donor::connection::{DonorConnection, QueryError};
use crate::optime::OpTime;

/// Durable state of one session transaction on the donor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionState {
    InProgress,
    Committed,
    Aborted,
}

/// One donor session-transaction record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub session_id: Uuid,
    pub txn_number: i64,
    /// First log position the transaction wrote at. Absent for records
    /// that never recorded a start.
    pub start_position: Option<OpTime>,
    pub last_write_position: OpTime,
    pub state: TransactionState,
}

/// The donor's newest log position.
pub async fn latest_position(conn: &dyn DonorConnection) -> Result<OpTime, QueryError> {
    conn.latest_log_position().await
}

/// Session-transaction records currently in progress on the donor.
pub async fn in_progress_transactions(
    conn: &dyn DonorConnection,
) -> Result<Vec<TransactionRecord>, QueryError> {
    conn.transactions_in_state(TransactionState::InProgress).await
}

/// Earliest start position among in-progress records. Records without a
/// recorded start are skipped.
pub fn earliest_open_transaction(records: &[TransactionRecord]) -> Option<OpTime> {
    records
        .iter()
        .filter(|record| record.state == TransactionState::InProgress)
        .filter_map(|record| record.start_position)
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optime::Timestamp;

    fn record(start: Option<OpTime>, state: TransactionState) -> TransactionRecord {
        TransactionRecord {
            session_id: Uuid::new_v4(),
            txn_number: 1,
            start_position: start,
            last_write_position: OpTime::new(Timestamp::new(9, 9), 1),
            state,
        }
    }

    #[test]
    fn earliest_open_transaction_picks_minimum_in_progress_start() {
        let records = vec![
            record(
                Some(OpTime::new(Timestamp::new(7, 1), 1)),
                TransactionState::InProgress,
            ),
            record(
                Some(OpTime::new(Timestamp::new(3, 1), 1)),
                TransactionState::InProgress,
            ),
            record(
                Some(OpTime::new(Timestamp::new(1, 1), 1)),
                TransactionState::Committed,
            ),
        ];
        assert_eq!(
            earliest_open_transaction(&records),
            Some(OpTime::new(Timestamp::new(3, 1), 1))
        );
    }

    #[test]
    fn earliest_open_transaction_skips_records_without_start() {
        let records = vec![record(None, TransactionState::InProgress)];
        assert_eq!(earliest_open_transaction(&records), None);
    }

    #[test]
    fn earliest_open_transaction_empty_when_nothing_in_progress() {
        assert_eq!(earliest_open_transaction(&[]), None);
        let records = vec![record(
            Some(OpTime::new(Timestamp::new(2, 1), 1)),
            TransactionState::Aborted,
        )];
        assert_eq!(earliest_open_transaction(&records), None);
    }
}
