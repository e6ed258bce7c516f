//! Donor log positions.
//!
//! A donor's operation history is totally ordered. A position in it is an
//! `OpTime`: the oplog timestamp plus the election term it was written
//! under. Positions from the same donor are monotonic over time absent a
//! rollback, so ordered comparisons are meaningful.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An oplog timestamp: seconds since epoch plus an increment that orders
/// entries within the same second.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp {
    pub secs: u32,
    pub inc: u32,
}

impl Timestamp {
    pub const fn new(secs: u32, inc: u32) -> Self {
        Self { secs, inc }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.secs, self.inc)
    }
}

/// A position in a donor's log: (timestamp, term).
///
/// Field order matters: the derived `Ord` compares the timestamp first and
/// the term second, which is the donor's total order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct OpTime {
    pub timestamp: Timestamp,
    pub term: i64,
}

impl OpTime {
    pub const fn new(timestamp: Timestamp, term: i64) -> Self {
        Self { timestamp, term }
    }
}

impl fmt::Display for OpTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, t{})", self.timestamp, self.term)
    }
}
