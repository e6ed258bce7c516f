//! Durable migration state documents and their key types.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::optime::OpTime;

/// Globally unique identifier of one migration. Primary key for the
/// instance and its state document.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MigrationKey(pub Uuid);

impl MigrationKey {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MigrationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which donor member role(s) a connection may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadPreferenceMode {
    PrimaryOnly,
    SecondaryOnly,
    PrimaryPreferred,
    SecondaryPreferred,
    Nearest,
}

impl fmt::Display for ReadPreferenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PrimaryOnly => "primary-only",
            Self::SecondaryOnly => "secondary-only",
            Self::PrimaryPreferred => "primary-preferred",
            Self::SecondaryPreferred => "secondary-preferred",
            Self::Nearest => "nearest",
        };
        f.write_str(name)
    }
}

/// A read preference mode plus tag constraints. A member qualifies only if
/// it carries every required tag pair; an empty tag map is unconstrained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadPreferencePolicy {
    pub mode: ReadPreferenceMode,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl ReadPreferencePolicy {
    pub fn new(mode: ReadPreferenceMode) -> Self {
        Self {
            mode,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Final durable outcome of a migration. Written at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalStatus {
    Completed,
    Aborted,
}

/// The durable, keyed record of one migration's progress.
///
/// Invariants: once both start positions are set they are never revised
/// and `start_fetching_position <= start_applying_position`; the terminal
/// status is written at most once. The store enforces both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    pub key: MigrationKey,
    /// Replica-set descriptor of the donor, `set/host:port,...` form.
    pub donor_address: String,
    pub tenant_id: String,
    pub read_preference: ReadPreferencePolicy,
    /// Earliest point from which the donor's log must be captured.
    pub start_fetching_position: Option<OpTime>,
    /// Point from which captured operations are actually replayed.
    pub start_applying_position: Option<OpTime>,
    pub terminal_status: Option<TerminalStatus>,
    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl StateDocument {
    pub fn new(
        key: MigrationKey,
        donor_address: impl Into<String>,
        tenant_id: impl Into<String>,
        read_preference: ReadPreferencePolicy,
    ) -> Self {
        let now = Utc::now();
        Self {
            key,
            donor_address: donor_address.into(),
            tenant_id: tenant_id.into(),
            read_preference,
            start_fetching_position: None,
            start_applying_position: None,
            terminal_status: None,
            started_at: now,
            last_updated: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal_status.is_some()
    }

    pub fn has_start_positions(&self) -> bool {
        self.start_fetching_position.is_some() && self.start_applying_position.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optime::Timestamp;

    fn doc() -> StateDocument {
        StateDocument::new(
            MigrationKey::generate(),
            "donorSet/a:27017",
            "tenantA",
            ReadPreferencePolicy::new(ReadPreferenceMode::PrimaryOnly),
        )
    }

    #[test]
    fn fresh_document_is_active_without_positions() {
        let doc = doc();
        assert!(!doc.is_terminal());
        assert!(!doc.has_start_positions());
    }

    #[test]
    fn has_start_positions_requires_both() {
        let mut doc = doc();
        doc.start_fetching_position = Some(OpTime::new(Timestamp::new(3, 1), 1));
        assert!(!doc.has_start_positions());
        doc.start_applying_position = Some(OpTime::new(Timestamp::new(5, 1), 1));
        assert!(doc.has_start_positions());
    }

    #[test]
    fn tag_builder_accumulates() {
        let policy = ReadPreferencePolicy::new(ReadPreferenceMode::SecondaryOnly)
            .with_tag("region", "east")
            .with_tag("disk", "ssd");
        assert_eq!(policy.tags.len(), 2);
        assert_eq!(policy.tags.get("region").map(String::as_str), Some("east"));
    }
}
