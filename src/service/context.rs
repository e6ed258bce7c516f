//! Explicitly constructed dependency bundle for recipient services.
//!
//! There is no process-wide singleton: whoever hosts a service builds a
//! context and hands it down, which scopes init and teardown to the
//! process or the test fixture that owns it.

use std::sync::Arc;

use crate::config::RecipientConfig;
use crate::donor::topology::DonorDirectory;
use crate::failgate::FailGateRegistry;
use crate::store::StateStore;

/// Everything a recipient instance needs to run.
pub struct RecipientContext {
    pub store: Arc<dyn StateStore>,
    pub donors: Arc<dyn DonorDirectory>,
    pub config: RecipientConfig,
    /// Test-control hook. Absent in production; workflow gate checks are
    /// no-ops without it.
    pub gates: Option<Arc<FailGateRegistry>>,
}

impl RecipientContext {
    pub fn new(
        store: Arc<dyn StateStore>,
        donors: Arc<dyn DonorDirectory>,
        config: RecipientConfig,
    ) -> Self {
        Self {
            store,
            donors,
            config,
            gates: None,
        }
    }

    pub fn with_gates(mut self, gates: Arc<FailGateRegistry>) -> Self {
        self.gates = Some(gates);
        self
    }
}
