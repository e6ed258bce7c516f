//! Named synchronization gates for deterministic test control.
//!
//! A workflow step checks its named gate; if the gate is armed the step
//! increments the gate's entered counter and suspends until the gate is
//! disarmed. Harnesses arm gates, wait for a step to arrive, mutate the
//! world, then disarm. Production paths carry no dependency on this
//! module: the registry is injected as an optional hook and an absent
//! registry makes every check a no-op.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

/// Arming mode of a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
    /// Entries pass straight through.
    Off,
    /// Every entry suspends until the mode changes.
    AlwaysOn,
    /// The next `n` entries suspend; later entries pass through.
    Times(u32),
}

#[derive(Debug, Clone)]
struct GateState {
    mode: GateMode,
    entered: u64,
}

/// One named gate. Cheap to share; all methods take `&self`.
pub struct FailGate {
    name: String,
    state: watch::Sender<GateState>,
}

impl FailGate {
    fn new(name: &str) -> Self {
        let (state, _) = watch::channel(GateState {
            mode: GateMode::Off,
            entered: 0,
        });
        Self {
            name: name.to_string(),
            state,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arm or disarm the gate. Returns the entered count at the time of
    /// the call, so harnesses can wait for `count + n` further entries.
    pub fn set_mode(&self, mode: GateMode) -> u64 {
        let mut entered = 0;
        self.state.send_modify(|state| {
            entered = state.entered;
            state.mode = mode;
        });
        entered
    }

    /// Entered count so far.
    pub fn entered(&self) -> u64 {
        self.state.borrow().entered
    }

    /// Record an entry and, if the gate is armed, suspend until the mode
    /// changes to [`GateMode::Off`]. A `Times(n)` gate arms the first `n`
    /// entries; `set_mode` is the only disarm path for a suspended entry.
    pub async fn enter(&self) {
        let mut armed = false;
        self.state.send_modify(|state| {
            state.entered += 1;
            match state.mode {
                GateMode::Off => {}
                GateMode::AlwaysOn => armed = true,
                GateMode::Times(0) => state.mode = GateMode::Off,
                GateMode::Times(n) => {
                    armed = true;
                    state.mode = GateMode::Times(n - 1);
                }
            }
        });
        if !armed {
            return;
        }
        let mut rx = self.state.subscribe();
        while rx.borrow_and_update().mode != GateMode::Off {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Suspend until the entered counter reaches `count`.
    pub async fn wait_for_entered(&self, count: u64) {
        let mut rx = self.state.subscribe();
        while rx.borrow_and_update().entered < count {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Registry of named gates. Gates are created on first lookup so harness
/// and workflow sides need no registration order.
#[derive(Default)]
pub struct FailGateRegistry {
    gates: Mutex<HashMap<String, Arc<FailGate>>>,
}

impl FailGateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, name: &str) -> Arc<FailGate> {
        let mut gates = self.gates.lock().expect("fail gate registry poisoned");
        gates
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(FailGate::new(name)))
            .clone()
    }
}
