use super::{RelayDriver, RelayState};
use crate::error::{GenwatchError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Default)]
struct Shared {
    on: AtomicBool,
    failing: AtomicBool,
    writes: AtomicUsize,
}

/// In-memory relay for simulation and tests
#[derive(Debug, Clone, Default)]
pub struct SimulatedRelay {
    shared: Arc<Shared>,
}

/// Observer/control side of a [`SimulatedRelay`]
#[derive(Debug, Clone)]
pub struct SimulatedRelayHandle {
    shared: Arc<Shared>,
}

impl SimulatedRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> SimulatedRelayHandle {
        SimulatedRelayHandle {
            shared: self.shared.clone(),
        }
    }
}

impl SimulatedRelayHandle {
    /// Physical position of the simulated contactor
    pub fn is_on(&self) -> bool {
        self.shared.on.load(Ordering::SeqCst)
    }

    /// Number of driver writes so far
    pub fn write_count(&self) -> usize {
        self.shared.writes.load(Ordering::SeqCst)
    }

    /// Reject On writes until cleared; Off writes always succeed
    pub fn set_failing(&self, failing: bool) {
        self.shared.failing.store(failing, Ordering::SeqCst);
    }
}

impl RelayDriver for SimulatedRelay {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn write(&mut self, state: RelayState) -> Result<()> {
        self.shared.writes.fetch_add(1, Ordering::SeqCst);
        if state.is_on() && self.shared.failing.load(Ordering::SeqCst) {
            return Err(GenwatchError::relay("simulated contactor refused to close"));
        }
        self.shared.on.store(state.is_on(), Ordering::SeqCst);
        Ok(())
    }
}
