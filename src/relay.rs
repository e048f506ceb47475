//! Generator contactor relay
//!
//! [`RelayActuator`] is the only path to the relay hardware. It caches the last
//! commanded state, mirrors it into the shared status and hands out
//! [`GeneratorGuard`]s that switch the generator off when dropped.

use crate::error::{GenwatchError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::status::StatusHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};

mod gpio;
mod guard;
mod simulated;

pub use gpio::GpioRelay;
pub use guard::GeneratorGuard;
pub use simulated::{SimulatedRelay, SimulatedRelayHandle};

/// Commanded relay position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayState {
    On,
    Off,
}

impl RelayState {
    pub fn is_on(self) -> bool {
        matches!(self, RelayState::On)
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayState::On => f.write_str("on"),
            RelayState::Off => f.write_str("off"),
        }
    }
}

/// Hardware side of the relay. Writes must be quick; they also run from `Drop`.
pub trait RelayDriver: Send {
    /// Short name for logs
    fn name(&self) -> &'static str;

    fn write(&mut self, state: RelayState) -> Result<()>;
}

struct RelayInner {
    driver: Box<dyn RelayDriver>,
    state: RelayState,
}

/// Shared, cloneable relay front-end
#[derive(Clone)]
pub struct RelayActuator {
    inner: Arc<Mutex<RelayInner>>,
    status: StatusHandle,
    logger: StructuredLogger,
}

impl fmt::Debug for RelayActuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayActuator")
            .field("state", &self.current_state())
            .finish()
    }
}

impl RelayActuator {
    /// Wrap a driver. The relay is assumed off; call [`Self::force_off`] to make sure.
    pub fn new(driver: Box<dyn RelayDriver>, status: StatusHandle) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RelayInner {
                driver,
                state: RelayState::Off,
            })),
            status,
            logger: get_logger("relay"),
        }
    }

    /// Last commanded state
    pub fn current_state(&self) -> RelayState {
        match self.inner.lock() {
            Ok(inner) => inner.state,
            Err(poisoned) => poisoned.into_inner().state,
        }
    }

    /// Command the relay; repeating the current state only logs
    pub fn set(&self, state: RelayState) -> Result<()> {
        self.apply(state, None)
    }

    /// Command the relay and publish `message` in the same status update
    pub fn set_with_message<S: Into<String>>(&self, state: RelayState, message: S) -> Result<()> {
        self.apply(state, Some(message.into()))
    }

    /// Switch the generator on and return a guard that switches it off again
    pub fn acquire<S: Into<String>>(&self, message: S) -> Result<GeneratorGuard> {
        self.set_with_message(RelayState::On, message)?;
        Ok(GeneratorGuard::new(self.clone()))
    }

    /// Write Off to the driver regardless of the cached state. Never fails the
    /// caller; a driver error is logged and the status still reports off.
    pub fn force_off(&self) {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = inner.driver.write(RelayState::Off) {
            self.logger
                .error(&format!("Failed to force generator relay off: {}", e));
        }
        let was_on = inner.state.is_on();
        inner.state = RelayState::Off;
        self.status.update(|s| s.generator_on = false);
        drop(inner);
        if was_on {
            self.logger.warn("Generator relay forced off");
        } else {
            self.logger.debug("Generator relay forced off (already off)");
        }
    }

    fn apply(&self, state: RelayState, message: Option<String>) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| GenwatchError::relay("relay lock poisoned"))?;

        if inner.state == state {
            self.logger
                .debug(&format!("Generator relay already {}, nothing to do", state));
            if let Some(message) = message {
                self.status.update(|s| {
                    s.generator_on = state.is_on();
                    s.message = message;
                });
            }
            return Ok(());
        }

        if let Err(e) = inner.driver.write(state) {
            // A failed write leaves the contactor in an unknown position
            if state.is_on() {
                let _ = inner.driver.write(RelayState::Off);
                inner.state = RelayState::Off;
                self.status.update(|s| s.generator_on = false);
            }
            return Err(GenwatchError::relay(format!(
                "{} driver failed to switch {}: {}",
                inner.driver.name(),
                state,
                e
            )));
        }

        inner.state = state;
        self.status.update(|s| {
            s.generator_on = state.is_on();
            if let Some(message) = message {
                s.message = message;
            }
        });
        drop(inner);

        self.logger.info(&format!("Generator relay {}", state));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_off_twice_writes_once() {
        let status = StatusHandle::default();
        let relay = SimulatedRelay::new();
        let handle = relay.handle();
        let actuator = RelayActuator::new(Box::new(relay), status.clone());

        actuator.set(RelayState::On).unwrap();
        actuator.set(RelayState::Off).unwrap();
        assert!(!status.snapshot().generator_on);
        actuator.set(RelayState::Off).unwrap();
        assert!(!status.snapshot().generator_on);
        assert_eq!(handle.write_count(), 2);
    }

    #[test]
    fn failed_on_write_reports_error_and_stays_off() {
        let status = StatusHandle::default();
        let relay = SimulatedRelay::new();
        let handle = relay.handle();
        handle.set_failing(true);
        let actuator = RelayActuator::new(Box::new(relay), status.clone());

        assert!(actuator.set(RelayState::On).is_err());
        assert_eq!(actuator.current_state(), RelayState::Off);
        assert!(!status.snapshot().generator_on);
    }

    #[test]
    fn message_and_state_publish_together() {
        let status = StatusHandle::default();
        let actuator = RelayActuator::new(Box::new(SimulatedRelay::new()), status.clone());
        let mut rx = status.subscribe();

        actuator
            .set_with_message(RelayState::On, "Charging")
            .unwrap();
        let snap = rx.borrow_and_update().clone();
        assert!(snap.generator_on);
        assert_eq!(snap.message, "Charging");
    }
}
