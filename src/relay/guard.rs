use super::{RelayActuator, RelayState};

/// Scope guard for a running generator
///
/// Obtained from [`RelayActuator::acquire`]. [`GeneratorGuard::release`]
/// switches the relay off with a status message; if the guard is dropped
/// without being released (early return, panic unwinding, task abort) the
/// relay is forced off.
#[derive(Debug)]
#[must_use = "dropping the guard switches the generator off"]
pub struct GeneratorGuard {
    relay: RelayActuator,
    released: bool,
}

impl GeneratorGuard {
    pub(super) fn new(relay: RelayActuator) -> Self {
        Self {
            relay,
            released: false,
        }
    }

    /// Switch the generator off and publish `message` with the state change
    pub fn release<S: Into<String>>(mut self, message: S) {
        self.released = true;
        if self
            .relay
            .set_with_message(RelayState::Off, message)
            .is_err()
        {
            self.relay.force_off();
        }
    }
}

impl Drop for GeneratorGuard {
    fn drop(&mut self) {
        if !self.released {
            self.relay.force_off();
        }
    }
}
