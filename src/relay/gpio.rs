use super::{RelayDriver, RelayState};
use crate::error::{GenwatchError, Result};
use std::path::PathBuf;

/// Relay on a sysfs GPIO line (`/sys/class/gpio/gpioN/value`)
///
/// The line must already be exported and configured as an output.
#[derive(Debug, Clone)]
pub struct GpioRelay {
    value_path: PathBuf,
    active_low: bool,
}

impl GpioRelay {
    pub fn new<P: Into<PathBuf>>(value_path: P, active_low: bool) -> Self {
        Self {
            value_path: value_path.into(),
            active_low,
        }
    }

    fn level_for(&self, state: RelayState) -> &'static str {
        match (state.is_on(), self.active_low) {
            (true, false) | (false, true) => "1",
            (false, false) | (true, true) => "0",
        }
    }
}

impl RelayDriver for GpioRelay {
    fn name(&self) -> &'static str {
        "gpio"
    }

    fn write(&mut self, state: RelayState) -> Result<()> {
        std::fs::write(&self.value_path, self.level_for(state)).map_err(|e| {
            GenwatchError::relay(format!("{}: {}", self.value_path.display(), e))
        })
    }
}
