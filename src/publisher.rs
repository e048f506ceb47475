//! Status publisher
//!
//! Read-only view of the shared status for the display panel, plus the
//! inbound toggle channel. The panel itself lives outside this crate; the
//! console display loop stands in for it when no panel is attached.

use crate::logging::{StructuredLogger, get_logger};
use crate::status::{StatusHandle, SystemStatus};
use crate::supervisor::OperatorEvent;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, MissedTickBehavior, interval};

/// Colour-coded state shown on the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusIndicator {
    /// Automatic charging off (red)
    Disabled,
    /// Relay on (orange)
    GeneratorRunning,
    /// Armed and waiting (blue)
    Standby,
}

impl StatusIndicator {
    pub fn from_status(status: &SystemStatus) -> Self {
        if !status.enabled {
            StatusIndicator::Disabled
        } else if status.generator_on {
            StatusIndicator::GeneratorRunning
        } else {
            StatusIndicator::Standby
        }
    }
}

impl fmt::Display for StatusIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusIndicator::Disabled => f.write_str("DISABLED"),
            StatusIndicator::GeneratorRunning => f.write_str("GENERATOR ON"),
            StatusIndicator::Standby => f.write_str("STANDBY"),
        }
    }
}

/// One console line for a snapshot
pub fn render_line(status: &SystemStatus) -> String {
    let mut line = format!(
        "[{}] {:.1}V {:.2}A {:.0}Wh phase={}",
        StatusIndicator::from_status(status),
        status.last_voltage,
        status.last_current,
        status.ac_energy_wh,
        status.phase
    );
    if !status.message.is_empty() {
        line.push_str(" | ");
        line.push_str(&status.message);
    }
    line
}

#[derive(Debug, Clone)]
pub struct StatusPublisher {
    status: StatusHandle,
    toggle_tx: mpsc::UnboundedSender<OperatorEvent>,
}

impl StatusPublisher {
    pub fn new(status: StatusHandle, toggle_tx: mpsc::UnboundedSender<OperatorEvent>) -> Self {
        Self { status, toggle_tx }
    }

    pub fn snapshot(&self) -> Arc<SystemStatus> {
        self.status.snapshot()
    }

    pub fn indicator(&self) -> StatusIndicator {
        StatusIndicator::from_status(&self.status.snapshot())
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<SystemStatus>> {
        self.status.subscribe()
    }

    /// Forward a button press to the enable supervisor. Returns false when
    /// the supervisor is gone.
    pub fn press_toggle(&self) -> bool {
        self.toggle_tx.send(OperatorEvent::TogglePressed).is_ok()
    }

    /// Log a status line every `period` until shutdown
    pub async fn run_console_display(self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let logger: StructuredLogger = get_logger("display");
        let mut ticker = interval(period.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    logger.info(&render_line(&self.status.snapshot()));
                }
                _ = shutdown.changed() => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ChargePhase;

    #[test]
    fn indicator_prefers_disabled() {
        let mut status = SystemStatus::default();
        assert_eq!(StatusIndicator::from_status(&status), StatusIndicator::Standby);
        status.generator_on = true;
        assert_eq!(
            StatusIndicator::from_status(&status),
            StatusIndicator::GeneratorRunning
        );
        status.enabled = false;
        assert_eq!(StatusIndicator::from_status(&status), StatusIndicator::Disabled);
    }

    #[test]
    fn line_carries_message() {
        let status = SystemStatus {
            last_voltage: 47.96,
            phase: ChargePhase::LowVoltageCountdown,
            message: "Low voltage".to_string(),
            ..SystemStatus::default()
        };
        let line = render_line(&status);
        assert!(line.starts_with("[STANDBY] 48.0V"));
        assert!(line.ends_with("| Low voltage"));
    }

    #[test]
    fn toggle_reaches_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let publisher = StatusPublisher::new(StatusHandle::default(), tx);
        assert!(publisher.press_toggle());
        assert_eq!(rx.try_recv().unwrap(), OperatorEvent::TogglePressed);
        drop(rx);
        assert!(!publisher.press_toggle());
    }
}
