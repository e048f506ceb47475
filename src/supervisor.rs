//! Enable supervisor
//!
//! Owns the `enabled` flag that gates automatic charging. The operator
//! toggles it; safety faults force it off. Nothing re-enables it
//! automatically.

use crate::logging::{StructuredLogger, get_logger};
use crate::status::StatusHandle;
use tokio::sync::{mpsc, watch};

/// Events coming from the operator panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorEvent {
    /// Edge of the enable/disable button
    TogglePressed,
}

#[derive(Debug, Clone)]
pub struct EnableSupervisor {
    status: StatusHandle,
    logger: StructuredLogger,
}

impl EnableSupervisor {
    pub fn new(status: StatusHandle) -> Self {
        Self {
            status,
            logger: get_logger("supervisor"),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.status.snapshot().enabled
    }

    /// Flip the flag on operator request; returns the new value
    pub fn toggle(&self) -> bool {
        let mut now_enabled = false;
        self.status.update(|s| {
            s.enabled = !s.enabled;
            now_enabled = s.enabled;
            s.message = if s.enabled {
                "Automatic charging enabled by operator".to_string()
            } else {
                "Automatic charging disabled by operator".to_string()
            };
        });
        self.logger.info(&format!(
            "Operator toggled automatic charging {}",
            if now_enabled { "on" } else { "off" }
        ));
        now_enabled
    }

    /// Safety shutdown of automatic charging. Idempotent; the message is
    /// always refreshed, the transition is logged once.
    pub fn disable<S: Into<String>>(&self, reason: S) {
        let reason = reason.into();
        let mut was_enabled = false;
        self.status.update(|s| {
            was_enabled = s.enabled;
            s.enabled = false;
            s.message = reason.clone();
        });
        if was_enabled {
            self.logger
                .error(&format!("Automatic charging disabled: {}", reason));
        } else {
            self.logger
                .debug(&format!("Already disabled, message now: {}", reason));
        }
    }

    /// Consume operator events until the channel closes or shutdown is signalled
    pub async fn run_operator_events(
        self,
        mut events: mpsc::UnboundedReceiver<OperatorEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(OperatorEvent::TogglePressed) => {
                        self.toggle();
                    }
                    None => break,
                },
                _ = shutdown.changed() => break,
            }
        }
        self.logger.debug("Operator event loop stopped");
    }
}
