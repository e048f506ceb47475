//! Shared system status
//!
//! One [`SystemStatus`] record is published through a `tokio::sync::watch`
//! channel. Writers go through [`StatusHandle::update`], which applies the
//! whole modification inside a single `send_modify`, so readers always see a
//! complete record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Externally visible phase of the charge state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargePhase {
    Idle,
    LowVoltageCountdown,
    Starting,
    RampUp,
    Trickle,
    CoolDown,
    Faulted,
    /// Startup self-test holds the relay
    SelfTest,
}

impl ChargePhase {
    /// Whether a charge session is running in this phase
    pub fn is_charging(self) -> bool {
        matches!(
            self,
            ChargePhase::Starting | ChargePhase::RampUp | ChargePhase::Trickle
        )
    }
}

impl fmt::Display for ChargePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChargePhase::Idle => "idle",
            ChargePhase::LowVoltageCountdown => "low-voltage countdown",
            ChargePhase::Starting => "starting",
            ChargePhase::RampUp => "ramp-up",
            ChargePhase::Trickle => "trickle",
            ChargePhase::CoolDown => "cooldown",
            ChargePhase::Faulted => "faulted",
            ChargePhase::SelfTest => "self-test",
        };
        f.write_str(s)
    }
}

/// Snapshot of everything the display and telemetry need
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub enabled: bool,
    pub generator_on: bool,
    pub phase: ChargePhase,
    pub last_voltage: f64,
    pub last_current: f64,
    /// Energy estimate integrated by the current sampler
    pub ac_energy_wh: f64,
    pub message: String,
    pub updated_at: DateTime<Utc>,
}

impl Default for SystemStatus {
    fn default() -> Self {
        Self {
            enabled: true,
            generator_on: false,
            phase: ChargePhase::Idle,
            last_voltage: 0.0,
            last_current: 0.0,
            ac_energy_wh: 0.0,
            message: String::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Cloneable write handle for the shared status
#[derive(Debug, Clone)]
pub struct StatusHandle {
    tx: Arc<watch::Sender<Arc<SystemStatus>>>,
}

impl StatusHandle {
    pub fn new(initial: SystemStatus) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self { tx: Arc::new(tx) }
    }

    /// Apply a modification atomically and stamp `updated_at`
    pub fn update<F>(&self, modify: F)
    where
        F: FnOnce(&mut SystemStatus),
    {
        self.tx.send_modify(|current| {
            let status = Arc::make_mut(current);
            modify(status);
            status.updated_at = Utc::now();
        });
    }

    /// Current snapshot; cheap `Arc` clone
    pub fn snapshot(&self) -> Arc<SystemStatus> {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every update
    pub fn subscribe(&self) -> watch::Receiver<Arc<SystemStatus>> {
        self.tx.subscribe()
    }

    pub fn set_message<S: Into<String>>(&self, message: S) {
        let message = message.into();
        self.update(|s| s.message = message);
    }

    pub fn set_phase(&self, phase: ChargePhase) {
        self.update(|s| s.phase = phase);
    }

    pub fn record_voltage(&self, voltage: f64) {
        self.update(|s| s.last_voltage = voltage);
    }
}

impl Default for StatusHandle {
    fn default() -> Self {
        Self::new(SystemStatus::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_publishes_fields_together() {
        let handle = StatusHandle::default();
        let before = handle.snapshot();
        handle.update(|s| {
            s.generator_on = true;
            s.message = "Charging".to_string();
        });
        let after = handle.snapshot();

        // Old snapshot is untouched, new one carries both fields
        assert!(!before.generator_on);
        assert!(before.message.is_empty());
        assert!(after.generator_on);
        assert_eq!(after.message, "Charging");
    }

    #[tokio::test]
    async fn subscribers_are_notified() {
        let handle = StatusHandle::default();
        let mut rx = handle.subscribe();
        handle.record_voltage(51.2);
        rx.changed().await.unwrap();
        assert!((rx.borrow().last_voltage - 51.2).abs() < 1e-9);
    }

    #[test]
    fn charging_phases() {
        assert!(ChargePhase::RampUp.is_charging());
        assert!(!ChargePhase::CoolDown.is_charging());
        assert_eq!(ChargePhase::LowVoltageCountdown.to_string(), "low-voltage countdown");
    }
}
