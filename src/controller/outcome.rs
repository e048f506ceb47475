use crate::status::ChargePhase;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Why a charge cycle finished normally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionReason {
    /// Trickle phase ran its full length
    TrickleElapsed,
    /// Bank crossed the over-voltage ceiling during trickle
    OverVoltage,
}

/// Result of one charge session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChargeOutcome {
    Completed(CompletionReason),
    /// Full voltage not reached within the ramp-up limit; recoverable
    TimedOut { voltage: f64, elapsed: Duration },
    /// Voltage did not rise after the relay closed
    FaultedStartFailure { initial_voltage: f64, voltage: f64 },
    /// Voltage collapsed while charging
    FaultedFuelOut { phase: ChargePhase, voltage: f64 },
    /// Automatic charging was disabled mid-session
    Cancelled,
    /// Voltage could not be read mid-session
    SensorFault { message: String },
}

impl ChargeOutcome {
    /// Whether the outcome must disable automatic charging
    pub fn disables_supervisor(&self) -> bool {
        matches!(
            self,
            ChargeOutcome::FaultedStartFailure { .. } | ChargeOutcome::FaultedFuelOut { .. }
        )
    }

    /// Text published in the status message
    pub fn message(&self) -> String {
        match self {
            ChargeOutcome::Completed(CompletionReason::TrickleElapsed) => {
                "Charge complete".to_string()
            }
            ChargeOutcome::Completed(CompletionReason::OverVoltage) => {
                "Charge complete (over-voltage stop)".to_string()
            }
            ChargeOutcome::TimedOut { voltage, elapsed } => format!(
                "RAMP-UP TIMEOUT: {:.1}V after {} min",
                voltage,
                elapsed.as_secs() / 60
            ),
            ChargeOutcome::FaultedStartFailure {
                initial_voltage,
                voltage,
            } => format!(
                "GENERATOR START FAILURE: {:.1}V -> {:.1}V, check fuel",
                initial_voltage, voltage
            ),
            ChargeOutcome::FaultedFuelOut { phase, voltage } => format!(
                "FUEL OUT: voltage fell to {:.1}V during {}",
                voltage, phase
            ),
            ChargeOutcome::Cancelled => "Charge cancelled: automatic charging disabled".to_string(),
            ChargeOutcome::SensorFault { message } => {
                format!("SENSOR FAULT during charge: {}", message)
            }
        }
    }
}

impl fmt::Display for ChargeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}
