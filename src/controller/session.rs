//! Charge session state
//!
//! A session exists from the moment the relay closes until the cycle reaches
//! an outcome. It owns the [`GeneratorGuard`], so the relay cannot outlive it.

use super::outcome::ChargeOutcome;
use crate::logging::StructuredLogger;
use crate::relay::GeneratorGuard;
use crate::status::ChargePhase;
use chrono::{DateTime, Utc};
use tokio::time::{Duration, Instant};

/// Phases a session can be in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Starting,
    RampUp,
    Trickle,
}

impl From<SessionPhase> for ChargePhase {
    fn from(phase: SessionPhase) -> Self {
        match phase {
            SessionPhase::Starting => ChargePhase::Starting,
            SessionPhase::RampUp => ChargePhase::RampUp,
            SessionPhase::Trickle => ChargePhase::Trickle,
        }
    }
}

/// One generator run
#[derive(Debug)]
pub struct ChargeSession {
    /// Unique session ID
    pub id: String,
    pub phase: SessionPhase,
    /// Monotonic start, used for all timeouts
    pub start_time: Instant,
    /// Wall-clock start for logs
    pub started_at: DateTime<Utc>,
    pub initial_voltage: f64,
    pub peak_voltage: f64,
    pub phase_start_time: Instant,
    pub(super) logger: StructuredLogger,
    guard: GeneratorGuard,
}

impl ChargeSession {
    pub(super) fn new(
        guard: GeneratorGuard,
        initial_voltage: f64,
        now: Instant,
        component_logger: &StructuredLogger,
    ) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let logger = component_logger.for_session(&id);
        Self {
            id,
            phase: SessionPhase::Starting,
            start_time: now,
            started_at: Utc::now(),
            initial_voltage,
            peak_voltage: initial_voltage,
            phase_start_time: now,
            logger,
            guard,
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start_time)
    }

    pub fn phase_elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.phase_start_time)
    }

    pub(super) fn observe(&mut self, voltage: f64) {
        if voltage > self.peak_voltage {
            self.peak_voltage = voltage;
        }
    }

    pub(super) fn enter(&mut self, phase: SessionPhase, now: Instant) {
        self.logger.info(&format!(
            "Entering {} after {:.1} min",
            ChargePhase::from(phase),
            self.elapsed(now).as_secs_f64() / 60.0
        ));
        self.phase = phase;
        self.phase_start_time = now;
    }

    /// Switch the generator off and log the session summary
    pub(super) fn finish(self, outcome: &ChargeOutcome, now: Instant) {
        let minutes = self.elapsed(now).as_secs_f64() / 60.0;
        let summary = format!(
            "Ended charging after {:.1} min: {} (start {:.1}V, peak {:.1}V, started {})",
            minutes,
            outcome,
            self.initial_voltage,
            self.peak_voltage,
            self.started_at.to_rfc3339()
        );
        match outcome {
            ChargeOutcome::Completed(_) | ChargeOutcome::Cancelled => self.logger.info(&summary),
            _ => self.logger.error(&summary),
        }
        self.guard.release(outcome.message());
    }

    /// End the session without an outcome (process shutdown)
    pub(super) fn abort(self, reason: &str) {
        self.logger.warn(&format!(
            "{} (phase {}, peak {:.1}V)",
            reason,
            ChargePhase::from(self.phase),
            self.peak_voltage
        ));
        self.guard.release(reason);
    }
}
