//! Charge state machine
//!
//! The controller is the only task that commands the generator relay in
//! steady-state operation. Each [`ChargeController::tick`] takes one fresh
//! voltage reading and advances the state machine:
//!
//! ```text
//! Idle -> LowVoltageCountdown -> Starting -> RampUp -> Trickle -> CoolDown -> Idle
//!                                    \          \          \
//!                                     +----------+----------+--> Faulted / Idle
//! ```
//!
//! A charge session ends with a [`ChargeOutcome`]; [`ChargeController`]
//! matches on it to decide the next state and whether the enable supervisor
//! must be tripped.

use crate::config::ChargeConfig;
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use crate::relay::RelayActuator;
use crate::sensor::SensorSource;
use crate::status::{ChargePhase, StatusHandle, SystemStatus};
use crate::supervisor::EnableSupervisor;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, Instant, sleep};

mod outcome;
mod session;

pub use outcome::{ChargeOutcome, CompletionReason};
pub use session::{ChargeSession, SessionPhase};

#[derive(Debug)]
enum ControllerState {
    Idle,
    Countdown { since: Instant, refused_logged: bool },
    Charging(ChargeSession),
    CoolDown { since: Instant },
    Faulted,
}

enum SessionStep {
    Continue(ChargeSession),
    Finished(ChargeSession, ChargeOutcome),
}

pub struct ChargeController {
    config: ChargeConfig,
    sensor: SensorSource,
    relay: RelayActuator,
    supervisor: EnableSupervisor,
    status: StatusHandle,
    state: ControllerState,
    logger: StructuredLogger,
}

impl ChargeController {
    pub fn new(
        config: ChargeConfig,
        sensor: SensorSource,
        relay: RelayActuator,
        supervisor: EnableSupervisor,
        status: StatusHandle,
    ) -> Self {
        Self {
            config,
            sensor,
            relay,
            supervisor,
            status,
            state: ControllerState::Idle,
            logger: get_logger("controller"),
        }
    }

    /// Current phase of the state machine
    pub fn phase(&self) -> ChargePhase {
        match &self.state {
            ControllerState::Idle => ChargePhase::Idle,
            ControllerState::Countdown { .. } => ChargePhase::LowVoltageCountdown,
            ControllerState::Charging(session) => session.phase.into(),
            ControllerState::CoolDown { .. } => ChargePhase::CoolDown,
            ControllerState::Faulted => ChargePhase::Faulted,
        }
    }

    /// Active charge session, if any
    pub fn session(&self) -> Option<&ChargeSession> {
        match &self.state {
            ControllerState::Charging(session) => Some(session),
            _ => None,
        }
    }

    /// Time left in the post-charge inhibition window
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        match self.state {
            ControllerState::CoolDown { since } => Some(
                self.config
                    .cooldown()
                    .saturating_sub(Instant::now().saturating_duration_since(since)),
            ),
            _ => None,
        }
    }

    /// Decision interval for the current state
    pub fn poll_interval(&self) -> Duration {
        match self.state {
            ControllerState::Charging(_) => self.config.active_poll_interval(),
            _ => self.config.poll_interval(),
        }
    }

    /// Advance the state machine by one monitoring tick. Returns the outcome
    /// when a charge session ended on this tick.
    pub async fn tick(&mut self) -> Option<ChargeOutcome> {
        let reading = self.sensor.read_voltage().await;
        let now = Instant::now();
        if let Ok(voltage) = &reading {
            self.status.record_voltage(*voltage);
        }

        let state = std::mem::replace(&mut self.state, ControllerState::Idle);
        let (next, outcome) = match state {
            ControllerState::Idle => (self.tick_idle(&reading, now), None),
            ControllerState::Countdown {
                since,
                refused_logged,
            } => (
                self.tick_countdown(since, refused_logged, &reading, now),
                None,
            ),
            ControllerState::Charging(session) => match self.tick_session(session, &reading, now)
            {
                SessionStep::Continue(session) => (ControllerState::Charging(session), None),
                SessionStep::Finished(session, outcome) => {
                    session.finish(&outcome, now);
                    (self.apply_outcome(&outcome, now), Some(outcome))
                }
            },
            ControllerState::CoolDown { since } => (self.tick_cooldown(since, now), None),
            ControllerState::Faulted => (self.tick_faulted(), None),
        };
        self.state = next;
        self.publish_phase();
        outcome
    }

    /// Decide the next state from a finished session
    fn apply_outcome(&self, outcome: &ChargeOutcome, now: Instant) -> ControllerState {
        if outcome.disables_supervisor() {
            self.supervisor.disable(outcome.message());
            return ControllerState::Faulted;
        }

        match outcome {
            ChargeOutcome::Completed(reason) => {
                self.logger.info(&format!(
                    "CHARGE COMPLETE ({:?}), generator inhibited for {} min",
                    reason,
                    self.config.cooldown().as_secs() / 60
                ));
                return ControllerState::CoolDown { since: now };
            }
            ChargeOutcome::TimedOut { .. } => {
                self.logger.error(&format!(
                    "Did not get to full voltage in maximum time: {}",
                    outcome
                ));
            }
            ChargeOutcome::Cancelled => {
                self.logger
                    .warn("Charge cancelled because automatic charging was disabled");
            }
            ChargeOutcome::SensorFault { message } => {
                self.logger.warn(&format!(
                    "Charge aborted, voltage unknown: {}",
                    message
                ));
            }
            ChargeOutcome::FaultedStartFailure { .. } | ChargeOutcome::FaultedFuelOut { .. } => {}
        }
        ControllerState::Idle
    }

    fn tick_idle(&self, reading: &Result<f64>, now: Instant) -> ControllerState {
        match reading {
            Ok(voltage) if *voltage <= self.config.low_charge_voltage => {
                self.logger.info(&format!(
                    "Voltage {:.1}V at or below {:.1}V, starting {}s countdown",
                    voltage,
                    self.config.low_charge_voltage,
                    self.config.low_voltage_secs_before_generator
                ));
                if self.supervisor.is_enabled() {
                    self.status.set_message(format!(
                        "Low voltage {:.1}V, generator in {}s",
                        voltage, self.config.low_voltage_secs_before_generator
                    ));
                }
                ControllerState::Countdown {
                    since: now,
                    refused_logged: false,
                }
            }
            Ok(_) => ControllerState::Idle,
            Err(e) => {
                self.logger
                    .warn(&format!("Voltage read failed while idle: {}", e));
                ControllerState::Idle
            }
        }
    }

    fn tick_countdown(
        &self,
        since: Instant,
        refused_logged: bool,
        reading: &Result<f64>,
        now: Instant,
    ) -> ControllerState {
        let voltage = match reading {
            Ok(voltage) => *voltage,
            Err(e) => {
                self.logger.warn(&format!(
                    "Voltage read failed, cancelling low-voltage countdown: {}",
                    e
                ));
                return ControllerState::Idle;
            }
        };

        if voltage > self.config.low_charge_voltage {
            self.logger.info(&format!(
                "Voltage recovered to {:.1}V, countdown cancelled",
                voltage
            ));
            if self.supervisor.is_enabled() {
                self.status
                    .set_message(format!("Voltage recovered to {:.1}V", voltage));
            }
            return ControllerState::Idle;
        }

        let elapsed = now.saturating_duration_since(since);
        if elapsed <= self.config.low_voltage_grace() {
            self.logger.debug(&format!(
                "Low voltage {:.1}V for {}s of {}s",
                voltage,
                elapsed.as_secs(),
                self.config.low_voltage_secs_before_generator
            ));
            return ControllerState::Countdown {
                since,
                refused_logged,
            };
        }

        if !self.supervisor.is_enabled() {
            if !refused_logged {
                self.logger.warn(&format!(
                    "Voltage low for {}s but automatic charging is disabled",
                    elapsed.as_secs()
                ));
            }
            return ControllerState::Countdown {
                since,
                refused_logged: true,
            };
        }

        self.start_session(voltage, now)
    }

    fn start_session(&self, voltage: f64, now: Instant) -> ControllerState {
        self.logger
            .info(&format!("Starting to charge because voltage is low ({:.1}V)", voltage));
        match self
            .relay
            .acquire(format!("Generator starting, bank at {:.1}V", voltage))
        {
            Ok(guard) => {
                let session = ChargeSession::new(guard, voltage, now, &self.logger);
                session.logger.info(&format!(
                    "Charge session started at {:.1}V, verifying start in {}s",
                    voltage, self.config.start_verification_secs
                ));
                ControllerState::Charging(session)
            }
            Err(e) => {
                self.relay.force_off();
                self.supervisor
                    .disable(format!("RELAY FAULT: could not start generator: {}", e));
                ControllerState::Faulted
            }
        }
    }

    fn tick_session(
        &self,
        mut session: ChargeSession,
        reading: &Result<f64>,
        now: Instant,
    ) -> SessionStep {
        // Cancellation channel comes first, independent of the readings
        if !self.supervisor.is_enabled() {
            return SessionStep::Finished(session, ChargeOutcome::Cancelled);
        }

        let voltage = match reading {
            Ok(voltage) => *voltage,
            Err(e) => {
                return SessionStep::Finished(
                    session,
                    ChargeOutcome::SensorFault {
                        message: e.to_string(),
                    },
                );
            }
        };
        session.observe(voltage);

        let low = self.config.low_charge_voltage;
        match session.phase {
            SessionPhase::Starting => {
                if session.phase_elapsed(now) < self.config.start_verification() {
                    session.logger.debug(&format!(
                        "Waiting for generator to start, {:.1}V",
                        voltage
                    ));
                    return SessionStep::Continue(session);
                }
                let rise = voltage - session.initial_voltage;
                if rise < self.config.minimum_start_voltage_rise {
                    let initial_voltage = session.initial_voltage;
                    return SessionStep::Finished(
                        session,
                        ChargeOutcome::FaultedStartFailure {
                            initial_voltage,
                            voltage,
                        },
                    );
                }
                session.enter(SessionPhase::RampUp, now);
                self.status.set_message(format!(
                    "Charging: ramp-up to {:.1}V, now {:.1}V",
                    self.config.full_charge_voltage, voltage
                ));
                SessionStep::Continue(session)
            }
            SessionPhase::RampUp => {
                if voltage <= low {
                    return SessionStep::Finished(
                        session,
                        ChargeOutcome::FaultedFuelOut {
                            phase: ChargePhase::RampUp,
                            voltage,
                        },
                    );
                }
                if voltage > self.config.full_charge_voltage {
                    session.logger.info(&format!(
                        "Full voltage during charging after {:.1} minutes",
                        session.elapsed(now).as_secs_f64() / 60.0
                    ));
                    session.enter(SessionPhase::Trickle, now);
                    self.status.set_message(format!(
                        "Charging: trickle for {} min",
                        self.config.trickle_charge_time / 60
                    ));
                    return SessionStep::Continue(session);
                }
                let elapsed = session.elapsed(now);
                if elapsed > self.config.max_ramp_time() {
                    return SessionStep::Finished(
                        session,
                        ChargeOutcome::TimedOut { voltage, elapsed },
                    );
                }
                session.logger.debug(&format!(
                    "{:.1} min. Voltage: {:.1}",
                    elapsed.as_secs_f64() / 60.0,
                    voltage
                ));
                SessionStep::Continue(session)
            }
            SessionPhase::Trickle => {
                if voltage <= low {
                    return SessionStep::Finished(
                        session,
                        ChargeOutcome::FaultedFuelOut {
                            phase: ChargePhase::Trickle,
                            voltage,
                        },
                    );
                }
                if voltage > self.config.over_voltage {
                    session.logger.warn(&format!(
                        "Voltage {:.1}V above {:.1}V, stopping trickle early",
                        voltage, self.config.over_voltage
                    ));
                    return SessionStep::Finished(
                        session,
                        ChargeOutcome::Completed(CompletionReason::OverVoltage),
                    );
                }
                if session.phase_elapsed(now) >= self.config.trickle_time() {
                    return SessionStep::Finished(
                        session,
                        ChargeOutcome::Completed(CompletionReason::TrickleElapsed),
                    );
                }
                session.logger.debug(&format!(
                    "Trickle {:.1} min. Voltage: {:.1}",
                    session.phase_elapsed(now).as_secs_f64() / 60.0,
                    voltage
                ));
                SessionStep::Continue(session)
            }
        }
    }

    fn tick_cooldown(&self, since: Instant, now: Instant) -> ControllerState {
        if now.saturating_duration_since(since) >= self.config.cooldown() {
            self.logger
                .info("Cooldown finished, automatic charging armed again");
            if self.supervisor.is_enabled() {
                self.status.set_message("Standby");
            }
            ControllerState::Idle
        } else {
            ControllerState::CoolDown { since }
        }
    }

    fn tick_faulted(&self) -> ControllerState {
        if self.supervisor.is_enabled() {
            self.logger
                .info("Operator re-enabled automatic charging, leaving fault state");
            ControllerState::Idle
        } else {
            ControllerState::Faulted
        }
    }

    fn publish_phase(&self) {
        let phase = self.phase();
        if self.status.snapshot().phase != phase {
            self.status.set_phase(phase);
        }
    }

    /// Switch the generator off if a session is running; used on shutdown
    pub fn shutdown(&mut self) {
        if let ControllerState::Charging(session) =
            std::mem::replace(&mut self.state, ControllerState::Idle)
        {
            session.abort("Generator stopped: controller shutting down");
        }
        self.publish_phase();
    }

    /// Run the decision loop until `shutdown` flips or its sender is dropped
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.logger.info(&format!(
            "Charge controller running: low {:.1}V, full {:.1}V, over {:.1}V, poll {}s",
            self.config.low_charge_voltage,
            self.config.full_charge_voltage,
            self.config.over_voltage,
            self.config.poll_interval_secs
        ));
        let mut status_rx = self.status.subscribe();
        self.publish_phase();

        loop {
            if *shutdown.borrow() {
                break;
            }
            self.tick().await;

            let wait = self.poll_interval();
            let charging = self.session().is_some();
            tokio::select! {
                _ = sleep(wait) => {}
                _ = wait_for_disable(&mut status_rx), if charging => {
                    self.logger.debug("Enable flag dropped, re-evaluating immediately");
                }
                _ = shutdown.changed() => break,
            }
        }

        self.shutdown();
        self.logger.info("Charge controller stopped");
        Ok(())
    }
}

async fn wait_for_disable(rx: &mut watch::Receiver<Arc<SystemStatus>>) {
    let disabled = rx.wait_for(|s| !s.enabled).await.is_ok();
    if !disabled {
        // Status sender gone; nothing will ever change again
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{SimulatedRelay, SimulatedRelayHandle};
    use crate::sensor::{CalibrationParams, SimulatedHandle, SimulatedSource};

    struct Rig {
        controller: ChargeController,
        volts: SimulatedHandle,
        relay: SimulatedRelayHandle,
        supervisor: EnableSupervisor,
        status: StatusHandle,
    }

    fn rig(voltage: f64) -> Rig {
        let status = StatusHandle::default();
        let sim = SimulatedSource::new(voltage, 0.0);
        let volts = sim.handle();
        let sensor = SensorSource::new(
            Arc::new(sim),
            CalibrationParams::identity(),
            CalibrationParams::identity(),
        );
        let driver = SimulatedRelay::new();
        let relay = driver.handle();
        let actuator = RelayActuator::new(Box::new(driver), status.clone());
        let supervisor = EnableSupervisor::new(status.clone());
        let controller = ChargeController::new(
            ChargeConfig::default(),
            sensor,
            actuator,
            supervisor.clone(),
            status.clone(),
        );
        Rig {
            controller,
            volts,
            relay,
            supervisor,
            status,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sensor_failure_while_idle_stays_idle() {
        let mut rig = rig(52.0);
        rig.volts.set_failing(true);
        assert!(rig.controller.tick().await.is_none());
        assert_eq!(rig.controller.phase(), ChargePhase::Idle);
        assert!(!rig.relay.is_on());
    }

    #[tokio::test(start_paused = true)]
    async fn relay_failure_on_start_faults_and_disables() {
        let mut rig = rig(46.0);
        rig.relay.set_failing(true);
        rig.controller.tick().await;
        assert_eq!(rig.controller.phase(), ChargePhase::LowVoltageCountdown);

        tokio::time::advance(Duration::from_secs(301)).await;
        rig.controller.tick().await;
        assert_eq!(rig.controller.phase(), ChargePhase::Faulted);
        assert!(!rig.supervisor.is_enabled());
        assert!(!rig.relay.is_on());
        assert!(rig.status.snapshot().message.contains("RELAY FAULT"));
        assert_eq!(rig.status.snapshot().phase, ChargePhase::Faulted);
    }

    #[tokio::test(start_paused = true)]
    async fn faulted_holds_until_operator_re_enables() {
        let mut rig = rig(46.0);
        rig.relay.set_failing(true);
        rig.controller.tick().await;
        tokio::time::advance(Duration::from_secs(301)).await;
        rig.controller.tick().await;
        assert_eq!(rig.controller.phase(), ChargePhase::Faulted);

        rig.relay.set_failing(false);
        tokio::time::advance(Duration::from_secs(600)).await;
        rig.controller.tick().await;
        assert_eq!(rig.controller.phase(), ChargePhase::Faulted);

        rig.supervisor.toggle();
        rig.controller.tick().await;
        assert_eq!(rig.controller.phase(), ChargePhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_mid_session_switches_generator_off() {
        let mut rig = rig(46.0);
        rig.controller.tick().await;
        tokio::time::advance(Duration::from_secs(301)).await;
        rig.controller.tick().await;
        assert_eq!(rig.controller.phase(), ChargePhase::Starting);
        assert!(rig.relay.is_on());

        rig.controller.shutdown();
        assert!(!rig.relay.is_on());
        assert!(!rig.status.snapshot().generator_on);
        assert_eq!(rig.controller.phase(), ChargePhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn only_fault_outcomes_disable_supervisor() {
        let rig = rig(52.0);
        let now = Instant::now();

        let next = rig.controller.apply_outcome(
            &ChargeOutcome::TimedOut {
                voltage: 55.0,
                elapsed: Duration::from_secs(7200),
            },
            now,
        );
        assert!(matches!(next, ControllerState::Idle));
        assert!(rig.supervisor.is_enabled());

        let next = rig
            .controller
            .apply_outcome(&ChargeOutcome::Completed(CompletionReason::OverVoltage), now);
        assert!(matches!(next, ControllerState::CoolDown { .. }));
        assert!(rig.supervisor.is_enabled());

        let fuel_out = ChargeOutcome::FaultedFuelOut {
            phase: ChargePhase::Trickle,
            voltage: 46.0,
        };
        let next = rig.controller.apply_outcome(&fuel_out, now);
        assert!(matches!(next, ControllerState::Faulted));
        assert!(!rig.supervisor.is_enabled());
        assert_eq!(rig.status.snapshot().message, fuel_out.message());
    }

    #[test]
    fn poll_interval_follows_state() {
        let rig = rig(52.0);
        assert_eq!(rig.controller.poll_interval(), Duration::from_secs(10));
    }
}
