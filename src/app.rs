//! Application wiring
//!
//! Builds the sensor and relay once from configuration, runs the self-test,
//! spawns the long-lived tasks and tears them down on a shutdown signal. Signal
//! handlers are installed before the relay is first closed, and the relay is
//! forced off on every way out.

use crate::config::{Config, RelayDriverKind, SensorSourceKind};
use crate::controller::ChargeController;
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use crate::publisher::StatusPublisher;
use crate::relay::{GpioRelay, RelayActuator, RelayDriver, SimulatedRelay};
use crate::sampler::CurrentSampler;
use crate::self_test::run_self_test;
use crate::sensor::{HardwareSource, RawSampler, SensorSource, SimulatorFileSource};
use crate::status::StatusHandle;
use crate::supervisor::EnableSupervisor;
use crate::telemetry::TelemetryLogger;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Duration;

pub struct Application {
    config: Config,
    status: StatusHandle,
    sensor: SensorSource,
    relay: RelayActuator,
    supervisor: EnableSupervisor,
    logger: StructuredLogger,
}

impl Application {
    /// Select the sensor and relay backends and make sure the relay starts off
    pub fn build(config: Config) -> Result<Self> {
        let logger = get_logger("app");
        let status = StatusHandle::default();

        let hardware = match config.sensor.source {
            SensorSourceKind::Hardware => true,
            SensorSourceKind::Simulated => false,
            SensorSourceKind::Auto => {
                HardwareSource::is_available(Path::new(&config.sensor.voltage_channel_path))
            }
        };
        let sampler: Arc<dyn RawSampler> = if hardware {
            Arc::new(HardwareSource::new(
                config.sensor.voltage_channel_path.as_str(),
                config.sensor.current_channel_path.as_str(),
            ))
        } else {
            Arc::new(SimulatorFileSource::new(config.sensor.simulator_file.as_str()))
        };
        let sensor = SensorSource::new(
            sampler,
            config.calibration.voltage(),
            config.calibration.current(),
        );

        let driver_kind = config.relay.driver.unwrap_or(if hardware {
            RelayDriverKind::Gpio
        } else {
            RelayDriverKind::Simulated
        });
        let driver: Box<dyn RelayDriver> = match driver_kind {
            RelayDriverKind::Gpio => Box::new(GpioRelay::new(
                config.relay.gpio_value_path.as_str(),
                config.relay.active_low,
            )),
            RelayDriverKind::Simulated => Box::new(SimulatedRelay::new()),
        };
        logger.info(&format!(
            "Using {} sensor source and {:?} relay driver",
            sensor.sampler_name(),
            driver_kind
        ));

        let relay = RelayActuator::new(driver, status.clone());
        relay.force_off();
        let supervisor = EnableSupervisor::new(status.clone());

        Ok(Self {
            config,
            status,
            sensor,
            relay,
            supervisor,
            logger,
        })
    }

    pub fn status(&self) -> &StatusHandle {
        &self.status
    }

    pub fn relay(&self) -> &RelayActuator {
        &self.relay
    }

    /// Run until SIGINT/SIGTERM or until the controller stops
    pub async fn run(self) -> Result<()> {
        self.logger.info(&format!(
            "Genwatch {} starting",
            env!("APP_VERSION")
        ));
        for line in self.config.parameter_lines() {
            self.logger.info(&line);
        }

        let signals = ShutdownSignals::install()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown_tx = Arc::new(shutdown_tx);
        let (toggle_tx, toggle_rx) = mpsc::unbounded_channel();
        let publisher = StatusPublisher::new(self.status.clone(), toggle_tx);
        let signal_task = tokio::spawn(forward_signals(
            signals,
            publisher.clone(),
            shutdown_tx.clone(),
        ));

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        tasks.push(tokio::spawn(
            CurrentSampler::new(
                self.sensor.clone(),
                self.status.clone(),
                self.config.sampling.clone(),
            )
            .run(shutdown_rx.clone()),
        ));
        tasks.push(tokio::spawn(
            TelemetryLogger::new(self.sensor.clone(), self.status.clone(), &self.config.telemetry)
                .run(shutdown_rx.clone()),
        ));
        tasks.push(tokio::spawn(publisher.clone().run_console_display(
            Duration::from_secs(self.config.display.interval_secs),
            shutdown_rx.clone(),
        )));

        let report = run_self_test(
            &self.sensor,
            &self.relay,
            &self.supervisor,
            &self.status,
            &self.config.self_test,
            shutdown_rx.clone(),
        )
        .await;

        if report.interrupted {
            self.logger.info("Shutdown requested during self-test");
        } else {
            if !report.passed {
                self.logger
                    .error("Self-test failed; automatic charging stays disabled until re-enabled");
            }

            tasks.push(tokio::spawn(
                self.supervisor
                    .clone()
                    .run_operator_events(toggle_rx, shutdown_rx.clone()),
            ));

            let controller = ChargeController::new(
                self.config.charge.clone(),
                self.sensor.clone(),
                self.relay.clone(),
                self.supervisor.clone(),
                self.status.clone(),
            );
            let mut controller_task = tokio::spawn(controller.run(shutdown_rx.clone()));

            let mut stop_rx = shutdown_rx.clone();
            let mut controller_joined = None;
            tokio::select! {
                _ = stop_rx.wait_for(|stop| *stop) => {}
                joined = &mut controller_task => {
                    controller_joined = Some(joined);
                }
            }

            let _ = shutdown_tx.send(true);
            let joined = match controller_joined {
                Some(joined) => joined,
                None => controller_task.await,
            };
            self.log_controller_exit(joined);
        }

        let _ = shutdown_tx.send(true);
        signal_task.abort();
        self.relay.force_off();
        for task in tasks {
            if let Err(e) = task.await {
                self.logger.warn(&format!("Task ended abnormally: {}", e));
            }
        }
        self.logger.info("Genwatch stopped");
        Ok(())
    }

    fn log_controller_exit(&self, joined: std::result::Result<Result<()>, JoinError>) {
        match joined {
            Ok(Ok(())) => self.logger.info("Controller shutdown complete"),
            Ok(Err(e)) => self.logger.error(&format!("Controller failed: {}", e)),
            Err(e) => self.logger.error(&format!("Controller task aborted: {}", e)),
        }
    }
}

/// Wait for a shutdown signal, then tell every task to stop
async fn forward_signals(
    mut signals: ShutdownSignals,
    publisher: StatusPublisher,
    shutdown: Arc<watch::Sender<bool>>,
) {
    let logger = get_logger("app");
    match signals.wait(&publisher).await {
        Ok(()) => logger.info("Shutdown signal received"),
        Err(e) => logger.error(&format!("Signal handling failed, shutting down: {}", e)),
    }
    let _ = shutdown.send(true);
}

/// SIGINT/SIGTERM streams plus SIGUSR1 for the toggle button
#[cfg(unix)]
struct ShutdownSignals {
    usr1: tokio::signal::unix::Signal,
    term: tokio::signal::unix::Signal,
    int: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    fn install() -> Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            usr1: signal(SignalKind::user_defined1())?,
            term: signal(SignalKind::terminate())?,
            int: signal(SignalKind::interrupt())?,
        })
    }

    async fn wait(&mut self, publisher: &StatusPublisher) -> Result<()> {
        loop {
            tokio::select! {
                Some(()) = self.usr1.recv() => {
                    publisher.press_toggle();
                }
                _ = self.term.recv() => return Ok(()),
                _ = self.int.recv() => return Ok(()),
            }
        }
    }
}

#[cfg(not(unix))]
struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    fn install() -> Result<Self> {
        Ok(Self)
    }

    async fn wait(&mut self, _publisher: &StatusPublisher) -> Result<()> {
        tokio::signal::ctrl_c().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_build_starts_with_relay_off() {
        let mut config = Config::default();
        config.sensor.source = SensorSourceKind::Simulated;
        let app = Application::build(config).unwrap();
        assert!(!app.relay().current_state().is_on());
        assert!(!app.status().snapshot().generator_on);
        assert!(app.status().snapshot().enabled);
    }
}
