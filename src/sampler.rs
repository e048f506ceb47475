//! AC current sampling loop
//!
//! Reads the current channel on a short fixed interval, publishes a moving
//! average as `last_current` and integrates a rough energy estimate from the
//! nominal AC line voltage.

use crate::config::SamplingConfig;
use crate::logging::{StructuredLogger, get_logger};
use crate::sensor::SensorSource;
use crate::status::StatusHandle;
use std::collections::VecDeque;
use tokio::sync::watch;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval};

pub struct CurrentSampler {
    sensor: SensorSource,
    status: StatusHandle,
    config: SamplingConfig,
    window: VecDeque<f64>,
    read_failing: bool,
    logger: StructuredLogger,
}

impl CurrentSampler {
    pub fn new(sensor: SensorSource, status: StatusHandle, config: SamplingConfig) -> Self {
        let capacity = config.window.max(1);
        Self {
            sensor,
            status,
            config,
            window: VecDeque::with_capacity(capacity),
            read_failing: false,
            logger: get_logger("sampler"),
        }
    }

    /// Add one sample and return the moving average
    fn push(&mut self, current: f64) -> f64 {
        let capacity = self.config.window.max(1);
        while self.window.len() >= capacity {
            self.window.pop_front();
        }
        self.window.push_back(current);
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }

    /// Record one sample taken `dt` after the previous one
    pub fn record(&mut self, current: f64, dt: Duration) {
        let average = self.push(current);
        let watt_hours = average.abs() * self.config.nominal_ac_voltage * dt.as_secs_f64() / 3600.0;
        self.status.update(|s| {
            s.last_current = average;
            s.ac_energy_wh += watt_hours;
        });
    }

    /// Take one sample from the sensor
    pub async fn sample_once(&mut self, dt: Duration) {
        match self.sensor.read_current().await {
            Ok(current) => {
                if self.read_failing {
                    self.logger.info("Current sensor recovered");
                    self.read_failing = false;
                }
                self.record(current, dt);
            }
            Err(e) => {
                // Log the first failure of a run only; the loop is fast
                if !self.read_failing {
                    self.logger
                        .warn(&format!("Current read failed: {}", e));
                    self.read_failing = true;
                }
            }
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_millis(self.config.current_interval_ms.max(1));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.logger.debug(&format!(
            "Sampling current every {} ms, window {}",
            self.config.current_interval_ms, self.config.window
        ));

        let mut last = Instant::now();
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Instant::now();
                    let dt = now.saturating_duration_since(last);
                    last = now;
                    self.sample_once(dt).await;
                }
                _ = shutdown.changed() => break,
            }
        }
        self.logger.debug("Current sampler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{CalibrationParams, SimulatedSource};
    use std::sync::Arc;

    fn sampler(window: usize) -> (CurrentSampler, StatusHandle, crate::sensor::SimulatedHandle) {
        let status = StatusHandle::default();
        let sim = SimulatedSource::new(52.0, 0.0);
        let handle = sim.handle();
        let sensor = SensorSource::new(
            Arc::new(sim),
            CalibrationParams::identity(),
            CalibrationParams::identity(),
        );
        let config = SamplingConfig {
            window,
            ..SamplingConfig::default()
        };
        (CurrentSampler::new(sensor, status.clone(), config), status, handle)
    }

    #[test]
    fn moving_average_over_window() {
        let (mut s, status, _) = sampler(4);
        for current in [4.0, 8.0, 8.0, 8.0, 8.0] {
            s.record(current, Duration::ZERO);
        }
        assert!((status.snapshot().last_current - 8.0).abs() < 1e-9);
    }

    #[test]
    fn energy_integrates_nominal_voltage() {
        let (mut s, status, _) = sampler(1);
        // 10 A at 120 V for one hour
        s.record(10.0, Duration::from_secs(3600));
        assert!((status.snapshot().ac_energy_wh - 1200.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn failed_reads_leave_last_value() {
        let (mut s, status, handle) = sampler(1);
        handle.set_current(3.0);
        s.sample_once(Duration::from_millis(50)).await;
        handle.set_failing(true);
        s.sample_once(Duration::from_millis(50)).await;
        assert!((status.snapshot().last_current - 3.0).abs() < 1e-9);
    }
}
