//! Adaptive telemetry logger
//!
//! Appends one JSON record per sample to an append-only log. Sampling is dense
//! right after a generator start and thins out as the run settles.

use crate::config::TelemetryConfig;
use crate::error::{GenwatchError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::sensor::SensorSource;
use crate::status::StatusHandle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tokio::time::{Duration, Instant, sleep_until};

/// Sampling interval for the time elapsed since the last generator start
pub fn sample_interval(since_start: Option<Duration>) -> Duration {
    let secs = match since_start {
        Some(elapsed) => elapsed.as_secs_f64(),
        None => return Duration::from_secs(60),
    };
    if secs < 10.0 {
        Duration::from_secs(1)
    } else if secs < 60.0 {
        Duration::from_secs(5)
    } else if secs < 300.0 {
        Duration::from_secs(30)
    } else {
        Duration::from_secs(60)
    }
}

/// One line of the telemetry log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    pub enabled: bool,
    pub voltage: f64,
    pub current: f64,
    pub message: String,
}

pub struct TelemetryLogger {
    sensor: SensorSource,
    status: StatusHandle,
    path: PathBuf,
    enabled: bool,
    last_start: Option<Instant>,
    logger: StructuredLogger,
}

impl TelemetryLogger {
    pub fn new(sensor: SensorSource, status: StatusHandle, config: &TelemetryConfig) -> Self {
        Self {
            sensor,
            status,
            path: PathBuf::from(&config.path),
            enabled: config.enabled,
            last_start: None,
            logger: get_logger("telemetry"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// False once disabled by configuration or a write failure
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Reset the cadence clock; called on every generator off->on transition
    pub fn generator_started(&mut self, now: Instant) {
        self.last_start = Some(now);
    }

    /// Interval until the next sample
    pub fn interval(&self, now: Instant) -> Duration {
        sample_interval(
            self.last_start
                .map(|start| now.saturating_duration_since(start)),
        )
    }

    /// Build a record from a fresh reading and the shared snapshot
    pub async fn sample(&self) -> TelemetryRecord {
        let snapshot = self.status.snapshot();
        let (voltage, current) = match self.sensor.read().await {
            Ok(reading) => (reading.voltage, reading.current),
            Err(e) => {
                self.logger.debug(&format!(
                    "Sensor read failed, recording last known values: {}",
                    e
                ));
                (snapshot.last_voltage, snapshot.last_current)
            }
        };
        TelemetryRecord {
            timestamp: Utc::now(),
            enabled: snapshot.enabled,
            voltage,
            current,
            message: snapshot.message.clone(),
        }
    }

    /// Append one record as a JSON line
    pub fn append(&self, record: &TelemetryRecord) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                GenwatchError::telemetry(format!("{}: {}", parent.display(), e))
            })?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| GenwatchError::telemetry(format!("{}: {}", self.path.display(), e)))?;
        file.write_all(line.as_bytes())
            .map_err(|e| GenwatchError::telemetry(format!("{}: {}", self.path.display(), e)))?;
        Ok(())
    }

    /// Take one sample and append it; a failed write turns telemetry off
    pub async fn log_once(&mut self) {
        if !self.enabled {
            return;
        }
        let record = self.sample().await;
        if let Err(e) = self.append(&record) {
            self.logger
                .warn(&format!("Disabling telemetry after write failure: {}", e));
            self.enabled = false;
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        if !self.enabled {
            self.logger.info("Telemetry disabled");
            return;
        }
        self.logger
            .info(&format!("Telemetry logging to {}", self.path.display()));

        let mut status_rx = self.status.subscribe();
        let mut was_on = status_rx.borrow_and_update().generator_on;
        let mut next = Instant::now();

        while self.enabled {
            tokio::select! {
                _ = sleep_until(next) => {
                    self.log_once().await;
                    let now = Instant::now();
                    next = now + self.interval(now);
                }
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let on = status_rx.borrow_and_update().generator_on;
                    if on && !was_on {
                        let now = Instant::now();
                        self.generator_started(now);
                        self.log_once().await;
                        next = now + self.interval(now);
                    }
                    was_on = on;
                }
                _ = shutdown.changed() => break,
            }
        }
        self.logger.debug("Telemetry logger stopped");
    }
}
