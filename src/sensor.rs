//! Sensor source for battery voltage and AC current
//!
//! Raw samples come from a [`RawSampler`] chosen once at startup (hardware or
//! simulated). [`SensorSource`] applies the per-channel calibration so that no
//! downstream code ever sees a raw value.

use crate::error::{GenwatchError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

mod calibration;
mod hardware;
mod simulated;

pub use calibration::CalibrationParams;
pub use hardware::HardwareSource;
pub use simulated::{SimulatedHandle, SimulatedSource, SimulatorFileSource};

/// Analog input channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Battery bank voltage divider
    Voltage,
    /// AC current sensor on the generator output
    Current,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Voltage => f.write_str("voltage"),
            Channel::Current => f.write_str("current"),
        }
    }
}

/// Substrate producing raw analog samples
#[async_trait::async_trait]
pub trait RawSampler: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Take one fresh raw sample
    async fn read_raw(&self, channel: Channel) -> Result<f64>;
}

/// One calibrated reading of both channels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub voltage: f64,
    pub current: f64,
    pub sampled_at: DateTime<Utc>,
}

/// Calibrated sensor access shared by all tasks
#[derive(Clone)]
pub struct SensorSource {
    sampler: Arc<dyn RawSampler>,
    voltage_cal: CalibrationParams,
    current_cal: CalibrationParams,
}

impl fmt::Debug for SensorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorSource")
            .field("sampler", &self.sampler.name())
            .field("voltage_cal", &self.voltage_cal)
            .field("current_cal", &self.current_cal)
            .finish()
    }
}

impl SensorSource {
    pub fn new(
        sampler: Arc<dyn RawSampler>,
        voltage_cal: CalibrationParams,
        current_cal: CalibrationParams,
    ) -> Self {
        Self {
            sampler,
            voltage_cal,
            current_cal,
        }
    }

    /// Name of the underlying sampler
    pub fn sampler_name(&self) -> &'static str {
        self.sampler.name()
    }

    /// Battery voltage in volts
    pub async fn read_voltage(&self) -> Result<f64> {
        self.read_channel(Channel::Voltage).await
    }

    /// AC current in amps
    pub async fn read_current(&self) -> Result<f64> {
        self.read_channel(Channel::Current).await
    }

    /// Both channels, voltage first
    pub async fn read(&self) -> Result<SensorReading> {
        let voltage = self.read_voltage().await?;
        let current = self.read_current().await?;
        Ok(SensorReading {
            voltage,
            current,
            sampled_at: Utc::now(),
        })
    }

    async fn read_channel(&self, channel: Channel) -> Result<f64> {
        let raw = self.sampler.read_raw(channel).await?;
        let params = match channel {
            Channel::Voltage => &self.voltage_cal,
            Channel::Current => &self.current_cal,
        };
        let value = params.apply(raw);
        if !value.is_finite() {
            return Err(GenwatchError::sensor_read(
                channel.to_string(),
                format!("calibrated value is not finite (raw {})", raw),
            ));
        }
        Ok(value)
    }
}
