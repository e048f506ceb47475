//! Configuration management for Genwatch
//!
//! This module handles loading and validation of the controller configuration
//! from YAML files. Every section falls back to its defaults so a partial file
//! only needs to name the values it changes.

use crate::error::{GenwatchError, Result};
use crate::sensor::CalibrationParams;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod defaults;

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "GENWATCH_CONFIG";

/// Upper bound for the charge timers (one week)
pub const MAX_TIMER_SECS: u64 = 7 * 24 * 3600;

/// Longest allowed controller poll period
pub const MAX_POLL_INTERVAL_SECS: u64 = 10;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Charge thresholds and timers
    pub charge: ChargeConfig,

    /// Per-channel calibration constants
    pub calibration: CalibrationConfig,

    /// Sensor source selection
    pub sensor: SensorConfig,

    /// Relay driver selection
    pub relay: RelayConfig,

    /// Startup self-test
    pub self_test: SelfTestConfig,

    /// AC current sampling loop
    pub sampling: SamplingConfig,

    /// Telemetry log
    pub telemetry: TelemetryConfig,

    /// Console status display
    pub display: DisplayConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Thresholds and timers for the charge state machine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargeConfig {
    /// Bank voltage at or below which the bank is considered depleted
    pub low_charge_voltage: f64,

    /// Voltage that ends the ramp-up phase
    pub full_charge_voltage: f64,

    /// Safety ceiling that ends trickle charging early
    pub over_voltage: f64,

    /// Grace period of continuous low voltage before starting the generator
    pub low_voltage_secs_before_generator: u64,

    /// Maximum time from generator start to reaching full voltage
    pub maximum_seconds_charging_to_full_voltage: u64,

    /// Duration of the trickle phase
    pub trickle_charge_time: u64,

    /// Inhibition window after a completed charge cycle
    pub cooldown_secs: u64,

    /// Delay before checking that the generator actually started
    pub start_verification_secs: u64,

    /// Voltage rise required during the start verification delay
    pub minimum_start_voltage_rise: f64,

    /// Decision tick while idle, counting down or cooling down
    pub poll_interval_secs: u64,

    /// Decision tick while a charge session is active
    pub active_poll_interval_secs: u64,
}

/// Calibration constants, keyed as on the calibration sheet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub voltage_multiplier: f64,
    pub voltage_offset: f64,
    pub ac_current_multiplier: f64,
    pub ac_current_multiplier_2: f64,
    pub ac_current_offset: f64,
    pub ac_current_divider: f64,
}

/// Where raw samples come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorSourceKind {
    /// Hardware when the voltage channel exists, simulator file otherwise
    Auto,
    /// Linux IIO sysfs channels
    Hardware,
    /// JSON simulator file
    Simulated,
}

/// Sensor source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Source selection, fixed for the process lifetime
    pub source: SensorSourceKind,

    /// IIO raw file for the battery voltage divider
    pub voltage_channel_path: String,

    /// IIO raw file for the AC current sensor
    pub current_channel_path: String,

    /// Simulator JSON file with `analog.one` / `analog.two` raw values
    pub simulator_file: String,
}

/// Relay driver kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayDriverKind {
    /// Sysfs GPIO value file
    Gpio,
    /// In-memory relay, only logs
    Simulated,
}

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Driver selection; follows the sensor source when absent
    pub driver: Option<RelayDriverKind>,

    /// Sysfs GPIO value file for the generator contactor
    pub gpio_value_path: String,

    /// Write 0 for on and 1 for off
    pub active_low: bool,
}

/// Startup self-test configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfTestConfig {
    /// Run the self-test before steady-state operation
    pub enabled: bool,

    /// How long to hold the relay on
    pub duration_secs: u64,

    /// Voltage rise required to pass
    pub minimum_voltage_rise: f64,
}

/// AC current sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Interval between current samples in milliseconds
    pub current_interval_ms: u64,

    /// Number of samples averaged into the published current
    pub window: usize,

    /// AC line voltage used for the energy estimate
    pub nominal_ac_voltage: f64,
}

/// Telemetry log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Whether telemetry records are written at all
    pub enabled: bool,

    /// Append-only JSON lines file
    pub path: String,
}

/// Console status display configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Interval between console status lines
    pub interval_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional override for the console layer
    pub console_level: Option<String>,

    /// Optional override for the file layer
    pub file_level: Option<String>,

    /// Path to log file (its directory receives the rotated files)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl ChargeConfig {
    pub fn low_voltage_grace(&self) -> Duration {
        Duration::from_secs(self.low_voltage_secs_before_generator)
    }

    pub fn max_ramp_time(&self) -> Duration {
        Duration::from_secs(self.maximum_seconds_charging_to_full_voltage)
    }

    pub fn trickle_time(&self) -> Duration {
        Duration::from_secs(self.trickle_charge_time)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn start_verification(&self) -> Duration {
        Duration::from_secs(self.start_verification_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn active_poll_interval(&self) -> Duration {
        Duration::from_secs(self.active_poll_interval_secs)
    }
}

impl CalibrationConfig {
    /// Calibration for the battery voltage channel
    pub fn voltage(&self) -> CalibrationParams {
        CalibrationParams::linear(self.voltage_multiplier, self.voltage_offset)
    }

    /// Calibration for the AC current channel
    pub fn current(&self) -> CalibrationParams {
        CalibrationParams {
            multiplier: self.ac_current_multiplier,
            multiplier_2: self.ac_current_multiplier_2,
            offset: self.ac_current_offset,
            divider: self.ac_current_divider,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            GenwatchError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&contents)
            .map_err(|e| GenwatchError::config(format!("{}: {}", path.display(), e)))
    }

    /// Parse configuration from YAML text
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        Ok(config)
    }

    /// Load configuration from the environment override or default locations
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR)
            && !path.trim().is_empty()
        {
            return Self::from_file(path.trim());
        }

        let default_paths = [
            "genwatch.yaml",
            "/data/genwatch.yaml",
            "/etc/genwatch/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Flatten every parameter into `section.key = value` lines for the startup banner
    pub fn parameter_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let Ok(value) = serde_json::to_value(self) else {
            return lines;
        };
        if let serde_json::Value::Object(sections) = value {
            for (section, body) in sections {
                match body {
                    serde_json::Value::Object(fields) => {
                        for (key, v) in fields {
                            lines.push(format!("{}.{}: {}", section, key, v));
                        }
                    }
                    other => lines.push(format!("{}: {}", section, other)),
                }
            }
        }
        lines
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let c = &self.charge;

        for (field, value) in [
            ("charge.low_charge_voltage", c.low_charge_voltage),
            ("charge.full_charge_voltage", c.full_charge_voltage),
            ("charge.over_voltage", c.over_voltage),
            ("charge.minimum_start_voltage_rise", c.minimum_start_voltage_rise),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(GenwatchError::validation(field, "Must be a positive number"));
            }
        }

        if c.low_charge_voltage >= c.full_charge_voltage {
            return Err(GenwatchError::validation(
                "charge.full_charge_voltage",
                "Must be greater than low_charge_voltage",
            ));
        }

        if c.full_charge_voltage > c.over_voltage {
            return Err(GenwatchError::validation(
                "charge.over_voltage",
                "Must not be below full_charge_voltage",
            ));
        }

        for (field, value) in [
            (
                "charge.maximum_seconds_charging_to_full_voltage",
                c.maximum_seconds_charging_to_full_voltage,
            ),
            ("charge.start_verification_secs", c.start_verification_secs),
            ("charge.poll_interval_secs", c.poll_interval_secs),
            ("charge.active_poll_interval_secs", c.active_poll_interval_secs),
            ("display.interval_secs", self.display.interval_secs),
            ("sampling.current_interval_ms", self.sampling.current_interval_ms),
        ] {
            if value == 0 {
                return Err(GenwatchError::validation(field, "Must be greater than 0"));
            }
        }

        for (field, value) in [
            (
                "charge.low_voltage_secs_before_generator",
                c.low_voltage_secs_before_generator,
            ),
            (
                "charge.maximum_seconds_charging_to_full_voltage",
                c.maximum_seconds_charging_to_full_voltage,
            ),
            ("charge.trickle_charge_time", c.trickle_charge_time),
            ("charge.cooldown_secs", c.cooldown_secs),
        ] {
            if value > MAX_TIMER_SECS {
                return Err(GenwatchError::validation(
                    field,
                    format!("Must not exceed {} seconds", MAX_TIMER_SECS),
                ));
            }
        }

        for (field, value) in [
            ("charge.poll_interval_secs", c.poll_interval_secs),
            ("charge.active_poll_interval_secs", c.active_poll_interval_secs),
        ] {
            if value > MAX_POLL_INTERVAL_SECS {
                return Err(GenwatchError::validation(
                    field,
                    format!("Must not exceed {} seconds", MAX_POLL_INTERVAL_SECS),
                ));
            }
        }

        if c.start_verification_secs >= c.maximum_seconds_charging_to_full_voltage {
            return Err(GenwatchError::validation(
                "charge.start_verification_secs",
                "Must be shorter than maximum_seconds_charging_to_full_voltage",
            ));
        }

        let cal = &self.calibration;
        for (field, value) in [
            ("calibration.voltage_multiplier", cal.voltage_multiplier),
            ("calibration.voltage_offset", cal.voltage_offset),
            ("calibration.ac_current_multiplier", cal.ac_current_multiplier),
            ("calibration.ac_current_multiplier_2", cal.ac_current_multiplier_2),
            ("calibration.ac_current_offset", cal.ac_current_offset),
        ] {
            if !value.is_finite() {
                return Err(GenwatchError::validation(field, "Must be a finite number"));
            }
        }
        if !cal.ac_current_divider.is_finite() || cal.ac_current_divider == 0.0 {
            return Err(GenwatchError::validation(
                "calibration.ac_current_divider",
                "Must be a finite, non-zero number",
            ));
        }

        if self.sampling.window == 0 {
            return Err(GenwatchError::validation(
                "sampling.window",
                "Must hold at least one sample",
            ));
        }

        if self.self_test.enabled && self.self_test.duration_secs == 0 {
            return Err(GenwatchError::validation(
                "self_test.duration_secs",
                "Must be greater than 0 when the self-test is enabled",
            ));
        }

        if self.telemetry.enabled && self.telemetry.path.trim().is_empty() {
            return Err(GenwatchError::validation(
                "telemetry.path",
                "Cannot be empty when telemetry is enabled",
            ));
        }

        if self.relay.driver == Some(RelayDriverKind::Gpio)
            && self.relay.gpio_value_path.trim().is_empty()
        {
            return Err(GenwatchError::validation(
                "relay.gpio_value_path",
                "Cannot be empty for the gpio driver",
            ));
        }

        Ok(())
    }
}
