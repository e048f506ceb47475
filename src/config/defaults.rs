use super::*;

impl Default for ChargeConfig {
    fn default() -> Self {
        Self {
            low_charge_voltage: 48.0,
            full_charge_voltage: 57.6,
            over_voltage: 58.0,
            low_voltage_secs_before_generator: 300,
            maximum_seconds_charging_to_full_voltage: 7200,
            trickle_charge_time: 3600,
            cooldown_secs: 4 * 3600,
            start_verification_secs: 10,
            minimum_start_voltage_rise: 2.0,
            poll_interval_secs: 10,
            active_poll_interval_secs: 2,
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            voltage_multiplier: 1.0,
            voltage_offset: 0.0,
            ac_current_multiplier: 1.0,
            ac_current_multiplier_2: 0.0,
            ac_current_offset: 0.0,
            ac_current_divider: 1.0,
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            source: SensorSourceKind::Auto,
            voltage_channel_path: "/sys/bus/iio/devices/iio:device0/in_voltage0_raw".to_string(),
            current_channel_path: "/sys/bus/iio/devices/iio:device0/in_voltage1_raw".to_string(),
            simulator_file: "simulator.json".to_string(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            driver: None,
            gpio_value_path: "/sys/class/gpio/gpio16/value".to_string(),
            active_low: false,
        }
    }
}

impl Default for SelfTestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_secs: 30,
            minimum_voltage_rise: 0.5,
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            current_interval_ms: 50,
            window: 20,
            nominal_ac_voltage: 120.0,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "logs/telemetry.jsonl".to_string(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { interval_secs: 10 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "DEBUG".to_string(),
            console_level: None,
            file_level: Some("INFO".to_string()),
            file: "logs/generator.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            charge: ChargeConfig::default(),
            calibration: CalibrationConfig::default(),
            sensor: SensorConfig::default(),
            relay: RelayConfig::default(),
            self_test: SelfTestConfig::default(),
            sampling: SamplingConfig::default(),
            telemetry: TelemetryConfig::default(),
            display: DisplayConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
