//! Error types and handling for Genwatch
//!
//! This module defines the error types used throughout the controller.
//! Charge faults (start failure, fuel-out, ramp-up timeout) are not errors;
//! they are reported as [`crate::controller::ChargeOutcome`] values.

use thiserror::Error;

/// Result type alias for Genwatch operations
pub type Result<T> = std::result::Result<T, GenwatchError>;

/// Main error type for Genwatch
#[derive(Debug, Error)]
pub enum GenwatchError {
    /// Configuration could not be loaded or parsed
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// A sensor channel could not produce a sample
    #[error("Sensor read error on {channel}: {message}")]
    SensorRead { channel: String, message: String },

    /// Relay driver failed to switch
    #[error("Relay error: {message}")]
    Relay { message: String },

    /// Startup self-test did not see the generator raise the bank voltage
    #[error("Self-test failed: {message}")]
    SelfTest { message: String },

    /// Telemetry log could not be written
    #[error("Telemetry error: {message}")]
    Telemetry { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl GenwatchError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        GenwatchError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        GenwatchError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new sensor read error for a named channel
    pub fn sensor_read<C: Into<String>, S: Into<String>>(channel: C, message: S) -> Self {
        GenwatchError::SensorRead {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Create a new relay error
    pub fn relay<S: Into<String>>(message: S) -> Self {
        GenwatchError::Relay {
            message: message.into(),
        }
    }

    /// Create a new self-test error
    pub fn self_test<S: Into<String>>(message: S) -> Self {
        GenwatchError::SelfTest {
            message: message.into(),
        }
    }

    /// Create a new telemetry error
    pub fn telemetry<S: Into<String>>(message: S) -> Self {
        GenwatchError::Telemetry {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        GenwatchError::Io {
            message: message.into(),
        }
    }

    /// Whether this error came from a sensor channel
    pub fn is_sensor_error(&self) -> bool {
        matches!(self, GenwatchError::SensorRead { .. })
    }
}

impl From<std::io::Error> for GenwatchError {
    fn from(err: std::io::Error) -> Self {
        GenwatchError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for GenwatchError {
    fn from(err: serde_yaml::Error) -> Self {
        GenwatchError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GenwatchError {
    fn from(err: serde_json::Error) -> Self {
        GenwatchError::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = GenwatchError::config("test config error");
        assert!(matches!(err, GenwatchError::Config { .. }));

        let err = GenwatchError::relay("stuck contactor");
        assert!(matches!(err, GenwatchError::Relay { .. }));

        let err = GenwatchError::validation("field", "test validation error");
        assert!(matches!(err, GenwatchError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = GenwatchError::config("test error");
        assert_eq!(format!("{}", err), "Configuration error: test error");

        let err = GenwatchError::sensor_read("voltage", "no such device");
        assert_eq!(
            format!("{}", err),
            "Sensor read error on voltage: no such device"
        );
        assert!(err.is_sensor_error());
    }
}
