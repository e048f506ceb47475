use super::{Channel, RawSampler};
use crate::error::{GenwatchError, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy)]
struct SimulatedValues {
    voltage_raw: f64,
    current_raw: f64,
    failing: bool,
}

/// In-memory sampler whose values are set through a [`SimulatedHandle`]
#[derive(Debug, Clone)]
pub struct SimulatedSource {
    values: Arc<RwLock<SimulatedValues>>,
}

/// Control side of a [`SimulatedSource`]
#[derive(Debug, Clone)]
pub struct SimulatedHandle {
    values: Arc<RwLock<SimulatedValues>>,
}

impl SimulatedSource {
    pub fn new(voltage_raw: f64, current_raw: f64) -> Self {
        Self {
            values: Arc::new(RwLock::new(SimulatedValues {
                voltage_raw,
                current_raw,
                failing: false,
            })),
        }
    }

    pub fn handle(&self) -> SimulatedHandle {
        SimulatedHandle {
            values: self.values.clone(),
        }
    }
}

impl SimulatedHandle {
    pub fn set_voltage(&self, raw: f64) {
        if let Ok(mut v) = self.values.write() {
            v.voltage_raw = raw;
        }
    }

    pub fn set_current(&self, raw: f64) {
        if let Ok(mut v) = self.values.write() {
            v.current_raw = raw;
        }
    }

    /// Make every read fail until cleared
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut v) = self.values.write() {
            v.failing = failing;
        }
    }
}

#[async_trait::async_trait]
impl RawSampler for SimulatedSource {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn read_raw(&self, channel: Channel) -> Result<f64> {
        let values = self
            .values
            .read()
            .map_err(|_| GenwatchError::sensor_read(channel.to_string(), "simulator lock poisoned"))?;
        if values.failing {
            return Err(GenwatchError::sensor_read(
                channel.to_string(),
                "simulated sensor failure",
            ));
        }
        Ok(match channel {
            Channel::Voltage => values.voltage_raw,
            Channel::Current => values.current_raw,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SimulatorFile {
    #[serde(rename = "analog.one")]
    analog_one: f64,
    #[serde(rename = "analog.two")]
    analog_two: f64,
}

/// Sampler backed by a JSON file that is re-read on every sample, so values
/// can be edited while the controller runs
#[derive(Debug, Clone)]
pub struct SimulatorFileSource {
    path: PathBuf,
}

impl SimulatorFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl RawSampler for SimulatorFileSource {
    fn name(&self) -> &'static str {
        "simulator-file"
    }

    async fn read_raw(&self, channel: Channel) -> Result<f64> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            GenwatchError::sensor_read(
                channel.to_string(),
                format!("{}: {}", self.path.display(), e),
            )
        })?;
        let file: SimulatorFile = serde_json::from_str(&contents).map_err(|e| {
            GenwatchError::sensor_read(
                channel.to_string(),
                format!("{}: {}", self.path.display(), e),
            )
        })?;
        Ok(match channel {
            Channel::Voltage => file.analog_one,
            Channel::Current => file.analog_two,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn handle_changes_values() {
        let sim = SimulatedSource::new(46.0, 0.0);
        let handle = sim.handle();
        assert_eq!(sim.read_raw(Channel::Voltage).await.unwrap(), 46.0);
        handle.set_voltage(52.5);
        handle.set_current(7.0);
        assert_eq!(sim.read_raw(Channel::Voltage).await.unwrap(), 52.5);
        assert_eq!(sim.read_raw(Channel::Current).await.unwrap(), 7.0);
    }

    #[tokio::test]
    async fn file_source_rereads_each_sample() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, r#"{{"analog.one": 4.2, "analog.two": 0.3}}"#).unwrap();
        let source = SimulatorFileSource::new(tmp.path());
        assert_eq!(source.read_raw(Channel::Voltage).await.unwrap(), 4.2);

        std::fs::write(tmp.path(), r#"{"analog.one": 5.1, "analog.two": 0.9}"#).unwrap();
        assert_eq!(source.read_raw(Channel::Voltage).await.unwrap(), 5.1);
        assert_eq!(source.read_raw(Channel::Current).await.unwrap(), 0.9);
    }

    #[tokio::test]
    async fn missing_file_is_a_sensor_error() {
        let source = SimulatorFileSource::new("/nonexistent/genwatch/simulator.json");
        let err = source.read_raw(Channel::Voltage).await.unwrap_err();
        assert!(err.is_sensor_error());
    }
}
