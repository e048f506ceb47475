use super::{Channel, RawSampler};
use crate::error::{GenwatchError, Result};
use std::path::{Path, PathBuf};

/// Linux IIO ADC exposed through sysfs `in_voltageN_raw` files
#[derive(Debug, Clone)]
pub struct HardwareSource {
    voltage_path: PathBuf,
    current_path: PathBuf,
}

impl HardwareSource {
    pub fn new<P: Into<PathBuf>>(voltage_path: P, current_path: P) -> Self {
        Self {
            voltage_path: voltage_path.into(),
            current_path: current_path.into(),
        }
    }

    /// Whether the voltage channel is present on this machine
    pub fn is_available(voltage_path: &Path) -> bool {
        voltage_path.exists()
    }

    fn path_for(&self, channel: Channel) -> &Path {
        match channel {
            Channel::Voltage => &self.voltage_path,
            Channel::Current => &self.current_path,
        }
    }
}

fn parse_raw(channel: Channel, text: &str) -> Result<f64> {
    text.trim().parse::<f64>().map_err(|e| {
        GenwatchError::sensor_read(
            channel.to_string(),
            format!("unparseable sample {:?}: {}", text.trim(), e),
        )
    })
}

#[async_trait::async_trait]
impl RawSampler for HardwareSource {
    fn name(&self) -> &'static str {
        "iio"
    }

    async fn read_raw(&self, channel: Channel) -> Result<f64> {
        let path = self.path_for(channel);
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            GenwatchError::sensor_read(channel.to_string(), format!("{}: {}", path.display(), e))
        })?;
        parse_raw(channel, &text)
    }
}
