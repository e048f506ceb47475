#![allow(dead_code)]

use genwatch::config::ChargeConfig;
use genwatch::controller::ChargeController;
use genwatch::error::{GenwatchError, Result};
use genwatch::relay::{RelayActuator, SimulatedRelay, SimulatedRelayHandle};
use genwatch::sensor::{CalibrationParams, Channel, RawSampler, SensorSource};
use genwatch::status::StatusHandle;
use genwatch::supervisor::EnableSupervisor;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy)]
struct BankState {
    resting: f64,
    charging: f64,
    generator_amps: f64,
    failing: bool,
}

/// Battery bank whose terminal voltage depends on whether the generator relay is closed
pub struct BankModel {
    state: Arc<Mutex<BankState>>,
    relay: SimulatedRelayHandle,
}

#[derive(Clone)]
pub struct BankHandle {
    state: Arc<Mutex<BankState>>,
}

impl BankModel {
    pub fn new(relay: SimulatedRelayHandle, resting: f64, charging: f64) -> (Self, BankHandle) {
        let state = Arc::new(Mutex::new(BankState {
            resting,
            charging,
            generator_amps: 12.0,
            failing: false,
        }));
        (
            Self {
                state: state.clone(),
                relay,
            },
            BankHandle { state },
        )
    }
}

impl BankHandle {
    pub fn set_resting(&self, volts: f64) {
        self.state.lock().unwrap().resting = volts;
    }

    pub fn set_charging(&self, volts: f64) {
        self.state.lock().unwrap().charging = volts;
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }
}

#[async_trait::async_trait]
impl RawSampler for BankModel {
    fn name(&self) -> &'static str {
        "bank-model"
    }

    async fn read_raw(&self, channel: Channel) -> Result<f64> {
        let state = *self.state.lock().unwrap();
        if state.failing {
            return Err(GenwatchError::sensor_read(channel.to_string(), "ADC offline"));
        }
        let on = self.relay.is_on();
        Ok(match (channel, on) {
            (Channel::Voltage, true) => state.charging,
            (Channel::Voltage, false) => state.resting,
            (Channel::Current, true) => state.generator_amps,
            (Channel::Current, false) => 0.0,
        })
    }
}

/// Everything a controller test needs, wired to simulated hardware
pub struct Rig {
    pub status: StatusHandle,
    pub sensor: SensorSource,
    pub actuator: RelayActuator,
    pub relay: SimulatedRelayHandle,
    pub supervisor: EnableSupervisor,
    pub bank: BankHandle,
}

impl Rig {
    pub fn new(resting: f64, charging: f64) -> Self {
        let status = StatusHandle::default();
        let driver = SimulatedRelay::new();
        let relay = driver.handle();
        let (model, bank) = BankModel::new(relay.clone(), resting, charging);
        let sensor = SensorSource::new(
            Arc::new(model),
            CalibrationParams::identity(),
            CalibrationParams::identity(),
        );
        let actuator = RelayActuator::new(Box::new(driver), status.clone());
        let supervisor = EnableSupervisor::new(status.clone());
        Self {
            status,
            sensor,
            actuator,
            relay,
            supervisor,
            bank,
        }
    }

    pub fn controller(&self) -> ChargeController {
        self.controller_with(ChargeConfig::default())
    }

    pub fn controller_with(&self, config: ChargeConfig) -> ChargeController {
        ChargeController::new(
            config,
            self.sensor.clone(),
            self.actuator.clone(),
            self.supervisor.clone(),
            self.status.clone(),
        )
    }
}
