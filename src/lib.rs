//! # Genwatch - Backup Generator Charge Controller
//!
//! Watches a battery bank and runs a backup generator to recharge it when the
//! voltage stays low. A charge cycle verifies that the generator started,
//! ramps up to full voltage, trickles for a fixed time and then inhibits new
//! starts for a cooldown window. Faults such as a failed start or fuel
//! running out switch the generator off and disable automatic charging until
//! the operator re-enables it.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `sensor`: Calibrated voltage and current readings
//! - `relay`: Generator contactor relay and its scope guard
//! - `status`: Shared status snapshot
//! - `supervisor`: Enable flag and operator toggle
//! - `controller`: Charge state machine
//! - `sampler`: AC current sampling and energy estimate
//! - `telemetry`: Adaptive telemetry log
//! - `publisher`: Status view and console display
//! - `self_test`: Startup self-test
//! - `app`: Task wiring and shutdown

pub mod app;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod publisher;
pub mod relay;
pub mod sampler;
pub mod self_test;
pub mod sensor;
pub mod status;
pub mod supervisor;
pub mod telemetry;

// Re-export commonly used types
pub use app::Application;
pub use config::Config;
pub use error::{GenwatchError, Result};
