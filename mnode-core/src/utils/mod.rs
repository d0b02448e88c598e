//! Utility re-exports for the motor-control node.
//!
//! - `config`: board constants and runtime loop configuration
//! - `connection`: protocol byte codec and link plumbing
//! - `controllers`: motor outputs, telemetry sampling and the control loop
//! - `math`: host-side speed scaling used to produce protocol bytes

pub mod config;
pub mod connection;
pub mod controllers;
pub mod math;

pub use connection::codec::{decode, DriveValue, MotorCommand};
pub use controllers::{ControlLoop, NodeHardware};
pub use controllers::telemetry::{TelemetryFrame, TelemetrySample};
