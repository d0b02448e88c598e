//! Command decode, motor dispatch and telemetry loop for a serial motor-control node.
//!
//! The host sends one protocol byte per motor command; the node drives one of four
//! PWM/DIR motor outputs and answers every loop iteration with a line of analog samples.
//!
//! For a runnable simulation, see the `mock-mcu` binary in `mnode-app/`.
#![no_std]

pub mod utils;
