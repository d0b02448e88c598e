//! Host-side speed scaling and command encoding.
//!
//! The host works in signed speeds in `[-1, 1]`. Before a speed is quantized into a protocol
//! byte it is lifted past the motor's dead band (`start_input`) and capped at `max_speed`.
//!
//! # Example
//! ```rust
//! use mnode_core::utils::{math::SpeedScaling, MotorCommand};
//! let scaling = SpeedScaling::new(0.0, 1.0).unwrap();
//! let cmd = MotorCommand::from_speed(2, 1.0, &scaling);
//! assert_eq!(cmd.encode(), 0b11111_0_10);
//! ```

use serde::{Deserialize, Serialize};

use crate::utils::{config::MAX_MAGNITUDE, connection::codec::MotorCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingError {
    /// `start_input` outside `[0, 1]`.
    StartInput,
    /// `max_speed` outside `[0, 1]`.
    MaxSpeed,
}

/// Per-motor speed shaping applied before quantization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedScaling {
    /// Input at which the motor starts responding.
    start_input: f32,
    max_speed: f32,
}

impl Default for SpeedScaling {
    fn default() -> Self {
        Self {
            start_input: 0.0,
            max_speed: 1.0,
        }
    }
}

impl SpeedScaling {
    pub fn new(
        start_input: f32,
        max_speed: f32,
    ) -> Result<Self, ScalingError> {
        if !(0.0..=1.0).contains(&start_input) {
            return Err(ScalingError::StartInput);
        }
        if !(0.0..=1.0).contains(&max_speed) {
            return Err(ScalingError::MaxSpeed);
        }
        Ok(Self {
            start_input,
            max_speed,
        })
    }

    pub fn start_input(&self) -> f32 {
        self.start_input
    }

    pub fn max_speed(&self) -> f32 {
        self.max_speed
    }

    /// Map `(0, 1]` onto `[start_input, 1]` (mirrored for negative speeds), then onto
    /// `[0, max_speed]`, rounded to four decimals. Zero stays zero.
    pub fn scale(&self, speed: f32) -> f32 {
        let speed = speed.clamp(-1.0, 1.0);
        let lifted = if speed > 0.0 {
            speed * (1.0 - self.start_input) + self.start_input
        } else if speed < 0.0 {
            speed * (1.0 - self.start_input) - self.start_input
        } else {
            0.0
        };
        libm::roundf(lifted * self.max_speed * 10_000.0) / 10_000.0
    }
}

impl MotorCommand {
    /// Quantize a signed speed for motor `motor_id` (low two bits kept).
    ///
    /// A speed that quantizes to zero is always sent as positive, since a negative zero is
    /// the special-request encoding.
    pub fn from_speed(
        motor_id: u8,
        speed: f32,
        scaling: &SpeedScaling,
    ) -> Self {
        let scaled = scaling.scale(speed);
        let magnitude = libm::floorf(libm::fabsf(scaled) * MAX_MAGNITUDE as f32)
            .clamp(0.0, MAX_MAGNITUDE as f32) as u8;

        Self {
            motor_id: motor_id & 0b11,
            negative: scaled < 0.0 && magnitude != 0,
            magnitude,
        }
    }
}
