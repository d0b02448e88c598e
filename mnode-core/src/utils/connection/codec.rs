//! Single-byte motor command protocol.
//!
//! ```text
//! bit 7 6 5 4 3   2        1 0
//!     [ magnitude ][ sign ][motor_id]
//! ```
//!
//! `sign` is 1 for negative. A negative command with zero magnitude is a special request: the
//! motor id field then selects a host-defined request instead of a motor.
//!
//! Every byte decodes to exactly one [`MotorCommand`]; there is no malformed input.

use serde::{Deserialize, Serialize};

use crate::utils::config::MAX_MAGNITUDE;

const MOTOR_ID_MASK: u8 = 0b11;
const SIGN_SHIFT: u8 = 2;
const MAGNITUDE_SHIFT: u8 = 3;
const MAGNITUDE_MASK: u8 = 0b1_1111;

/// A decoded protocol byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorCommand {
    /// Motor index, or request selector for special requests. Always in `0..=3`.
    pub motor_id: u8,
    pub negative: bool,
    /// Quantized speed in `0..=31`.
    pub magnitude: u8,
}

/// Signal handed to a motor output for one non-special command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriveValue {
    pub forward: bool,
    /// Requested duty cycle in `[0, 1]`.
    pub duty_fraction: f32,
}

/// What the control loop should do with a command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    Drive { motor_id: u8, value: DriveValue },
    Special { selector: u8 },
}

/// Decode one protocol byte.
#[inline]
pub fn decode(byte: u8) -> MotorCommand {
    MotorCommand {
        motor_id: byte & MOTOR_ID_MASK,
        negative: (byte >> SIGN_SHIFT) & 1 == 1,
        magnitude: (byte >> MAGNITUDE_SHIFT) & MAGNITUDE_MASK,
    }
}

impl MotorCommand {
    /// Build the reserved encoding for request `selector` (only the low two bits are kept).
    pub const fn special(selector: u8) -> Self {
        Self {
            motor_id: selector & MOTOR_ID_MASK,
            negative: true,
            magnitude: 0,
        }
    }

    /// Pack the command back into its protocol byte.
    ///
    /// Out-of-range fields are masked to their bit widths.
    pub fn encode(&self) -> u8 {
        (self.motor_id & MOTOR_ID_MASK)
            | ((self.negative as u8) << SIGN_SHIFT)
            | ((self.magnitude & MAGNITUDE_MASK) << MAGNITUDE_SHIFT)
    }

    #[inline]
    pub fn is_special_request(&self) -> bool {
        self.negative && self.magnitude == 0
    }

    /// Drive signal for this command, or `None` for special requests.
    pub fn drive_value(&self) -> Option<DriveValue> {
        if self.is_special_request() {
            return None;
        }
        Some(DriveValue {
            forward: !self.negative,
            duty_fraction: duty_fraction(self.magnitude),
        })
    }

    pub fn action(&self) -> Action {
        match self.drive_value() {
            Some(value) => Action::Drive {
                motor_id: self.motor_id,
                value,
            },
            None => Action::Special {
                selector: self.motor_id,
            },
        }
    }
}

impl From<u8> for MotorCommand {
    fn from(byte: u8) -> Self {
        decode(byte)
    }
}

impl From<MotorCommand> for u8 {
    fn from(command: MotorCommand) -> Self {
        command.encode()
    }
}

/// Map a magnitude in `0..=31` onto `[0, 1]`. Zero maps to exactly `0.0`.
#[inline]
pub fn duty_fraction(magnitude: u8) -> f32 {
    if magnitude == 0 {
        return 0.0;
    }
    (magnitude.min(MAX_MAGNITUDE) as f32 / MAX_MAGNITUDE as f32).min(1.0)
}

impl DriveValue {
    /// A zero-duty drive value, used to bring a motor to rest.
    pub const STOP: Self = Self {
        forward: true,
        duty_fraction: 0.0,
    };

    /// Duty fraction clamped into `[0, 1]`; NaN is treated as stopped.
    pub fn clamped_duty(&self) -> f32 {
        if self.duty_fraction.is_nan() {
            0.0
        } else {
            self.duty_fraction.clamp(0.0, 1.0)
        }
    }
}
