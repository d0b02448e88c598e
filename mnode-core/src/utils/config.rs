//! Board constants and runtime loop configuration.

use serde::{Deserialize, Serialize};

/// Number of independently addressable motor outputs.
pub const MOTOR_COUNT: usize = 4;
/// Largest magnitude carried by a protocol byte (5 bits).
pub const MAX_MAGNITUDE: u8 = 31;

/// Analog inputs available on the board.
pub const MAX_CHANNELS: usize = 6;
/// Channels reported by the stock build (left and right flipper position).
pub const DEFAULT_CHANNELS: usize = 2;

/// PWM period for the motor drivers (25 kHz).
pub const PWM_PERIOD_US: u32 = 40;
pub const LINK_BAUD_RATE: u32 = 38_400;

/// Special-request selector the host uses to ask a node for its name.
pub const IDENTIFY_SELECTOR: u8 = 3;

/// Longest telemetry line: `"0xFFFF "` per channel plus the newline.
pub const TELEMETRY_LINE_CAPACITY: usize = MAX_CHANNELS * 7 + 1;

/// What the loop does with the active command when no new byte has arrived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayPolicy {
    /// Dispatch the last decoded command again on every iteration.
    #[default]
    Redispatch,
    /// Only dispatch commands decoded during the current iteration.
    HoldLast,
}

/// Runtime options for [`ControlLoop`](crate::utils::ControlLoop).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopConfig {
    pub replay: ReplayPolicy,
    /// Protocol byte treated as active before anything is received.
    pub initial_command: u8,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            replay: ReplayPolicy::Redispatch,
            initial_command: 0x00,
        }
    }
}
