//! Module Exports
//!
//! This file exports the modules that move bytes between the host and the node.
//!
//! # Modules
//! - `codec`: Decodes (and encodes) the single-byte motor command protocol.
//! - `link`: Non-blocking inbound byte sources and the telemetry transmit path.

pub mod codec;
pub mod link;

pub use codec::{decode, Action, DriveValue, MotorCommand};
pub use link::{CommandInbox, PolledLink};
