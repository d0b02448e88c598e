//! Module Exports
//!
//! - `scaling`: maps signed host speeds onto protocol bytes.

pub mod scaling;

pub use scaling::{ScalingError, SpeedScaling};
