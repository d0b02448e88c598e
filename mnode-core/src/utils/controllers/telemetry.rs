//! Analog telemetry sampling.
//!
//! Channels are identified by position only: the host expects the same fixed order on every
//! line, so the order of sources handed to [`TelemetrySampler::new`] is part of the protocol.

use core::fmt::{self, Write as _};

use heapless::String;
use serde::{ser::Serializer, Serialize};

use crate::utils::config::{MAX_CHANNELS, TELEMETRY_LINE_CAPACITY};

/// Capability returning one 16-bit sample from an analog channel.
pub trait TelemetrySource {
    type Error: core::fmt::Debug;

    fn read_u16(&mut self) -> Result<u16, Self::Error>;
}

/// Any infallible reader closure is a source, e.g. one built around a shared ADC handle.
impl<F> TelemetrySource for F
where
    F: FnMut() -> u16,
{
    type Error = core::convert::Infallible;

    fn read_u16(&mut self) -> Result<u16, Self::Error> {
        Ok(self())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TelemetrySample {
    pub channel: u8,
    pub value: u16,
}

/// One full set of samples, in channel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryFrame<const N: usize> {
    samples: [TelemetrySample; N],
}

impl<const N: usize> TelemetryFrame<N> {
    pub fn samples(&self) -> &[TelemetrySample; N] {
        &self.samples
    }

    pub fn values(&self) -> [u16; N] {
        self.samples.map(|s| s.value)
    }

    /// Render the frame as the wire line, e.g. `"0xFF 0x1234 \n"`.
    pub fn to_line(&self) -> String<TELEMETRY_LINE_CAPACITY> {
        const {
            assert!(N <= MAX_CHANNELS, "more telemetry channels than the board has");
            assert!(N * 7 + 1 <= TELEMETRY_LINE_CAPACITY, "telemetry line buffer too small");
        };
        let mut line = String::new();
        let written = write!(line, "{}", self);
        debug_assert!(written.is_ok(), "telemetry line truncated");
        line
    }
}

impl<const N: usize> fmt::Display for TelemetryFrame<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for sample in &self.samples {
            write!(f, "0x{:X} ", sample.value)?;
        }
        f.write_char('\n')
    }
}

impl<const N: usize> Serialize for TelemetryFrame<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.samples.iter())
    }
}

/// Fixed, ordered set of telemetry sources.
pub struct TelemetrySampler<S, const N: usize> {
    sources: [S; N],
}

impl<S, const N: usize> TelemetrySampler<S, N>
where
    S: TelemetrySource,
{
    pub fn new(sources: [S; N]) -> Self {
        const { assert!(N <= MAX_CHANNELS, "more telemetry channels than the board has") };
        Self { sources }
    }

    pub const fn channel_count(&self) -> usize {
        N
    }

    /// Read every channel once, in order. The frame is always full length.
    pub fn sample_all(&mut self) -> Result<TelemetryFrame<N>, S::Error> {
        let mut samples = [TelemetrySample::default(); N];
        for (i, (source, slot)) in self.sources.iter_mut().zip(samples.iter_mut()).enumerate() {
            *slot = TelemetrySample {
                channel: i as u8,
                value: source.read_u16()?,
            };
        }
        tracing::trace!(?samples, "telemetry sampled");
        Ok(TelemetryFrame { samples })
    }

    pub fn free(self) -> [S; N] {
        self.sources
    }
}
