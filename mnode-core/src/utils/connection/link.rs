//! Link plumbing between the host and the control loop.
//!
//! Inbound bytes come through a [`CommandInbox`], which must never block: either a
//! [`PolledLink`] that checks `read_ready` on a serial receiver, or an embassy [`Signal`] that a
//! receive interrupt fills with the latest byte. Outbound telemetry goes to any
//! `embedded_io::Write`.

use embassy_sync::{blocking_mutex::raw::RawMutex, signal::Signal};
use embedded_io::{Read, ReadReady, Write};

use crate::utils::controllers::telemetry::TelemetryFrame;

/// Non-blocking source of protocol bytes.
pub trait CommandInbox {
    type Error: core::fmt::Debug;

    /// Return the next received byte, or `None` if nothing has arrived.
    fn poll(&mut self) -> Result<Option<u8>, Self::Error>;
}

/// Polls a serial receiver for one byte per call.
pub struct PolledLink<R> {
    rx: R,
}

impl<R> PolledLink<R>
where
    R: Read + ReadReady,
{
    pub fn new(rx: R) -> Self {
        Self { rx }
    }

    pub fn free(self) -> R {
        self.rx
    }
}

impl<R> CommandInbox for PolledLink<R>
where
    R: Read + ReadReady,
{
    type Error = R::Error;

    fn poll(&mut self) -> Result<Option<u8>, Self::Error> {
        if !self.rx.read_ready()? {
            return Ok(None);
        }
        let mut byte = [0u8; 1];
        match self.rx.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }
}

/// Latest-byte cell written from a receive callback.
///
/// Bytes that arrive faster than the loop polls overwrite each other; only the newest is seen.
impl<M> CommandInbox for &Signal<M, u8>
where
    M: RawMutex,
{
    type Error = core::convert::Infallible;

    fn poll(&mut self) -> Result<Option<u8>, Self::Error> {
        Ok(self.try_take())
    }
}

/// Format `frame` and write it to `tx` as one telemetry line.
pub fn transmit<W, const N: usize>(
    tx: &mut W,
    frame: &TelemetryFrame<N>,
) -> Result<(), W::Error>
where
    W: Write,
{
    let line = frame.to_line();
    tx.write_all(line.as_bytes())?;
    tx.flush()
}
