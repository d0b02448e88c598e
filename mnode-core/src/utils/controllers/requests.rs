//! Special-request extension point.
//!
//! A negative, zero-magnitude command never drives a motor. Its motor id field is a request
//! selector routed to a [`RequestHandler`]. The core protocol gives no selector a meaning;
//! [`NoopHandler`] is the reference behaviour and silently discards every request.

use embedded_io::Write;

use crate::utils::config::IDENTIFY_SELECTOR;

/// A special request seen by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialRequest {
    /// Selector in `0..=3`.
    pub selector: u8,
    /// `false` when the request is being replayed because no new byte arrived.
    pub fresh: bool,
}

/// Deployment-specific handling of special requests.
pub trait RequestHandler {
    /// `tx` is the link the telemetry is written to; replies go out ahead of this iteration's
    /// telemetry line.
    fn handle<W: Write>(&mut self, request: SpecialRequest, tx: &mut W) -> Result<(), W::Error>;
}

/// Discards every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl RequestHandler for NoopHandler {
    fn handle<W: Write>(&mut self, _request: SpecialRequest, _tx: &mut W) -> Result<(), W::Error> {
        Ok(())
    }
}

/// Answers the host's identify probe with the board name.
///
/// The host sends selector 3 and reads back one line (e.g. `"body"`) to tell which node sits
/// on which serial port. Replayed requests are ignored so the name is sent once per probe.
#[derive(Debug, Clone, Copy)]
pub struct IdentifyHandler {
    name: &'static str,
}

impl IdentifyHandler {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl RequestHandler for IdentifyHandler {
    fn handle<W: Write>(&mut self, request: SpecialRequest, tx: &mut W) -> Result<(), W::Error> {
        if request.selector != IDENTIFY_SELECTOR || !request.fresh {
            return Ok(());
        }
        tracing::info!(name = self.name, "answering identify request");
        tx.write_all(self.name.as_bytes())?;
        tx.write_all(b"\n")
    }
}
