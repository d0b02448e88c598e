//! Module Exports
//!
//! This file exports the hardware-facing controllers and the control loop that ties them
//! together.
//!
//! - `actuator`: PWM/DIR motor outputs.
//! - `telemetry`: analog sources, sampler and the telemetry frame.
//! - `requests`: special-request handlers.

pub mod actuator;
pub mod requests;
pub mod telemetry;

use embedded_io::{ErrorType, Write};

pub use actuator::{ActuatorOutput, Motor, MotorError};
pub use requests::{IdentifyHandler, NoopHandler, RequestHandler, SpecialRequest};
pub use telemetry::{TelemetryFrame, TelemetrySample, TelemetrySampler, TelemetrySource};

use crate::utils::{
    config::{LoopConfig, ReplayPolicy, MOTOR_COUNT},
    connection::{
        codec::{decode, Action, DriveValue, MotorCommand},
        link::{self, CommandInbox},
    },
};

/// Everything the loop drives or samples, handed over once at start-up.
///
/// Motor order is the host's dispatch order (motor id 0 is `motors[0]`); channel order is the
/// order of values on each telemetry line.
pub struct NodeHardware<A, S, H, const N: usize> {
    pub motors: [A; MOTOR_COUNT],
    pub channels: [S; N],
    pub handler: H,
}

/// Failure during one loop iteration.
#[derive(Debug)]
pub enum LoopError<AE, SE, IE, LE> {
    Actuator { motor_id: u8, error: AE },
    Telemetry(SE),
    Inbox(IE),
    Link(LE),
}

/// [`LoopError`] spelled in terms of the loop's capability types.
pub type NodeError<I, W, A, S> = LoopError<
    <A as ActuatorOutput>::Error,
    <S as TelemetrySource>::Error,
    <I as CommandInbox>::Error,
    <W as ErrorType>::Error,
>;

/// Loop state. Every iteration visits each phase once, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitByte,
    Dispatch,
    Sample,
    Transmit,
}

/// The node's scheduler: receive, dispatch, sample, transmit, forever.
pub struct ControlLoop<I, W, A, S, H, const N: usize> {
    inbox: I,
    tx: W,
    motors: [A; MOTOR_COUNT],
    sampler: TelemetrySampler<S, N>,
    handler: H,
    config: LoopConfig,
    active: MotorCommand,
    fresh: bool,
    phase: Phase,
    frame: Option<TelemetryFrame<N>>,
}

impl<I, W, A, S, H, const N: usize> ControlLoop<I, W, A, S, H, N>
where
    I: CommandInbox,
    W: Write,
    A: ActuatorOutput,
    S: TelemetrySource,
    H: RequestHandler,
{
    /// Build the loop and bring every motor to rest.
    pub fn new(
        inbox: I,
        tx: W,
        hardware: NodeHardware<A, S, H, N>,
        config: LoopConfig,
    ) -> Result<Self, NodeError<I, W, A, S>> {
        let NodeHardware {
            motors,
            channels,
            handler,
        } = hardware;

        let mut node = Self {
            inbox,
            tx,
            motors,
            sampler: TelemetrySampler::new(channels),
            handler,
            config,
            active: decode(config.initial_command),
            fresh: false,
            phase: Phase::AwaitByte,
            frame: None,
        };
        node.stop_all()?;
        Ok(node)
    }

    /// Command currently being dispatched.
    pub fn active_command(&self) -> MotorCommand {
        self.active
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Frame sampled during the most recent iteration, if sampling succeeded.
    pub fn last_frame(&self) -> Option<&TelemetryFrame<N>> {
        self.frame.as_ref()
    }

    pub fn tx(&self) -> &W {
        &self.tx
    }

    pub fn tx_mut(&mut self) -> &mut W {
        &mut self.tx
    }

    /// Drive every motor to zero duty. All motors are attempted; the first failure is returned.
    pub fn stop_all(&mut self) -> Result<(), NodeError<I, W, A, S>> {
        let mut first = None;
        for (motor_id, motor) in self.motors.iter_mut().enumerate() {
            if let Err(error) = motor.drive(DriveValue::STOP) {
                first.get_or_insert(LoopError::Actuator {
                    motor_id: motor_id as u8,
                    error,
                });
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Run one complete iteration.
    ///
    /// A failing phase does not cut the iteration short: telemetry is still sampled and sent
    /// after a failed dispatch. The first error is returned once the loop is back at
    /// [`Phase::AwaitByte`].
    pub fn step(&mut self) -> Result<(), NodeError<I, W, A, S>> {
        let mut first = None;
        loop {
            if let Err(error) = self.advance() {
                first.get_or_insert(error);
            }
            if self.phase == Phase::AwaitByte {
                break;
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Execute the current phase and move to the next one, even on failure.
    pub fn advance(&mut self) -> Result<(), NodeError<I, W, A, S>> {
        match self.phase {
            Phase::AwaitByte => {
                self.phase = Phase::Dispatch;
                self.receive()
            }
            Phase::Dispatch => {
                self.phase = Phase::Sample;
                self.dispatch()
            }
            Phase::Sample => {
                self.phase = Phase::Transmit;
                self.frame = None;
                let frame = self.sampler.sample_all().map_err(LoopError::Telemetry)?;
                self.frame = Some(frame);
                Ok(())
            }
            Phase::Transmit => {
                self.phase = Phase::AwaitByte;
                match &self.frame {
                    Some(frame) => link::transmit(&mut self.tx, frame).map_err(LoopError::Link),
                    None => Ok(()),
                }
            }
        }
    }

    /// Loop until power-off. Failures are logged and the next iteration starts regardless.
    pub fn run(&mut self) -> ! {
        tracing::info!(channels = N, replay = ?self.config.replay, "control loop running");
        loop {
            if let Err(error) = self.step() {
                tracing::warn!(?error, "control loop iteration failed");
            }
        }
    }

    /// Hand the inbox, link and hardware back.
    pub fn release(self) -> (I, W, NodeHardware<A, S, H, N>) {
        (
            self.inbox,
            self.tx,
            NodeHardware {
                motors: self.motors,
                channels: self.sampler.free(),
                handler: self.handler,
            },
        )
    }

    fn receive(&mut self) -> Result<(), NodeError<I, W, A, S>> {
        self.fresh = false;
        if let Some(byte) = self.inbox.poll().map_err(LoopError::Inbox)? {
            self.active = decode(byte);
            self.fresh = true;
            tracing::debug!(
                byte,
                motor_id = self.active.motor_id,
                negative = self.active.negative,
                magnitude = self.active.magnitude,
                "command received"
            );
        }
        Ok(())
    }

    fn dispatch(&mut self) -> Result<(), NodeError<I, W, A, S>> {
        if !self.fresh && self.config.replay == ReplayPolicy::HoldLast {
            return Ok(());
        }

        match self.active.action() {
            Action::Drive { motor_id, value } => {
                tracing::trace!(motor_id, ?value, "drive");
                self.motors[usize::from(motor_id)]
                    .drive(value)
                    .map_err(|error| LoopError::Actuator { motor_id, error })
            }
            Action::Special { selector } => {
                if self.fresh {
                    tracing::info!(selector, "special request");
                }
                let request = SpecialRequest {
                    selector,
                    fresh: self.fresh,
                };
                self.handler
                    .handle(request, &mut self.tx)
                    .map_err(LoopError::Link)
            }
        }
    }
}
