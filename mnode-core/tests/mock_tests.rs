use std::collections::VecDeque;
use std::convert::Infallible;

use embassy_sync::{blocking_mutex::raw::NoopRawMutex, signal::Signal};
use embedded_hal_mock::eh1::digital::{
    Mock as PinMock, State as PinState, Transaction as PinTransaction,
};
use embedded_io::{ErrorKind, ErrorType, Read, ReadReady, Write};
use mnode_core::utils::{
    config::{LoopConfig, ReplayPolicy},
    connection::link::{CommandInbox, PolledLink},
    controllers::{
        telemetry::TelemetrySampler, ActuatorOutput, ControlLoop, IdentifyHandler, LoopError,
        Motor, NodeHardware, NoopHandler, Phase, RequestHandler, TelemetrySource,
    },
    DriveValue, MotorCommand,
};

/// PWM channel that records every duty written to it.
struct FakePwm {
    max: u16,
    history: Vec<u16>,
}

impl FakePwm {
    fn new(max: u16) -> Self {
        Self {
            max,
            history: Vec::new(),
        }
    }
}

impl embedded_hal::pwm::ErrorType for FakePwm {
    type Error = Infallible;
}

impl embedded_hal::pwm::SetDutyCycle for FakePwm {
    fn max_duty_cycle(&self) -> u16 {
        self.max
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        self.history.push(duty);
        Ok(())
    }
}

/// Motor output that records every drive value.
#[derive(Default)]
struct RecordingMotor {
    drives: Vec<DriveValue>,
}

impl ActuatorOutput for RecordingMotor {
    type Error = Infallible;

    fn drive(&mut self, value: DriveValue) -> Result<(), Self::Error> {
        self.drives.push(value);
        Ok(())
    }
}

/// Receive line that hands out one scripted byte per poll.
struct ScriptedRx {
    pending: VecDeque<u8>,
}

impl ScriptedRx {
    fn new(bytes: &[u8]) -> Self {
        Self {
            pending: bytes.iter().copied().collect(),
        }
    }
}

impl ErrorType for ScriptedRx {
    type Error = Infallible;
}

impl Read for ScriptedRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        match (buf.first_mut(), self.pending.pop_front()) {
            (Some(slot), Some(byte)) => {
                *slot = byte;
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}

impl ReadReady for ScriptedRx {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.pending.is_empty())
    }
}

/// Transmit line that captures everything written.
#[derive(Default)]
struct CaptureTx {
    bytes: Vec<u8>,
}

impl CaptureTx {
    fn text(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap()
    }
}

impl ErrorType for CaptureTx {
    type Error = Infallible;
}

impl Write for CaptureTx {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Transmit line with a broken cable.
struct DeadTx;

impl ErrorType for DeadTx {
    type Error = ErrorKind;
}

impl Write for DeadTx {
    fn write(&mut self, _buf: &[u8]) -> Result<usize, Self::Error> {
        Err(ErrorKind::Other)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Err(ErrorKind::Other)
    }
}

/// Analog channel whose converter never answers.
struct DeadChannel;

impl TelemetrySource for DeadChannel {
    type Error = ();

    fn read_u16(&mut self) -> Result<u16, Self::Error> {
        Err(())
    }
}

fn constant(value: u16) -> impl FnMut() -> u16 {
    move || value
}

fn left_flipper() -> u16 {
    0x00FF
}

fn right_flipper() -> u16 {
    0x1234
}

const LINE: &str = "0xFF 0x1234 \n";

type TestLoop<H> =
    ControlLoop<PolledLink<ScriptedRx>, CaptureTx, RecordingMotor, fn() -> u16, H, 2>;

fn node<H: RequestHandler>(
    bytes: &[u8],
    handler: H,
    config: LoopConfig,
) -> TestLoop<H> {
    let hardware = NodeHardware {
        motors: Default::default(),
        channels: [left_flipper as fn() -> u16, right_flipper],
        handler,
    };
    ControlLoop::new(
        PolledLink::new(ScriptedRx::new(bytes)),
        CaptureTx::default(),
        hardware,
        config,
    )
    .unwrap()
}

fn drives<H: RequestHandler>(node: TestLoop<H>) -> [Vec<DriveValue>; 4] {
    let (_, _, hardware) = node.release();
    hardware.motors.map(|m| m.drives)
}

#[test]
fn motor_new_pulls_lines_low() {
    let pin = PinMock::new(&[PinTransaction::set(PinState::Low)]);
    let motor = Motor::new(FakePwm::new(1000), pin).unwrap();

    let (pwm, mut pin) = motor.free();
    pin.done();
    assert_eq!(pwm.history, vec![0]);
}

#[test]
fn motor_drive_sets_direction_then_duty() {
    let pin = PinMock::new(&[
        PinTransaction::set(PinState::Low),
        PinTransaction::set(PinState::High),
        PinTransaction::set(PinState::Low),
    ]);
    let mut motor = Motor::new(FakePwm::new(1000), pin).unwrap();

    motor
        .drive(DriveValue {
            forward: true,
            duty_fraction: 0.5,
        })
        .unwrap();
    motor
        .drive(DriveValue {
            forward: false,
            duty_fraction: 0.25,
        })
        .unwrap();

    let (pwm, mut pin) = motor.free();
    pin.done();
    assert_eq!(pwm.history, vec![0, 500, 250]);
}

#[test]
fn motor_zero_duty_is_off_in_both_directions() {
    let pin = PinMock::new(&[
        PinTransaction::set(PinState::Low),
        PinTransaction::set(PinState::High),
        PinTransaction::set(PinState::Low),
    ]);
    let mut motor = Motor::new(FakePwm::new(4095), pin).unwrap();

    for forward in [true, false] {
        motor
            .drive(DriveValue {
                forward,
                duty_fraction: 0.0,
            })
            .unwrap();
    }

    let (pwm, mut pin) = motor.free();
    pin.done();
    assert_eq!(pwm.history, vec![0, 0, 0]);
}

#[test]
fn motor_clamps_duty_above_one() {
    let pin = PinMock::new(&[
        PinTransaction::set(PinState::Low),
        PinTransaction::set(PinState::High),
    ]);
    let mut motor = Motor::new(FakePwm::new(4095), pin).unwrap();

    motor
        .drive(DriveValue {
            forward: true,
            duty_fraction: 3.0,
        })
        .unwrap();

    let (pwm, mut pin) = motor.free();
    pin.done();
    assert_eq!(pwm.history, vec![0, 4095]);
}

#[test]
fn telemetry_line_matches_host_format() {
    let mut sampler = TelemetrySampler::new([constant(0x00FF), constant(0x1234)]);
    let frame = sampler.sample_all().unwrap();

    assert_eq!(frame.to_line().as_str(), LINE);
    assert_eq!(frame.values(), [0x00FF, 0x1234]);
    assert_eq!(frame.samples()[1].channel, 1);
}

#[test]
fn telemetry_is_idempotent_for_unchanged_inputs() {
    let mut sampler = TelemetrySampler::new([constant(7), constant(0), constant(0xFFFF)]);
    let first = sampler.sample_all().unwrap();
    let second = sampler.sample_all().unwrap();

    assert_eq!(first, second);
    assert_eq!(sampler.channel_count(), 3);
    assert_eq!(first.to_line().as_str(), "0x7 0x0 0xFFFF \n");
}

#[test]
fn telemetry_line_fits_every_channel_at_full_width() {
    let mut sampler = TelemetrySampler::new([
        constant(0xFFFF),
        constant(0xFFFF),
        constant(0xFFFF),
        constant(0xFFFF),
        constant(0xFFFF),
        constant(0xFFFF),
    ]);
    let line = sampler.sample_all().unwrap().to_line();

    assert_eq!(line.as_str(), "0xFFFF ".repeat(6) + "\n");
}

#[test]
fn zero_magnitude_command_stops_motor_forward() {
    let mut node = node(&[0b00000_0_01], NoopHandler, LoopConfig::default());
    node.step().unwrap();

    assert_eq!(node.tx().text(), LINE);
    let [m0, m1, m2, m3] = drives(node);
    assert_eq!(
        m1.last(),
        Some(&DriveValue {
            forward: true,
            duty_fraction: 0.0
        })
    );
    assert_eq!(m1.len(), 2);
    for motor in [m0, m2, m3] {
        assert_eq!(motor, vec![DriveValue::STOP]);
    }
}

#[test]
fn new_loop_stops_every_motor() {
    let node = node(&[], NoopHandler, LoopConfig::default());
    for motor in drives(node) {
        assert_eq!(motor, vec![DriveValue::STOP]);
    }
}

#[test]
fn phases_advance_in_order() {
    let mut node = node(&[], NoopHandler, LoopConfig::default());
    let mut seen = vec![node.phase()];
    for _ in 0..4 {
        node.advance().unwrap();
        seen.push(node.phase());
    }
    assert_eq!(
        seen,
        vec![
            Phase::AwaitByte,
            Phase::Dispatch,
            Phase::Sample,
            Phase::Transmit,
            Phase::AwaitByte
        ]
    );
    assert_eq!(node.tx().text(), LINE);
}

#[test]
fn full_speed_command_drives_motor_and_reports() {
    let mut node = node(&[0b11111_0_10], NoopHandler, LoopConfig::default());
    node.step().unwrap();

    assert_eq!(node.tx().text(), LINE);
    let [m0, m1, m2, m3] = drives(node);
    assert_eq!(m0.len(), 1);
    assert_eq!(m1.len(), 1);
    assert_eq!(m3.len(), 1);
    assert_eq!(
        m2.last(),
        Some(&DriveValue {
            forward: true,
            duty_fraction: 1.0
        })
    );
}

#[test]
fn stale_command_is_redispatched_every_iteration() {
    let mut node = node(&[0b01000_1_01], NoopHandler, LoopConfig::default());
    for _ in 0..3 {
        node.step().unwrap();
    }

    assert_eq!(node.tx().text(), LINE.repeat(3));
    let motors = drives(node);
    // Initial stop plus one drive per iteration.
    assert_eq!(motors[1].len(), 4);
    assert!(motors[1][1..].iter().all(|v| !v.forward && v.duty_fraction > 0.0));
}

#[test]
fn hold_last_only_dispatches_fresh_commands() {
    let config = LoopConfig {
        replay: ReplayPolicy::HoldLast,
        ..LoopConfig::default()
    };
    let mut node = node(&[0b01000_1_01], NoopHandler, config);
    for _ in 0..3 {
        node.step().unwrap();
    }

    // Telemetry keeps flowing even though nothing is redispatched.
    assert_eq!(node.tx().text(), LINE.repeat(3));
    assert_eq!(drives(node)[1].len(), 2);
}

#[test]
fn initial_command_is_dispatched_before_any_byte() {
    let mut node = node(&[], NoopHandler, LoopConfig::default());
    node.step().unwrap();

    assert_eq!(node.active_command(), MotorCommand::from(0x00));
    let motors = drives(node);
    assert_eq!(motors[0].len(), 2);
    assert_eq!(motors[0][1].duty_fraction, 0.0);
}

#[test]
fn special_request_never_drives() {
    let mut node = node(&[0b00000_1_11], NoopHandler, LoopConfig::default());
    node.step().unwrap();
    node.step().unwrap();

    assert!(node.active_command().is_special_request());
    assert_eq!(node.tx().text(), LINE.repeat(2));
    for motor in drives(node) {
        assert_eq!(motor, vec![DriveValue::STOP]);
    }
}

#[test]
fn identify_replies_once_per_probe() {
    let mut node = node(
        &[MotorCommand::special(3).encode()],
        IdentifyHandler::new("body"),
        LoopConfig::default(),
    );
    node.step().unwrap();
    node.step().unwrap();

    assert_eq!(node.tx().text(), format!("body\n{LINE}{LINE}"));
}

#[test]
fn identify_ignores_other_selectors() {
    let mut node = node(
        &[MotorCommand::special(1).encode()],
        IdentifyHandler::new("arm"),
        LoopConfig::default(),
    );
    node.step().unwrap();

    assert_eq!(node.tx().text(), LINE);
}

#[test]
fn dispatch_targets_only_the_decoded_motor() {
    let bytes: Vec<u8> = (0..=u8::MAX).collect();
    let mut node = node(&bytes, NoopHandler, LoopConfig::default());
    for _ in 0..bytes.len() {
        node.step().unwrap();
    }

    let motors = drives(node);
    for id in 0..4u8 {
        // 64 bytes per motor id, one of them the special request, plus the initial stop.
        assert_eq!(motors[id as usize].len(), 64 - 1 + 1, "motor {id}");
    }
}

#[test]
fn telemetry_lines_keep_full_length() {
    let mut node = node(&[0x01, 0xFF, 0x07, 0x80], NoopHandler, LoopConfig::default());
    for _ in 0..6 {
        node.step().unwrap();
    }

    let text = node.tx().text().to_owned();
    assert_eq!(text.lines().count(), 6);
    assert!(text.lines().all(|l| l == "0xFF 0x1234 "));
}

#[test]
fn signal_inbox_sees_only_latest_byte() {
    let signal: Signal<NoopRawMutex, u8> = Signal::new();
    let hardware = NodeHardware {
        motors: <[RecordingMotor; 4]>::default(),
        channels: [constant(1)],
        handler: NoopHandler,
    };
    let mut node = ControlLoop::new(
        &signal,
        CaptureTx::default(),
        hardware,
        LoopConfig {
            replay: ReplayPolicy::HoldLast,
            ..LoopConfig::default()
        },
    )
    .unwrap();

    signal.signal(0b00001_0_00);
    signal.signal(0b00011_0_10);
    node.step().unwrap();
    node.step().unwrap();

    assert_eq!(node.active_command().encode(), 0b00011_0_10);
    assert_eq!(node.tx().text(), "0x1 \n0x1 \n");
    let (mut inbox, _, hardware) = node.release();
    assert_eq!(inbox.poll(), Ok(None));
    assert_eq!(hardware.motors[0].drives.len(), 1);
    assert_eq!(hardware.motors[2].drives.len(), 2);
}

#[test]
fn link_failure_is_reported_after_dispatch() {
    let hardware = NodeHardware {
        motors: <[RecordingMotor; 4]>::default(),
        channels: [constant(1)],
        handler: NoopHandler,
    };
    let mut node = ControlLoop::new(
        PolledLink::new(ScriptedRx::new(&[0b11111_0_11])),
        DeadTx,
        hardware,
        LoopConfig::default(),
    )
    .unwrap();

    assert!(matches!(node.step(), Err(LoopError::Link(ErrorKind::Other))));
    assert_eq!(node.phase(), Phase::AwaitByte);
    let (_, _, hardware) = node.release();
    assert_eq!(hardware.motors[3].drives.len(), 2);
}

#[test]
fn sampling_failure_skips_transmit_but_not_dispatch() {
    let hardware = NodeHardware {
        motors: <[RecordingMotor; 4]>::default(),
        channels: [DeadChannel, DeadChannel],
        handler: NoopHandler,
    };
    let mut node = ControlLoop::new(
        PolledLink::new(ScriptedRx::new(&[0b00100_0_00])),
        CaptureTx::default(),
        hardware,
        LoopConfig::default(),
    )
    .unwrap();

    assert!(matches!(node.step(), Err(LoopError::Telemetry(()))));
    assert!(node.tx().bytes.is_empty());
    let (_, _, hardware) = node.release();
    assert_eq!(hardware.motors[0].drives.len(), 2);
}
