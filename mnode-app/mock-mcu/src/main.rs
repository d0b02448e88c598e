use clap::Parser;
use embassy_sync::{blocking_mutex::raw::NoopRawMutex, signal::Signal};
use embedded_hal::{digital, pwm};
use embedded_io::{ErrorKind, ErrorType, Write};
use mnode_core::utils::{
    MotorCommand, NodeHardware,
    config::{
        DEFAULT_CHANNELS, LINK_BAUD_RATE, LoopConfig, MOTOR_COUNT, PWM_PERIOD_US, ReplayPolicy,
    },
    controllers::{
        ControlLoop, IdentifyHandler, Motor, NoopHandler, RequestHandler, SpecialRequest,
    },
    math::SpeedScaling,
};
use std::convert::Infallible;
use std::io::Write as _;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts {
    /// Raw protocol bytes sent by the host, e.g. `0xFA,0x07`
    #[clap(long, value_delimiter = ',', value_parser = parse_u8)]
    commands: Vec<u8>,
    /// Host-side speed commands as `motor:speed`, encoded after `--commands`
    #[clap(long = "speed", value_parser = parse_speed)]
    speeds: Vec<(u8, f32)>,
    /// Dead band applied by the host encoder
    #[clap(long, default_value_t = 0.0)]
    start_input: f32,
    /// Speed cap applied by the host encoder
    #[clap(long, default_value_t = 1.0)]
    max_speed: f32,
    /// Deliver one scripted byte every N loop iterations
    #[clap(long, default_value_t = 1)]
    every: usize,
    /// Number of loop iterations to run
    #[clap(long, default_value_t = 8)]
    iterations: usize,
    /// Raw sample reported by each telemetry channel
    #[clap(long, value_delimiter = ',', value_parser = parse_u16, default_values = ["0x00FF", "0x1234"])]
    channels: Vec<u16>,
    /// Only dispatch freshly received commands
    #[clap(long)]
    hold_last: bool,
    /// Answer identify requests (selector 3) with this board name
    #[clap(long)]
    identify: Option<String>,
    /// Log every telemetry frame as JSON
    #[clap(long)]
    json: bool,
}

fn parse_u8(s: &str) -> Result<u8, String> {
    parse_u16(s)?
        .try_into()
        .map_err(|_| format!("{s} does not fit in a byte"))
}

fn parse_u16(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("{s}: {e}"))
}

fn parse_speed(s: &str) -> Result<(u8, f32), String> {
    let (motor, speed) = s
        .split_once(':')
        .ok_or_else(|| format!("{s}: expected motor:speed"))?;
    let motor: u8 = motor.parse().map_err(|e| format!("{s}: {e}"))?;
    if usize::from(motor) >= MOTOR_COUNT {
        return Err(format!("{s}: motor id must be below {MOTOR_COUNT}"));
    }
    let speed: f32 = speed.parse().map_err(|e| format!("{s}: {e}"))?;
    Ok((motor, speed))
}

const TIMER_TICKS_PER_US: u32 = 100;

/// PWM channel that logs duty changes instead of toggling a timer.
struct LoggingPwm {
    motor: usize,
}

impl pwm::ErrorType for LoggingPwm {
    type Error = Infallible;
}

impl pwm::SetDutyCycle for LoggingPwm {
    fn max_duty_cycle(&self) -> u16 {
        (PWM_PERIOD_US * TIMER_TICKS_PER_US) as u16
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        debug!(motor = self.motor, duty, "pwm");
        Ok(())
    }
}

/// Direction pin that logs its level.
struct LoggingPin {
    motor: usize,
}

impl digital::ErrorType for LoggingPin {
    type Error = Infallible;
}

impl digital::OutputPin for LoggingPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        debug!(motor = self.motor, "dir low (reverse)");
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        debug!(motor = self.motor, "dir high (forward)");
        Ok(())
    }
}

/// Serial transmit line backed by stdout.
struct StdoutLink {
    out: std::io::Stdout,
}

impl ErrorType for StdoutLink {
    type Error = ErrorKind;
}

impl Write for StdoutLink {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.out.write(buf).map_err(|_| ErrorKind::Other)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.out.flush().map_err(|_| ErrorKind::Other)
    }
}

enum Handler {
    Noop(NoopHandler),
    Identify(IdentifyHandler),
}

impl RequestHandler for Handler {
    fn handle<W: Write>(&mut self, request: SpecialRequest, tx: &mut W) -> Result<(), W::Error> {
        match self {
            Handler::Noop(h) => h.handle(request, tx),
            Handler::Identify(h) => h.handle(request, tx),
        }
    }
}

fn adc_channel(value: u16) -> impl FnMut() -> u16 {
    move || value
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opts: Opts = Opts::parse();

    let scaling = match SpeedScaling::new(opts.start_input, opts.max_speed) {
        Ok(scaling) => scaling,
        Err(e) => {
            error!(?e, "invalid speed scaling");
            std::process::exit(2);
        }
    };
    let channels: [u16; DEFAULT_CHANNELS] = match opts.channels.as_slice().try_into() {
        Ok(channels) => channels,
        Err(_) => {
            error!(
                got = opts.channels.len(),
                expected = DEFAULT_CHANNELS,
                "wrong number of telemetry channels"
            );
            std::process::exit(2);
        }
    };

    let mut script: Vec<u8> = opts.commands.clone();
    script.extend(
        opts.speeds
            .iter()
            .map(|&(motor, speed)| MotorCommand::from_speed(motor, speed, &scaling).encode()),
    );
    for &byte in &script {
        let cmd = MotorCommand::from(byte);
        info!(
            byte = %format!("{byte:#04X}"),
            command = %serde_json::to_string(&cmd).unwrap_or_default(),
            special = cmd.is_special_request(),
            "scripted"
        );
    }

    let config = LoopConfig {
        replay: if opts.hold_last {
            ReplayPolicy::HoldLast
        } else {
            ReplayPolicy::Redispatch
        },
        ..LoopConfig::default()
    };
    info!(
        config = %serde_json::to_string(&config).unwrap_or_default(),
        baud = LINK_BAUD_RATE,
        pwm_period_us = PWM_PERIOD_US,
        "starting mock node"
    );

    let motors = [0, 1, 2, 3].map(|motor| {
        Motor::new(LoggingPwm { motor }, LoggingPin { motor }).unwrap()
    });
    let handler = match opts.identify {
        Some(name) => Handler::Identify(IdentifyHandler::new(name.leak())),
        None => Handler::Noop(NoopHandler),
    };
    let hardware = NodeHardware {
        motors,
        channels: channels.map(adc_channel),
        handler,
    };

    // Filled by the "receive interrupt" below, drained by the loop.
    let rx: Signal<NoopRawMutex, u8> = Signal::new();
    let tx = StdoutLink {
        out: std::io::stdout(),
    };
    let mut node = ControlLoop::new(&rx, tx, hardware, config).unwrap();

    let every = opts.every.max(1);
    let mut pending = script.into_iter();
    for iteration in 0..opts.iterations {
        if iteration % every == 0 {
            if let Some(byte) = pending.next() {
                rx.signal(byte);
            }
        }
        if let Err(e) = node.step() {
            error!(iteration, ?e, "iteration failed");
        }
        if opts.json {
            if let Some(frame) = node.last_frame() {
                info!(iteration, frame = %serde_json::to_string(frame).unwrap_or_default());
            }
        }
    }

    if let Err(e) = node.stop_all() {
        error!(?e, "failed to stop motors");
    }
    info!(iterations = opts.iterations, "mock node finished");
}
