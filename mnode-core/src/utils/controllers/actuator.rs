//! Motor outputs.
//!
//! Each motor driver takes a PWM line for speed and a DIR line for direction (high is forward).
//! The control loop only sees the [`ActuatorOutput`] capability, so boards with a different
//! driver wiring can plug in their own implementation.

use embedded_hal::{digital::OutputPin, pwm::SetDutyCycle};

use crate::utils::connection::codec::DriveValue;

/// Capability that applies a [`DriveValue`] to one physical motor.
pub trait ActuatorOutput {
    type Error: core::fmt::Debug;

    fn drive(&mut self, value: DriveValue) -> Result<(), Self::Error>;
}

impl<A> ActuatorOutput for &mut A
where
    A: ActuatorOutput + ?Sized,
{
    type Error = A::Error;

    fn drive(&mut self, value: DriveValue) -> Result<(), Self::Error> {
        (**self).drive(value)
    }
}

/// Errors from the PWM/DIR motor driver.
#[derive(Debug)]
pub enum MotorError<PE: core::fmt::Debug, DE: core::fmt::Debug> {
    Pwm(PE),
    Direction(DE),
}

/// Motor driver wired to one PWM channel and one direction pin.
pub struct Motor<PWM, DIR> {
    pwm: PWM,
    dir: DIR,
}

impl<PWM, DIR> Motor<PWM, DIR>
where
    PWM: SetDutyCycle,
    DIR: OutputPin,
{
    /// Take ownership of the driver lines and pull both low (reverse, stopped).
    pub fn new(
        mut pwm: PWM,
        mut dir: DIR,
    ) -> Result<Self, MotorError<PWM::Error, DIR::Error>> {
        dir.set_low().map_err(MotorError::Direction)?;
        pwm.set_duty_cycle_fully_off().map_err(MotorError::Pwm)?;
        Ok(Self { pwm, dir })
    }

    pub fn free(self) -> (PWM, DIR) {
        (self.pwm, self.dir)
    }
}

impl<PWM, DIR> ActuatorOutput for Motor<PWM, DIR>
where
    PWM: SetDutyCycle,
    DIR: OutputPin,
{
    type Error = MotorError<PWM::Error, DIR::Error>;

    /// Set DIR, then PWM. A zero duty always turns the output fully off.
    fn drive(&mut self, value: DriveValue) -> Result<(), Self::Error> {
        let duty = value.clamped_duty();

        if value.forward {
            self.dir.set_high()
        } else {
            self.dir.set_low()
        }
        .map_err(MotorError::Direction)?;

        if duty == 0.0 {
            return self.pwm.set_duty_cycle_fully_off().map_err(MotorError::Pwm);
        }

        let max = self.pwm.max_duty_cycle();
        let raw = libm::roundf(duty * max as f32) as u16;
        self.pwm
            .set_duty_cycle(raw.min(max))
            .map_err(MotorError::Pwm)
    }
}
