//! PCA9685-backed motor channels on a shared I2C bus.
//!
//! Boards without spare timer outputs can drive the two H-bridges from a
//! PCA9685 PWM expander. The expander sits on a `RefCell`-shared bus so other
//! devices (the camera's SCCB port, for instance) can use the same pins.

use core::cell::RefCell;

use embedded_hal::i2c::I2c;
use embedded_hal_bus::i2c::RefCellDevice;
use pwm_pca9685::{Address as PwmAddress, Channel as PwmChannel, Error as PwmError, Pca9685};

use super::motors::{Channel, Motor, MotorPeripheral};

/// Default I2C address of the PWM expander.
pub const PWM_ADDRESS: u8 = 0x40;
/// Prescale for roughly 1 kHz PWM from the 25 MHz internal oscillator.
pub const DEFAULT_PRESCALE: u8 = 5;

const MAX_COUNT: u32 = 4095;

/// Errors that can occur when driving the PWM expander.
#[derive(Debug)]
pub enum DeviceError<E: core::fmt::Debug> {
    PwmError(PwmError<E>),
    PwmNotInitialized,
}

/// Motor channels mapped onto PCA9685 outputs.
pub struct Pca9685Motors<'a, I2C: 'static> {
    i2c: &'a RefCell<I2C>,
    pub pwm: Option<Pca9685<RefCellDevice<'a, I2C>>>,
    address: u8,
    /// `(forward, backward)` outputs for the left and right motor.
    motor_channels: [(PwmChannel, PwmChannel); 2],
}

impl<'a, I2C, E> Pca9685Motors<'a, I2C>
where
    I2C: I2c<Error = E> + 'static,
    E: core::fmt::Debug,
{
    /// Left motor on outputs 0/1, right motor on outputs 2/3.
    pub fn new(
        i2c_bus: &'a RefCell<I2C>,
        address: u8,
    ) -> Self {
        Self::with_channels(
            i2c_bus,
            address,
            [
                (PwmChannel::C0, PwmChannel::C1),
                (PwmChannel::C2, PwmChannel::C3),
            ],
        )
    }

    pub fn with_channels(
        i2c_bus: &'a RefCell<I2C>,
        address: u8,
        motor_channels: [(PwmChannel, PwmChannel); 2],
    ) -> Self {
        Pca9685Motors {
            i2c: i2c_bus,
            pwm: None,
            address,
            motor_channels,
        }
    }

    /// Attach the PWM driver to the bus. Does not touch the hardware yet.
    pub fn init_devices(&mut self) -> Result<(), DeviceError<E>> {
        let pwm = Pca9685::new(RefCellDevice::new(self.i2c), PwmAddress::from(self.address))
            .map_err(DeviceError::PwmError)?;
        self.pwm = Some(pwm);
        Ok(())
    }

    /// Scan the I2C bus for devices and log any found addresses.
    pub fn scan_bus(&self) {
        let mut bus = self.i2c.borrow_mut();
        for addr in 0x03..0x78 {
            if bus.write(addr, &[]).is_ok() {
                tracing::warn!("I2C device found at 0x{:02X}", addr);
            }
        }
    }

    /// Enable the expander outputs and set the PWM prescale.
    pub fn configure_pwm(
        &mut self,
        prescale: u8,
    ) -> Result<(), DeviceError<E>> {
        let pca = self.pwm.as_mut().ok_or(DeviceError::PwmNotInitialized)?;
        pca.enable().map_err(DeviceError::PwmError)?;
        tracing::info!("PWM enabled");
        pca.set_prescale(prescale).map_err(DeviceError::PwmError)?;
        tracing::info!(prescale, "PWM prescale set");
        Ok(())
    }

    /// Attach and configure, falling back to a bus scan when the expander
    /// does not answer.
    pub fn bring_up(
        &mut self,
        prescale: u8,
    ) -> Result<(), DeviceError<E>> {
        let result = self.init_devices().and_then(|()| self.configure_pwm(prescale));
        if let Err(e) = &result {
            tracing::warn!("PWM expander init failed, scanning instead: {:?}", e);
            self.pwm = None;
            self.scan_bus();
        }
        result
    }

    pub fn enable(&mut self) -> Result<(), DeviceError<E>> {
        if let Some(pca) = self.pwm.as_mut() {
            pca.enable().map_err(DeviceError::PwmError)?;
        }
        Ok(())
    }

    /// Put the expander to sleep; all outputs go low.
    pub fn disable(&mut self) -> Result<(), DeviceError<E>> {
        if let Some(pca) = self.pwm.as_mut() {
            pca.disable().map_err(DeviceError::PwmError)?;
        }
        Ok(())
    }

    fn output(
        &self,
        motor: Motor,
        channel: Channel,
    ) -> PwmChannel {
        let (forward, backward) = match motor {
            Motor::Left => self.motor_channels[0],
            Motor::Right => self.motor_channels[1],
        };
        match channel {
            Channel::Forward => forward,
            Channel::Backward => backward,
        }
    }
}

impl<'a, I2C, E> MotorPeripheral for Pca9685Motors<'a, I2C>
where
    I2C: I2c<Error = E> + 'static,
    E: core::fmt::Debug,
{
    type Error = DeviceError<E>;

    fn set_channel_duty(
        &mut self,
        motor: Motor,
        channel: Channel,
        percent: u8,
    ) -> Result<(), Self::Error> {
        let output = self.output(motor, channel);
        let off = (u32::from(percent.min(100)) * MAX_COUNT / 100) as u16;
        let pca = self.pwm.as_mut().ok_or(DeviceError::PwmNotInitialized)?;
        pca.set_channel_on_off(output, 0, off)
            .map_err(DeviceError::PwmError)
    }
}
