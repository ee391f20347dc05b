//! Module Exports
//!
//! This file exports the hardware-facing controllers of the rover.
//!
//! - `motors`: motor actuator, presets and the four-PWM backend.
//! - `i2c`: PCA9685 motor backend on a shared I2C bus.
//! - `leds`: headlights and the battery status pixel.

pub mod i2c;
pub mod leds;
pub mod motors;

use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::RawMutex, Mutex};
use embedded_hal::digital::OutputPin;
use smart_leds_trait::{SmartLedsWrite, RGB8};

pub use leds::{BatteryLevel, Headlights, StatusPixel};
pub use motors::{DriveHandle, MotorActuator, MotorPeripheral, Preset};

use crate::utils::math::drive::DriveCommand;

/// Source of the battery charge, already mapped to percent.
pub trait BatteryGauge {
    fn percentage(&mut self) -> u8;
}

/// A hardware write failed while serving a control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareFault {
    Motor,
    Lights,
}

/// Operations the control endpoints need from the vehicle.
pub trait Vehicle {
    fn drive(
        &self,
        command: DriveCommand,
    ) -> Result<(), HardwareFault>;

    /// Last command fully applied to the motors.
    fn applied(&self) -> DriveCommand;

    /// Flip the headlights and return the new state.
    fn toggle_lights(&self) -> Result<bool, HardwareFault>;

    /// Read the battery and refresh the status indicators.
    fn battery_percentage(&self) -> u8;

    fn preset(
        &self,
        preset: Preset,
    ) -> Result<(), HardwareFault> {
        self.drive(preset.command())
    }
}

struct Indicators<L, X, B> {
    lights: Headlights<L>,
    pixel: StatusPixel<X>,
    battery: B,
}

/// Owns the motors and indicators of one rover.
///
/// Motors and indicators sit behind separate mutexes so a battery read never
/// delays a drive command.
pub struct SystemController<M: RawMutex, P, L, X, B> {
    drive: DriveHandle<M, P>,
    indicators: Mutex<M, RefCell<Indicators<L, X, B>>>,
}

impl<M, P, L, X, B> SystemController<M, P, L, X, B>
where
    M: RawMutex,
    P: MotorPeripheral,
    L: OutputPin,
    X: SmartLedsWrite<Color = RGB8>,
    X::Error: core::fmt::Debug,
    B: BatteryGauge,
{
    /// Stop the motors and show a green status before the first battery read.
    pub fn new(
        mut actuator: MotorActuator<P>,
        lights: Headlights<L>,
        mut pixel: StatusPixel<X>,
        battery: B,
    ) -> Self {
        if let Err(e) = actuator.stop() {
            tracing::error!(?e, "initial motor stop failed");
        }
        if let Err(e) = pixel.show_level(BatteryLevel::Good) {
            tracing::warn!(?e, "status pixel write failed");
        }

        let controller = SystemController {
            drive: DriveHandle::new(actuator),
            indicators: Mutex::new(RefCell::new(Indicators {
                lights,
                pixel,
                battery,
            })),
        };
        controller.battery_percentage();
        controller
    }

    pub fn drive_handle(&self) -> &DriveHandle<M, P> {
        &self.drive
    }

    pub fn lights_on(&self) -> bool {
        self.indicators.lock(|ind| ind.borrow().lights.is_on())
    }

    pub fn status_color(&self) -> Option<RGB8> {
        self.indicators.lock(|ind| ind.borrow().pixel.color())
    }
}

impl<M, P, L, X, B> Vehicle for SystemController<M, P, L, X, B>
where
    M: RawMutex,
    P: MotorPeripheral,
    L: OutputPin,
    X: SmartLedsWrite<Color = RGB8>,
    X::Error: core::fmt::Debug,
    B: BatteryGauge,
{
    fn drive(
        &self,
        command: DriveCommand,
    ) -> Result<(), HardwareFault> {
        self.drive.drive(command).map_err(|_| HardwareFault::Motor)
    }

    fn applied(&self) -> DriveCommand {
        self.drive.applied()
    }

    fn toggle_lights(&self) -> Result<bool, HardwareFault> {
        self.indicators.lock(|ind| {
            let on = ind.borrow_mut().lights.toggle().map_err(|e| {
                tracing::error!(?e, "headlight write failed");
                HardwareFault::Lights
            })?;
            tracing::info!(on, "headlights toggled");
            Ok(on)
        })
    }

    fn battery_percentage(&self) -> u8 {
        self.indicators.lock(|ind| {
            let ind = &mut *ind.borrow_mut();
            let percent = ind.battery.percentage().min(100);
            let level = BatteryLevel::from_percent(percent);
            tracing::info!(percent, ?level, "battery read");

            if level == BatteryLevel::Critical && ind.lights.is_on() {
                if let Err(e) = ind.lights.set(false) {
                    tracing::error!(?e, "headlight write failed");
                }
            }
            if let Err(e) = ind.pixel.show_level(level) {
                tracing::warn!(?e, "status pixel write failed");
            }
            percent
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use embedded_hal::digital::ErrorType;

    use super::motors::{Channel, Motor};

    struct NullMotors;

    impl MotorPeripheral for NullMotors {
        type Error = Infallible;

        fn set_channel_duty(
            &mut self,
            _motor: Motor,
            _channel: Channel,
            _percent: u8,
        ) -> Result<(), Infallible> {
            Ok(())
        }
    }

    struct Pin;

    impl ErrorType for Pin {
        type Error = Infallible;
    }

    impl OutputPin for Pin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            Ok(())
        }
    }

    struct Strip;

    impl SmartLedsWrite for Strip {
        type Color = RGB8;
        type Error = Infallible;

        fn write<T, I>(
            &mut self,
            _iterator: T,
        ) -> Result<(), Infallible>
        where
            T: IntoIterator<Item = I>,
            I: Into<Self::Color>,
        {
            Ok(())
        }
    }

    struct Battery(u8);

    impl BatteryGauge for Battery {
        fn percentage(&mut self) -> u8 {
            self.0
        }
    }

    fn controller(percent: u8) -> SystemController<NoopRawMutex, NullMotors, Pin, Strip, Battery> {
        SystemController::new(
            MotorActuator::new(NullMotors),
            Headlights::new(Pin).unwrap(),
            StatusPixel::new(Strip),
            Battery(percent),
        )
    }

    #[test]
    fn test_critical_battery_turns_lights_off() {
        let ctrl = controller(15);
        assert!(ctrl.toggle_lights().unwrap());
        assert_eq!(ctrl.battery_percentage(), 15);
        assert!(!ctrl.lights_on());
        assert_eq!(ctrl.status_color(), Some(BatteryLevel::Critical.color()));
    }

    #[test]
    fn test_battery_reading_is_capped() {
        let ctrl = controller(180);
        assert_eq!(ctrl.battery_percentage(), 100);
        assert_eq!(ctrl.status_color(), Some(BatteryLevel::Good.color()));
    }

    #[test]
    fn test_preset_goes_through_drive() {
        let ctrl = controller(80);
        ctrl.preset(Preset::ReverseRight).unwrap();
        assert_eq!(ctrl.applied(), DriveCommand::new(-100, -30));
    }
}
