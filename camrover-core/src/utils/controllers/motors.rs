//! Motor actuation for the two-motor differential drive.
//!
//! Each motor has a forward and a backward channel driven through a
//! `MotorPeripheral`. `MotorActuator` turns signed duty cycles into channel
//! writes and guarantees that both channels of one motor are never driven at
//! the same time. `DriveHandle` puts the actuator behind a critical-section
//! mutex so concurrent request handlers cannot interleave their writes.
//!
//! ## Channel truth table
//!
//! | duty  | forward | backward |
//! |-------|---------|----------|
//! | d > 0 | d       | 0        |
//! | d ≤ 0 | 0       | -d       |

use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::RawMutex, Mutex};
use embedded_hal::pwm::{Error as _, ErrorKind, SetDutyCycle};

use crate::utils::math::drive::DriveCommand;

/// One of the two drive motors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motor {
    Left,
    Right,
}

/// Directional input of a motor's H-bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Forward,
    Backward,
}

/// Hardware that accepts a duty percentage (0..=100) per motor channel.
pub trait MotorPeripheral {
    type Error: core::fmt::Debug;

    fn set_channel_duty(
        &mut self,
        motor: Motor,
        channel: Channel,
        percent: u8,
    ) -> Result<(), Self::Error>;
}

/// A channel write failed; the motor is left with at most one channel driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorError<E> {
    pub motor: Motor,
    pub channel: Channel,
    pub source: E,
}

/// Named duty tables applied through the regular channel-update path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Stop,
    Forward,
    Reverse,
    PivotLeft,
    PivotRight,
    ForwardLeft,
    ForwardRight,
    ReverseLeft,
    ReverseRight,
}

impl Preset {
    pub const ALL: [Preset; 9] = [
        Preset::Stop,
        Preset::Forward,
        Preset::Reverse,
        Preset::PivotLeft,
        Preset::PivotRight,
        Preset::ForwardLeft,
        Preset::ForwardRight,
        Preset::ReverseLeft,
        Preset::ReverseRight,
    ];

    pub const fn command(self) -> DriveCommand {
        match self {
            Preset::Stop => DriveCommand::STOP,
            Preset::Forward => DriveCommand::new(100, 100),
            Preset::Reverse => DriveCommand::new(-100, -100),
            Preset::PivotLeft => DriveCommand::new(-50, 50),
            Preset::PivotRight => DriveCommand::new(50, -50),
            Preset::ForwardLeft => DriveCommand::new(30, 100),
            Preset::ForwardRight => DriveCommand::new(100, 30),
            Preset::ReverseLeft => DriveCommand::new(-30, -100),
            Preset::ReverseRight => DriveCommand::new(-100, -30),
        }
    }

    /// Route path the preset is served under.
    pub const fn path(self) -> &'static str {
        match self {
            Preset::Stop => "/stop",
            Preset::Forward => "/go",
            Preset::Reverse => "/back",
            Preset::PivotLeft => "/left",
            Preset::PivotRight => "/right",
            Preset::ForwardLeft => "/upleft",
            Preset::ForwardRight => "/upright",
            Preset::ReverseLeft => "/downleft",
            Preset::ReverseRight => "/downright",
        }
    }
}

/// Applies drive commands to a `MotorPeripheral`.
pub struct MotorActuator<P> {
    peripheral: P,
    applied: DriveCommand,
}

impl<P: MotorPeripheral> MotorActuator<P> {
    /// Wrap a peripheral. Nothing is written until `stop` or `apply`.
    pub fn new(peripheral: P) -> Self {
        Self {
            peripheral,
            applied: DriveCommand::STOP,
        }
    }

    /// Apply both motor duties. On error the remaining writes are skipped.
    pub fn apply(
        &mut self,
        command: DriveCommand,
    ) -> Result<(), ActuatorError<P::Error>> {
        self.set_motor(Motor::Left, command.left())?;
        self.set_motor(Motor::Right, command.right())?;
        self.applied = command;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), ActuatorError<P::Error>> {
        self.apply(DriveCommand::STOP)
    }

    pub fn apply_preset(
        &mut self,
        preset: Preset,
    ) -> Result<(), ActuatorError<P::Error>> {
        self.apply(preset.command())
    }

    /// Last command whose channel writes all succeeded.
    pub fn applied(&self) -> DriveCommand {
        self.applied
    }

    pub fn peripheral(&self) -> &P {
        &self.peripheral
    }

    fn set_motor(
        &mut self,
        motor: Motor,
        duty: i32,
    ) -> Result<(), ActuatorError<P::Error>> {
        let (active, idle) = if duty > 0 {
            (Channel::Forward, Channel::Backward)
        } else {
            (Channel::Backward, Channel::Forward)
        };
        let percent = duty.unsigned_abs().min(100) as u8;

        // idle side first: a failure after this write leaves the motor coasting
        self.write(motor, idle, 0)?;
        self.write(motor, active, percent)
    }

    fn write(
        &mut self,
        motor: Motor,
        channel: Channel,
        percent: u8,
    ) -> Result<(), ActuatorError<P::Error>> {
        self.peripheral
            .set_channel_duty(motor, channel, percent)
            .map_err(|source| {
                tracing::error!(?motor, ?channel, percent, ?source, "motor channel write failed");
                ActuatorError {
                    motor,
                    channel,
                    source,
                }
            })
    }
}

/// Shared handle to a `MotorActuator`.
///
/// Every command runs inside one critical section, so a concurrent command can
/// never observe or produce a half-updated motor.
pub struct DriveHandle<M: RawMutex, P> {
    inner: Mutex<M, RefCell<MotorActuator<P>>>,
}

impl<M: RawMutex, P: MotorPeripheral> DriveHandle<M, P> {
    pub fn new(actuator: MotorActuator<P>) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(actuator)),
        }
    }

    pub fn drive(
        &self,
        command: DriveCommand,
    ) -> Result<(), ActuatorError<P::Error>> {
        self.inner.lock(|actuator| actuator.borrow_mut().apply(command))
    }

    pub fn preset(
        &self,
        preset: Preset,
    ) -> Result<(), ActuatorError<P::Error>> {
        self.drive(preset.command())
    }

    pub fn applied(&self) -> DriveCommand {
        self.inner.lock(|actuator| actuator.borrow().applied())
    }

    /// Run `f` against the actuator while holding the lock.
    pub fn with<R>(
        &self,
        f: impl FnOnce(&MotorActuator<P>) -> R,
    ) -> R {
        self.inner.lock(|actuator| f(&actuator.borrow()))
    }
}

/// Four independent PWM outputs, one per motor channel.
///
/// This is the wiring of boards that route each H-bridge input to its own
/// timer output (MCPWM operators on the ESP32-S3).
pub struct PwmMotors<LF, LB, RF, RB> {
    left_fwd: LF,
    left_bwd: LB,
    right_fwd: RF,
    right_bwd: RB,
}

impl<LF, LB, RF, RB> PwmMotors<LF, LB, RF, RB>
where
    LF: SetDutyCycle,
    LB: SetDutyCycle,
    RF: SetDutyCycle,
    RB: SetDutyCycle,
{
    pub fn new(
        left_fwd: LF,
        left_bwd: LB,
        right_fwd: RF,
        right_bwd: RB,
    ) -> Self {
        Self {
            left_fwd,
            left_bwd,
            right_fwd,
            right_bwd,
        }
    }

    pub fn release(self) -> (LF, LB, RF, RB) {
        (self.left_fwd, self.left_bwd, self.right_fwd, self.right_bwd)
    }
}

impl<LF, LB, RF, RB> MotorPeripheral for PwmMotors<LF, LB, RF, RB>
where
    LF: SetDutyCycle,
    LB: SetDutyCycle,
    RF: SetDutyCycle,
    RB: SetDutyCycle,
{
    type Error = ErrorKind;

    fn set_channel_duty(
        &mut self,
        motor: Motor,
        channel: Channel,
        percent: u8,
    ) -> Result<(), ErrorKind> {
        let percent = percent.min(100);
        match (motor, channel) {
            (Motor::Left, Channel::Forward) => self
                .left_fwd
                .set_duty_cycle_percent(percent)
                .map_err(|e| e.kind()),
            (Motor::Left, Channel::Backward) => self
                .left_bwd
                .set_duty_cycle_percent(percent)
                .map_err(|e| e.kind()),
            (Motor::Right, Channel::Forward) => self
                .right_fwd
                .set_duty_cycle_percent(percent)
                .map_err(|e| e.kind()),
            (Motor::Right, Channel::Backward) => self
                .right_bwd
                .set_duty_cycle_percent(percent)
                .map_err(|e| e.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use embedded_hal::pwm::ErrorType;

    /// Records channel duties and flags any moment both sides of a motor are on.
    #[derive(Default)]
    struct RecordingPeripheral {
        duties: [[u8; 2]; 2],
        writes: usize,
        fail_on_write: Option<usize>,
        overlap_seen: bool,
    }

    fn index(
        motor: Motor,
        channel: Channel,
    ) -> (usize, usize) {
        let m = match motor {
            Motor::Left => 0,
            Motor::Right => 1,
        };
        let c = match channel {
            Channel::Forward => 0,
            Channel::Backward => 1,
        };
        (m, c)
    }

    impl RecordingPeripheral {
        fn duty(
            &self,
            motor: Motor,
            channel: Channel,
        ) -> u8 {
            let (m, c) = index(motor, channel);
            self.duties[m][c]
        }
    }

    impl MotorPeripheral for RecordingPeripheral {
        type Error = ();

        fn set_channel_duty(
            &mut self,
            motor: Motor,
            channel: Channel,
            percent: u8,
        ) -> Result<(), ()> {
            self.writes += 1;
            if self.fail_on_write == Some(self.writes) {
                return Err(());
            }
            let (m, c) = index(motor, channel);
            self.duties[m][c] = percent;
            if self.duties[m][0] != 0 && self.duties[m][1] != 0 {
                self.overlap_seen = true;
            }
            Ok(())
        }
    }

    #[test]
    fn test_forward_and_backward_channels() {
        let mut act = MotorActuator::new(RecordingPeripheral::default());
        act.apply(DriveCommand::new(75, -40)).unwrap();

        let p = act.peripheral();
        assert_eq!(p.duty(Motor::Left, Channel::Forward), 75);
        assert_eq!(p.duty(Motor::Left, Channel::Backward), 0);
        assert_eq!(p.duty(Motor::Right, Channel::Forward), 0);
        assert_eq!(p.duty(Motor::Right, Channel::Backward), 40);
        assert_eq!(act.applied(), DriveCommand::new(75, -40));
    }

    #[test]
    fn test_stop_zeroes_every_channel() {
        let mut act = MotorActuator::new(RecordingPeripheral::default());
        act.apply(DriveCommand::new(100, 100)).unwrap();
        act.stop().unwrap();
        assert_eq!(act.peripheral().duties, [[0, 0], [0, 0]]);
        assert!(act.applied().is_stop());
    }

    #[test]
    fn test_direction_reversal_never_overlaps() {
        let mut act = MotorActuator::new(RecordingPeripheral::default());
        for preset in Preset::ALL {
            act.apply_preset(preset).unwrap();
            act.apply(DriveCommand::new(-preset.command().left(), -preset.command().right()))
                .unwrap();
        }
        for left in (-100..=100).step_by(7) {
            act.apply(DriveCommand::new(left, -left)).unwrap();
        }
        assert!(!act.peripheral().overlap_seen);
    }

    #[test]
    fn test_failed_write_keeps_previous_command_and_no_overlap() {
        let mut act = MotorActuator::new(RecordingPeripheral::default());
        act.apply(DriveCommand::new(60, 60)).unwrap();

        // four writes per command: fail the second write of the next one
        act.peripheral.fail_on_write = Some(act.peripheral.writes + 2);

        let err = act.apply(DriveCommand::new(-60, 60)).unwrap_err();
        assert_eq!(err.motor, Motor::Left);
        assert_eq!(err.channel, Channel::Backward);
        assert_eq!(act.applied(), DriveCommand::new(60, 60));
        assert_eq!(act.peripheral().duty(Motor::Left, Channel::Forward), 0);
        assert_eq!(act.peripheral().duty(Motor::Left, Channel::Backward), 0);
        assert!(!act.peripheral().overlap_seen);
    }

    #[test]
    fn test_presets_match_tables() {
        assert_eq!(Preset::Forward.command(), DriveCommand::new(100, 100));
        assert_eq!(Preset::PivotRight.command(), DriveCommand::new(50, -50));
        assert_eq!(Preset::ForwardRight.command(), DriveCommand::new(100, 30));
        assert_eq!(Preset::ReverseLeft.command(), DriveCommand::new(-30, -100));
        assert_eq!(Preset::ReverseRight.path(), "/downright");
    }

    #[test]
    fn test_drive_handle_tracks_applied() {
        let handle: DriveHandle<NoopRawMutex, _> =
            DriveHandle::new(MotorActuator::new(RecordingPeripheral::default()));
        handle.preset(Preset::PivotLeft).unwrap();
        assert_eq!(handle.applied(), DriveCommand::new(-50, 50));
        assert_eq!(
            handle.with(|a| a.peripheral().duty(Motor::Left, Channel::Backward)),
            50
        );
    }

    /// PWM output with a 0..=1000 range, enough to check percent scaling.
    struct FakePwm {
        duty: u16,
    }

    impl ErrorType for FakePwm {
        type Error = ErrorKind;
    }

    impl SetDutyCycle for FakePwm {
        fn max_duty_cycle(&self) -> u16 {
            1000
        }

        fn set_duty_cycle(
            &mut self,
            duty: u16,
        ) -> Result<(), ErrorKind> {
            self.duty = duty;
            Ok(())
        }
    }

    #[test]
    fn test_pwm_motors_scale_percent() {
        let pwm = PwmMotors::new(
            FakePwm { duty: 0 },
            FakePwm { duty: 0 },
            FakePwm { duty: 0 },
            FakePwm { duty: 0 },
        );
        let mut act = MotorActuator::new(pwm);
        act.apply(DriveCommand::new(-25, 80)).unwrap();

        let (lf, lb, rf, rb) = act.peripheral.release();
        assert_eq!(lf.duty, 0);
        assert_eq!(lb.duty, 250);
        assert_eq!(rf.duty, 800);
        assert_eq!(rb.duty, 0);
    }
}
