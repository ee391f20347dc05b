//! Joystick to differential-drive mapping.
//!
//! `compute_drive` turns one `AxisSample` into a signed duty cycle for each of
//! the two motors. Small deflections inside the deadzone yield an explicit
//! `Drive::Stop`; sharper turns damp the overall speed down to half.
//!
//! # Example
//! ```rust
//! use camrover_core::utils::math::drive::{compute_drive, AxisSample, DriveCommand};
//! let cmd = compute_drive(AxisSample::new(0, 100)).command();
//! assert_eq!(cmd, DriveCommand::new(100, 100));
//! ```

/// Deflection (per axis) below which a sample counts as "no input".
pub const DEADZONE: i32 = 10;
/// Largest duty cycle magnitude, in percent.
pub const MAX_DUTY: i32 = 100;

const MIN_TURN_FACTOR: f32 = 0.5;
const MAX_TURN_FACTOR: f32 = 1.0;

/// One joystick reading: `x` is lateral, `y` is forward/backward.
///
/// Both axes are conventionally in `[-100, 100]`, but any `i32` is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisSample {
    pub x: i32,
    pub y: i32,
}

impl AxisSample {
    pub const fn new(
        x: i32,
        y: i32,
    ) -> Self {
        Self { x, y }
    }

    /// True when both axes sit inside the deadzone.
    pub fn in_deadzone(&self) -> bool {
        self.x.unsigned_abs() < DEADZONE as u32 && self.y.unsigned_abs() < DEADZONE as u32
    }
}

/// Signed duty cycles for the left and right motor.
///
/// Positive drives the forward channel, negative the backward channel. Both
/// values are always within `[-MAX_DUTY, MAX_DUTY]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriveCommand {
    left: i32,
    right: i32,
}

impl DriveCommand {
    /// Both motors idle.
    pub const STOP: Self = Self { left: 0, right: 0 };

    /// Build a command, clamping each side into the legal duty range.
    pub const fn new(
        left: i32,
        right: i32,
    ) -> Self {
        Self {
            left: clamp_duty(left),
            right: clamp_duty(right),
        }
    }

    pub const fn left(&self) -> i32 {
        self.left
    }

    pub const fn right(&self) -> i32 {
        self.right
    }

    pub const fn is_stop(&self) -> bool {
        self.left == 0 && self.right == 0
    }
}

/// Result of mapping a sample: an explicit stop or a duty pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drive {
    Stop,
    Duty(DriveCommand),
}

impl Drive {
    /// The command to hand to the actuator; `Stop` is `{0, 0}`.
    pub fn command(self) -> DriveCommand {
        match self {
            Drive::Stop => DriveCommand::STOP,
            Drive::Duty(cmd) => cmd,
        }
    }
}

const fn clamp_duty(duty: i32) -> i32 {
    if duty > MAX_DUTY {
        MAX_DUTY
    } else if duty < -MAX_DUTY {
        -MAX_DUTY
    } else {
        duty
    }
}

/// Speed damping for a lateral deflection, always in `[0.5, 1.0]`.
pub fn turn_factor(x: i32) -> f32 {
    let factor = 1.0 - x.unsigned_abs() as f32 / MAX_DUTY as f32;
    factor.clamp(MIN_TURN_FACTOR, MAX_TURN_FACTOR)
}

/// Map a joystick sample onto the two motors.
///
/// The lateral term is mirrored while reversing so that "left" on the stick
/// still swings the camera view left.
pub fn compute_drive(sample: AxisSample) -> Drive {
    if sample.in_deadzone() {
        return Drive::Stop;
    }

    let factor = turn_factor(sample.x);
    let y = sample.y as f32;
    let adjusted_x = if sample.y >= 0 {
        sample.x as f32
    } else {
        -(sample.x as f32)
    };

    // float -> int casts saturate, clamp_duty then bounds the range
    let right = libm::truncf((y - adjusted_x) * factor) as i32;
    let left = libm::truncf((y + adjusted_x) * factor) as i32;

    Drive::Duty(DriveCommand::new(left, right))
}
