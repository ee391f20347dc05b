//! Math utilities for the camera rover.
//!
//! This module maps joystick samples onto the two motors of a differential drive.

pub mod drive;
