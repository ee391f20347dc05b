//! Utility re-exports and helper macros for the camera rover.
//!
//! This module re-exports the drive, camera and connection components and
//! provides a helper macro and the embedded web page:
//!
//! - `camera`: frame source, encoder and sensor-setting abstractions
//! - `connection`: HTTP control server, MJPEG stream server and handlers
//! - `controllers`: motor actuator, PWM backends and indicator outputs
//! - `math`: joystick to differential-drive mapping
//! - `frontend`: HTML control page served at `/`
//!
//! The `mk_static!` macro simplifies static initialization in no-std contexts.

pub mod camera;
pub mod config;
pub mod connection;
pub mod controllers;
pub(crate) mod frontend;
pub mod math;

pub use camera::Camera;
pub use config::RoverConfig;
pub use connection::server::{run as http, run_stream as mjpeg};
pub use controllers::{SystemController, Vehicle};
pub use embassy_time::*;
pub use math::drive::compute_drive;

#[doc(hidden)]
pub use static_cell as __static_cell;

#[macro_export]
/// Initialize a no-std static cell and write the given value into it.
///
/// This macro creates a `static_cell::StaticCell` for type `$t` and initializes
/// it with `$val`, returning a mutable reference to the stored value.
macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: $crate::utils::__static_cell::StaticCell<$t> =
            $crate::utils::__static_cell::StaticCell::new();
        STATIC_CELL.uninit().write($val)
    }};
}
