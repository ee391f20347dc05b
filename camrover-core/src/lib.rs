//! Drive control and MJPEG streaming core for a camera-equipped RC rover on
//! no-std embedded platforms.
//!
//! For a runnable host simulation, see the `camrover-app/mock-mcu` crate.
#![no_std]

extern crate alloc;

pub mod utils;
