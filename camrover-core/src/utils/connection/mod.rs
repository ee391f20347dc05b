//! Module Exports
//!
//! - `server`: picoserve routers for the control and stream ports.
//! - `handlers`: typed control handlers and their error mapping.
//! - `stream`: the per-client MJPEG streaming session.

pub mod handlers;
pub mod server;
pub mod stream;

pub use handlers::ControlError;
pub use server::Assets;
pub use stream::{FrameSink, SessionState, StreamError, StreamSession};
