//! Typed request handlers.
//!
//! Handlers take already-extracted query values and return
//! `Result<_, ControlError>`; the router turns errors into status codes
//! through `ControlError::status_code`.

use alloc::{string::String, vec::Vec};
use core::fmt::Write as _;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Instant;
use picoserve::{
    response::StatusCode,
    url_encoded::{deserialize_form, UrlEncodedString},
};
use serde::{de::DeserializeOwned, Deserialize};

use crate::utils::{
    camera::{Camera, CameraSensor, Encoder, FrameSource, Payload, SettingError},
    controllers::{HardwareFault, Preset, Vehicle},
    math::drive::{compute_drive, AxisSample},
};

/// Client-visible failure of a control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    /// Missing or unparseable query parameters.
    Malformed,
    UnknownSetting,
    /// The setting exists but the value was refused.
    Rejected,
    Capture,
    Hardware,
    /// A response body could not be serialised.
    Encoding,
}

impl ControlError {
    pub fn status_code(self) -> StatusCode {
        match self {
            ControlError::Malformed => StatusCode::NOT_FOUND,
            ControlError::UnknownSetting
            | ControlError::Rejected
            | ControlError::Capture
            | ControlError::Hardware
            | ControlError::Encoding => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ControlError::Malformed => "Not Found",
            ControlError::UnknownSetting => "Unknown setting",
            ControlError::Rejected => "Setting rejected",
            ControlError::Capture => "Camera capture failed",
            ControlError::Hardware => "Hardware fault",
            ControlError::Encoding => "Response encoding failed",
        }
    }
}

impl From<SettingError> for ControlError {
    fn from(e: SettingError) -> Self {
        match e {
            SettingError::Unknown => ControlError::UnknownSetting,
            SettingError::OutOfRange { .. } | SettingError::Rejected(_) => ControlError::Rejected,
        }
    }
}

impl From<HardwareFault> for ControlError {
    fn from(_: HardwareFault) -> Self {
        ControlError::Hardware
    }
}

/// `/joycontrol?x=..&y=..`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct JoyQuery {
    pub x: String,
    pub y: String,
}

/// `/control?var=..&val=..`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ControlQuery {
    pub var: String,
    pub val: String,
}

/// Decode a query string; an absent or undecodable query is `Malformed`.
pub fn parse_query<T: DeserializeOwned>(query: Option<UrlEncodedString<'_>>) -> Result<T, ControlError> {
    let query = query.ok_or(ControlError::Malformed)?;
    deserialize_form(query).map_err(|_| ControlError::Malformed)
}

/// Parse one joystick axis. Fractional input is truncated toward zero.
fn parse_axis(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    if let Ok(v) = raw.parse::<i32>() {
        return Some(v);
    }
    let v = raw.parse::<f32>().ok().filter(|v| v.is_finite())?;
    Some(libm::truncf(v) as i32)
}

/// Map a joystick sample to motor duties and apply them.
pub fn joycontrol<V: Vehicle>(
    vehicle: &V,
    query: Result<JoyQuery, ControlError>,
) -> Result<(), ControlError> {
    let query = query?;
    let (Some(x), Some(y)) = (parse_axis(&query.x), parse_axis(&query.y)) else {
        tracing::debug!(x = %query.x, y = %query.y, "malformed joystick sample");
        return Err(ControlError::Malformed);
    };

    let drive = compute_drive(AxisSample::new(x, y));
    tracing::trace!(x, y, ?drive, "joystick");
    vehicle.drive(drive.command())?;
    Ok(())
}

/// Apply one named sensor setting.
pub fn control<M, S, E, Z>(
    camera: &Camera<M, S, E, Z>,
    query: Result<ControlQuery, ControlError>,
) -> Result<(), ControlError>
where
    M: RawMutex,
    S: FrameSource,
    E: Encoder,
    Z: CameraSensor,
{
    let query = query?;
    if query.var.is_empty() {
        return Err(ControlError::Malformed);
    }
    let value: i32 = query
        .val
        .trim()
        .parse()
        .map_err(|_| ControlError::Malformed)?;

    camera.apply_setting(&query.var, value).map_err(|e| {
        tracing::warn!(var = %query.var, value, %e, "setting not applied");
        ControlError::from(e)
    })?;
    tracing::info!(var = %query.var, value, "setting applied");
    Ok(())
}

/// Current sensor settings as a JSON object.
pub fn status<M, S, E, Z>(camera: &Camera<M, S, E, Z>) -> Result<Vec<u8>, ControlError>
where
    M: RawMutex,
    S: FrameSource,
    E: Encoder,
    Z: CameraSensor,
{
    serde_json::to_vec(&camera.status()).map_err(|e| {
        tracing::error!(%e, "status not serialised");
        ControlError::Encoding
    })
}

/// Battery charge as plain-text percent; refreshes the indicators.
pub fn battery<V: Vehicle>(vehicle: &V) -> heapless::String<4> {
    let mut text = heapless::String::new();
    let _ = write!(text, "{}", vehicle.battery_percentage());
    text
}

pub fn toggle_led<V: Vehicle>(vehicle: &V) -> Result<(), ControlError> {
    vehicle.toggle_lights()?;
    Ok(())
}

pub fn preset<V: Vehicle>(
    vehicle: &V,
    preset: Preset,
) -> Result<(), ControlError> {
    tracing::info!(?preset, "preset");
    vehicle.preset(preset)?;
    Ok(())
}

/// Grab a single JPEG.
pub async fn capture<'c, M, S, E, Z>(
    camera: &'c Camera<M, S, E, Z>,
    quality: u8,
) -> Result<Payload<'c, S>, ControlError>
where
    M: RawMutex,
    S: FrameSource,
    E: Encoder,
    Z: CameraSensor,
{
    let started = Instant::now();
    let payload = camera.grab_jpeg(quality).await.map_err(|e| {
        tracing::error!(?e, "camera capture failed");
        ControlError::Capture
    })?;
    tracing::info!(
        "JPG: {}B {}ms",
        payload.bytes().len(),
        started.elapsed().as_millis()
    );
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{
        camera::{FrameBuffer, PixelFormat, SensorStatus, Setting},
        math::drive::DriveCommand,
    };
    use alloc::vec;
    use core::cell::{Cell, RefCell};
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    struct Rover {
        commands: RefCell<Vec<DriveCommand>>,
        lights: Cell<bool>,
    }

    impl Rover {
        fn new() -> Self {
            Self {
                commands: RefCell::new(Vec::new()),
                lights: Cell::new(false),
            }
        }
    }

    impl Vehicle for Rover {
        fn drive(
            &self,
            command: DriveCommand,
        ) -> Result<(), HardwareFault> {
            self.commands.borrow_mut().push(command);
            Ok(())
        }

        fn applied(&self) -> DriveCommand {
            self.commands
                .borrow()
                .last()
                .copied()
                .unwrap_or(DriveCommand::STOP)
        }

        fn toggle_lights(&self) -> Result<bool, HardwareFault> {
            self.lights.set(!self.lights.get());
            Ok(self.lights.get())
        }

        fn battery_percentage(&self) -> u8 {
            42
        }
    }

    struct Frame;

    impl FrameBuffer for Frame {
        fn data(&self) -> &[u8] {
            &[0xFF, 0xD8, 0xFF, 0xD9]
        }

        fn format(&self) -> PixelFormat {
            PixelFormat::Jpeg
        }

        fn width(&self) -> u16 {
            2
        }

        fn height(&self) -> u16 {
            1
        }
    }

    struct Source {
        fail: bool,
        released: Cell<usize>,
    }

    impl FrameSource for Source {
        type Frame = Frame;
        type Error = ();

        async fn acquire(&self) -> Result<Frame, ()> {
            if self.fail {
                Err(())
            } else {
                Ok(Frame)
            }
        }

        fn release(
            &self,
            _frame: Frame,
        ) {
            self.released.set(self.released.get() + 1);
        }
    }

    struct Passthrough;

    impl Encoder for Passthrough {
        type Error = ();

        fn transcode<F: FrameBuffer>(
            &self,
            frame: &F,
            _quality: u8,
        ) -> Result<Vec<u8>, ()> {
            Ok(frame.data().to_vec())
        }
    }

    struct Sensor(SensorStatus);

    impl CameraSensor for Sensor {
        type Error = ();

        fn pixel_format(&self) -> PixelFormat {
            PixelFormat::Jpeg
        }

        fn status(&self) -> SensorStatus {
            self.0
        }

        fn set(
            &mut self,
            setting: Setting,
            value: i32,
        ) -> Result<(), ()> {
            self.0.record(setting, value);
            Ok(())
        }
    }

    type TestCamera = Camera<NoopRawMutex, Source, Passthrough, Sensor>;

    fn camera(fail: bool) -> TestCamera {
        Camera::new(
            Source {
                fail,
                released: Cell::new(0),
            },
            Passthrough,
            Sensor(SensorStatus::default()),
        )
    }

    fn joy(
        x: &str,
        y: &str,
    ) -> Result<JoyQuery, ControlError> {
        Ok(JoyQuery {
            x: String::from(x),
            y: String::from(y),
        })
    }

    fn set(
        var: &str,
        val: &str,
    ) -> Result<ControlQuery, ControlError> {
        Ok(ControlQuery {
            var: String::from(var),
            val: String::from(val),
        })
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ControlError::Malformed.status_code(), StatusCode::NOT_FOUND);
        for e in [
            ControlError::UnknownSetting,
            ControlError::Rejected,
            ControlError::Capture,
            ControlError::Hardware,
            ControlError::Encoding,
        ] {
            assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR, "{e:?}");
        }
    }

    #[test]
    fn test_control_query_missing_or_absent() {
        let cam = camera(false);

        let no_val = parse_query::<ControlQuery>(Some(UrlEncodedString("var=quality")));
        let err = control(&cam, no_val).unwrap_err();
        assert_eq!(err, ControlError::Malformed);
        assert_eq!(err.status_code().as_u16(), 404);

        let absent = parse_query::<ControlQuery>(None);
        assert!(matches!(absent, Err(ControlError::Malformed)));
        assert_eq!(control(&cam, absent).unwrap_err().status_code().as_u16(), 404);

        let full = parse_query::<ControlQuery>(Some(UrlEncodedString("var=quality&val=12"))).unwrap();
        assert_eq!((full.var.as_str(), full.val.as_str()), ("quality", "12"));
        control(&cam, Ok(full)).unwrap();
        assert_eq!(cam.status().quality, 12);

        let unknown = parse_query::<ControlQuery>(Some(UrlEncodedString("var=turbo&val=1")));
        assert_eq!(control(&cam, unknown).unwrap_err().status_code().as_u16(), 500);
    }

    #[test]
    fn test_joy_query_decodes_axes() {
        let rover = Rover::new();
        joycontrol(&rover, parse_query(Some(UrlEncodedString("x=0&y=100")))).unwrap();
        assert_eq!(rover.applied(), DriveCommand::new(100, 100));
        assert_eq!(
            joycontrol(&rover, parse_query(Some(UrlEncodedString("x=5")))),
            Err(ControlError::Malformed)
        );
        assert_eq!(rover.commands.borrow().len(), 1);
    }

    #[test]
    fn test_joycontrol_drives() {
        let rover = Rover::new();
        joycontrol(&rover, joy("0", "100")).unwrap();
        joycontrol(&rover, joy("100", "0")).unwrap();
        assert_eq!(
            *rover.commands.borrow(),
            vec![DriveCommand::new(100, 100), DriveCommand::new(50, -50)]
        );
    }

    #[test]
    fn test_joycontrol_truncates_fractions() {
        let rover = Rover::new();
        joycontrol(&rover, joy(" -0.9", "100.7")).unwrap();
        assert_eq!(rover.applied(), DriveCommand::new(100, 100));
    }

    #[test]
    fn test_joycontrol_malformed_leaves_motors() {
        let rover = Rover::new();
        assert_eq!(joycontrol(&rover, joy("", "10")), Err(ControlError::Malformed));
        assert_eq!(joycontrol(&rover, joy("left", "10")), Err(ControlError::Malformed));
        assert_eq!(joycontrol(&rover, joy("NaN", "10")), Err(ControlError::Malformed));
        assert_eq!(
            joycontrol(&rover, Err(ControlError::Malformed)),
            Err(ControlError::Malformed)
        );
        assert!(rover.commands.borrow().is_empty());
    }

    #[test]
    fn test_control_outcomes() {
        let cam = camera(false);
        control(&cam, set("quality", "10")).unwrap();
        assert_eq!(cam.status().quality, 10);

        assert_eq!(control(&cam, set("warp", "1")), Err(ControlError::UnknownSetting));
        assert_eq!(control(&cam, set("quality", "99")), Err(ControlError::Rejected));
        assert_eq!(control(&cam, set("quality", "ten")), Err(ControlError::Malformed));
        assert_eq!(control(&cam, set("", "1")), Err(ControlError::Malformed));
        assert_eq!(cam.status().quality, 10);
    }

    #[test]
    fn test_status_json() {
        let cam = camera(false);
        control(&cam, set("hmirror", "1")).unwrap();
        let json = status(&cam).unwrap();
        let text = core::str::from_utf8(&json).unwrap();
        assert!(text.contains("\"hmirror\":1"));
        assert!(text.starts_with('{') && text.ends_with('}'));
    }

    #[test]
    fn test_battery_and_lights() {
        let rover = Rover::new();
        assert_eq!(battery(&rover).as_str(), "42");
        toggle_led(&rover).unwrap();
        assert!(rover.lights.get());
    }

    #[test]
    fn test_capture() {
        let cam = camera(false);
        let payload = embassy_futures::block_on(capture(&cam, 80)).unwrap();
        assert_eq!(payload.bytes(), &[0xFF, 0xD8, 0xFF, 0xD9]);
        drop(payload);
        assert_eq!(cam.source().released.get(), 1);

        let failing = camera(true);
        let err = embassy_futures::block_on(capture(&failing, 80)).err();
        assert_eq!(err, Some(ControlError::Capture));
        assert_eq!(err.map(|e| e.status_code().as_u16()), Some(500));
    }
}
