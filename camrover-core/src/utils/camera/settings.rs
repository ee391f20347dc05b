//! Named image-sensor settings for the `/control` and `/status` endpoints.
//!
//! Each setting name maps to one `Setting` variant with a legal value range.
//! Values are range-checked before the sensor is touched, and every outcome is
//! a `Result` rather than a driver return code.

use core::ops::RangeInclusive;

use serde::Serialize;

use super::PixelFormat;

/// Adjustable sensor setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    Framesize,
    Quality,
    Contrast,
    Brightness,
    Saturation,
    GainCeiling,
    Colorbar,
    Awb,
    Agc,
    Aec,
    Hmirror,
    Vflip,
    AwbGain,
    AgcGain,
    AecValue,
    Aec2,
    Dcw,
    Bpc,
    Wpc,
    RawGma,
    Lenc,
    SpecialEffect,
    WbMode,
    AeLevel,
}

impl Setting {
    pub const ALL: [Setting; 24] = [
        Setting::Framesize,
        Setting::Quality,
        Setting::Contrast,
        Setting::Brightness,
        Setting::Saturation,
        Setting::GainCeiling,
        Setting::Colorbar,
        Setting::Awb,
        Setting::Agc,
        Setting::Aec,
        Setting::Hmirror,
        Setting::Vflip,
        Setting::AwbGain,
        Setting::AgcGain,
        Setting::AecValue,
        Setting::Aec2,
        Setting::Dcw,
        Setting::Bpc,
        Setting::Wpc,
        Setting::RawGma,
        Setting::Lenc,
        Setting::SpecialEffect,
        Setting::WbMode,
        Setting::AeLevel,
    ];

    /// Query-string name of the setting.
    pub const fn name(self) -> &'static str {
        match self {
            Setting::Framesize => "framesize",
            Setting::Quality => "quality",
            Setting::Contrast => "contrast",
            Setting::Brightness => "brightness",
            Setting::Saturation => "saturation",
            Setting::GainCeiling => "gainceiling",
            Setting::Colorbar => "colorbar",
            Setting::Awb => "awb",
            Setting::Agc => "agc",
            Setting::Aec => "aec",
            Setting::Hmirror => "hmirror",
            Setting::Vflip => "vflip",
            Setting::AwbGain => "awb_gain",
            Setting::AgcGain => "agc_gain",
            Setting::AecValue => "aec_value",
            Setting::Aec2 => "aec2",
            Setting::Dcw => "dcw",
            Setting::Bpc => "bpc",
            Setting::Wpc => "wpc",
            Setting::RawGma => "raw_gma",
            Setting::Lenc => "lenc",
            Setting::SpecialEffect => "special_effect",
            Setting::WbMode => "wb_mode",
            Setting::AeLevel => "ae_level",
        }
    }

    pub fn from_name(name: &str) -> Option<Setting> {
        Setting::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Values the sensor accepts for this setting.
    pub const fn range(self) -> RangeInclusive<i32> {
        match self {
            Setting::Framesize => 0..=23,
            Setting::Quality => 0..=63,
            Setting::Contrast | Setting::Brightness | Setting::Saturation | Setting::AeLevel => {
                -2..=2
            }
            Setting::GainCeiling | Setting::SpecialEffect => 0..=6,
            Setting::WbMode => 0..=4,
            Setting::AgcGain => 0..=30,
            Setting::AecValue => 0..=1200,
            Setting::Colorbar
            | Setting::Awb
            | Setting::Agc
            | Setting::Aec
            | Setting::Hmirror
            | Setting::Vflip
            | Setting::AwbGain
            | Setting::Aec2
            | Setting::Dcw
            | Setting::Bpc
            | Setting::Wpc
            | Setting::RawGma
            | Setting::Lenc => 0..=1,
        }
    }
}

/// Why a setting was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingError {
    /// No setting with that name.
    Unknown,
    OutOfRange { setting: Setting, value: i32 },
    /// The sensor driver refused the value.
    Rejected(Setting),
}

impl core::fmt::Display for SettingError {
    fn fmt(
        &self,
        f: &mut core::fmt::Formatter<'_>,
    ) -> core::fmt::Result {
        match self {
            SettingError::Unknown => f.write_str("unknown setting"),
            SettingError::OutOfRange { setting, value } => {
                write!(f, "{} out of range: {}", setting.name(), value)
            }
            SettingError::Rejected(setting) => write!(f, "sensor rejected {}", setting.name()),
        }
    }
}

/// Snapshot of the sensor state, serialized for `/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SensorStatus {
    pub framesize: u8,
    pub quality: u8,
    pub brightness: i8,
    pub contrast: i8,
    pub saturation: i8,
    pub sharpness: i8,
    pub special_effect: u8,
    pub wb_mode: u8,
    pub awb: u8,
    pub awb_gain: u8,
    pub aec: u8,
    pub aec2: u8,
    pub ae_level: i8,
    pub aec_value: u16,
    pub agc: u8,
    pub agc_gain: u8,
    pub gainceiling: u8,
    pub bpc: u8,
    pub wpc: u8,
    pub raw_gma: u8,
    pub lenc: u8,
    pub vflip: u8,
    pub hmirror: u8,
    pub dcw: u8,
    pub colorbar: u8,
}

impl SensorStatus {
    /// Record `value` for `setting`. The value must already be in range.
    pub fn record(
        &mut self,
        setting: Setting,
        value: i32,
    ) {
        let v = value as u8;
        let s = value as i8;
        match setting {
            Setting::Framesize => self.framesize = v,
            Setting::Quality => self.quality = v,
            Setting::Contrast => self.contrast = s,
            Setting::Brightness => self.brightness = s,
            Setting::Saturation => self.saturation = s,
            Setting::GainCeiling => self.gainceiling = v,
            Setting::Colorbar => self.colorbar = v,
            Setting::Awb => self.awb = v,
            Setting::Agc => self.agc = v,
            Setting::Aec => self.aec = v,
            Setting::Hmirror => self.hmirror = v,
            Setting::Vflip => self.vflip = v,
            Setting::AwbGain => self.awb_gain = v,
            Setting::AgcGain => self.agc_gain = v,
            Setting::AecValue => self.aec_value = value as u16,
            Setting::Aec2 => self.aec2 = v,
            Setting::Dcw => self.dcw = v,
            Setting::Bpc => self.bpc = v,
            Setting::Wpc => self.wpc = v,
            Setting::RawGma => self.raw_gma = v,
            Setting::Lenc => self.lenc = v,
            Setting::SpecialEffect => self.special_effect = v,
            Setting::WbMode => self.wb_mode = v,
            Setting::AeLevel => self.ae_level = s,
        }
    }
}

/// Image sensor control port.
pub trait CameraSensor {
    type Error: core::fmt::Debug;

    fn pixel_format(&self) -> PixelFormat;

    fn status(&self) -> SensorStatus;

    fn set(
        &mut self,
        setting: Setting,
        value: i32,
    ) -> Result<(), Self::Error>;
}

/// Look up `name`, range-check `value` and apply it to `sensor`.
///
/// `framesize` only matters for JPEG output; on other formats it is accepted
/// and ignored.
pub fn apply_named<Z: CameraSensor>(
    sensor: &mut Z,
    name: &str,
    value: i32,
) -> Result<(), SettingError> {
    let setting = Setting::from_name(name).ok_or(SettingError::Unknown)?;
    if !setting.range().contains(&value) {
        return Err(SettingError::OutOfRange { setting, value });
    }

    if setting == Setting::Framesize && sensor.pixel_format() != PixelFormat::Jpeg {
        tracing::debug!(value, "framesize ignored outside JPEG mode");
        return Ok(());
    }

    sensor.set(setting, value).map_err(|e| {
        tracing::warn!(setting = setting.name(), value, ?e, "sensor rejected setting");
        SettingError::Rejected(setting)
    })
}
