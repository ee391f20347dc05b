//! Runtime configuration of the rover.
//!
//! Every field has a default, so a partial JSON document (or none at all)
//! yields a working configuration.

use alloc::string::String;

use serde::Deserialize;

use crate::utils::controllers::i2c::DEFAULT_PRESCALE;

/// Multipart boundary used between stream parts.
pub const STREAM_BOUNDARY: &str = "123456789000000000000987654321";
/// JPEG quality used when a raw frame has to be transcoded.
pub const DEFAULT_TRANSCODE_QUALITY: u8 = 80;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RoverConfig {
    /// Port of the control server; the stream server listens one above it.
    pub http_port: u16,
    pub stream: StreamConfig,
    /// PCA9685 prescale when the expander backend is used.
    pub pwm_prescale: u8,
}

impl RoverConfig {
    pub fn stream_port(&self) -> u16 {
        self.http_port.wrapping_add(1)
    }
}

impl Default for RoverConfig {
    fn default() -> Self {
        Self {
            http_port: 80,
            stream: StreamConfig::default(),
            pwm_prescale: DEFAULT_PRESCALE,
        }
    }
}

/// Settings of one MJPEG streaming session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub boundary: String,
    pub transcode_quality: u8,
    /// Consecutive acquisition failures tolerated before the session ends.
    /// Zero ends it on the first failure.
    pub acquire_retries: u8,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            boundary: String::from(STREAM_BOUNDARY),
            transcode_quality: DEFAULT_TRANSCODE_QUALITY,
            acquire_retries: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = RoverConfig::default();
        assert_eq!(cfg.http_port, 80);
        assert_eq!(cfg.stream_port(), 81);
        assert_eq!(cfg.stream.boundary, STREAM_BOUNDARY);
        assert_eq!(cfg.stream.transcode_quality, 80);
        assert_eq!(cfg.stream.acquire_retries, 0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg: RoverConfig =
            serde_json::from_str(r#"{"http_port":8080,"stream":{"acquire_retries":3}}"#).unwrap();
        assert_eq!(cfg.stream_port(), 8081);
        assert_eq!(cfg.stream.acquire_retries, 3);
        assert_eq!(cfg.stream.transcode_quality, 80);
        assert_eq!(cfg.pwm_prescale, DEFAULT_PRESCALE);
    }
}
