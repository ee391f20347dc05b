//! Indicator outputs for the camera rover.
//!
//! - `Headlights`: a plain on/off output toggled from the web page.
//! - `StatusPixel`: an addressable LED that shows the battery level as a color.

use embassy_time::{Duration, Timer};
use embedded_hal::digital::{OutputPin, PinState};
use smart_leds_trait::{SmartLedsWrite, RGB8};

/// Number of LEDs in the attached chain.
const LED_COUNT: usize = 1;
/// Default dimming applied to every color (out of 255).
pub const DEFAULT_BRIGHTNESS: u8 = 30;

/// Coarse battery state used for the status color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryLevel {
    /// 20 % or less; headlights are switched off to save power.
    Critical,
    /// 21 % to 50 %.
    Low,
    Good,
}

impl BatteryLevel {
    pub fn from_percent(percent: u8) -> Self {
        match percent {
            0..=20 => BatteryLevel::Critical,
            21..=50 => BatteryLevel::Low,
            _ => BatteryLevel::Good,
        }
    }

    pub fn color(self) -> RGB8 {
        match self {
            BatteryLevel::Critical => RGB8 { r: 255, g: 0, b: 0 },
            BatteryLevel::Low => RGB8 { r: 255, g: 255, b: 0 },
            BatteryLevel::Good => RGB8 { r: 0, g: 255, b: 0 },
        }
    }
}

/// Single addressable status LED.
pub struct StatusPixel<Driver> {
    driver: Driver,
    brightness: u8,
    color: Option<RGB8>,
}

impl<Driver, E> StatusPixel<Driver>
where
    Driver: SmartLedsWrite<Color = RGB8, Error = E>,
{
    pub fn new(driver: Driver) -> Self {
        Self {
            driver,
            brightness: DEFAULT_BRIGHTNESS,
            color: None,
        }
    }

    pub fn with_brightness(
        mut self,
        brightness: u8,
    ) -> Self {
        self.brightness = brightness;
        self
    }

    /// Show `level`'s color. Skips the write when the color is unchanged.
    pub fn show_level(
        &mut self,
        level: BatteryLevel,
    ) -> Result<(), E> {
        let color = level.color();
        if self.color == Some(color) {
            return Ok(());
        }
        self.show(color)
    }

    pub fn show(
        &mut self,
        color: RGB8,
    ) -> Result<(), E> {
        let dimmed = dim(color, self.brightness);
        self.driver
            .write(core::iter::repeat(dimmed).take(LED_COUNT))?;
        self.color = Some(color);
        Ok(())
    }

    /// Undimmed color currently shown, if any.
    pub fn color(&self) -> Option<RGB8> {
        self.color
    }
}

fn dim(
    color: RGB8,
    brightness: u8,
) -> RGB8 {
    let scale = |c: u8| ((u16::from(c) * u16::from(brightness)) / 255) as u8;
    RGB8 {
        r: scale(color.r),
        g: scale(color.g),
        b: scale(color.b),
    }
}

/// Headlight output.
pub struct Headlights<P> {
    pin: P,
    is_on: bool,
}

impl<P: OutputPin> Headlights<P> {
    /// Take the pin and drive it low.
    pub fn new(mut pin: P) -> Result<Self, P::Error> {
        pin.set_low()?;
        Ok(Self { pin, is_on: false })
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn set(
        &mut self,
        on: bool,
    ) -> Result<(), P::Error> {
        self.pin.set_state(PinState::from(on))?;
        self.is_on = on;
        Ok(())
    }

    /// Flip the output and return the new state.
    pub fn toggle(&mut self) -> Result<bool, P::Error> {
        self.set(!self.is_on)?;
        Ok(self.is_on)
    }

    /// Blink `times` times, then restore the previous state.
    pub async fn blink(
        &mut self,
        times: u8,
        period: Duration,
    ) -> Result<(), P::Error> {
        let restore = self.is_on;
        for _ in 0..times {
            self.pin.set_high()?;
            Timer::after(period).await;
            self.pin.set_low()?;
            Timer::after(period).await;
        }
        self.set(restore)
    }
}
