//! Host simulation of the camera rover.
//!
//! Runs the control and stream servers on a TAP interface with simulated
//! motors, lights, battery and camera. Everything the hardware would do is
//! logged through `tracing`; set `RUST_LOG=debug` to see channel writes.
#![recursion_limit = "256"]

use std::{
    cell::Cell,
    convert::Infallible,
    path::{Path, PathBuf},
};

use camrover_core::{
    mk_static,
    utils::{
        camera::{CameraSensor, Encoder, FrameBuffer, FrameSource, PixelFormat, SensorStatus, Setting},
        connection::Assets,
        controllers::{motors::PwmMotors, BatteryGauge, Headlights, MotorActuator, StatusPixel},
        http,
        mjpeg,
        Camera,
        Duration,
        RoverConfig,
        SystemController,
        Timer,
    },
};
use clap::Parser;
use embassy_executor::{Executor, Spawner};
use embassy_net::{Config, Ipv4Address, Ipv4Cidr, Runner, Stack, StackResources};
use embassy_net_tuntap::TunTapDevice;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_hal::{digital, pwm};
use rand_core::{OsRng, RngCore};
use smart_leds_trait::{SmartLedsWrite, RGB8};
use static_cell::StaticCell;
use tracing::{error, info, warn};

const HTTP_TASKS: usize = 2;
const STREAM_TASKS: usize = 2;

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts {
    /// TAP device name
    #[clap(long, default_value = "tap0")]
    tap: String,
    /// use a static IP instead of DHCP
    #[clap(long)]
    static_ip: bool,
    /// JSON file with rover settings
    #[clap(long)]
    config: Option<PathBuf>,
    /// directory holding `logo.png` and `joy.min.js`
    #[clap(long)]
    assets: Option<PathBuf>,
}

/// PWM output that logs duty changes.
struct SimPwm {
    name: &'static str,
    duty: u16,
}

impl SimPwm {
    fn new(name: &'static str) -> Self {
        Self { name, duty: 0 }
    }
}

impl pwm::ErrorType for SimPwm {
    type Error = Infallible;
}

impl pwm::SetDutyCycle for SimPwm {
    fn max_duty_cycle(&self) -> u16 {
        1000
    }

    fn set_duty_cycle(
        &mut self,
        duty: u16,
    ) -> Result<(), Infallible> {
        if duty != self.duty {
            tracing::debug!(channel = self.name, duty, "pwm");
            self.duty = duty;
        }
        Ok(())
    }
}

struct SimLight;

impl digital::ErrorType for SimLight {
    type Error = Infallible;
}

impl digital::OutputPin for SimLight {
    fn set_low(&mut self) -> Result<(), Infallible> {
        tracing::debug!("lights off");
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        tracing::debug!("lights on");
        Ok(())
    }
}

/// LED driver that logs to console
struct SerialLedDriver;

impl SmartLedsWrite for SerialLedDriver {
    type Color = RGB8;
    type Error = Infallible;

    fn write<T, I>(
        &mut self,
        iterator: T,
    ) -> Result<(), Infallible>
    where
        T: IntoIterator<Item = I>,
        I: Into<Self::Color>,
    {
        for c in iterator {
            let c: RGB8 = c.into();
            info!("LED: {:?}", c);
        }
        Ok(())
    }
}

/// Loses a few percent per reading and is swapped for a full pack when empty.
struct DrainingBattery {
    percent: u8,
}

impl BatteryGauge for DrainingBattery {
    fn percentage(&mut self) -> u8 {
        let reading = self.percent;
        self.percent = match self.percent.checked_sub(3) {
            Some(p) => p,
            None => 100,
        };
        reading
    }
}

struct SimFrame {
    data: Vec<u8>,
    format: PixelFormat,
}

impl FrameBuffer for SimFrame {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn width(&self) -> u16 {
        320
    }

    fn height(&self) -> u16 {
        240
    }
}

/// Produces about 15 frames per second, alternating JPEG and RGB565.
struct SyntheticFrames {
    sequence: Cell<u32>,
    in_flight: Cell<u32>,
}

impl FrameSource for SyntheticFrames {
    type Frame = SimFrame;
    type Error = Infallible;

    async fn acquire(&self) -> Result<SimFrame, Infallible> {
        Timer::after(Duration::from_millis(66)).await;
        let n = self.sequence.get();
        self.sequence.set(n.wrapping_add(1));
        self.in_flight.set(self.in_flight.get() + 1);

        let mut data = vec![0u8; 512];
        data.iter_mut().enumerate().for_each(|(i, b)| *b = (i as u32 ^ n) as u8);
        let format = if n % 2 == 0 {
            data[..2].copy_from_slice(&[0xFF, 0xD8]);
            PixelFormat::Jpeg
        } else {
            PixelFormat::Rgb565
        };
        Ok(SimFrame { data, format })
    }

    fn release(
        &self,
        _frame: SimFrame,
    ) {
        self.in_flight.set(self.in_flight.get() - 1);
        tracing::trace!(in_flight = self.in_flight.get(), "frame released");
    }
}

/// Wraps raw bytes in JPEG markers; enough to exercise the transcode path.
struct MarkerEncoder;

impl Encoder for MarkerEncoder {
    type Error = Infallible;

    fn transcode<F: FrameBuffer>(
        &self,
        frame: &F,
        quality: u8,
    ) -> Result<Vec<u8>, Infallible> {
        let mut out = Vec::with_capacity(frame.len() + 4);
        out.extend_from_slice(&[0xFF, 0xD8]);
        out.extend_from_slice(frame.data());
        out.extend_from_slice(&[0xFF, 0xD9]);
        tracing::trace!(quality, bytes = out.len(), "transcoded");
        Ok(out)
    }
}

struct SimSensor {
    status: SensorStatus,
}

impl CameraSensor for SimSensor {
    type Error = Infallible;

    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::Jpeg
    }

    fn status(&self) -> SensorStatus {
        self.status
    }

    fn set(
        &mut self,
        setting: Setting,
        value: i32,
    ) -> Result<(), Infallible> {
        info!(setting = setting.name(), value, "sensor register write");
        self.status.record(setting, value);
        Ok(())
    }
}

type Motors = PwmMotors<SimPwm, SimPwm, SimPwm, SimPwm>;
type Rover = SystemController<CriticalSectionRawMutex, Motors, SimLight, SerialLedDriver, DrainingBattery>;
type SimCamera = Camera<CriticalSectionRawMutex, SyntheticFrames, MarkerEncoder, SimSensor>;

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, TunTapDevice>) -> ! {
    runner.run().await
}

#[embassy_executor::task(pool_size = HTTP_TASKS)]
async fn http_task(
    id: usize,
    stack: Stack<'static>,
    rover: &'static Rover,
    camera: &'static SimCamera,
    assets: Assets,
    config: &'static RoverConfig,
) -> ! {
    http(id, stack, rover, camera, assets, config, None).await
}

#[embassy_executor::task(pool_size = STREAM_TASKS)]
async fn stream_task(
    id: usize,
    stack: Stack<'static>,
    camera: &'static SimCamera,
    config: &'static RoverConfig,
) -> ! {
    mjpeg(id, stack, camera, config, None).await
}

fn load_config(path: Option<&Path>) -> RoverConfig {
    let Some(path) = path else {
        return RoverConfig::default();
    };
    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_json::from_str(&text).map_err(|e| e.to_string()));
    match parsed {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unusable config, using defaults");
            RoverConfig::default()
        }
    }
}

fn load_asset(
    dir: Option<&Path>,
    name: &str,
) -> Option<&'static [u8]> {
    let path = dir?.join(name);
    match std::fs::read(&path) {
        Ok(bytes) => Some(&*Vec::leak(bytes)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "asset not loaded");
            None
        }
    }
}

#[embassy_executor::task]
async fn main_task(spawner: Spawner) {
    let opts: Opts = Opts::parse();
    let rover_config = &*mk_static!(RoverConfig, load_config(opts.config.as_deref()));
    let assets = Assets {
        logo: load_asset(opts.assets.as_deref(), "logo.png"),
        joystick: load_asset(opts.assets.as_deref(), "joy.min.js"),
    };

    let mut lights = Headlights::new(SimLight).unwrap();
    let motors = PwmMotors::new(
        SimPwm::new("left_fwd"),
        SimPwm::new("left_bwd"),
        SimPwm::new("right_fwd"),
        SimPwm::new("right_bwd"),
    );

    let camera = &*mk_static!(
        SimCamera,
        Camera::new(
            SyntheticFrames {
                sequence: Cell::new(0),
                in_flight: Cell::new(0),
            },
            MarkerEncoder,
            SimSensor {
                status: SensorStatus {
                    framesize: 5,
                    quality: 12,
                    ..SensorStatus::default()
                },
            },
        )
    );

    // Parse CLI and initialize network
    let device = TunTapDevice::new(&opts.tap).unwrap();
    let net_config = if opts.static_ip {
        Config::ipv4_static(embassy_net::StaticConfigV4 {
            address: Ipv4Cidr::new(Ipv4Address::new(192, 168, 69, 2), 24),
            dns_servers: heapless::Vec::new(),
            gateway: Some(Ipv4Address::new(192, 168, 69, 1)),
        })
    } else {
        Config::dhcpv4(Default::default())
    };
    let mut seed_buf = [0; 8];
    OsRng.fill_bytes(&mut seed_buf);
    let seed = u64::from_le_bytes(seed_buf);

    static RESOURCES: StaticCell<StackResources<8>> = StaticCell::new();
    let (stack, runner) = embassy_net::new(
        device,
        net_config,
        RESOURCES.init(StackResources::<8>::new()),
        seed,
    );
    spawner.spawn(net_task(runner)).unwrap();

    info!("Waiting for network link...");
    stack.wait_config_up().await;

    // The rover shows it is ready by blinking its lights.
    if let Err(e) = lights.blink(3, Duration::from_millis(50)).await {
        error!(?e, "boot blink failed");
    }
    let rover = &*mk_static!(
        Rover,
        SystemController::new(
            MotorActuator::new(motors),
            lights,
            StatusPixel::new(SerialLedDriver),
            DrainingBattery { percent: 100 },
        )
    );

    for id in 0..HTTP_TASKS {
        spawner
            .spawn(http_task(id, stack, rover, camera, assets, rover_config))
            .unwrap();
    }
    for id in 0..STREAM_TASKS {
        spawner
            .spawn(stream_task(HTTP_TASKS + id, stack, camera, rover_config))
            .unwrap();
    }
    info!(
        http = rover_config.http_port,
        stream = rover_config.stream_port(),
        "camera rover up"
    );
}

static EXECUTOR: StaticCell<Executor> = StaticCell::new();

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        spawner.spawn(main_task(spawner)).unwrap();
    });
}
