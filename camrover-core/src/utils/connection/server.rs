//! HTTP Server Module
//!
//! Two `picoserve` servers run side by side: the control server on
//! `http_port` (page, joystick, presets, lights, battery, camera settings and
//! single captures) and the stream server on `http_port + 1`, which serves the
//! endless MJPEG response. Each listener task serves one connection at a time;
//! spawn several task ids for concurrent clients.

use embassy_net::Stack;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Duration;
use embedded_io_async::{Read, Write};
use picoserve::{
    extract::FromRequest,
    request::{RequestBody, RequestParts},
    response::{
        chunked::{ChunkWriter, ChunkedResponse, Chunks, ChunksWritten},
        IntoResponse,
        Response,
        StatusCode,
    },
    routing::get,
    Router,
};
use serde::de::DeserializeOwned;

use super::{
    handlers::{self, ControlError, ControlQuery, JoyQuery},
    stream::{self, StreamError, StreamSession},
};
use crate::utils::{
    camera::{Camera, CameraSensor, Encoder, FrameSource},
    config::{RoverConfig, StreamConfig},
    controllers::{Preset, Vehicle},
    frontend::INDEX_HTML,
};

/// Static files read from the asset store at boot.
#[derive(Debug, Clone, Copy, Default)]
pub struct Assets {
    pub logo: Option<&'static [u8]>,
    pub joystick: Option<&'static [u8]>,
}

/// Query-string extractor that never rejects; malformed input reaches the
/// handler as `ControlError::Malformed`.
pub struct Query<T>(pub Result<T, ControlError>);

impl<'r, S, T: DeserializeOwned> FromRequest<'r, S> for Query<T> {
    type Rejection = &'static str;

    async fn from_request<R: Read>(
        _state: &'r S,
        parts: RequestParts<'r>,
        _body: RequestBody<'r, R>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Query(handlers::parse_query(parts.query())))
    }
}

/// Lets the page on the control port embed the stream and captures.
pub const ALLOW_ANY_ORIGIN: (&str, &str) = ("Access-Control-Allow-Origin", "*");

pub const CAPTURE_HEADERS: [(&str, &str); 2] = [
    ("Content-Disposition", "inline; filename=capture.jpg"),
    ALLOW_ANY_ORIGIN,
];

/// Body written as a single chunk.
pub struct Body<B> {
    content_type: &'static str,
    bytes: B,
}

impl<B: AsRef<[u8]>> Body<B> {
    pub fn new(
        content_type: &'static str,
        bytes: B,
    ) -> Self {
        Self {
            content_type,
            bytes,
        }
    }
}

impl<B: AsRef<[u8]>> Chunks for Body<B> {
    fn content_type(&self) -> &'static str {
        self.content_type
    }

    async fn write_chunks<W: Write>(
        self,
        mut chunk_writer: ChunkWriter<W>,
    ) -> Result<ChunksWritten, W::Error> {
        chunk_writer.write_chunk(self.bytes.as_ref()).await?;
        chunk_writer.finalize().await
    }
}

/// Endless multipart JPEG body backed by a `StreamSession`.
struct MjpegBody<M: RawMutex + 'static, S: 'static, E: 'static, Z: 'static> {
    camera: &'static Camera<M, S, E, Z>,
    config: &'static StreamConfig,
    content_type: &'static str,
}

impl<M, S, E, Z> Chunks for MjpegBody<M, S, E, Z>
where
    M: RawMutex + 'static,
    S: FrameSource + 'static,
    E: Encoder + 'static,
    Z: CameraSensor + 'static,
{
    fn content_type(&self) -> &'static str {
        self.content_type
    }

    async fn write_chunks<W: Write>(
        self,
        mut chunk_writer: ChunkWriter<W>,
    ) -> Result<ChunksWritten, W::Error> {
        let mut session = StreamSession::new(self.config);
        let reason = session
            .run(self.camera.source(), self.camera.encoder(), &mut chunk_writer)
            .await;
        match reason {
            StreamError::Transport(e) => Err(e),
            reason => {
                tracing::warn!(?reason, frames = session.frames_sent(), "stream ended");
                chunk_writer.finalize().await
            }
        }
    }
}

fn reply<T: IntoResponse>(result: Result<T, ControlError>) -> impl IntoResponse {
    result.map_err(|e| Response::new(e.status_code(), e.message()))
}

fn asset(
    bytes: Option<&'static [u8]>,
    content_type: &'static str,
) -> impl IntoResponse {
    bytes
        .map(|b| Response::new(StatusCode::OK, b).with_headers([("Content-Type", content_type)]))
        .ok_or_else(|| Response::new(StatusCode::NOT_FOUND, "Not Found"))
}

fn default_config() -> picoserve::Config<Duration> {
    picoserve::Config::new(picoserve::Timeouts {
        start_read_request: Some(Duration::from_secs(5)),
        persistent_start_read_request: None,
        read_request: Some(Duration::from_secs(1)),
        write: Some(Duration::from_secs(5)),
    })
}

fn log_start(
    stack: Stack<'static>,
    what: &str,
    port: u16,
) {
    if let Some(ip_cfg) = stack.config_v4() {
        tracing::info!("Starting {} server at {}:{}", what, ip_cfg.address, port);
    } else {
        tracing::warn!("Starting {what} server on port {port}, but no IPv4 address is assigned yet!");
    }
}

macro_rules! preset_routes {
    ($router:expr, $vehicle:ident, [$($preset:expr),* $(,)?]) => {
        $router$(.route(
            $preset.path(),
            get(move || async move {
                reply(handlers::preset($vehicle, $preset).map(|()| "OK"))
            }),
        ))*
    };
}

/// Serve the control endpoints on `rover.http_port`.
pub async fn run<V, M, S, E, Z>(
    id: usize,
    stack: Stack<'static>,
    vehicle: &'static V,
    camera: &'static Camera<M, S, E, Z>,
    assets: Assets,
    rover: &'static RoverConfig,
    config: Option<&'static picoserve::Config<Duration>>,
) -> !
where
    V: Vehicle + 'static,
    M: RawMutex + 'static,
    S: FrameSource + 'static,
    E: Encoder + 'static,
    Z: CameraSensor + 'static,
{
    let default_config = default_config();
    let config = config.unwrap_or(&default_config);
    let quality = rover.stream.transcode_quality;

    let router = Router::new()
        .route(
            "/",
            get(|| async {
                Response::new(StatusCode::OK, INDEX_HTML)
                    .with_headers([("Content-Type", "text/html; charset=utf-8")])
            }),
        )
        .route(
            "/joycontrol",
            get(move |Query(query): Query<JoyQuery>| async move {
                reply(handlers::joycontrol(vehicle, query).map(|()| "OK"))
            }),
        )
        .route(
            "/control",
            get(move |Query(query): Query<ControlQuery>| async move {
                reply(handlers::control(camera, query).map(|()| ""))
            }),
        )
        .route(
            "/status",
            get(move || async move {
                reply(handlers::status(camera).map(|json| {
                    ChunkedResponse::new(Body::new("application/json", json))
                        .into_response()
                        .with_headers([ALLOW_ANY_ORIGIN])
                }))
            }),
        )
        .route(
            "/capture",
            get(move || async move {
                reply(
                    handlers::capture(camera, quality)
                        .await
                        .map(|payload| {
                            ChunkedResponse::new(Body::new("image/jpeg", payload))
                                .into_response()
                                .with_headers(CAPTURE_HEADERS)
                        }),
                )
            }),
        )
        .route(
            "/toggle_led",
            get(move || async move { reply(handlers::toggle_led(vehicle).map(|()| "OK")) }),
        )
        .route(
            "/battery",
            get(move || async move {
                let text = handlers::battery(vehicle);
                ChunkedResponse::new(Body::new("text/plain", text.into_bytes()))
            }),
        )
        .route(
            "/logo.png",
            get(move || async move { asset(assets.logo, "image/png") }),
        )
        .route(
            "/joy.min.js",
            get(move || async move { asset(assets.joystick, "application/javascript") }),
        );

    let router = preset_routes!(
        router,
        vehicle,
        [
            Preset::Forward,
            Preset::Reverse,
            Preset::PivotLeft,
            Preset::PivotRight,
            Preset::Stop,
            Preset::ForwardLeft,
            Preset::ForwardRight,
            Preset::ReverseLeft,
            Preset::ReverseRight,
        ]
    );

    log_start(stack, "control", rover.http_port);

    let (mut rx_buffer, mut tx_buffer, mut http_buffer) = ([0; 1024], [0; 1024], [0; 4096]);

    picoserve::listen_and_serve_with_state(
        id,
        &router,
        config,
        stack,
        rover.http_port,
        &mut rx_buffer,
        &mut tx_buffer,
        &mut http_buffer,
        &(),
    )
    .await
}

/// Serve `/stream` on `rover.stream_port()`.
pub async fn run_stream<M, S, E, Z>(
    id: usize,
    stack: Stack<'static>,
    camera: &'static Camera<M, S, E, Z>,
    rover: &'static RoverConfig,
    config: Option<&'static picoserve::Config<Duration>>,
) -> !
where
    M: RawMutex + 'static,
    S: FrameSource + 'static,
    E: Encoder + 'static,
    Z: CameraSensor + 'static,
{
    let default_config = default_config();
    let config = config.unwrap_or(&default_config);
    // Lives as long as this task, which never returns.
    let content_type: &'static str = stream::content_type(&rover.stream.boundary).leak();

    let router = Router::new().route(
        "/stream",
        get(move || async move {
            ChunkedResponse::new(MjpegBody {
                camera,
                config: &rover.stream,
                content_type,
            })
            .into_response()
            .with_headers([ALLOW_ANY_ORIGIN])
        }),
    );

    let port = rover.stream_port();
    log_start(stack, "stream", port);

    let (mut rx_buffer, mut tx_buffer, mut http_buffer) = ([0; 1024], [0; 4096], [0; 2048]);

    picoserve::listen_and_serve_with_state(
        id,
        &router,
        config,
        stack,
        port,
        &mut rx_buffer,
        &mut tx_buffer,
        &mut http_buffer,
        &(),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cross_origin_headers() {
        assert_eq!(ALLOW_ANY_ORIGIN, ("Access-Control-Allow-Origin", "*"));
        assert!(CAPTURE_HEADERS.contains(&ALLOW_ANY_ORIGIN));
        assert!(CAPTURE_HEADERS.contains(&("Content-Disposition", "inline; filename=capture.jpg")));
    }
}
