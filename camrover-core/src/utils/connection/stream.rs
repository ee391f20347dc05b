//! MJPEG streaming session.
//!
//! One session serves one client: it pulls frames from a `FrameSource`, makes
//! sure they are JPEG, and writes each as a multipart part to a `FrameSink`
//! until something fails. Every acquired frame is released before the next one
//! is requested, so a session never holds more than one buffer.

use alloc::{format, string::String};
use core::fmt::Write as _;

use embassy_time::Instant;
use picoserve::response::chunked::ChunkWriter;

use crate::utils::{
    camera::{grab_jpeg, CaptureError, Encoder, FrameSource},
    config::StreamConfig,
};

/// Byte sink for a chunked response body.
#[allow(async_fn_in_trait)]
pub trait FrameSink {
    type Error: core::fmt::Debug;

    /// Start the response with `content_type`. Sinks whose headers are
    /// already on the wire accept this as a no-op.
    async fn open(
        &mut self,
        content_type: &str,
    ) -> Result<(), Self::Error> {
        let _ = content_type;
        Ok(())
    }

    async fn write_chunk(
        &mut self,
        chunk: &[u8],
    ) -> Result<(), Self::Error>;
}

impl<W: embedded_io_async::Write> FrameSink for ChunkWriter<W> {
    type Error = W::Error;

    async fn write_chunk(
        &mut self,
        chunk: &[u8],
    ) -> Result<(), W::Error> {
        ChunkWriter::write_chunk(self, chunk).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Streaming,
    Terminated,
}

/// Why a session ended.
#[derive(Debug)]
pub enum StreamError<A, C, T> {
    Acquire(A),
    Transcode(C),
    Transport(T),
}

/// Content type announced for a stream with the given boundary.
pub fn content_type(boundary: &str) -> String {
    format!("multipart/x-mixed-replace;boundary={}", boundary)
}

pub struct StreamSession<'c> {
    config: &'c StreamConfig,
    delimiter: String,
    state: SessionState,
    frames_sent: u32,
    last_frame: Option<Instant>,
    acquire_failures: u8,
}

impl<'c> StreamSession<'c> {
    pub fn new(config: &'c StreamConfig) -> Self {
        Self {
            config,
            delimiter: format!("\r\n--{}\r\n", config.boundary),
            state: SessionState::Init,
            frames_sent: 0,
            last_frame: None,
            acquire_failures: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn frames_sent(&self) -> u32 {
        self.frames_sent
    }

    /// Open the sink with the multipart content type.
    pub async fn open<K: FrameSink>(
        &mut self,
        sink: &mut K,
    ) -> Result<(), K::Error> {
        debug_assert_eq!(self.state, SessionState::Init);
        match sink.open(&content_type(&self.config.boundary)).await {
            Ok(()) => {
                self.state = SessionState::Streaming;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(?e, "stream sink refused to open");
                self.state = SessionState::Terminated;
                Err(e)
            }
        }
    }

    /// Send one frame. An `Ok` after a failed acquisition means a retry is
    /// still allowed.
    pub async fn step<S, E, K>(
        &mut self,
        source: &S,
        encoder: &E,
        sink: &mut K,
    ) -> Result<(), StreamError<S::Error, E::Error, K::Error>>
    where
        S: FrameSource,
        E: Encoder,
        K: FrameSink,
    {
        let payload = match grab_jpeg(source, encoder, self.config.transcode_quality).await {
            Ok(payload) => {
                self.acquire_failures = 0;
                payload
            }
            Err(CaptureError::Acquire(e)) => {
                tracing::error!(?e, "camera capture failed");
                if self.acquire_failures < self.config.acquire_retries {
                    self.acquire_failures += 1;
                    return Ok(());
                }
                return Err(self.terminate(StreamError::Acquire(e)));
            }
            Err(CaptureError::Transcode(e)) => {
                tracing::error!(?e, "JPEG compression failed");
                return Err(self.terminate(StreamError::Transcode(e)));
            }
        };

        let bytes = payload.bytes();
        let mut header = heapless::String::<80>::new();
        // 80 bytes hold the header for any usize length.
        let _ = write!(
            header,
            "Content-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            bytes.len()
        );

        let written = async {
            sink.write_chunk(header.as_bytes()).await?;
            sink.write_chunk(bytes).await?;
            sink.write_chunk(self.delimiter.as_bytes()).await
        }
        .await;
        let len = bytes.len();
        drop(payload);

        if let Err(e) = written {
            tracing::info!(?e, frames = self.frames_sent, "stream client gone");
            return Err(self.terminate(StreamError::Transport(e)));
        }

        self.frames_sent += 1;
        let now = Instant::now();
        if let Some(last) = self.last_frame {
            tracing::debug!("MJPG: {}B {}ms", len, (now - last).as_millis());
        }
        self.last_frame = Some(now);
        Ok(())
    }

    /// Open the sink and stream until a failure ends the session.
    pub async fn run<S, E, K>(
        &mut self,
        source: &S,
        encoder: &E,
        sink: &mut K,
    ) -> StreamError<S::Error, E::Error, K::Error>
    where
        S: FrameSource,
        E: Encoder,
        K: FrameSink,
    {
        if let Err(e) = self.open(sink).await {
            return StreamError::Transport(e);
        }
        loop {
            if let Err(e) = self.step(source, encoder, sink).await {
                return e;
            }
        }
    }

    fn terminate<A, C, T>(
        &mut self,
        reason: StreamError<A, C, T>,
    ) -> StreamError<A, C, T> {
        self.state = SessionState::Terminated;
        self.last_frame = None;
        reason
    }
}
