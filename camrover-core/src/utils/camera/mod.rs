//! Camera abstractions: frame acquisition, JPEG transcoding and sensor settings.
//!
//! The sensor driver, its DMA frame pool and the JPEG encoder live outside this
//! crate and are reached through `FrameSource`, `Encoder` and `CameraSensor`.
//! A frame taken from a source is wrapped in a `FrameGuard`, which hands it
//! back to the source when dropped, so every exit path releases it exactly once.

pub mod settings;

use alloc::vec::Vec;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::RawMutex, Mutex};

pub use settings::{CameraSensor, SensorStatus, Setting, SettingError};

/// Pixel layout of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Jpeg,
    Rgb565,
    Yuv422,
    Grayscale,
}

/// A block of image bytes owned by whoever holds it.
pub trait FrameBuffer {
    fn data(&self) -> &[u8];
    fn format(&self) -> PixelFormat;
    fn width(&self) -> u16;
    fn height(&self) -> u16;

    fn len(&self) -> usize {
        self.data().len()
    }

    fn is_empty(&self) -> bool {
        self.data().is_empty()
    }
}

/// Supplies frames from the camera pipeline.
///
/// `acquire` waits until a frame is available. Each frame returned must come
/// back through `release`; `FrameGuard` takes care of that.
#[allow(async_fn_in_trait)]
pub trait FrameSource {
    type Frame: FrameBuffer;
    type Error: core::fmt::Debug;

    async fn acquire(&self) -> Result<Self::Frame, Self::Error>;

    fn release(
        &self,
        frame: Self::Frame,
    );
}

/// Converts a raw frame into JPEG.
pub trait Encoder {
    type Error: core::fmt::Debug;

    fn transcode<F: FrameBuffer>(
        &self,
        frame: &F,
        quality: u8,
    ) -> Result<Vec<u8>, Self::Error>;
}

/// Borrowed frame that returns itself to its source on drop.
pub struct FrameGuard<'s, S: FrameSource> {
    source: &'s S,
    frame: Option<S::Frame>,
}

impl<'s, S: FrameSource> FrameGuard<'s, S> {
    /// Wait for the next frame from `source`.
    pub async fn acquire(source: &'s S) -> Result<Self, S::Error> {
        let frame = source.acquire().await?;
        Ok(Self {
            source,
            frame: Some(frame),
        })
    }

    pub fn frame(&self) -> &S::Frame {
        match &self.frame {
            Some(frame) => frame,
            None => unreachable!("frame is only taken on drop"),
        }
    }
}

impl<S: FrameSource> Drop for FrameGuard<'_, S> {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.source.release(frame);
        }
    }
}

/// JPEG bytes ready for the wire: either the source's own buffer or a
/// transcoded heap copy. Exactly one of the two is ever held.
pub enum Payload<'s, S: FrameSource> {
    Source(FrameGuard<'s, S>),
    Encoded(Vec<u8>),
}

impl<S: FrameSource> Payload<'_, S> {
    pub fn bytes(&self) -> &[u8] {
        match self {
            Payload::Source(guard) => guard.frame().data(),
            Payload::Encoded(buf) => buf,
        }
    }
}

impl<S: FrameSource> AsRef<[u8]> for Payload<'_, S> {
    fn as_ref(&self) -> &[u8] {
        self.bytes()
    }
}

/// Why a JPEG frame could not be produced.
#[derive(Debug)]
pub enum CaptureError<A, C> {
    Acquire(A),
    Transcode(C),
}

/// Acquire one frame and make sure it is JPEG.
///
/// Raw frames are transcoded and handed back to the source before this
/// returns, whether or not the encoder succeeded.
pub async fn grab_jpeg<'s, S: FrameSource, E: Encoder>(
    source: &'s S,
    encoder: &E,
    quality: u8,
) -> Result<Payload<'s, S>, CaptureError<S::Error, E::Error>> {
    let guard = FrameGuard::acquire(source)
        .await
        .map_err(CaptureError::Acquire)?;

    if guard.frame().format() == PixelFormat::Jpeg {
        return Ok(Payload::Source(guard));
    }

    let encoded = encoder.transcode(guard.frame(), quality);
    drop(guard);
    encoded.map(Payload::Encoded).map_err(CaptureError::Transcode)
}

/// Frame source, encoder and sensor of one camera.
pub struct Camera<M: RawMutex, S, E, Z> {
    source: S,
    encoder: E,
    sensor: Mutex<M, RefCell<Z>>,
}

impl<M, S, E, Z> Camera<M, S, E, Z>
where
    M: RawMutex,
    S: FrameSource,
    E: Encoder,
    Z: CameraSensor,
{
    pub fn new(
        source: S,
        encoder: E,
        sensor: Z,
    ) -> Self {
        Self {
            source,
            encoder,
            sensor: Mutex::new(RefCell::new(sensor)),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub async fn grab_jpeg(
        &self,
        quality: u8,
    ) -> Result<Payload<'_, S>, CaptureError<S::Error, E::Error>> {
        grab_jpeg(&self.source, &self.encoder, quality).await
    }

    /// Apply a named setting; see `settings::apply_named`.
    pub fn apply_setting(
        &self,
        name: &str,
        value: i32,
    ) -> Result<(), SettingError> {
        self.sensor
            .lock(|sensor| settings::apply_named(&mut *sensor.borrow_mut(), name, value))
    }

    pub fn status(&self) -> SensorStatus {
        self.sensor.lock(|sensor| sensor.borrow().status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use core::cell::Cell;

    struct Raw(Vec<u8>, PixelFormat);

    impl FrameBuffer for Raw {
        fn data(&self) -> &[u8] {
            &self.0
        }

        fn format(&self) -> PixelFormat {
            self.1
        }

        fn width(&self) -> u16 {
            4
        }

        fn height(&self) -> u16 {
            1
        }
    }

    struct Pool {
        format: PixelFormat,
        out: Cell<usize>,
        returned: Cell<usize>,
    }

    impl FrameSource for Pool {
        type Frame = Raw;
        type Error = ();

        async fn acquire(&self) -> Result<Raw, ()> {
            self.out.set(self.out.get() + 1);
            Ok(Raw(vec![1, 2, 3, 4], self.format))
        }

        fn release(
            &self,
            _frame: Raw,
        ) {
            self.returned.set(self.returned.get() + 1);
        }
    }

    struct Enc {
        fail: bool,
    }

    impl Encoder for Enc {
        type Error = &'static str;

        fn transcode<F: FrameBuffer>(
            &self,
            frame: &F,
            _quality: u8,
        ) -> Result<Vec<u8>, &'static str> {
            if self.fail {
                return Err("encoder out of memory");
            }
            let mut out = vec![0xFF, 0xD8];
            out.extend_from_slice(frame.data());
            Ok(out)
        }
    }

    fn pool(format: PixelFormat) -> Pool {
        Pool {
            format,
            out: Cell::new(0),
            returned: Cell::new(0),
        }
    }

    #[test]
    fn test_jpeg_frame_is_held_until_drop() {
        let pool = pool(PixelFormat::Jpeg);
        let payload =
            embassy_futures::block_on(grab_jpeg(&pool, &Enc { fail: false }, 80)).unwrap();
        assert!(matches!(payload, Payload::Source(_)));
        assert_eq!(payload.bytes(), &[1, 2, 3, 4]);
        assert_eq!(pool.returned.get(), 0);
        drop(payload);
        assert_eq!(pool.returned.get(), 1);
    }

    #[test]
    fn test_raw_frame_released_after_transcode() {
        let pool = pool(PixelFormat::Rgb565);
        let payload =
            embassy_futures::block_on(grab_jpeg(&pool, &Enc { fail: false }, 80)).unwrap();
        assert_eq!(pool.returned.get(), 1);
        assert_eq!(payload.bytes(), &[0xFF, 0xD8, 1, 2, 3, 4]);
    }

    #[test]
    fn test_raw_frame_released_when_transcode_fails() {
        let pool = pool(PixelFormat::Yuv422);
        let result = embassy_futures::block_on(grab_jpeg(&pool, &Enc { fail: true }, 80));
        assert!(matches!(result, Err(CaptureError::Transcode(_))));
        assert_eq!(pool.out.get(), 1);
        assert_eq!(pool.returned.get(), 1);
    }
}
