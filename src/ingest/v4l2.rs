//! V4L2 capture backend for `CameraSource`.
//!
//! Requests packed RGB from the device and falls back to whatever format the driver keeps
//! (YUYV is common on USB webcams). Frames are copied out of the mmap buffers before they leave
//! this module.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::time::Instant;

use super::camera::CameraConfig;
use super::FrameSource;
use crate::frame::{Frame, PixelFormat};
use crate::StreamPosition;

pub(crate) struct DeviceV4l2Source {
    config: CameraConfig,
    state: DeviceV4l2State,
    format: PixelFormat,
    active_width: u32,
    active_height: u32,
    started_at: Option<Instant>,
    position: StreamPosition,
    frame_count: u64,
}

#[self_referencing]
struct DeviceV4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl DeviceV4l2Source {
    pub(crate) fn open(config: CameraConfig) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&config.device)
            .with_context(|| format!("open v4l2 device {}", config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "CameraSource: failed to set format on {}: {}",
                    config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = match &format.fourcc.repr {
            b"RGB3" => PixelFormat::Rgb24,
            b"BGR3" => PixelFormat::Bgr24,
            b"YUYV" => PixelFormat::Yuyv,
            b"NV12" => PixelFormat::Nv12,
            b"GREY" => PixelFormat::Gray8,
            other => {
                return Err(anyhow!(
                    "v4l2 device {} uses unsupported pixel format {}",
                    config.device,
                    String::from_utf8_lossy(other)
                ))
            }
        };

        if config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "CameraSource: failed to set fps on {}: {}",
                    config.device,
                    err
                );
            }
        }

        let state = DeviceV4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "CameraSource: connected to {} ({}x{}, {:?})",
            config.device,
            format.width,
            format.height,
            pixel_format
        );

        Ok(Self {
            config,
            state,
            format: pixel_format,
            active_width: format.width,
            active_height: format.height,
            started_at: None,
            position: StreamPosition::ZERO,
            frame_count: 0,
        })
    }
}

impl FrameSource for DeviceV4l2Source {
    fn describe(&self) -> String {
        format!(
            "{} (v4l2, {}x{}, {} frames)",
            self.config.device, self.active_width, self.active_height, self.frame_count
        )
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        use v4l::io::traits::CaptureStream;

        let pixels = self
            .state
            .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
            .context("capture v4l2 frame")?;

        let started_at = *self.started_at.get_or_insert_with(Instant::now);
        self.position = StreamPosition::from_millis(started_at.elapsed().as_millis() as u64);
        self.frame_count += 1;

        // Drivers may hand back oversized buffers; keep only the image payload.
        let expected = self
            .format
            .buffer_len(self.active_width, self.active_height)
            .context("v4l2 frame dimensions overflow")?;
        let mut pixels = pixels;
        pixels.truncate(expected);

        Frame::new(pixels, self.active_width, self.active_height, self.format).map(Some)
    }

    fn position(&self) -> StreamPosition {
        self.position
    }
}
