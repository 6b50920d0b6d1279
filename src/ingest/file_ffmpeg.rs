//! Local file frame source using FFmpeg.
//!
//! Frames are decoded in-memory and scaled to packed RGB. The stream position of each frame is
//! its best-effort presentation timestamp converted to milliseconds.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use super::file::FileConfig;
use super::FrameSource;
use crate::frame::{Frame, PixelFormat};
use crate::StreamPosition;

pub(crate) struct FfmpegFileSource {
    config: FileConfig,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    time_base: f64,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    position: StreamPosition,
    frames_decoded: u64,
    eof_sent: bool,
}

impl FfmpegFileSource {
    pub(crate) fn open(config: FileConfig) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let mut input = ffmpeg::format::input(&config.path)
            .with_context(|| format!("failed to open file input '{}' with ffmpeg", config.path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let time_base = f64::from(input_stream.time_base());
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        if config.start > StreamPosition::ZERO {
            // AV_TIME_BASE is microseconds.
            let target = i64::try_from(config.start.as_millis())
                .ok()
                .and_then(|ms| ms.checked_mul(1000))
                .ok_or_else(|| anyhow!("start offset {} ms is out of range", config.start))?;
            input
                .seek(target, ..target)
                .with_context(|| format!("seek to {} ms", config.start))?;
        }

        log::info!(
            "FileSource: connected to {} (ffmpeg, {}x{}, start {} ms)",
            config.path,
            decoder.width(),
            decoder.height(),
            config.start
        );

        Ok(Self {
            config,
            input,
            stream_index,
            time_base,
            decoder,
            scaler,
            position: StreamPosition::ZERO,
            frames_decoded: 0,
            eof_sent: false,
        })
    }

    fn next_video_packet(&mut self) -> Option<ffmpeg::Packet> {
        for (stream, packet) in self.input.packets() {
            if stream.index() == self.stream_index {
                return Some(packet);
            }
        }
        None
    }

    fn timestamp_of(&self, decoded: &ffmpeg::frame::Video) -> StreamPosition {
        match decoded.timestamp() {
            Some(pts) if pts >= 0 => {
                StreamPosition::from_millis((pts as f64 * self.time_base * 1000.0).round() as u64)
            }
            _ => self.position,
        }
    }
}

impl FrameSource for FfmpegFileSource {
    fn describe(&self) -> String {
        format!("{} (ffmpeg, {} frames decoded)", self.config.path, self.frames_decoded)
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                let position = self.timestamp_of(&decoded);
                // Seeking lands on the keyframe before the target; skip the pre-roll.
                if position < self.config.start {
                    continue;
                }
                let mut rgb_frame = ffmpeg::frame::Video::empty();
                self.scaler
                    .run(&decoded, &mut rgb_frame)
                    .context("scale frame to RGB")?;
                let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;

                self.frames_decoded += 1;
                self.position = position.max(self.position);
                return Frame::new(pixels, width, height, PixelFormat::Rgb24).map(Some);
            }

            if self.eof_sent {
                return Ok(None);
            }
            match self.next_video_packet() {
                Some(packet) => self
                    .decoder
                    .send_packet(&packet)
                    .context("send packet to ffmpeg decoder")?,
                None => {
                    self.decoder.send_eof().context("flush ffmpeg decoder")?;
                    self.eof_sent = true;
                }
            }
        }
    }

    fn position(&self) -> StreamPosition {
        self.position
    }

    fn close(&mut self) -> Result<()> {
        log::debug!(
            "FileSource: closing {} after {} frames",
            self.config.path,
            self.frames_decoded
        );
        Ok(())
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let packed = data
            .get(..row_bytes * height as usize)
            .context("ffmpeg frame is shorter than its dimensions")?;
        return Ok((packed.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
