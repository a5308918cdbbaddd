//! FFmpeg-backed decoding for local video files.
//!
//! Picks the container's best video stream, converts every decoded picture
//! to packed RGB24, and reports the stream's average frame rate (falling
//! back to the real base rate). At end of file the decoder is drained so
//! trailing buffered pictures are still delivered.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling;

use super::FrameSource;
use crate::frame::RawFrame;

pub(crate) struct FfmpegDecoder {
    demuxer: ffmpeg::format::context::Input,
    video_stream: usize,
    decoder: ffmpeg::codec::decoder::Video,
    to_rgb: scaling::Context,
    fps: Option<f64>,
    draining: bool,
}

impl FfmpegDecoder {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        ffmpeg::init().context("ffmpeg initialisation failed")?;
        let demuxer = ffmpeg::format::input(&path)
            .with_context(|| format!("ffmpeg could not open {}", path.display()))?;

        let (video_stream, fps, parameters) = {
            let stream = demuxer
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| anyhow!("{} contains no video stream", path.display()))?;
            let fps = positive_rate(stream.avg_frame_rate()).or_else(|| positive_rate(stream.rate()));
            (stream.index(), fps, stream.parameters())
        };

        let decoder = ffmpeg::codec::context::Context::from_parameters(parameters)
            .context("unsupported video codec parameters")?
            .decoder()
            .video()
            .context("could not start video decoder")?;
        let (width, height) = (decoder.width(), decoder.height());
        let to_rgb = scaling::Context::get(
            decoder.format(),
            width,
            height,
            Pixel::RGB24,
            width,
            height,
            scaling::Flags::BILINEAR,
        )
        .context("could not build RGB converter")?;

        log::info!(
            "decoding {} ({}x{}, fps {:?})",
            path.display(),
            width,
            height,
            fps
        );

        Ok(Self {
            demuxer,
            video_stream,
            decoder,
            to_rgb,
            fps,
            draining: false,
        })
    }

    /// Feed the decoder one more packet, or start draining at end of file.
    /// Returns false once there is nothing left to feed.
    fn feed(&mut self) -> Result<bool> {
        if self.draining {
            return Ok(false);
        }
        let wanted = self.video_stream;
        let packet = self
            .demuxer
            .packets()
            .find_map(|(stream, packet)| (stream.index() == wanted).then_some(packet));
        match packet {
            Some(packet) => self
                .decoder
                .send_packet(&packet)
                .context("decoder rejected packet")?,
            None => {
                self.decoder.send_eof().context("decoder rejected end of stream")?;
                self.draining = true;
            }
        }
        Ok(true)
    }

    fn convert(&mut self, picture: &ffmpeg::frame::Video) -> Result<RawFrame> {
        let mut rgb = ffmpeg::frame::Video::empty();
        self.to_rgb
            .run(picture, &mut rgb)
            .context("RGB conversion failed")?;
        let pixels = packed_rgb(&rgb)?;
        RawFrame::from_rgb(pixels, rgb.width(), rgb.height())
    }
}

impl FrameSource for FfmpegDecoder {
    fn fps(&self) -> Option<f64> {
        self.fps
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        let mut picture = ffmpeg::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut picture).is_ok() {
                return self.convert(&picture).map(Some);
            }
            if !self.feed()? {
                return Ok(None);
            }
        }
    }
}

fn positive_rate(rate: ffmpeg::Rational) -> Option<f64> {
    (rate.numerator() > 0 && rate.denominator() > 0).then(|| f64::from(rate))
}

/// Copy plane 0 into a tightly packed buffer, dropping any row padding.
fn packed_rgb(frame: &ffmpeg::frame::Video) -> Result<Vec<u8>> {
    let row_len = frame.width() as usize * 3;
    let rows = frame.height() as usize;
    let stride = frame.stride(0);
    let plane = frame.data(0);

    let mut out = Vec::with_capacity(row_len * rows);
    for row in 0..rows {
        let offset = row * stride;
        let line = plane
            .get(offset..offset + row_len)
            .ok_or_else(|| anyhow!("decoded picture row {} is truncated", row))?;
        out.extend_from_slice(line);
    }
    Ok(out)
}
