//! Compressed stream source using FFmpeg.
//!
//! Demultiplexes the configured URL, decodes the best video stream and converts every
//! decoded picture to planar YUV 4:2:0. A packet the decoder rejects is reported and
//! skipped; the stream only ends when the demuxer runs out of packets and the decoder
//! has been drained.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use std::time::{Duration, Instant};

use super::stream::StreamConfig;
use super::{FrameRate, SourceError, SourceStats, StreamInfo};
use crate::frame::{ColorRange, PixelFormat, RawFrame};

pub(crate) struct FfmpegStreamSource {
    config: StreamConfig,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: Option<ScalerState>,
    frame_rate: FrameRate,
    info: Option<StreamInfo>,
    frame_count: u64,
    decode_errors: u64,
    draining: bool,
    last_frame_at: Option<Instant>,
    connected_at: Option<Instant>,
}

struct ScalerState {
    context: ffmpeg::software::scaling::Context,
    format: ffmpeg::util::format::pixel::Pixel,
    width: u32,
    height: u32,
}

impl FfmpegStreamSource {
    pub(crate) fn new(config: StreamConfig) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&config.url)
            .with_context(|| format!("failed to open stream '{}' with ffmpeg", config.url))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("stream has no video track"))?;
        let stream_index = input_stream.index();
        let rate = input_stream.avg_frame_rate();
        let frame_rate = if rate.numerator() > 0 && rate.denominator() > 0 {
            FrameRate::new(rate.numerator() as u32, rate.denominator() as u32)
        } else {
            FrameRate::fps(config.fps)
        };
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        Ok(Self {
            config,
            input,
            stream_index,
            decoder,
            scaler: None,
            frame_rate,
            info: None,
            frame_count: 0,
            decode_errors: 0,
            draining: false,
            last_frame_at: None,
            connected_at: None,
        })
    }

    pub(crate) fn connect(&mut self) -> Result<()> {
        self.connected_at = Some(Instant::now());
        log::info!("StreamSource: connected to {} (ffmpeg)", self.config.url);
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Option<Result<RawFrame, SourceError>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return Some(self.emit(&decoded));
            }
            if self.draining {
                return None;
            }

            match self.input.packets().next() {
                Some((stream, packet)) => {
                    if stream.index() != self.stream_index {
                        continue;
                    }
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        self.decode_errors += 1;
                        return Some(Err(SourceError::Decode(e.to_string())));
                    }
                }
                None => {
                    self.draining = true;
                    if let Err(e) = self.decoder.send_eof() {
                        log::debug!("StreamSource: decoder eof: {}", e);
                    }
                }
            }
        }
    }

    fn emit(&mut self, decoded: &ffmpeg::frame::Video) -> Result<RawFrame, SourceError> {
        let (planes, range) = self
            .to_yuv420p_planes(decoded)
            .map_err(|e| SourceError::Decode(format!("{:#}", e)))?;
        let frame = RawFrame::new(
            decoded.width(),
            decoded.height(),
            PixelFormat::Yuv420p,
            planes,
            self.frame_count,
        )
        .map_err(|e| SourceError::Decode(format!("{:#}", e)))?
        .with_color_range(range);

        if self.info.is_none() {
            self.info = Some(StreamInfo {
                width: frame.width(),
                height: frame.height(),
                pixel_format: PixelFormat::Yuv420p,
                frame_rate: self.frame_rate,
            });
        }
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Ok(frame)
    }

    /// YUV 4:2:0 planes and their sample range. Unspecified ranges are read as limited,
    /// the H.264 default; swscale output for `YUV420P` is always limited.
    fn to_yuv420p_planes(
        &mut self,
        decoded: &ffmpeg::frame::Video,
    ) -> Result<(Vec<Vec<u8>>, ColorRange)> {
        use ffmpeg::util::color::Range;
        use ffmpeg::util::format::pixel::Pixel;

        if decoded.format() == Pixel::YUV420P {
            let range = match decoded.color_range() {
                Range::JPEG => ColorRange::Full,
                _ => ColorRange::Limited,
            };
            return Ok((copy_planes(decoded)?, range));
        }
        if decoded.format() == Pixel::YUVJ420P {
            return Ok((copy_planes(decoded)?, ColorRange::Full));
        }

        let stale = self.scaler.as_ref().map_or(true, |s| {
            s.format != decoded.format() || s.width != decoded.width() || s.height != decoded.height()
        });
        if stale {
            let context = ffmpeg::software::scaling::context::Context::get(
                decoded.format(),
                decoded.width(),
                decoded.height(),
                Pixel::YUV420P,
                decoded.width(),
                decoded.height(),
                ffmpeg::software::scaling::flag::Flags::BILINEAR,
            )
            .context("create ffmpeg scaler")?;
            self.scaler = Some(ScalerState {
                context,
                format: decoded.format(),
                width: decoded.width(),
                height: decoded.height(),
            });
        }

        let scaler = self
            .scaler
            .as_mut()
            .ok_or_else(|| anyhow!("ffmpeg scaler missing"))?;
        let mut yuv = ffmpeg::frame::Video::empty();
        scaler
            .context
            .run(decoded, &mut yuv)
            .context("scale frame to yuv420p")?;
        Ok((copy_planes(&yuv)?, ColorRange::Limited))
    }

    pub(crate) fn stream_info(&self) -> Option<StreamInfo> {
        self.info
    }

    pub(crate) fn is_healthy(&self) -> bool {
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        let Some(last_frame_at) = self.last_frame_at else {
            return connected_at.elapsed() <= Duration::from_secs(5);
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    pub(crate) fn stats(&self) -> SourceStats {
        SourceStats {
            frames_decoded: self.frame_count,
            decode_errors: self.decode_errors,
            url: self.config.url.clone(),
        }
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.config.fps == 0 {
            2_000
        } else {
            (1000 / self.config.fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }
}

/// Copy the three planes of a yuv420p frame, dropping row padding.
fn copy_planes(frame: &ffmpeg::frame::Video) -> Result<Vec<Vec<u8>>> {
    let mut planes = Vec::with_capacity(3);
    for index in 0..3 {
        let row_bytes = frame.plane_width(index) as usize;
        let rows = frame.plane_height(index) as usize;
        let stride = frame.stride(index);
        let data = frame.data(index);

        if stride == row_bytes {
            planes.push(
                data.get(..row_bytes * rows)
                    .context("ffmpeg plane is shorter than expected")?
                    .to_vec(),
            );
            continue;
        }

        let mut plane = Vec::with_capacity(row_bytes * rows);
        for row in 0..rows {
            let start = row * stride;
            let end = start + row_bytes;
            plane.extend_from_slice(
                data.get(start..end)
                    .context("ffmpeg frame row is out of bounds")?,
            );
        }
        planes.push(plane);
    }
    Ok(planes)
}
