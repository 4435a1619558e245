//! Video stream frame source.
//!
//! `StreamSource` ingests the vehicle's compressed video feed:
//! - Opening the stream (network URL, named pipe, or local file)
//! - Demultiplexing and decoding packets in presentation order
//! - Producing planar YUV 4:2:0 `RawFrame` instances
//!
//! `stub://` URLs select a synthetic scene instead: a solid green disc moving over a dark
//! background. `stub://name?frames=N` ends the stream after N frames, and `radius=R`
//! sets the disc radius in pixels.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

use super::{FrameRate, FrameSource, SourceError, SourceStats, StreamInfo};
#[cfg(feature = "stream-ffmpeg")]
use super::stream_ffmpeg::FfmpegStreamSource;
use crate::frame::{rgb_to_yuv420p, PixelFormat, RawFrame};

/// Configuration for a stream source.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Stream URL (e.g., "udp://0.0.0.0:11111" for the vehicle's H.264 feed).
    pub url: String,
    /// Nominal frame rate, used when the container does not declare one.
    pub fps: u32,
    /// Frame width (synthetic scenes only).
    pub width: u32,
    /// Frame height (synthetic scenes only).
    pub height: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "stub://target".to_string(),
            fps: 30,
            width: 960,
            height: 720,
        }
    }
}

/// Compressed video stream source.
pub struct StreamSource {
    backend: StreamBackend,
}

enum StreamBackend {
    Synthetic(SyntheticStreamSource),
    #[cfg(feature = "stream-ffmpeg")]
    Ffmpeg(FfmpegStreamSource),
}

impl StreamSource {
    pub fn new(config: StreamConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(anyhow!("stream url must not be empty"));
        }
        if config.url.starts_with("stub://") {
            Ok(Self {
                backend: StreamBackend::Synthetic(SyntheticStreamSource::new(config)?),
            })
        } else {
            #[cfg(feature = "stream-ffmpeg")]
            {
                Ok(Self {
                    backend: StreamBackend::Ffmpeg(FfmpegStreamSource::new(config)?),
                })
            }
            #[cfg(not(feature = "stream-ffmpeg"))]
            {
                Err(anyhow!(
                    "stream '{}' requires the stream-ffmpeg feature",
                    config.url
                ))
            }
        }
    }
}

impl FrameSource for StreamSource {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            StreamBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "stream-ffmpeg")]
            StreamBackend::Ffmpeg(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Option<Result<RawFrame, SourceError>> {
        match &mut self.backend {
            StreamBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "stream-ffmpeg")]
            StreamBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn stream_info(&self) -> Option<StreamInfo> {
        match &self.backend {
            StreamBackend::Synthetic(source) => source.stream_info(),
            #[cfg(feature = "stream-ffmpeg")]
            StreamBackend::Ffmpeg(source) => source.stream_info(),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            StreamBackend::Synthetic(_) => true,
            #[cfg(feature = "stream-ffmpeg")]
            StreamBackend::Ffmpeg(source) => source.is_healthy(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            StreamBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "stream-ffmpeg")]
            StreamBackend::Ffmpeg(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests and demos
// ----------------------------------------------------------------------------

const DEFAULT_DISC_RADIUS: u32 = 48;
const BACKGROUND: Rgb<u8> = Rgb([30, 30, 30]);
const TARGET: Rgb<u8> = Rgb([0, 255, 0]);

struct SyntheticStreamSource {
    config: StreamConfig,
    frame_limit: Option<u64>,
    radius: u32,
    frame_count: u64,
    connected: bool,
}

impl SyntheticStreamSource {
    fn new(config: StreamConfig) -> Result<Self> {
        if config.width < 2 || config.height < 2 {
            return Err(anyhow!("synthetic stream needs at least 2x2 pixels"));
        }
        let mut frame_limit = None;
        let mut radius = DEFAULT_DISC_RADIUS;
        if let Some((_, query)) = config.url.split_once('?') {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| anyhow!("malformed stub parameter '{}'", pair))?;
                match key {
                    "frames" => {
                        frame_limit = Some(value.parse().map_err(|_| {
                            anyhow!("stub parameter frames must be an integer")
                        })?)
                    }
                    "radius" => {
                        radius = value
                            .parse()
                            .map_err(|_| anyhow!("stub parameter radius must be an integer"))?
                    }
                    other => return Err(anyhow!("unknown stub parameter '{}'", other)),
                }
            }
        }
        Ok(Self {
            config,
            frame_limit,
            radius,
            frame_count: 0,
            connected: false,
        })
    }

    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!("StreamSource: connected to {} (synthetic)", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Option<Result<RawFrame, SourceError>> {
        if !self.connected {
            return Some(Err(SourceError::Fatal(anyhow!(
                "synthetic stream used before connect"
            ))));
        }
        if self
            .frame_limit
            .is_some_and(|limit| self.frame_count >= limit)
        {
            return None;
        }

        let image = self.render_scene();
        let [y, u, v] = rgb_to_yuv420p(&image);
        let frame = RawFrame::new(
            self.config.width,
            self.config.height,
            PixelFormat::Yuv420p,
            vec![y, u, v],
            self.frame_count,
        );
        self.frame_count += 1;
        Some(frame.map_err(SourceError::Fatal))
    }

    /// Disc center follows an ellipse around the frame center, one lap every 120 frames.
    fn disc_center(&self) -> (f32, f32) {
        let w = self.config.width as f32;
        let h = self.config.height as f32;
        let phase = (self.frame_count % 120) as f32 / 120.0 * std::f32::consts::TAU;
        (
            w / 2.0 + w / 4.0 * phase.cos(),
            h / 2.0 + h / 4.0 * phase.sin(),
        )
    }

    fn render_scene(&self) -> RgbImage {
        let (cx, cy) = self.disc_center();
        let r2 = (self.radius * self.radius) as f32;
        RgbImage::from_fn(self.config.width, self.config.height, |x, y| {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            if dx * dx + dy * dy <= r2 {
                TARGET
            } else {
                BACKGROUND
            }
        })
    }

    fn stream_info(&self) -> Option<StreamInfo> {
        (self.frame_count > 0).then_some(StreamInfo {
            width: self.config.width,
            height: self.config.height,
            pixel_format: PixelFormat::Yuv420p,
            frame_rate: FrameRate::fps(self.config.fps),
        })
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_decoded: self.frame_count,
            decode_errors: 0,
            url: self.config.url.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
