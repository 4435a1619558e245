use anyhow::{anyhow, Result};
use std::path::Path;

use crate::frame::PixelFormat;
use crate::ingest::{FrameRate, StreamInfo};

/// Output video stream description, fixed for the lifetime of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamParams {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    /// Encoder input layout. Always planar 4:2:0.
    pub pixel_format: PixelFormat,
}

impl StreamParams {
    /// Output parameters for a source stream: same geometry and rate, 4:2:0 pixels.
    pub fn from_stream_info(info: &StreamInfo) -> Result<Self> {
        if info.width == 0 || info.height == 0 {
            return Err(anyhow!("stream has no geometry yet"));
        }
        if info.frame_rate.num == 0 || info.frame_rate.den == 0 {
            return Err(anyhow!("stream frame rate {:?} is unusable", info.frame_rate));
        }
        Ok(Self {
            width: info.width,
            height: info.height,
            frame_rate: info.frame_rate,
            pixel_format: PixelFormat::Yuv420p,
        })
    }
}

/// One picture in encoder input layout.
pub struct EncoderInput {
    pub planes: [Vec<u8>; 3],
    pub pts: i64,
}

/// Compressed output of the encoder, in the encoder's time base.
#[derive(Clone, Debug)]
pub struct EncodedPacket {
    pub data: Vec<u8>,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub keyframe: bool,
}

/// An open output container with one video stream.
pub trait OutputContainer: Send {
    /// Encode one picture. `Ok(None)` means the encoder buffered it without output.
    fn encode(&mut self, input: &EncoderInput) -> Result<Option<EncodedPacket>>;

    /// Multiplex one packet into the container.
    fn mux(&mut self, packet: EncodedPacket) -> Result<()>;

    /// Flush the encoder, finish the container and release the file.
    /// Must be safe to call once after any number of failed `encode`/`mux` calls.
    fn close(&mut self) -> Result<()>;
}

/// Opens output containers of one format.
pub trait ContainerFactory: Send {
    fn name(&self) -> &'static str;

    /// File extension without the dot.
    fn extension(&self) -> &'static str;

    fn open(&self, path: &Path, params: &StreamParams) -> Result<Box<dyn OutputContainer>>;
}

/// Container formats selectable from configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerFormat {
    /// YUV4MPEG2, uncompressed 4:2:0.
    Y4m,
    /// MP4 with an MPEG-4 video stream (feature: record-ffmpeg).
    Mp4,
}

impl ContainerFormat {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "y4m" => Ok(ContainerFormat::Y4m),
            "mp4" => Ok(ContainerFormat::Mp4),
            other => Err(anyhow!("unknown container format '{}' (expected y4m|mp4)", other)),
        }
    }

    /// Mp4 when this build can write it, Y4m otherwise.
    pub fn for_build() -> Self {
        if cfg!(feature = "record-ffmpeg") {
            ContainerFormat::Mp4
        } else {
            ContainerFormat::Y4m
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Y4m => "y4m",
            ContainerFormat::Mp4 => "mp4",
        }
    }

    pub fn factory(&self) -> Result<Box<dyn ContainerFactory>> {
        match self {
            ContainerFormat::Y4m => Ok(Box::new(super::y4m::Y4mFactory)),
            #[cfg(feature = "record-ffmpeg")]
            ContainerFormat::Mp4 => Ok(Box::new(super::mp4_ffmpeg::Mp4Factory)),
            #[cfg(not(feature = "record-ffmpeg"))]
            ContainerFormat::Mp4 => Err(anyhow!(
                "mp4 recording requires the record-ffmpeg feature"
            )),
        }
    }
}
