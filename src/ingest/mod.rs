//! Frame ingestion sources.
//!
//! This module provides sources that turn a compressed video feed into `RawFrame`s:
//! - Live vehicle / network streams and local files (feature: stream-ffmpeg)
//! - Synthetic target scene (`stub://` URLs, testing and demos)
//! - Replay of a prepared frame list (`ReplaySource`)
//!
//! Every source yields frames in strictly increasing presentation order and never drops or
//! reorders frames itself. A packet that fails to decode is reported as
//! `SourceError::Decode` and the sequence continues; the sequence ends (`None`) only when the
//! underlying stream ends. Transport failures that cannot be recovered surface as
//! `SourceError::Fatal`.

pub mod replay;
pub mod stream;
#[cfg(feature = "stream-ffmpeg")]
pub(crate) mod stream_ffmpeg;

pub use replay::ReplaySource;
pub use stream::{StreamConfig, StreamSource};

use anyhow::Result;

use crate::frame::{PixelFormat, RawFrame};

/// Nominal stream frame rate as a rational number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    pub fn fps(num: u32) -> Self {
        Self { num, den: 1 }
    }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }
}

/// Stream metadata, known once the first frame has been decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub frame_rate: FrameRate,
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default)]
pub struct SourceStats {
    pub frames_decoded: u64,
    pub decode_errors: u64,
    pub url: String,
}

/// Errors reported by a frame source.
#[derive(Debug)]
pub enum SourceError {
    /// A single packet could not be decoded. The sequence continues.
    Decode(String),
    /// The transport failed and the stream cannot continue.
    Fatal(anyhow::Error),
}

impl SourceError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::Fatal(_))
    }
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Decode(reason) => write!(f, "decode failed: {}", reason),
            SourceError::Fatal(err) => write!(f, "stream failed: {:#}", err),
        }
    }
}

impl std::error::Error for SourceError {}

/// A forward-only sequence of decoded frames.
pub trait FrameSource {
    /// Open the underlying stream.
    fn connect(&mut self) -> Result<()>;

    /// Next frame in presentation order. `None` once the stream has ended.
    fn next_frame(&mut self) -> Option<Result<RawFrame, SourceError>>;

    /// Stream metadata. `None` until the first frame has been produced.
    fn stream_info(&self) -> Option<StreamInfo>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}
