use anyhow::{Context, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::container::{ContainerFactory, EncoderInput, OutputContainer, StreamParams};
use crate::frame::RawFrame;
use crate::storage;

/// Why a single frame did not make it into the container.
#[derive(Debug)]
pub(crate) enum FrameFailure {
    Encode(String),
    Mux(String),
}

/// One recording interval: an open container plus the stream it was declared with.
///
/// Construction opens and configures the container completely; `close` always
/// releases it, whatever happened to individual frames in between.
pub struct RecordingSession {
    container: Box<dyn OutputContainer>,
    params: StreamParams,
    path: PathBuf,
    started_at: Instant,
    next_pts: i64,
    frames_written: u64,
    encode_failures: u64,
    mux_failures: u64,
}

/// What a closed session produced.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSummary {
    pub path: PathBuf,
    pub frames_written: u64,
    pub encode_failures: u64,
    pub mux_failures: u64,
    pub elapsed: Duration,
}

impl RecordingSession {
    pub(crate) fn open(
        factory: &dyn ContainerFactory,
        dir: &Path,
        device: &str,
        params: StreamParams,
    ) -> Result<Self> {
        let path = storage::reserve_path(dir, device, &Local::now(), factory.extension())?;
        let container = factory
            .open(&path, &params)
            .with_context(|| format!("open {} recording {}", factory.name(), path.display()))?;
        Ok(Self {
            container,
            params,
            path,
            started_at: Instant::now(),
            next_pts: 0,
            frames_written: 0,
            encode_failures: 0,
            mux_failures: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Encode and mux one frame. `Ok(false)` means the encoder kept it without output.
    pub(crate) fn write(&mut self, frame: &RawFrame) -> Result<bool, FrameFailure> {
        if (frame.width(), frame.height()) != (self.params.width, self.params.height) {
            self.encode_failures += 1;
            return Err(FrameFailure::Encode(format!(
                "frame is {}x{}, stream is {}x{}",
                frame.width(),
                frame.height(),
                self.params.width,
                self.params.height
            )));
        }
        let planes = match frame.to_yuv420p() {
            Ok(planes) => planes,
            Err(e) => {
                self.encode_failures += 1;
                return Err(FrameFailure::Encode(format!("{:#}", e)));
            }
        };
        let input = EncoderInput {
            planes,
            pts: self.next_pts,
        };
        self.next_pts += 1;

        let packet = match self.container.encode(&input) {
            Ok(Some(packet)) => packet,
            Ok(None) => return Ok(false),
            Err(e) => {
                self.encode_failures += 1;
                return Err(FrameFailure::Encode(format!("{:#}", e)));
            }
        };
        if let Err(e) = self.container.mux(packet) {
            self.mux_failures += 1;
            return Err(FrameFailure::Mux(format!("{:#}", e)));
        }
        self.frames_written += 1;
        Ok(true)
    }

    /// Flush and close the container. The session is consumed either way.
    pub(crate) fn close(mut self) -> (SessionSummary, Result<()>) {
        let closed = self
            .container
            .close()
            .with_context(|| format!("close recording {}", self.path.display()));
        let summary = SessionSummary {
            path: self.path,
            frames_written: self.frames_written,
            encode_failures: self.encode_failures,
            mux_failures: self.mux_failures,
            elapsed: self.started_at.elapsed(),
        };
        (summary, closed)
    }
}
