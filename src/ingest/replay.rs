//! Replay of a prepared frame list.
//!
//! Plays back frames (and injected decode failures) in the order given. Useful for
//! re-running the tracker over captured frames and for exercising the pipeline's
//! per-frame error handling.

use anyhow::{anyhow, Result};
use std::collections::VecDeque;

use super::{FrameRate, FrameSource, SourceError, SourceStats, StreamInfo};
use crate::frame::RawFrame;

/// One scripted item.
pub enum ReplayItem {
    Frame(RawFrame),
    DecodeError(String),
}

pub struct ReplaySource {
    name: String,
    items: VecDeque<ReplayItem>,
    frame_rate: FrameRate,
    info: Option<StreamInfo>,
    last_index: Option<u64>,
    frames_decoded: u64,
    decode_errors: u64,
    connected: bool,
}

impl ReplaySource {
    pub fn new(name: &str, frame_rate: FrameRate) -> Self {
        Self {
            name: name.to_string(),
            items: VecDeque::new(),
            frame_rate,
            info: None,
            last_index: None,
            frames_decoded: 0,
            decode_errors: 0,
            connected: false,
        }
    }

    pub fn from_frames(name: &str, frame_rate: FrameRate, frames: Vec<RawFrame>) -> Self {
        let mut source = Self::new(name, frame_rate);
        source
            .items
            .extend(frames.into_iter().map(ReplayItem::Frame));
        source
    }

    pub fn push_frame(&mut self, frame: RawFrame) {
        self.items.push_back(ReplayItem::Frame(frame));
    }

    pub fn push_decode_error(&mut self, reason: &str) {
        self.items
            .push_back(ReplayItem::DecodeError(reason.to_string()));
    }

    pub fn remaining(&self) -> usize {
        self.items.len()
    }
}

impl FrameSource for ReplaySource {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!(
            "ReplaySource: {} ready with {} items",
            self.name,
            self.items.len()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Option<Result<RawFrame, SourceError>> {
        if !self.connected {
            return Some(Err(SourceError::Fatal(anyhow!(
                "replay source used before connect"
            ))));
        }
        match self.items.pop_front()? {
            ReplayItem::DecodeError(reason) => {
                self.decode_errors += 1;
                Some(Err(SourceError::Decode(reason)))
            }
            ReplayItem::Frame(frame) => {
                if self.last_index.is_some_and(|last| frame.index() <= last) {
                    return Some(Err(SourceError::Fatal(anyhow!(
                        "replay frame index {} is not after {}",
                        frame.index(),
                        self.last_index.unwrap_or_default()
                    ))));
                }
                self.last_index = Some(frame.index());
                if self.info.is_none() {
                    self.info = Some(StreamInfo {
                        width: frame.width(),
                        height: frame.height(),
                        pixel_format: frame.format(),
                        frame_rate: self.frame_rate,
                    });
                }
                self.frames_decoded += 1;
                Some(Ok(frame))
            }
        }
    }

    fn stream_info(&self) -> Option<StreamInfo> {
        self.info
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_decoded: self.frames_decoded,
            decode_errors: self.decode_errors,
            url: format!("replay://{}", self.name),
        }
    }
}
