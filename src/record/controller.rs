//! On-demand recording state machine.
//!
//! Two states: Idle (no session) and Recording (exactly one open session). All
//! operations go through one mutex, so a `toggle` never interleaves with a `submit`.

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::container::{ContainerFactory, StreamParams};
use super::session::{FrameFailure, RecordingSession, SessionSummary};
use crate::frame::RawFrame;

/// Where recordings go.
#[derive(Clone, Debug)]
pub struct RecorderSettings {
    pub pictures_dir: PathBuf,
    pub device: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RecordingStatus {
    Idle,
    Recording {
        path: PathBuf,
        elapsed: Duration,
        frames: u64,
    },
}

impl RecordingStatus {
    pub fn is_recording(&self) -> bool {
        matches!(self, RecordingStatus::Recording { .. })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ToggleOutcome {
    Started { path: PathBuf },
    Stopped(SessionSummary),
}

/// Result of offering one frame to the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// One packet reached the container.
    Written,
    /// The encoder buffered the frame without producing a packet.
    NoPacket,
    /// No session is open; nothing was written.
    Rejected,
    EncodeFailed(String),
    MuxFailed(String),
}

impl SubmitOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SubmitOutcome::EncodeFailed(_) | SubmitOutcome::MuxFailed(_)
        )
    }
}

struct ControllerState {
    factory: Box<dyn ContainerFactory>,
    settings: RecorderSettings,
    params: Option<StreamParams>,
    session: Option<RecordingSession>,
}

impl ControllerState {
    fn start(&mut self) -> Result<PathBuf> {
        let params = self
            .params
            .ok_or_else(|| anyhow!("stream parameters are not known yet; no frame decoded"))?;
        let session = RecordingSession::open(
            self.factory.as_ref(),
            &self.settings.pictures_dir,
            &self.settings.device,
            params,
        )?;
        let path = session.path().to_path_buf();
        log::info!(
            "Recorder: started {} ({}x{} @ {:.2} fps, {})",
            path.display(),
            params.width,
            params.height,
            params.frame_rate.as_f64(),
            self.factory.name()
        );
        self.session = Some(session);
        Ok(path)
    }

    fn stop(&mut self) -> Result<Option<SessionSummary>> {
        let Some(session) = self.session.take() else {
            return Ok(None);
        };
        let (summary, closed) = session.close();
        match closed {
            Ok(()) => {
                log::info!(
                    "Recorder: saved {} ({} frames, {:.1}s)",
                    summary.path.display(),
                    summary.frames_written,
                    summary.elapsed.as_secs_f64()
                );
                Ok(Some(summary))
            }
            Err(e) => {
                log::error!(
                    "Recorder: closing {} failed: {:#}",
                    summary.path.display(),
                    e
                );
                Err(e)
            }
        }
    }
}

pub struct RecordingController {
    state: Mutex<ControllerState>,
}

impl RecordingController {
    pub fn new(factory: Box<dyn ContainerFactory>, settings: RecorderSettings) -> Self {
        Self {
            state: Mutex::new(ControllerState {
                factory,
                settings,
                params: None,
                session: None,
            }),
        }
    }

    // A panic elsewhere must not strand an open container.
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declare the stream the next session will record. An open session keeps its own.
    pub fn set_stream_params(&self, params: StreamParams) {
        let mut state = self.lock();
        if state.params != Some(params) {
            log::debug!("Recorder: stream parameters {:?}", params);
            state.params = Some(params);
        }
    }

    pub fn stream_params(&self) -> Option<StreamParams> {
        self.lock().params
    }

    /// Idle opens a session; Recording closes it.
    ///
    /// A failed open leaves the controller Idle. A failed close is returned as an
    /// error but the session is gone either way.
    pub fn toggle(&self) -> Result<ToggleOutcome> {
        let mut state = self.lock();
        if state.session.is_some() {
            let summary = state
                .stop()?
                .ok_or_else(|| anyhow!("recording session vanished while stopping"))?;
            Ok(ToggleOutcome::Stopped(summary))
        } else {
            let path = state.start()?;
            Ok(ToggleOutcome::Started { path })
        }
    }

    /// Close the open session, if any.
    pub fn stop(&self) -> Result<Option<SessionSummary>> {
        self.lock().stop()
    }

    /// Offer one frame. Failures are per frame and leave the session open.
    pub fn submit(&self, frame: &RawFrame) -> SubmitOutcome {
        let mut state = self.lock();
        let Some(session) = state.session.as_mut() else {
            return SubmitOutcome::Rejected;
        };
        match session.write(frame) {
            Ok(true) => SubmitOutcome::Written,
            Ok(false) => SubmitOutcome::NoPacket,
            Err(FrameFailure::Encode(reason)) => {
                log::warn!("Recorder: encode failed for frame {}: {}", frame.index(), reason);
                SubmitOutcome::EncodeFailed(reason)
            }
            Err(FrameFailure::Mux(reason)) => {
                log::warn!("Recorder: mux failed for frame {}: {}", frame.index(), reason);
                SubmitOutcome::MuxFailed(reason)
            }
        }
    }

    pub fn is_recording(&self) -> bool {
        self.lock().session.is_some()
    }

    pub fn status(&self) -> RecordingStatus {
        match self.lock().session.as_ref() {
            None => RecordingStatus::Idle,
            Some(session) => RecordingStatus::Recording {
                path: session.path().to_path_buf(),
                elapsed: session.elapsed(),
                frames: session.frames_written(),
            },
        }
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        if let Err(e) = self.lock().stop() {
            log::error!("Recorder: close on shutdown failed: {:#}", e);
        }
    }
}
