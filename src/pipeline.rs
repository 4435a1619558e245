//! Frame pipeline driver.
//!
//! One iteration per decoded frame: display (never blocks), track, record when a session
//! is open, then forward the offset. Input events are drained between frames. Every way
//! out of the loop closes the open recording first.

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::frame::RawFrame;
use crate::ingest::{FrameSource, SourceError, StreamInfo};
use crate::record::{RecordingController, StreamParams, SubmitOutcome, ToggleOutcome};
use crate::track::{Offset, TrackResult, Tracker};

/// Asynchronous requests from the input side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    ToggleRecording,
    ToggleTracking,
    Quit,
}

/// Where frames are shown. Must not block: a busy display skips the frame.
pub trait DisplaySink {
    /// Returns false if the frame was dropped.
    fn try_present(&mut self, frame: &RawFrame) -> bool;
}

/// Receives the per-frame tracking result (the control side).
pub trait OffsetSink {
    fn forward(&mut self, frame_index: u64, result: &TrackResult);
}

/// Display backed by a bounded channel. A full channel drops the frame.
pub struct ChannelDisplay {
    tx: Sender<RawFrame>,
}

impl ChannelDisplay {
    pub fn bounded(capacity: usize) -> (Self, Receiver<RawFrame>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx }, rx)
    }
}

impl DisplaySink for ChannelDisplay {
    fn try_present(&mut self, frame: &RawFrame) -> bool {
        match self.tx.try_send(frame.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Record the first N frames on startup, then stop that recording.
    pub record_first: Option<u64>,
    /// Forward offsets to the control side from the start.
    pub tracking: bool,
    pub health_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            record_first: None,
            tracking: true,
            health_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    Quit,
    SourceFailed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineSummary {
    pub frames: u64,
    pub decode_errors: u64,
    pub frames_recorded: u64,
    pub encode_failures: u64,
    pub mux_failures: u64,
    pub display_drops: u64,
    pub stop_reason: StopReason,
}

#[derive(Debug, PartialEq, Eq)]
enum Capture {
    Off,
    Pending(u64),
    Active { limit: u64, written: u64 },
    Done,
}

pub struct PipelineDriver<'a, S: FrameSource> {
    source: S,
    tracker: Tracker,
    recorder: Arc<RecordingController>,
    display: Option<Box<dyn DisplaySink + 'a>>,
    offsets: Option<Box<dyn OffsetSink + 'a>>,
    events: Option<Receiver<InputEvent>>,
    quit: Arc<AtomicBool>,
    config: PipelineConfig,
    tracking: Arc<AtomicBool>,
    capture: Capture,
    last_info: Option<StreamInfo>,
}

impl<'a, S: FrameSource> PipelineDriver<'a, S> {
    pub fn new(
        source: S,
        tracker: Tracker,
        recorder: Arc<RecordingController>,
        config: PipelineConfig,
    ) -> Self {
        let capture = match config.record_first {
            Some(limit) if limit > 0 => Capture::Pending(limit),
            _ => Capture::Off,
        };
        Self {
            source,
            tracker,
            recorder,
            display: None,
            offsets: None,
            events: None,
            quit: Arc::new(AtomicBool::new(false)),
            tracking: Arc::new(AtomicBool::new(config.tracking)),
            config,
            capture,
            last_info: None,
        }
    }

    pub fn with_display(mut self, display: impl DisplaySink + 'a) -> Self {
        self.display = Some(Box::new(display));
        self
    }

    pub fn with_offset_sink(mut self, sink: impl OffsetSink + 'a) -> Self {
        self.offsets = Some(Box::new(sink));
        self
    }

    pub fn with_events(mut self, events: Receiver<InputEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Setting this flag stops the loop before the next frame.
    pub fn quit_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.quit)
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::SeqCst)
    }

    /// Shared view of the tracking switch, for status displays.
    pub fn tracking_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.tracking)
    }

    /// Run until the stream ends, a quit arrives, or the source fails.
    pub fn run(&mut self) -> Result<PipelineSummary> {
        self.source.connect()?;
        log::info!(
            "Pipeline: running (tracking={}, record_first={:?})",
            self.is_tracking(),
            self.config.record_first
        );

        let mut summary = PipelineSummary {
            frames: 0,
            decode_errors: 0,
            frames_recorded: 0,
            encode_failures: 0,
            mux_failures: 0,
            display_drops: 0,
            stop_reason: StopReason::EndOfStream,
        };
        let mut last_health_log = Instant::now();

        summary.stop_reason = loop {
            if self.drain_events() || self.quit.load(Ordering::SeqCst) {
                break StopReason::Quit;
            }

            let frame = match self.source.next_frame() {
                None => break StopReason::EndOfStream,
                Some(Ok(frame)) => frame,
                Some(Err(SourceError::Decode(reason))) => {
                    summary.decode_errors += 1;
                    log::warn!("Pipeline: skipping undecodable packet: {}", reason);
                    continue;
                }
                Some(Err(SourceError::Fatal(e))) => {
                    log::error!("Pipeline: source failed: {:#}", e);
                    break StopReason::SourceFailed(format!("{:#}", e));
                }
            };
            summary.frames += 1;
            self.refresh_stream_params();
            self.start_capture();

            if let Some(display) = self.display.as_mut() {
                if !display.try_present(&frame) {
                    summary.display_drops += 1;
                }
            }

            let tracked = match self.tracker.track(&frame) {
                Ok(result) => Some(result),
                Err(e) => {
                    log::warn!("Pipeline: tracking failed on frame {}: {:#}", frame.index(), e);
                    None
                }
            };

            // Rejected unless a session is open; checked under the recorder's lock.
            match self.recorder.submit(&frame) {
                SubmitOutcome::Written => {
                    summary.frames_recorded += 1;
                    self.count_capture();
                }
                SubmitOutcome::EncodeFailed(_) => summary.encode_failures += 1,
                SubmitOutcome::MuxFailed(_) => summary.mux_failures += 1,
                SubmitOutcome::NoPacket | SubmitOutcome::Rejected => {}
            }

            if self.is_tracking() {
                if let (Some(sink), Some(result)) = (self.offsets.as_mut(), tracked.as_ref()) {
                    sink.forward(frame.index(), result);
                }
            }

            if last_health_log.elapsed() >= self.config.health_interval {
                let stats = self.source.stats();
                let offset = self.tracker.state().offset;
                log::info!(
                    "stream health={} frames={} decode_errors={} recorded={} offset=({}, {}) url={}",
                    self.source.is_healthy(),
                    stats.frames_decoded,
                    stats.decode_errors,
                    summary.frames_recorded,
                    offset.x,
                    offset.y,
                    stats.url
                );
                last_health_log = Instant::now();
            }
        };

        self.shutdown();
        log::info!(
            "Pipeline: stopped ({:?}) after {} frames, {} recorded",
            summary.stop_reason,
            summary.frames,
            summary.frames_recorded
        );
        Ok(summary)
    }

    /// Apply pending input events. Returns true on quit.
    fn drain_events(&mut self) -> bool {
        let Some(events) = self.events.clone() else {
            return false;
        };
        loop {
            match events.try_recv() {
                Ok(InputEvent::Quit) => return true,
                Ok(InputEvent::ToggleTracking) => {
                    let on = !self.tracking.fetch_xor(true, Ordering::SeqCst);
                    log::info!("Pipeline: tracking {}", if on { "on" } else { "off" });
                }
                Ok(InputEvent::ToggleRecording) => self.toggle_recording(),
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => {
                    self.events = None;
                    return false;
                }
            }
        }
    }

    fn toggle_recording(&mut self) {
        match self.recorder.toggle() {
            Ok(ToggleOutcome::Started { path }) => {
                log::info!("Pipeline: recording to {}", path.display());
            }
            Ok(ToggleOutcome::Stopped(summary)) => {
                log::info!("Pipeline: video saved to {}", summary.path.display());
            }
            Err(e) => log::error!("Pipeline: recording toggle failed: {:#}", e),
        }
        // A manual toggle takes over from the startup capture.
        if matches!(self.capture, Capture::Active { .. }) {
            self.capture = Capture::Done;
        }
    }

    fn refresh_stream_params(&mut self) {
        let info = self.source.stream_info();
        if info.is_none() || info == self.last_info {
            return;
        }
        self.last_info = info;
        if let Some(info) = info {
            match StreamParams::from_stream_info(&info) {
                Ok(params) => self.recorder.set_stream_params(params),
                Err(e) => log::warn!("Pipeline: stream cannot be recorded: {:#}", e),
            }
        }
    }

    fn start_capture(&mut self) {
        let Capture::Pending(limit) = self.capture else {
            return;
        };
        if self.recorder.is_recording() {
            self.capture = Capture::Done;
            return;
        }
        match self.recorder.toggle() {
            Ok(ToggleOutcome::Started { path }) => {
                log::info!("Pipeline: capturing first {} frames to {}", limit, path.display());
                self.capture = Capture::Active { limit, written: 0 };
            }
            Ok(ToggleOutcome::Stopped(_)) => self.capture = Capture::Done,
            Err(e) => {
                log::error!("Pipeline: startup capture failed: {:#}", e);
                self.capture = Capture::Done;
            }
        }
    }

    fn count_capture(&mut self) {
        let Capture::Active { limit, written } = &mut self.capture else {
            return;
        };
        *written += 1;
        if *written < *limit {
            return;
        }
        let limit = *limit;
        self.capture = Capture::Done;
        match self.recorder.stop() {
            Ok(Some(summary)) => log::info!(
                "Pipeline: captured {} frames to {}",
                limit,
                summary.path.display()
            ),
            Ok(None) => {}
            Err(e) => log::error!("Pipeline: closing startup capture failed: {:#}", e),
        }
    }

    fn shutdown(&mut self) {
        match self.recorder.stop() {
            Ok(Some(summary)) => log::info!(
                "Pipeline: closed recording {} on shutdown",
                summary.path.display()
            ),
            Ok(None) => {}
            Err(e) => log::error!("Pipeline: closing recording on shutdown failed: {:#}", e),
        }
    }
}

/// Offset sink that only remembers the most recent offset.
#[derive(Clone, Debug, Default)]
pub struct LatestOffset {
    pub frame_index: Option<u64>,
    pub offset: Offset,
}

impl OffsetSink for LatestOffset {
    fn forward(&mut self, frame_index: u64, result: &TrackResult) {
        self.frame_index = Some(frame_index);
        self.offset = result.offset;
    }
}

impl<T: OffsetSink + ?Sized> OffsetSink for &mut T {
    fn forward(&mut self, frame_index: u64, result: &TrackResult) {
        (**self).forward(frame_index, result)
    }
}

impl<T: DisplaySink + ?Sized> DisplaySink for &mut T {
    fn try_present(&mut self, frame: &RawFrame) -> bool {
        (**self).try_present(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{FrameRate, ReplaySource};
    use crate::record::{y4m, RecorderSettings, Y4mFactory};
    use crate::track::TrackerConfig;
    use image::{Rgb, RgbImage};

    fn frame(index: u64) -> RawFrame {
        RawFrame::from_rgb_image(RgbImage::from_pixel(32, 16, Rgb([30, 30, 30])), index).unwrap()
    }

    fn recorder(dir: &std::path::Path) -> Arc<RecordingController> {
        Arc::new(RecordingController::new(
            Box::new(Y4mFactory),
            RecorderSettings {
                pictures_dir: dir.to_path_buf(),
                device: "tello".into(),
            },
        ))
    }

    fn replay(count: u64) -> ReplaySource {
        ReplaySource::from_frames("test", FrameRate::fps(30), (0..count).map(frame).collect())
    }

    fn recordings(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        paths.sort();
        paths
    }

    #[test]
    fn record_first_captures_exactly_n_frames() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder(dir.path());
        let config = PipelineConfig {
            record_first: Some(4),
            ..PipelineConfig::default()
        };
        let mut driver = PipelineDriver::new(
            replay(10),
            Tracker::new(TrackerConfig::default()),
            Arc::clone(&rec),
            config,
        );
        let summary = driver.run().unwrap();

        assert_eq!(summary.frames, 10);
        assert_eq!(summary.frames_recorded, 4);
        assert!(!rec.is_recording());
        let files = recordings(dir.path());
        assert_eq!(files.len(), 1);
        assert_eq!(y4m::count_frames(&files[0]).unwrap(), 4);
    }

    #[test]
    fn decode_errors_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ReplaySource::new("test", FrameRate::fps(30));
        source.push_frame(frame(0));
        source.push_decode_error("bad slice");
        source.push_frame(frame(1));

        let mut driver = PipelineDriver::new(
            source,
            Tracker::new(TrackerConfig::default()),
            recorder(dir.path()),
            PipelineConfig::default(),
        );
        let summary = driver.run().unwrap();
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.decode_errors, 1);
        assert_eq!(summary.stop_reason, StopReason::EndOfStream);
    }

    #[test]
    fn fatal_source_error_closes_open_session() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder(dir.path());
        // The repeated index makes the replay source fail.
        let source = ReplaySource::from_frames(
            "test",
            FrameRate::fps(30),
            vec![frame(0), frame(1), frame(1)],
        );
        let config = PipelineConfig {
            record_first: Some(100),
            ..PipelineConfig::default()
        };
        let mut driver = PipelineDriver::new(
            source,
            Tracker::new(TrackerConfig::default()),
            Arc::clone(&rec),
            config,
        );
        let summary = driver.run().unwrap();
        assert!(matches!(summary.stop_reason, StopReason::SourceFailed(_)));
        assert!(!rec.is_recording());
        let files = recordings(dir.path());
        assert_eq!(y4m::count_frames(&files[0]).unwrap(), 2);
    }

    #[test]
    fn quit_event_stops_before_next_frame() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(InputEvent::Quit).unwrap();
        let mut driver = PipelineDriver::new(
            replay(5),
            Tracker::new(TrackerConfig::default()),
            recorder(dir.path()),
            PipelineConfig::default(),
        )
        .with_events(rx);
        let summary = driver.run().unwrap();
        assert_eq!(summary.frames, 0);
        assert_eq!(summary.stop_reason, StopReason::Quit);
    }

    #[test]
    fn quit_flag_stops_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = PipelineDriver::new(
            replay(5),
            Tracker::new(TrackerConfig::default()),
            recorder(dir.path()),
            PipelineConfig::default(),
        );
        driver.quit_flag().store(true, Ordering::SeqCst);
        assert_eq!(driver.run().unwrap().stop_reason, StopReason::Quit);
    }

    #[test]
    fn full_display_drops_frames_without_stalling() {
        let dir = tempfile::tempdir().unwrap();
        let (display, rx) = ChannelDisplay::bounded(2);
        let mut driver = PipelineDriver::new(
            replay(6),
            Tracker::new(TrackerConfig::default()),
            recorder(dir.path()),
            PipelineConfig::default(),
        )
        .with_display(display);
        let summary = driver.run().unwrap();
        assert_eq!(summary.frames, 6);
        assert_eq!(summary.display_drops, 4);
        let shown: Vec<u64> = rx.try_iter().map(|f| f.index()).collect();
        assert_eq!(shown, vec![0, 1]);
    }

    #[test]
    fn tracking_toggle_gates_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(InputEvent::ToggleTracking).unwrap();
        let mut latest = LatestOffset::default();
        let mut driver = PipelineDriver::new(
            replay(3),
            Tracker::new(TrackerConfig::default()),
            recorder(dir.path()),
            PipelineConfig::default(),
        )
        .with_events(rx)
        .with_offset_sink(&mut latest);
        driver.run().unwrap();
        assert!(!driver.is_tracking());
        drop(driver);
        assert_eq!(latest.frame_index, None);
    }
}
