use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use crossbeam_channel::Sender;
use image::{Rgb, RgbImage};

use skytrack::record::{
    y4m, ContainerFactory, EncodedPacket, EncoderInput, OutputContainer, RecorderSettings,
    RecordingController, RecordingStatus, StreamParams, SubmitOutcome, ToggleOutcome, Y4mFactory,
};
use skytrack::{
    FrameRate, InputEvent, OffsetSink, PipelineConfig, PipelineDriver, PixelFormat, RawFrame,
    ReplaySource, StopReason, StreamConfig, StreamSource, TrackResult, Tracker, TrackerConfig,
};

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;

fn frame(index: u64) -> RawFrame {
    RawFrame::from_rgb_image(
        RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([30, 30, 30])),
        index,
    )
    .unwrap()
}

fn params() -> StreamParams {
    StreamParams {
        width: WIDTH,
        height: HEIGHT,
        frame_rate: FrameRate::fps(30),
        pixel_format: PixelFormat::Yuv420p,
    }
}

fn settings(dir: &Path) -> RecorderSettings {
    RecorderSettings {
        pictures_dir: dir.to_path_buf(),
        device: "tello".to_string(),
    }
}

fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    };
    files.sort();
    files
}

/// Sends recording toggles after chosen frame indices.
struct ToggleAfter {
    events: Sender<InputEvent>,
    after: Vec<u64>,
    seen: Vec<u64>,
}

impl OffsetSink for ToggleAfter {
    fn forward(&mut self, frame_index: u64, _result: &TrackResult) {
        self.seen.push(frame_index);
        if self.after.contains(&frame_index) {
            self.events.send(InputEvent::ToggleRecording).unwrap();
        }
    }
}

#[test]
fn records_exactly_the_frames_between_toggles() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(RecordingController::new(
        Box::new(Y4mFactory),
        settings(dir.path()),
    ));
    let source = StreamSource::new(StreamConfig {
        url: "stub://e2e?frames=10".to_string(),
        fps: 30,
        width: 160,
        height: 120,
    })
    .unwrap();

    // Frames are numbered from 1: toggle before frame 3 and after frame 8.
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut director = ToggleAfter {
        events: tx,
        after: vec![1, 7],
        seen: Vec::new(),
    };
    let summary = {
        let mut driver = PipelineDriver::new(
            source,
            Tracker::new(TrackerConfig::default()),
            Arc::clone(&recorder),
            PipelineConfig::default(),
        )
        .with_events(rx)
        .with_offset_sink(&mut director);
        driver.run().unwrap()
    };

    assert_eq!(summary.frames, 10);
    assert_eq!(summary.frames_recorded, 6);
    assert_eq!(summary.stop_reason, StopReason::EndOfStream);
    assert_eq!(director.seen, (0..10).collect::<Vec<u64>>());
    assert!(!recorder.is_recording());

    let files = files_in(dir.path());
    assert_eq!(files.len(), 1);
    assert_eq!(y4m::count_frames(&files[0]).unwrap(), 6);
    let header = y4m::read_header(&files[0]).unwrap();
    assert_eq!((header.width, header.height), (160, 120));
    assert_eq!(header.frame_rate, FrameRate::fps(30));
}

#[test]
fn start_then_stop_without_frames_leaves_valid_empty_file() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = RecordingController::new(Box::new(Y4mFactory), settings(dir.path()));
    recorder.set_stream_params(params());

    assert!(matches!(
        recorder.toggle().unwrap(),
        ToggleOutcome::Started { .. }
    ));
    let summary = match recorder.toggle().unwrap() {
        ToggleOutcome::Stopped(summary) => summary,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(recorder.status(), RecordingStatus::Idle);
    assert_eq!(summary.frames_written, 0);
    assert_eq!(y4m::count_frames(&summary.path).unwrap(), 0);
    assert_eq!(y4m::read_header(&summary.path).unwrap().width, WIDTH);
}

#[test]
fn submit_while_idle_is_rejected_and_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let pictures = dir.path().join("pictures");
    let recorder = RecordingController::new(Box::new(Y4mFactory), settings(&pictures));
    recorder.set_stream_params(params());

    for i in 0..3 {
        assert_eq!(recorder.submit(&frame(i)), SubmitOutcome::Rejected);
    }
    assert!(!recorder.is_recording());
    assert!(files_in(&pictures).is_empty());
}

/// Y4M container that fails chosen operations.
struct FaultyFactory {
    fail_encode_at: Option<i64>,
    fail_mux_at: Option<i64>,
    fail_close: bool,
}

struct FaultyContainer {
    inner: Box<dyn OutputContainer>,
    fail_encode_at: Option<i64>,
    fail_mux_at: Option<i64>,
    fail_close: bool,
}

impl ContainerFactory for FaultyFactory {
    fn name(&self) -> &'static str {
        "faulty-y4m"
    }

    fn extension(&self) -> &'static str {
        "y4m"
    }

    fn open(&self, path: &Path, params: &StreamParams) -> Result<Box<dyn OutputContainer>> {
        Ok(Box::new(FaultyContainer {
            inner: Y4mFactory.open(path, params)?,
            fail_encode_at: self.fail_encode_at,
            fail_mux_at: self.fail_mux_at,
            fail_close: self.fail_close,
        }))
    }
}

impl OutputContainer for FaultyContainer {
    fn encode(&mut self, input: &EncoderInput) -> Result<Option<EncodedPacket>> {
        if self.fail_encode_at == Some(input.pts) {
            return Err(anyhow!("injected encode failure"));
        }
        self.inner.encode(input)
    }

    fn mux(&mut self, packet: EncodedPacket) -> Result<()> {
        if packet.pts.is_some() && packet.pts == self.fail_mux_at {
            return Err(anyhow!("injected mux failure"));
        }
        self.inner.mux(packet)
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()?;
        if self.fail_close {
            return Err(anyhow!("injected close failure"));
        }
        Ok(())
    }
}

#[test]
fn encode_failure_on_one_frame_does_not_stop_the_next() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = RecordingController::new(
        Box::new(FaultyFactory {
            fail_encode_at: Some(2),
            fail_mux_at: None,
            fail_close: false,
        }),
        settings(dir.path()),
    );
    recorder.set_stream_params(params());
    recorder.toggle().unwrap();

    let outcomes: Vec<SubmitOutcome> = (0..5).map(|i| recorder.submit(&frame(i))).collect();
    assert_eq!(outcomes[1], SubmitOutcome::Written);
    assert!(matches!(outcomes[2], SubmitOutcome::EncodeFailed(_)));
    assert_eq!(outcomes[3], SubmitOutcome::Written);
    assert!(recorder.is_recording());

    let summary = recorder.stop().unwrap().unwrap();
    assert_eq!(summary.frames_written, 4);
    assert_eq!(summary.encode_failures, 1);
    assert_eq!(y4m::count_frames(&summary.path).unwrap(), 4);
}

#[test]
fn mux_failure_is_reported_per_frame() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = RecordingController::new(
        Box::new(FaultyFactory {
            fail_encode_at: None,
            fail_mux_at: Some(0),
            fail_close: false,
        }),
        settings(dir.path()),
    );
    recorder.set_stream_params(params());
    recorder.toggle().unwrap();

    assert!(matches!(
        recorder.submit(&frame(0)),
        SubmitOutcome::MuxFailed(_)
    ));
    assert_eq!(recorder.submit(&frame(1)), SubmitOutcome::Written);
    let summary = recorder.stop().unwrap().unwrap();
    assert_eq!(summary.mux_failures, 1);
    assert_eq!(summary.frames_written, 1);
}

#[test]
fn close_failure_still_returns_to_idle() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = RecordingController::new(
        Box::new(FaultyFactory {
            fail_encode_at: None,
            fail_mux_at: None,
            fail_close: true,
        }),
        settings(dir.path()),
    );
    recorder.set_stream_params(params());
    recorder.toggle().unwrap();
    recorder.submit(&frame(0));

    assert!(recorder.toggle().is_err());
    assert_eq!(recorder.status(), RecordingStatus::Idle);
    assert_eq!(recorder.submit(&frame(1)), SubmitOutcome::Rejected);

    // The next toggle opens a fresh session.
    assert!(matches!(
        recorder.toggle().unwrap(),
        ToggleOutcome::Started { .. }
    ));
}

#[test]
fn open_failure_leaves_controller_idle() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();

    let recorder = RecordingController::new(Box::new(Y4mFactory), settings(&blocker));
    recorder.set_stream_params(params());
    assert!(recorder.toggle().is_err());
    assert!(!recorder.is_recording());
    assert_eq!(recorder.submit(&frame(0)), SubmitOutcome::Rejected);
}

#[test]
fn startup_capture_really_stops_and_later_toggles_work() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(RecordingController::new(
        Box::new(Y4mFactory),
        settings(dir.path()),
    ));
    let source = ReplaySource::from_frames(
        "capture",
        FrameRate::fps(30),
        (0..12).map(frame).collect(),
    );

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut director = ToggleAfter {
        events: tx,
        after: vec![7, 9],
        seen: Vec::new(),
    };
    let summary = {
        let mut driver = PipelineDriver::new(
            source,
            Tracker::new(TrackerConfig::default()),
            Arc::clone(&recorder),
            PipelineConfig {
                record_first: Some(3),
                ..PipelineConfig::default()
            },
        )
        .with_events(rx)
        .with_offset_sink(&mut director);
        driver.run().unwrap()
    };

    // Frames 0..3 from the startup capture, then 8 and 9 from the manual toggle.
    assert_eq!(summary.frames_recorded, 5);
    let files = files_in(dir.path());
    assert_eq!(files.len(), 2);
    let mut counts: Vec<u64> = files
        .iter()
        .map(|path| y4m::count_frames(path).unwrap())
        .collect();
    counts.sort();
    assert_eq!(counts, vec![2, 3]);
}
