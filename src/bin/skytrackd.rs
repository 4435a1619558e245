//! skytrackd - live video pipeline daemon
//!
//! This daemon:
//! 1. Opens the vehicle's video stream (or a synthetic `stub://` scene)
//! 2. Tracks the configured target color in every frame
//! 3. Records the stream on demand (key `r`)
//! 4. Reads key events from stdin and maps them to vehicle commands
//!
//! Key protocol on stdin, one per line: `w` (press and release), `+w` (press), `-w` (release).

use anyhow::{anyhow, Result};
use clap::Parser;
use crossbeam_channel::Receiver;
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError};

use skytrack::storage::save_snapshot;
use skytrack::{
    ChannelDisplay, ContainerFormat, ControlMap, FlightCommand, FlightControl, Hud, HudSources,
    KeyState, KeyboardSession, OffsetSink, PipelineConfig, PipelineDriver, RawFrame,
    RecordingController, SkytrackConfig, StopReason, StreamSource, Telemetry, TrackResult,
    Tracker,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Stream URL (overrides config and SKYTRACK_STREAM_URL).
    #[arg(long)]
    url: Option<String>,
    /// Record the first N frames, then stop that recording.
    #[arg(long, value_name = "N")]
    record_first: Option<u64>,
    /// Start with tracking disabled (toggle with `t`).
    #[arg(long)]
    no_tracking: bool,
    /// Ignore stdin key events.
    #[arg(long)]
    no_keyboard: bool,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

/// Most recent frame handed to the display, shared with the picture key.
type LatestFrame = Arc<Mutex<Option<RawFrame>>>;

/// Stands in for the vehicle link: commands are logged, not transmitted.
/// Pictures are taken from the video feed instead of the vehicle camera.
struct LoggedVehicle {
    latest: LatestFrame,
    pictures_dir: PathBuf,
    device: String,
}

impl FlightControl for LoggedVehicle {
    fn send(&mut self, command: FlightCommand, speed: u32) -> Result<()> {
        log::info!("vehicle: {} {}", command.name(), speed);
        Ok(())
    }

    fn takeoff(&mut self) -> Result<()> {
        log::info!("vehicle: takeoff");
        Ok(())
    }

    fn land(&mut self) -> Result<()> {
        log::info!("vehicle: land");
        Ok(())
    }

    fn palm_land(&mut self) -> Result<()> {
        log::info!("vehicle: palm_land");
        Ok(())
    }

    fn take_picture(&mut self) -> Result<()> {
        let frame = self
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| anyhow!("no frame decoded yet"))?;
        let path = save_snapshot(&self.pictures_dir, &self.device, &frame)?;
        log::info!("vehicle: take_picture -> {}", path.display());
        Ok(())
    }

    fn set_zoom(&mut self, zoomed: bool) -> Result<()> {
        log::info!("vehicle: video mode {}", if zoomed { "VID" } else { "PIC" });
        Ok(())
    }
}

struct LoggedOffsets {
    last: Option<(i32, i32)>,
}

impl OffsetSink for LoggedOffsets {
    fn forward(&mut self, frame_index: u64, result: &TrackResult) {
        let offset = (result.offset.x, result.offset.y);
        if self.last != Some(offset) {
            log::debug!("frame {}: offset {:?} ({:?})", frame_index, offset, result.status);
            self.last = Some(offset);
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let mut cfg = {
        let _stage = ui.stage("Load configuration");
        SkytrackConfig::load()?
    };
    if let Some(url) = args.url {
        cfg.stream.url = url;
    }
    let record_first = args.record_first.or(cfg.recording.record_first);

    let source = {
        let _stage = ui.stage("Open stream");
        StreamSource::new(cfg.stream.clone())?
    };
    if cfg.recording.container != ContainerFormat::Mp4 {
        log::warn!(
            "recordings are written as .{}; build with --features record-ffmpeg for .mp4",
            cfg.recording.container.extension()
        );
    }
    let recorder = Arc::new(RecordingController::new(
        cfg.recording.container.factory()?,
        cfg.recorder_settings(),
    ));
    let tracker = Tracker::with_segmenter(cfg.tracker_config()?, cfg.tracker.backend.create()?);
    log::info!("tracker backend: {}", tracker.backend_name());

    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let (display, frames) = ChannelDisplay::bounded(2);

    let mut driver = PipelineDriver::new(
        source,
        tracker,
        Arc::clone(&recorder),
        PipelineConfig {
            record_first,
            tracking: !args.no_tracking,
            ..PipelineConfig::default()
        },
    )
    .with_display(display)
    .with_offset_sink(LoggedOffsets { last: None })
    .with_events(event_rx);

    let quit = driver.quit_flag();
    {
        let quit = Arc::clone(&quit);
        ctrlc::set_handler(move || {
            log::info!("quit requested");
            quit.store(true, Ordering::SeqCst);
        })?;
    }

    let latest: LatestFrame = Arc::new(Mutex::new(None));
    let settings = cfg.recorder_settings();
    let session = KeyboardSession::new(
        ControlMap::default(),
        cfg.control.speed,
        LoggedVehicle {
            latest: Arc::clone(&latest),
            pictures_dir: settings.pictures_dir,
            device: settings.device,
        },
        event_tx.clone(),
    );
    let sources = HudSources {
        zoomed: session.zoom_flag(),
        tracking: driver.tracking_flag(),
        recorder: Arc::clone(&recorder),
    };
    if !args.no_keyboard {
        std::thread::spawn(move || read_keys(session));
    }
    spawn_hud(frames, sources, latest, ui.frames(None));

    log::info!(
        "skytrackd running. stream={} recordings={} ({:?})",
        cfg.stream.url,
        cfg.recording.pictures_dir.display(),
        cfg.recording.container
    );
    let summary = driver.run()?;
    drop(event_tx);

    log::info!(
        "frames={} decode_errors={} recorded={} encode_failures={} mux_failures={} display_drops={}",
        summary.frames,
        summary.decode_errors,
        summary.frames_recorded,
        summary.encode_failures,
        summary.mux_failures,
        summary.display_drops
    );
    match summary.stop_reason {
        StopReason::SourceFailed(reason) => Err(anyhow!("stream failed: {}", reason)),
        StopReason::EndOfStream | StopReason::Quit => Ok(()),
    }
}

fn read_keys(mut session: KeyboardSession<LoggedVehicle>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            break;
        };
        let line = line.trim();
        let events: Vec<(&str, KeyState)> = if let Some(key) = line.strip_prefix('+') {
            vec![(key, KeyState::Pressed)]
        } else if let Some(key) = line.strip_prefix('-') {
            vec![(key, KeyState::Released)]
        } else if line.is_empty() {
            continue;
        } else {
            vec![(line, KeyState::Pressed), (line, KeyState::Released)]
        };
        for (key, state) in events {
            if let Err(e) = session.handle(key, state) {
                log::warn!("key '{}': {:#}", key, e);
                return;
            }
        }
    }
}

fn spawn_hud(
    frames: Receiver<RawFrame>,
    sources: HudSources,
    latest: LatestFrame,
    mut counter: ui::FrameCounter,
) {
    std::thread::spawn(move || {
        let mut hud = Hud::new();
        let telemetry = Telemetry::default();
        for frame in frames.iter() {
            *latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
            if hud.update(&telemetry, &sources.snapshot()) {
                log::debug!("hud: {}", hud.lines().join(" | "));
            }
            let rec = hud
                .lines()
                .into_iter()
                .find(|line| line.starts_with("REC"))
                .unwrap_or("");
            counter.tick(rec);
        }
    });
}
