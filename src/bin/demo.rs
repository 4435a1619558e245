//! demo - end-to-end synthetic run: track a moving disc and record part of it

use anyhow::{anyhow, Result};
use clap::Parser;
use crossbeam_channel::Sender;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use skytrack::record::y4m;
use skytrack::{
    ContainerFormat, InputEvent, OffsetSink, PipelineConfig, PipelineDriver, RecorderSettings,
    RecordingController, StreamConfig, StreamSource, TrackResult, Tracker, TrackerConfig,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of synthetic frames.
    #[arg(long, default_value_t = 120)]
    frames: u64,
    /// Frames per second of the synthetic stream.
    #[arg(long, default_value_t = 30)]
    fps: u32,
    /// First frame (0-based) to record.
    #[arg(long, default_value_t = 30)]
    record_from: u64,
    /// Frame (0-based, exclusive) at which recording stops.
    #[arg(long, default_value_t = 90)]
    record_to: u64,
    /// Output directory for the recording.
    #[arg(long, default_value = "demo_out")]
    out: PathBuf,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

/// Toggles recording around a frame window and keeps offset statistics.
struct Director {
    events: Sender<InputEvent>,
    counter: ui::FrameCounter,
    record_from: u64,
    record_to: u64,
    locked: u64,
    max_offset: i32,
}

impl OffsetSink for Director {
    fn forward(&mut self, frame_index: u64, result: &TrackResult) {
        if result.status.target().is_some() {
            self.locked += 1;
            self.max_offset = self
                .max_offset
                .max(result.offset.x.abs())
                .max(result.offset.y.abs());
            self.counter.tick("locked");
        } else {
            self.counter.tick("searching");
        }
        // Events are applied before the next frame.
        if frame_index + 1 == self.record_from || frame_index + 1 == self.record_to {
            let _ = self.events.send(InputEvent::ToggleRecording);
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }
    if args.record_from == 0 || args.record_from >= args.record_to {
        return Err(anyhow!("need 0 < record_from < record_to"));
    }
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let source = {
        let _stage = ui.stage("Open synthetic stream");
        StreamSource::new(StreamConfig {
            url: format!("stub://demo?frames={}", args.frames),
            fps: args.fps,
            width: 320,
            height: 240,
        })?
    };
    let recorder = Arc::new(RecordingController::new(
        ContainerFormat::Y4m.factory()?,
        RecorderSettings {
            pictures_dir: args.out.clone(),
            device: "demo".to_string(),
        },
    ));

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut director = Director {
        events: tx,
        counter: ui.frames(Some(args.frames)),
        record_from: args.record_from,
        record_to: args.record_to,
        locked: 0,
        max_offset: 0,
    };

    let summary = {
        let mut driver = PipelineDriver::new(
            source,
            Tracker::new(TrackerConfig::default()),
            Arc::clone(&recorder),
            PipelineConfig::default(),
        )
        .with_offset_sink(&mut director)
        .with_events(rx);
        driver.run()?
    };
    let Director {
        counter,
        locked,
        max_offset,
        ..
    } = director;
    drop(counter);

    let recording = {
        let _stage = ui.stage("Verify recording");
        let mut files: Vec<PathBuf> = std::fs::read_dir(&args.out)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "y4m"))
            .collect();
        files.sort();
        let latest = files
            .pop()
            .ok_or_else(|| anyhow!("no recording written to {}", args.out.display()))?;
        let frames = y4m::count_frames(&latest)?;
        (latest, frames)
    };

    println!("frames processed:  {}", summary.frames);
    println!("target locked:     {} frames", locked);
    println!("max |offset|:      {} px", max_offset);
    println!(
        "recording:         {} ({} frames)",
        recording.0.display(),
        recording.1
    );
    Ok(())
}
