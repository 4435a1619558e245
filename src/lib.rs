//! Skytrack
//!
//! Live video pipeline for a small aerial vehicle: decode the vehicle's compressed
//! stream, track a colored target in every frame, and record the stream on demand.
//!
//! # Architecture
//!
//! Every decoded frame passes through one loop, strictly in order:
//!
//! 1. **Display**: handed to the display sink, dropped if the sink is busy.
//! 2. **Track**: color segmentation yields an offset of the target from the frame center.
//! 3. **Record**: written to the open recording session, if any.
//! 4. **Control**: the offset is forwarded to the flight-control side while tracking is on.
//!
//! Decode, encode and mux failures affect a single frame only. Recording sessions are
//! always closed before the loop exits.
//!
//! # Module Structure
//!
//! - `frame`: decoded pictures (`RawFrame`) and pixel layouts
//! - `ingest`: frame sources (vehicle stream, synthetic scene, replay)
//! - `track`: HSV color tracker
//! - `record`: recording state machine and output containers
//! - `pipeline`: the per-frame driver and its sinks
//! - `controls`, `hud`: keyboard mapping and status text
//! - `config`, `storage`: configuration loading and output file naming

pub mod config;
pub mod controls;
pub mod frame;
pub mod hud;
pub mod ingest;
pub mod pipeline;
pub mod record;
pub mod storage;
pub mod track;

pub use config::SkytrackConfig;
pub use controls::{
    Binding, ControlMap, CustomAction, Dispatch, FlightCommand, FlightControl, KeyState,
    KeyboardSession,
};
pub use frame::{ColorRange, PixelFormat, RawFrame};
pub use hud::{Hud, HudSources, HudStatus, Telemetry};
pub use ingest::{
    FrameRate, FrameSource, ReplaySource, SourceError, SourceStats, StreamConfig, StreamInfo,
    StreamSource,
};
pub use pipeline::{
    ChannelDisplay, DisplaySink, InputEvent, LatestOffset, OffsetSink, PipelineConfig,
    PipelineDriver, PipelineSummary, StopReason,
};
pub use record::{
    ContainerFormat, RecorderSettings, RecordingController, RecordingStatus, StreamParams,
    SubmitOutcome, ToggleOutcome,
};
pub use track::{
    HsvBounds, Offset, SegmenterKind, TargetStatus, TrackResult, Tracker, TrackerConfig,
};
