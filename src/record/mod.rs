//! On-demand recording of the live stream.
//!
//! `RecordingController` owns at most one `RecordingSession`. Sessions write through
//! an `OutputContainer` opened by a `ContainerFactory`: YUV4MPEG2 is always available,
//! MP4 needs the `record-ffmpeg` feature.

mod container;
mod controller;
#[cfg(feature = "record-ffmpeg")]
mod mp4_ffmpeg;
mod session;
pub mod y4m;

pub use container::{
    ContainerFactory, ContainerFormat, EncodedPacket, EncoderInput, OutputContainer, StreamParams,
};
pub use controller::{
    RecorderSettings, RecordingController, RecordingStatus, SubmitOutcome, ToggleOutcome,
};
#[cfg(feature = "record-ffmpeg")]
pub use mp4_ffmpeg::Mp4Factory;
pub use session::{RecordingSession, SessionSummary};
pub use y4m::Y4mFactory;
