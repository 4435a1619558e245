pub mod cpu;

#[cfg(feature = "track-opencv")]
pub mod opencv;

pub use cpu::CpuSegmenter;

#[cfg(feature = "track-opencv")]
pub use self::opencv::OpenCvSegmenter;
