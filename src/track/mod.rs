mod annotate;
pub mod backend;
pub mod backends;
pub mod color;
pub mod geometry;
mod result;
mod tracker;

pub use backend::{Blob, Segmenter, SegmenterKind};
pub use color::{Hsv, HsvBounds};
pub use geometry::{Circle, Moments};
pub use result::{Offset, Target, TargetStatus, TrackResult};
pub use tracker::{TrackState, Tracker, TrackerConfig, DEFAULT_MIN_RADIUS};
