use crate::frame::RawFrame;

use super::geometry::Circle;

/// Signed pixel displacement of the target from the fixed frame center.
/// Positive `y` means the target is above center.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Offset {
    pub x: i32,
    pub y: i32,
}

impl Offset {
    pub const ZERO: Offset = Offset { x: 0, y: 0 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A target accepted for tracking in the current frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Target {
    pub circle: Circle,
    pub centroid: (i32, i32),
}

/// How the current frame resolved.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TargetStatus {
    /// The mask had no contours.
    NotFound,
    /// The largest contour encloses no area.
    Degenerate,
    /// The largest contour's enclosing circle is below the minimum radius.
    TooSmall { radius: f64 },
    Locked(Target),
}

impl TargetStatus {
    pub fn target(&self) -> Option<&Target> {
        match self {
            TargetStatus::Locked(target) => Some(target),
            _ => None,
        }
    }
}

/// Result of tracking one frame.
#[derive(Debug)]
pub struct TrackResult {
    pub offset: Offset,
    pub status: TargetStatus,
    /// Copy of the input frame with the overlays drawn.
    pub annotated: RawFrame,
}
