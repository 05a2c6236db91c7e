//! Core data types for sensor readings, poses and recorded records.

use std::fmt;

/// Signed motion delta in sensor-local counts, sign-normalized by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorDelta {
    pub dx: i32,
    pub dy: i32,
}

impl SensorDelta {
    pub const fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.dx == 0 && self.dy == 0
    }
}

/// Absolute counter pair of one physical sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorCounts {
    pub x: i64,
    pub y: i64,
}

impl SensorCounts {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// 2D pose in world units.
///
/// `theta` is the heading in radians and is never wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Pose2D {
    pub const fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    /// Pose at the world origin facing theta = 0
    pub const fn origin() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

/// One trajectory point, immutable once created
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectorySample {
    pub x: f64,
    pub y: f64,
    /// Seconds since session start
    pub timestamp: f64,
}

/// Kind of experiment event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Feeding,
    VisualStimulus,
}

impl EventKind {
    /// Human-readable label used in logs
    pub fn label(self) -> &'static str {
        match self {
            EventKind::Feeding => "Feeding",
            EventKind::VisualStimulus => "Visual Stimuli",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Experiment event marker, immutable once created
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventMarker {
    pub kind: EventKind,
    /// Seconds since session start
    pub timestamp: f64,
    pub on: bool,
    /// Sequence number of the on/off pair this marker belongs to
    pub count: u32,
}

impl EventMarker {
    /// "On" or "Off", as written to the tabular layout
    pub fn state_label(&self) -> &'static str {
        if self.on { "On" } else { "Off" }
    }
}

/// Latest pose exposed to the live view
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Telemetry {
    pub pose: Pose2D,
    /// Seconds since session start of the latest update
    pub elapsed: f64,
    /// Fusion updates so far in this session
    pub updates: u64,
}
