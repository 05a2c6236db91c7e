//! Live view window
//!
//! The live view shows a square window of half-size `canvas_half_size`,
//! initially centred on the origin. When the animal walks out of it the
//! window jumps to re-centre on the current position.

use crate::core::types::{Telemetry, TrajectorySample};
use crate::session::SessionState;

/// Axis-aligned view window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    half_size: f64,
    center_x: f64,
    center_y: f64,
}

/// Inclusive bounds of a [`Viewport`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Viewport {
    pub fn new(half_size: f64) -> Self {
        Self {
            half_size,
            center_x: 0.0,
            center_y: 0.0,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.center_x, self.center_y)
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            min_x: self.center_x - self.half_size,
            max_x: self.center_x + self.half_size,
            min_y: self.center_y - self.half_size,
            max_y: self.center_y + self.half_size,
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        let b = self.bounds();
        (b.min_x..=b.max_x).contains(&x) && (b.min_y..=b.max_y).contains(&y)
    }

    /// Re-centre on (x, y) if it left the window. Returns true on a jump.
    pub fn follow(&mut self, x: f64, y: f64) -> bool {
        if self.contains(x, y) {
            return false;
        }
        self.center_x = x;
        self.center_y = y;
        true
    }

    /// Back to the origin, for a new session
    pub fn reset(&mut self) {
        self.center_x = 0.0;
        self.center_y = 0.0;
    }

    /// Trail samples that fall inside the window
    pub fn visible<'a>(
        &'a self,
        trail: &'a [TrajectorySample],
    ) -> impl Iterator<Item = &'a TrajectorySample> + 'a {
        trail.iter().filter(|s| self.contains(s.x, s.y))
    }
}

/// One-line status for the terminal front end
pub fn status_line(
    state: SessionState,
    telemetry: &Telemetry,
    viewport: &Viewport,
    visible: usize,
) -> String {
    let (cx, cy) = viewport.center();
    format!(
        "[{:>9}] t={:8.2}s  x={:9.3}  y={:9.3}  θ={:8.3}  n={:<7} view=({:.1}, {:.1}) trail={}",
        state,
        telemetry.elapsed,
        telemetry.pose.x,
        telemetry.pose.y,
        telemetry.pose.theta,
        telemetry.updates,
        cx,
        cy,
        visible
    )
}
