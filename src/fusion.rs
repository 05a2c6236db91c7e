//! Motion fusion engine: two sensor deltas in, one dead-reckoning step out.
//!
//! # Geometry
//!
//! Both sensors read the ball surface. The primary sensor sits on the rig's
//! forward axis; the secondary sensor is rotated by the mount angle. With
//! `k` the calibration factor, `r` the ball radius and `φ = 90° − mount angle`:
//!
//! ```text
//! wx =  k · vm1y
//! wy = −k · vm1x
//! wz = −(k / r) · (sin φ · vm1y + vm2y) / cos φ
//! ```
//!
//! The heading integrates `θ ← θ − wz`, then the linear step `(−wy, wx)` is
//! rotated by the updated heading and added to the position:
//!
//! ```text
//! ┌x'┐   ┌x┐   ┌cos θ  −sin θ┐ ┌−wy┐
//! └y'┘ = └y┘ + └sin θ   cos θ┘ └ wx┘
//! ```
//!
//! Heading is never wrapped and no smoothing is applied. All arithmetic is
//! `f64` and evaluated in a fixed order, so identical inputs give
//! bit-identical trajectories.

use crate::config::{AxisConfig, TrackingConfig};
use crate::core::types::{Pose2D, SensorCounts, TrajectorySample};
use crate::error::Result;

/// Per-tick displacement of each sensor, in counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickDeltas {
    pub d1x: i64,
    pub d1y: i64,
    pub d2x: i64,
    pub d2y: i64,
}

impl TickDeltas {
    pub const fn new(d1x: i64, d1y: i64, d2x: i64, d2y: i64) -> Self {
        Self { d1x, d1y, d2x, d2y }
    }
}

/// Angular/linear motion of the ball for one tick
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BodyVelocity {
    pub wx: f64,
    pub wy: f64,
    pub wz: f64,
}

/// Parameters frozen at session start
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionParams {
    /// Calibration factor `k`
    pub calibration_factor: f64,
    /// Effective radius `r`
    pub radius: f64,
    /// `φ` in radians
    pub mount_complement: f64,
    pub axes: AxisConfig,
}

impl FusionParams {
    /// Validate a tracking section and freeze it
    pub fn from_config(tracking: &TrackingConfig) -> Result<Self> {
        tracking.validate()?;
        Ok(Self {
            calibration_factor: tracking.calibration_factor,
            radius: tracking.ball_radius,
            mount_complement: tracking.mount_complement_rad(),
            axes: tracking.axes,
        })
    }

    /// Apply the rig's axis convention and decompose into body motion
    pub fn velocity(&self, deltas: &TickDeltas) -> BodyVelocity {
        let vm1x = self.axes.primary_x.sign() * deltas.d1x as f64;
        let vm1y = self.axes.primary_y.sign() * deltas.d1y as f64;
        let vm2y = self.axes.secondary_y.sign() * deltas.d2y as f64;

        let k = self.calibration_factor;
        let (sin_phi, cos_phi) = self.mount_complement.sin_cos();

        BodyVelocity {
            wx: k * vm1y,
            wy: -k * vm1x,
            wz: -(k / self.radius) * (sin_phi * vm1y + vm2y) / cos_phi,
        }
    }
}

/// Dead-reckoning integrator.
///
/// Owned exclusively by the tick routine; nothing else touches the pose or
/// the previous-tick snapshots.
#[derive(Debug, Clone)]
pub struct FusionEngine {
    params: FusionParams,
    pose: Pose2D,
    before_primary: SensorCounts,
    before_secondary: SensorCounts,
    updates: u64,
}

impl FusionEngine {
    /// Engine at the origin with a zero "before" baseline
    pub fn new(params: FusionParams) -> Self {
        Self {
            params,
            pose: Pose2D::origin(),
            before_primary: SensorCounts::default(),
            before_secondary: SensorCounts::default(),
            updates: 0,
        }
    }

    pub fn params(&self) -> &FusionParams {
        &self.params
    }

    pub fn pose(&self) -> Pose2D {
        self.pose
    }

    /// Updates applied since creation or the last reset
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Back to the origin with a zero baseline
    pub fn reset(&mut self) {
        self.pose = Pose2D::origin();
        self.before_primary = SensorCounts::default();
        self.before_secondary = SensorCounts::default();
        self.updates = 0;
    }

    /// One tick from absolute counters: difference against the previous
    /// snapshot, integrate, emit a sample stamped `elapsed` seconds.
    pub fn tick(
        &mut self,
        primary: SensorCounts,
        secondary: SensorCounts,
        elapsed: f64,
    ) -> TrajectorySample {
        let deltas = TickDeltas::new(
            primary.x - self.before_primary.x,
            primary.y - self.before_primary.y,
            secondary.x - self.before_secondary.x,
            secondary.y - self.before_secondary.y,
        );
        self.before_primary = primary;
        self.before_secondary = secondary;

        self.integrate(&deltas);
        TrajectorySample {
            x: self.pose.x,
            y: self.pose.y,
            timestamp: elapsed,
        }
    }

    /// Integrate one set of per-tick deltas and return the new pose
    pub fn integrate(&mut self, deltas: &TickDeltas) -> Pose2D {
        let v = self.params.velocity(deltas);

        self.pose.theta -= v.wz;

        let (sin_t, cos_t) = self.pose.theta.sin_cos();
        let (lx, ly) = (-v.wy, v.wx);
        self.pose.x += cos_t * lx - sin_t * ly;
        self.pose.y += sin_t * lx + cos_t * ly;

        self.updates += 1;
        self.pose
    }
}
