//! ballpath - dual optical-sensor dead reckoning for ball treadmill rigs
//!
//! Two mouse sensors read the surface of an air-supported ball. Their
//! per-tick deltas are fused into a heading and a 2D trajectory, shown live
//! and optionally recorded together with experiment event markers.
//!
//! ## Features
//!
//! - `usb` (default): bind sensors over libusb. Without it only the mock
//!   transport is available, which is enough for the library and its tests.

pub mod config;
pub mod core;
pub mod devices;
pub mod display;
pub mod error;
pub mod fusion;
pub mod recording;
pub mod scheduler;
pub mod sensor;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use config::AppConfig;
pub use core::types::{EventKind, EventMarker, Pose2D, Telemetry, TrajectorySample};
pub use error::{Error, Result};
pub use fusion::{FusionEngine, FusionParams, TickDeltas};
pub use session::{SessionController, SessionMode, SessionState, SessionSummary};
