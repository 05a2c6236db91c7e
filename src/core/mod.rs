//! Core data types shared by the decoders, the fusion engine and the session.
//!
//! - [`types`]: sensor deltas, poses, trajectory samples, event markers
//! - [`history`]: bounded FIFO used for the live trail and pending records

pub mod history;
pub mod types;
