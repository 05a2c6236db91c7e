//! Session recording
//!
//! The session controller drains its pending-record buffers into a
//! [`RecordSink`] on the flush cadence and once more at stop. Two layouts are
//! provided:
//!
//! - [`CsvRecorder`]: three append-only tables flushed incrementally
//! - [`NpyRecorder`]: three NumPy arrays written once when the session ends
//!
//! Both write into `<output_dir>/runs/<YYYY_MM_DD_HH_MM_SS>/`.

mod csv;
mod npy;

pub use csv::CsvRecorder;
pub use npy::{NpyRecorder, write_npy};

use crate::config::RecordLayout;
use crate::core::types::{EventMarker, TrajectorySample};
use crate::error::Result;
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};

pub const TRAJECTORY_STEM: &str = "trajectory";
pub const FEEDING_STEM: &str = "feeding";
pub const STIMULUS_STEM: &str = "visual_stimuli";

/// Records drained from the pending buffers in one flush
#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    pub trajectory: Vec<TrajectorySample>,
    pub feeding: Vec<EventMarker>,
    pub stimulus: Vec<EventMarker>,
}

impl RecordBatch {
    pub fn is_empty(&self) -> bool {
        self.trajectory.is_empty() && self.feeding.is_empty() && self.stimulus.is_empty()
    }

    /// Total rows across all three record kinds
    pub fn rows(&self) -> usize {
        self.trajectory.len() + self.feeding.len() + self.stimulus.len()
    }

    /// Split into one batch per table (trajectory, feeding, stimulus), so a
    /// failed write can be retried without re-sending the tables that landed
    pub fn into_tables(self) -> [RecordBatch; 3] {
        [
            RecordBatch {
                trajectory: self.trajectory,
                ..Default::default()
            },
            RecordBatch {
                feeding: self.feeding,
                ..Default::default()
            },
            RecordBatch {
                stimulus: self.stimulus,
                ..Default::default()
            },
        ]
    }
}

/// Summary of a finished recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordInfo {
    pub dir: PathBuf,
    pub trajectory_rows: u64,
    pub feeding_rows: u64,
    pub stimulus_rows: u64,
}

/// Durable destination for session records
pub trait RecordSink: Send {
    /// Persist (or stage) one drained batch
    fn write_batch(&mut self, batch: &RecordBatch) -> Result<()>;

    /// Write anything still staged and close the outputs
    fn finish(self: Box<Self>) -> Result<RecordInfo>;

    /// Directory holding this session's outputs
    fn dir(&self) -> &Path;
}

/// `<root>/runs/<YYYY_MM_DD_HH_MM_SS>`, suffixed `_1`, `_2`… if already taken
pub fn session_dir(root: &Path, started: &DateTime<Local>) -> PathBuf {
    let runs = root.join("runs");
    let stamp = started.format("%Y_%m_%d_%H_%M_%S").to_string();

    let mut candidate = runs.join(&stamp);
    let mut suffix = 1;
    while candidate.exists() {
        candidate = runs.join(format!("{}_{}", stamp, suffix));
        suffix += 1;
    }
    candidate
}

/// Create the session directory and open a sink of the requested layout
pub fn create_sink(
    layout: RecordLayout,
    root: &Path,
    started: &DateTime<Local>,
) -> Result<Box<dyn RecordSink>> {
    let dir = session_dir(root, started);
    fs::create_dir_all(&dir)?;
    log::info!("Recording to {} ({:?} layout)", dir.display(), layout);

    let sink: Box<dyn RecordSink> = match layout {
        RecordLayout::Csv => Box::new(CsvRecorder::create(&dir)?),
        RecordLayout::Npy => Box::new(NpyRecorder::create(&dir)),
    };
    Ok(sink)
}
