//! Tabular layout: three append-only CSV tables
//!
//! - `trajectory.csv`: `X,Y,Timestamp`
//! - `feeding.csv`: `Timestamp,On/Off,Count`
//! - `visual_stimuli.csv`: `Timestamp,On/Off,Count`
//!
//! Each table gets its header at creation. A batch is formatted in memory and
//! handed to the OS with one `write_all` per table, so a failed write never
//! leaves buffered rows behind to be written again on retry.

use super::{FEEDING_STEM, RecordBatch, RecordInfo, RecordSink, STIMULUS_STEM, TRAJECTORY_STEM};
use crate::core::types::EventMarker;
use crate::error::Result;
use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const TRAJECTORY_HEADER: &str = "X,Y,Timestamp";
const EVENT_HEADER: &str = "Timestamp,On/Off,Count";

pub struct CsvRecorder {
    dir: PathBuf,
    trajectory: File,
    feeding: File,
    stimulus: File,
    trajectory_rows: u64,
    feeding_rows: u64,
    stimulus_rows: u64,
}

fn open_table(dir: &Path, stem: &str, header: &str) -> Result<File> {
    let path = dir.join(format!("{}.csv", stem));
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    file.write_all(format!("{}\n", header).as_bytes())?;
    Ok(file)
}

fn format_events(events: &[EventMarker]) -> String {
    let mut rows = String::new();
    for event in events {
        // Writing into a String cannot fail
        let _ = writeln!(
            rows,
            "{},{},{}",
            event.timestamp,
            event.state_label(),
            event.count
        );
    }
    rows
}

impl CsvRecorder {
    /// Create the three tables inside `dir` and write their headers
    pub fn create(dir: &Path) -> Result<Self> {
        Ok(Self {
            dir: dir.to_path_buf(),
            trajectory: open_table(dir, TRAJECTORY_STEM, TRAJECTORY_HEADER)?,
            feeding: open_table(dir, FEEDING_STEM, EVENT_HEADER)?,
            stimulus: open_table(dir, STIMULUS_STEM, EVENT_HEADER)?,
            trajectory_rows: 0,
            feeding_rows: 0,
            stimulus_rows: 0,
        })
    }
}

impl RecordSink for CsvRecorder {
    fn write_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        if !batch.trajectory.is_empty() {
            let mut rows = String::new();
            for sample in &batch.trajectory {
                let _ = writeln!(rows, "{},{},{}", sample.x, sample.y, sample.timestamp);
            }
            self.trajectory.write_all(rows.as_bytes())?;
            self.trajectory_rows += batch.trajectory.len() as u64;
        }

        if !batch.feeding.is_empty() {
            self.feeding
                .write_all(format_events(&batch.feeding).as_bytes())?;
            self.feeding_rows += batch.feeding.len() as u64;
        }

        if !batch.stimulus.is_empty() {
            self.stimulus
                .write_all(format_events(&batch.stimulus).as_bytes())?;
            self.stimulus_rows += batch.stimulus.len() as u64;
        }

        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<RecordInfo> {
        self.trajectory.sync_data()?;
        self.feeding.sync_data()?;
        self.stimulus.sync_data()?;

        Ok(RecordInfo {
            dir: self.dir.clone(),
            trajectory_rows: self.trajectory_rows,
            feeding_rows: self.feeding_rows,
            stimulus_rows: self.stimulus_rows,
        })
    }

    fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{EventKind, TrajectorySample};
    use std::fs;
    use tempfile::TempDir;

    fn marker(kind: EventKind, timestamp: f64, on: bool, count: u32) -> EventMarker {
        EventMarker {
            kind,
            timestamp,
            on,
            count,
        }
    }

    #[test]
    fn test_headers_written_on_create() {
        let dir = TempDir::new().unwrap();
        let recorder = Box::new(CsvRecorder::create(dir.path()).unwrap());
        let info = recorder.finish().unwrap();
        assert_eq!(info.trajectory_rows, 0);

        let trajectory = fs::read_to_string(dir.path().join("trajectory.csv")).unwrap();
        assert_eq!(trajectory, "X,Y,Timestamp\n");
        let feeding = fs::read_to_string(dir.path().join("feeding.csv")).unwrap();
        assert_eq!(feeding, "Timestamp,On/Off,Count\n");
        let stimulus = fs::read_to_string(dir.path().join("visual_stimuli.csv")).unwrap();
        assert_eq!(stimulus, "Timestamp,On/Off,Count\n");
    }

    #[test]
    fn test_incremental_batches() {
        let dir = TempDir::new().unwrap();
        let mut recorder = Box::new(CsvRecorder::create(dir.path()).unwrap());

        recorder
            .write_batch(&RecordBatch {
                trajectory: vec![TrajectorySample {
                    x: 1.5,
                    y: -2.0,
                    timestamp: 0.01,
                }],
                feeding: vec![marker(EventKind::Feeding, 0.5, true, 1)],
                stimulus: vec![],
            })
            .unwrap();

        // Visible on disk before finish
        let trajectory = fs::read_to_string(dir.path().join("trajectory.csv")).unwrap();
        assert_eq!(trajectory, "X,Y,Timestamp\n1.5,-2,0.01\n");

        recorder
            .write_batch(&RecordBatch {
                trajectory: vec![TrajectorySample {
                    x: 2.0,
                    y: 0.25,
                    timestamp: 0.02,
                }],
                feeding: vec![marker(EventKind::Feeding, 1.25, false, 1)],
                stimulus: vec![marker(EventKind::VisualStimulus, 2.0, true, 1)],
            })
            .unwrap();

        let info = recorder.finish().unwrap();
        assert_eq!(info.trajectory_rows, 2);
        assert_eq!(info.feeding_rows, 2);
        assert_eq!(info.stimulus_rows, 1);

        let feeding = fs::read_to_string(dir.path().join("feeding.csv")).unwrap();
        assert_eq!(
            feeding,
            "Timestamp,On/Off,Count\n0.5,On,1\n1.25,Off,1\n"
        );
        let stimulus = fs::read_to_string(dir.path().join("visual_stimuli.csv")).unwrap();
        assert_eq!(stimulus, "Timestamp,On/Off,Count\n2,On,1\n");
    }
}
