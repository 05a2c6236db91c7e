//! Bulk-array layout: three NumPy `.npy` files written at session end
//!
//! - `trajectory.npy`: `float64`, shape `(N, 3)` with columns x, y, t
//! - `feeding.npy`: `float64`, shape `(M, 1)`, feeding-on timestamps
//! - `visual_stimuli.npy`: `float64`, shape `(K,)`, stimulus-on timestamps
//!
//! Files use format version 1.0: magic, version, little-endian `u16` header
//! length, an ASCII dict header padded with spaces to a 64-byte boundary and
//! terminated by `\n`, then the raw little-endian C-order data.

use super::{FEEDING_STEM, RecordBatch, RecordInfo, RecordSink, STIMULUS_STEM, TRAJECTORY_STEM};
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
const NPY_VERSION: [u8; 2] = [1, 0];
const NPY_ALIGN: usize = 64;

/// Magic (6) + version (2) + header length (2)
const PREAMBLE_LEN: usize = 10;

fn shape_literal(shape: &[usize]) -> String {
    match shape {
        [n] => format!("({},)", n),
        dims => {
            let parts: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
            format!("({})", parts.join(", "))
        }
    }
}

fn header_for(shape: &[usize]) -> Result<Vec<u8>> {
    let dict = format!(
        "{{'descr': '<f8', 'fortran_order': False, 'shape': {}, }}",
        shape_literal(shape)
    );

    // Pad so that preamble + header (including the newline) is aligned
    let unpadded = PREAMBLE_LEN + dict.len() + 1;
    let padding = (NPY_ALIGN - unpadded % NPY_ALIGN) % NPY_ALIGN;

    let mut header = dict.into_bytes();
    header.resize(header.len() + padding, b' ');
    header.push(b'\n');

    if header.len() > u16::MAX as usize {
        return Err(Error::Storage(format!(
            "npy header too long ({} bytes)",
            header.len()
        )));
    }
    Ok(header)
}

/// Write a C-order `float64` array of `shape` to `path`
pub fn write_npy(path: &Path, shape: &[usize], data: &[f64]) -> Result<()> {
    let expected: usize = shape.iter().product();
    if expected != data.len() {
        return Err(Error::Storage(format!(
            "{}: shape {} needs {} values, got {}",
            path.display(),
            shape_literal(shape),
            expected,
            data.len()
        )));
    }

    let header = header_for(shape)?;
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(NPY_MAGIC)?;
    writer.write_all(&NPY_VERSION)?;
    writer.write_all(&(header.len() as u16).to_le_bytes())?;
    writer.write_all(&header)?;
    for value in data {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

/// Stages everything in memory and writes the arrays in [`RecordSink::finish`]
pub struct NpyRecorder {
    dir: PathBuf,
    /// Row-major (x, y, t)
    trajectory: Vec<f64>,
    feeding_on: Vec<f64>,
    stimulus_on: Vec<f64>,
}

impl NpyRecorder {
    pub fn create(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            trajectory: Vec::new(),
            feeding_on: Vec::new(),
            stimulus_on: Vec::new(),
        }
    }

    fn path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{}.npy", stem))
    }
}

impl RecordSink for NpyRecorder {
    fn write_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        self.trajectory.reserve(batch.trajectory.len() * 3);
        for sample in &batch.trajectory {
            self.trajectory
                .extend_from_slice(&[sample.x, sample.y, sample.timestamp]);
        }

        // Off markers carry no information the array layout keeps
        self.feeding_on.extend(
            batch
                .feeding
                .iter()
                .filter(|event| event.on)
                .map(|event| event.timestamp),
        );
        self.stimulus_on.extend(
            batch
                .stimulus
                .iter()
                .filter(|event| event.on)
                .map(|event| event.timestamp),
        );
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<RecordInfo> {
        let rows = self.trajectory.len() / 3;
        write_npy(&self.path(TRAJECTORY_STEM), &[rows, 3], &self.trajectory)?;
        write_npy(
            &self.path(FEEDING_STEM),
            &[self.feeding_on.len(), 1],
            &self.feeding_on,
        )?;
        write_npy(
            &self.path(STIMULUS_STEM),
            &[self.stimulus_on.len()],
            &self.stimulus_on,
        )?;

        log::debug!(
            "Wrote npy arrays to {} ({} trajectory rows)",
            self.dir.display(),
            rows
        );

        Ok(RecordInfo {
            dir: self.dir.clone(),
            trajectory_rows: rows as u64,
            feeding_rows: self.feeding_on.len() as u64,
            stimulus_rows: self.stimulus_on.len() as u64,
        })
    }

    fn dir(&self) -> &Path {
        &self.dir
    }
}
