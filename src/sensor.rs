//! Sensor accumulators
//!
//! Each physical sensor gets a dedicated polling thread that blocks on the
//! next raw report, decodes it and adds the delta to an absolute (X, Y)
//! counter. The fusion tick reads the counter pair under a short lock, so it
//! always sees a consistent pair.
//!
//! # Error policy
//!
//! Read failures (timeouts, dropped transfers, malformed reports) are counted
//! and the read is retried immediately. Nothing is propagated to the fusion
//! engine and the loop only exits when its accumulator is shut down.
//!
//! Polling threads outlive sessions: binding a device is expensive, so the
//! same accumulators are cleared and reused for every session.

use crate::core::types::{SensorCounts, SensorDelta};
use crate::devices::SensorModel;
use crate::error::{Error, Result};
use crate::transport::ReportSource;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

/// Read errors between throttled log lines
const ERROR_LOG_INTERVAL: u64 = 1000;

/// Absolute counters of one sensor, written by its polling loop only
#[derive(Debug, Default)]
pub struct SensorCounters {
    counts: Mutex<SensorCounts>,
    reports: AtomicU64,
    read_errors: AtomicU64,
}

impl SensorCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a decoded delta to the running counters
    #[inline]
    pub fn add(&self, delta: SensorDelta) {
        {
            let mut counts = self.counts.lock();
            counts.x += i64::from(delta.dx);
            counts.y += i64::from(delta.dy);
        }
        self.reports.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent copy of the (X, Y) pair
    #[inline]
    pub fn snapshot(&self) -> SensorCounts {
        *self.counts.lock()
    }

    /// Reset (X, Y) to (0, 0)
    pub fn clear(&self) {
        *self.counts.lock() = SensorCounts::default();
    }

    /// Reports decoded since creation
    pub fn reports(&self) -> u64 {
        self.reports.load(Ordering::Relaxed)
    }

    /// Failed reads since creation (timeouts excluded)
    pub fn read_errors(&self) -> u64 {
        self.read_errors.load(Ordering::Relaxed)
    }

    fn record_error(&self) -> u64 {
        self.read_errors.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Polling loop: read, decode, accumulate, forever
fn polling_loop<S: ReportSource>(
    mut source: S,
    model: &'static SensorModel,
    counters: Arc<SensorCounters>,
    shutdown: Arc<AtomicBool>,
    name: String,
) {
    let mut buffer = vec![0u8; model.report_length];
    log::debug!("{}: polling {}", name, source.describe());

    while !shutdown.load(Ordering::Relaxed) {
        let failure = match source.read_report(&mut buffer) {
            Ok(n) => match model.decode(&buffer[..n]) {
                Ok(delta) => {
                    counters.add(delta);
                    log::trace!("{}: dx={} dy={}", name, delta.dx, delta.dy);
                    continue;
                }
                Err(e) => e,
            },
            // No report within the transport timeout
            Err(Error::Timeout) => continue,
            Err(e) => e,
        };

        let errors = counters.record_error();
        if errors == 1 || errors % ERROR_LOG_INTERVAL == 0 {
            log::debug!("{}: read failed ({} so far), retrying: {}", name, errors, failure);
        }
    }

    log::debug!("{}: polling thread exiting", name);
}

/// One physical sensor: its counters plus the thread that feeds them
pub struct SensorAccumulator {
    name: String,
    counters: Arc<SensorCounters>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SensorAccumulator {
    /// Start polling `source` on a dedicated thread
    pub fn spawn<S>(name: &str, model: &'static SensorModel, source: S) -> Result<Self>
    where
        S: ReportSource + 'static,
    {
        let counters = Arc::new(SensorCounters::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_counters = Arc::clone(&counters);
        let thread_shutdown = Arc::clone(&shutdown);
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(format!("sensor-{}", name))
            .spawn(move || {
                polling_loop(source, model, thread_counters, thread_shutdown, thread_name);
            })
            .map_err(|e| Error::Other(format!("Failed to spawn {} polling thread: {}", name, e)))?;

        log::info!("Sensor '{}' polling started ({})", name, model.name);

        Ok(Self {
            name: name.to_string(),
            counters,
            shutdown,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared handle to the counters, for the fusion tick
    pub fn counters(&self) -> Arc<SensorCounters> {
        Arc::clone(&self.counters)
    }

    pub fn snapshot(&self) -> SensorCounts {
        self.counters.snapshot()
    }

    /// Drop drift accumulated while idle
    pub fn clear(&self) {
        self.counters.clear();
    }

    /// Stop the polling thread and wait for it
    pub fn shutdown(&mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| Error::ThreadPanic)?;
            log::debug!("Sensor '{}' polling stopped", self.name);
        }
        Ok(())
    }
}

impl Drop for SensorAccumulator {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// The two sensors of a rig
pub struct SensorPair {
    primary: SensorAccumulator,
    secondary: SensorAccumulator,
}

impl SensorPair {
    pub fn new(primary: SensorAccumulator, secondary: SensorAccumulator) -> Self {
        Self { primary, secondary }
    }

    /// Start polling loops over two already-bound sources
    pub fn spawn<P, S>(model: &'static SensorModel, primary: P, secondary: S) -> Result<Self>
    where
        P: ReportSource + 'static,
        S: ReportSource + 'static,
    {
        Ok(Self::new(
            SensorAccumulator::spawn("primary", model, primary)?,
            SensorAccumulator::spawn("secondary", model, secondary)?,
        ))
    }

    /// Bind both sensors over USB and start polling them
    #[cfg(feature = "usb")]
    pub fn bind(config: &crate::config::SensorConfig) -> Result<Self> {
        let model = SensorModel::from_name(&config.model)?;
        let (primary, secondary) = crate::transport::open_pair(
            model,
            config.primary_ordinal,
            config.secondary_ordinal,
        )?;
        Self::spawn(model, primary, secondary)
    }

    pub fn primary(&self) -> &SensorAccumulator {
        &self.primary
    }

    pub fn secondary(&self) -> &SensorAccumulator {
        &self.secondary
    }

    /// Exchange which physical sensor plays the primary role
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.primary, &mut self.secondary);
        log::info!(
            "Sensors swapped: primary='{}', secondary='{}'",
            self.primary.name(),
            self.secondary.name()
        );
    }

    /// Clear both accumulators
    pub fn clear(&self) {
        self.primary.clear();
        self.secondary.clear();
    }
}
