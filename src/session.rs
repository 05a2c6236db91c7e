//! Session controller: the acquisition state machine.
//!
//! ```text
//!          start_test()            start_record()
//!   Idle ───────────────▶ Testing   Idle ───────────────▶ Recording
//!    ▲                      │        ▲                       │
//!    └──── stop_test() ─────┘        └──── stop_record() ────┘
//! ```
//!
//! A session owns two periodic tasks: the fusion sampler (every tick) and,
//! when recording, the persistence flusher (every `flush_interval_ms`). The
//! fusion engine is moved into the sampler closure, so the pose and the
//! previous-tick snapshots are never touched outside the tick.
//!
//! The sampler only pushes into [`SharedBuffer`]s; the flusher drains them
//! under the buffer lock and performs I/O outside it, so storage never blocks
//! a tick. If the flusher falls behind, the pending buffers evict their
//! oldest rows; the eviction count is reported in the [`SessionSummary`].

use crate::config::{AppConfig, RecordingConfig, TrackingConfig};
use crate::core::history::SharedBuffer;
use crate::core::types::{EventKind, EventMarker, Telemetry, TrajectorySample};
use crate::error::{Error, Result};
use crate::fusion::{FusionEngine, FusionParams};
use crate::recording::{self, RecordBatch, RecordSink};
use crate::scheduler::PeriodicTask;
use crate::sensor::SensorPair;
use chrono::Local;
use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Kind of tracking session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Live display only
    Testing,
    /// Live display plus persistence
    Recording,
}

/// Acquisition state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Testing,
    Recording,
}

impl From<SessionMode> for SessionState {
    fn from(mode: SessionMode) -> Self {
        match mode {
            SessionMode::Testing => SessionState::Testing,
            SessionMode::Recording => SessionState::Recording,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            SessionState::Idle => "idle",
            SessionState::Testing => "testing",
            SessionState::Recording => "recording",
        })
    }
}

/// What a finished session did
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub mode: SessionMode,
    /// Fusion updates applied
    pub updates: u64,
    pub duration: Duration,
    /// Pending rows evicted before they could be flushed
    pub evicted: u64,
    /// Flushes that failed to write
    pub storage_failures: u64,
    /// Rows still pending when the final flush failed
    pub unflushed: u64,
    /// Session directory (recording only)
    pub output_dir: Option<PathBuf>,
}

/// On/off affordance and sequence count of one event kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventChannel {
    on: bool,
    count: u32,
}

impl EventChannel {
    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Flip the affordance. Returns the count the marker should carry when
    /// `in_session`; the count only advances on an in-session `on`.
    fn toggle(&mut self, kind: EventKind, on: bool, in_session: bool) -> Result<u32> {
        if self.on == on {
            return Err(Error::InvalidTransition(format!(
                "{} is already {}",
                kind,
                if on { "on" } else { "off" }
            )));
        }
        self.on = on;
        if on && in_session {
            self.count += 1;
        }
        Ok(self.count)
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Rows waiting for the next flush
struct PendingRecords {
    trajectory: SharedBuffer<TrajectorySample>,
    feeding: SharedBuffer<EventMarker>,
    stimulus: SharedBuffer<EventMarker>,
}

impl PendingRecords {
    fn new(capacity: usize) -> Self {
        Self {
            trajectory: SharedBuffer::new(capacity),
            feeding: SharedBuffer::new(capacity),
            stimulus: SharedBuffer::new(capacity),
        }
    }

    fn push_event(&self, marker: EventMarker) -> Option<EventMarker> {
        match marker.kind {
            EventKind::Feeding => self.feeding.push(marker),
            EventKind::VisualStimulus => self.stimulus.push(marker),
        }
    }

    fn drain(&self) -> RecordBatch {
        RecordBatch {
            trajectory: self.trajectory.drain(),
            feeding: self.feeding.drain(),
            stimulus: self.stimulus.drain(),
        }
    }

    /// Put a batch whose write failed back ahead of newer rows
    fn requeue(&self, batch: RecordBatch) {
        self.trajectory.requeue_front(batch.trajectory);
        self.feeding.requeue_front(batch.feeding);
        self.stimulus.requeue_front(batch.stimulus);
    }

    fn len(&self) -> usize {
        self.trajectory.len() + self.feeding.len() + self.stimulus.len()
    }

    fn evicted(&self) -> u64 {
        self.trajectory.evicted() + self.feeding.evicted() + self.stimulus.evicted()
    }
}

#[derive(Debug, Default)]
struct StorageStats {
    failures: AtomicU64,
}

type SharedSink = Arc<Mutex<Option<Box<dyn RecordSink>>>>;

/// Drain pending rows and hand them to the sink, one table at a time.
///
/// The buffer locks are held only for the swap; the write happens under the
/// sink lock, which the sampler never takes. A table whose write fails goes
/// back to the front of its pending buffer for the next flush, so overflow
/// eviction stays the only way rows are dropped.
fn flush_pending(pending: &PendingRecords, sink: &SharedSink, stats: &StorageStats) -> Result<()> {
    let batch = pending.drain();
    if batch.is_empty() {
        return Ok(());
    }

    let mut guard = sink.lock();
    let mut result = Ok(());
    let mut written = 0;

    for table in batch.into_tables() {
        if table.is_empty() {
            continue;
        }
        let outcome = match guard.as_mut() {
            Some(sink) => sink.write_batch(&table),
            None => Err(Error::Storage("recording already closed".to_string())),
        };
        match outcome {
            Ok(()) => written += table.rows(),
            Err(e) => {
                let failures = stats.failures.fetch_add(1, Ordering::Relaxed) + 1;
                log::error!(
                    "Flush failed ({} so far), {} rows kept for retry: {}",
                    failures,
                    table.rows(),
                    e
                );
                pending.requeue(table);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
    }

    log::trace!("Flushed {} rows", written);
    result
}

/// Storage side of a recording session
struct Persistence {
    pending: Arc<PendingRecords>,
    sink: SharedSink,
    stats: Arc<StorageStats>,
    flusher: Option<PeriodicTask>,
    dir: PathBuf,
}

impl Persistence {
    fn open(config: &RecordingConfig) -> Result<Self> {
        let sink = recording::create_sink(config.layout, &config.output_dir, &Local::now())?;
        let dir = sink.dir().to_path_buf();
        Ok(Self {
            pending: Arc::new(PendingRecords::new(config.buffer_capacity)),
            sink: Arc::new(Mutex::new(Some(sink))),
            stats: Arc::new(StorageStats::default()),
            flusher: None,
            dir,
        })
    }

    fn start_flusher(&mut self, period: Duration) -> Result<()> {
        let pending = Arc::clone(&self.pending);
        let sink = Arc::clone(&self.sink);
        let stats = Arc::clone(&self.stats);
        self.flusher = Some(PeriodicTask::spawn("session-flush", period, move || {
            // Failures are logged and counted inside; the session keeps going
            let _ = flush_pending(&pending, &sink, &stats);
        })?);
        Ok(())
    }

    /// Stop the flusher, write what is left and close the sink
    fn close(mut self) -> Result<()> {
        let mut result = match self.flusher.take() {
            Some(flusher) => flusher.stop(),
            None => Ok(()),
        };

        let flushed = flush_pending(&self.pending, &self.sink, &self.stats);
        if result.is_ok() {
            result = flushed;
        }

        if let Some(sink) = self.sink.lock().take() {
            match sink.finish() {
                Ok(info) => log::info!(
                    "Recording closed: {} ({} trajectory, {} feeding, {} stimulus rows)",
                    info.dir.display(),
                    info.trajectory_rows,
                    info.feeding_rows,
                    info.stimulus_rows
                ),
                Err(e) => {
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);
                    log::error!("Failed to close recording in {}: {}", self.dir.display(), e);
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
        }
        result
    }
}

struct ActiveSession {
    mode: SessionMode,
    started: Instant,
    sampler: PeriodicTask,
    persistence: Option<Persistence>,
}

/// Read-only handles for a live view running on its own cadence
#[derive(Clone)]
pub struct SessionMonitor {
    telemetry: Arc<Mutex<Telemetry>>,
    display: SharedBuffer<TrajectorySample>,
}

impl SessionMonitor {
    pub fn telemetry(&self) -> Telemetry {
        *self.telemetry.lock()
    }

    /// Recent trail, oldest first
    pub fn trail(&self) -> Vec<TrajectorySample> {
        self.display.snapshot()
    }
}

/// Acquisition state machine over one bound [`SensorPair`]
pub struct SessionController {
    sensors: SensorPair,
    config: AppConfig,
    display: SharedBuffer<TrajectorySample>,
    telemetry: Arc<Mutex<Telemetry>>,
    feeding: EventChannel,
    stimulus: EventChannel,
    active: Option<ActiveSession>,
}

impl SessionController {
    /// Controller in `Idle` over already-polling sensors
    pub fn new(sensors: SensorPair, config: AppConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            sensors,
            display: SharedBuffer::new(config.display.history_capacity),
            config,
            telemetry: Arc::new(Mutex::new(Telemetry::default())),
            feeding: EventChannel::default(),
            stimulus: EventChannel::default(),
            active: None,
        })
    }

    pub fn state(&self) -> SessionState {
        match &self.active {
            Some(active) => active.mode.into(),
            None => SessionState::Idle,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn sensors(&self) -> &SensorPair {
        &self.sensors
    }

    /// Replace the tracking parameters used by the next session
    pub fn set_tracking(&mut self, tracking: TrackingConfig) -> Result<()> {
        tracking.validate()?;
        self.config.tracking = tracking;
        Ok(())
    }

    pub fn monitor(&self) -> SessionMonitor {
        SessionMonitor {
            telemetry: Arc::clone(&self.telemetry),
            display: self.display.clone(),
        }
    }

    pub fn telemetry(&self) -> Telemetry {
        *self.telemetry.lock()
    }

    /// Recent trail for the live view, oldest first
    pub fn display_trail(&self) -> Vec<TrajectorySample> {
        self.display.snapshot()
    }

    pub fn event_channel(&self, kind: EventKind) -> EventChannel {
        match kind {
            EventKind::Feeding => self.feeding,
            EventKind::VisualStimulus => self.stimulus,
        }
    }

    pub fn start_test(&mut self) -> Result<()> {
        self.start(SessionMode::Testing)
    }

    pub fn start_record(&mut self) -> Result<()> {
        self.start(SessionMode::Recording)
    }

    pub fn stop_test(&mut self) -> Result<SessionSummary> {
        self.stop_mode(SessionMode::Testing)
    }

    pub fn stop_record(&mut self) -> Result<SessionSummary> {
        self.stop_mode(SessionMode::Recording)
    }

    /// Exchange the primary and secondary sensors (idle only)
    pub fn swap_sensors(&mut self) -> Result<()> {
        if self.active.is_some() {
            return Err(Error::InvalidTransition(format!(
                "cannot swap sensors while {}",
                self.state()
            )));
        }
        self.sensors.swap();
        Ok(())
    }

    /// Toggle an event.
    ///
    /// Inside a session this emits a marker stamped with the session clock
    /// (persisted when recording). While idle only the affordance flips and
    /// `None` is returned.
    pub fn mark_event(&mut self, kind: EventKind, on: bool) -> Result<Option<EventMarker>> {
        let in_session = self.active.is_some();
        let channel = match kind {
            EventKind::Feeding => &mut self.feeding,
            EventKind::VisualStimulus => &mut self.stimulus,
        };
        let count = channel.toggle(kind, on, in_session)?;

        let Some(active) = &self.active else {
            log::debug!("{} {} while idle, no marker", kind, if on { "on" } else { "off" });
            return Ok(None);
        };

        let marker = EventMarker {
            kind,
            timestamp: active.started.elapsed().as_secs_f64(),
            on,
            count,
        };
        log::info!(
            "{} {} #{} at {:.3}s",
            kind,
            marker.state_label(),
            count,
            marker.timestamp
        );

        if let Some(persistence) = &active.persistence
            && persistence.pending.push_event(marker).is_some()
        {
            log::warn!("{} pending buffer full, oldest marker evicted", kind);
        }
        Ok(Some(marker))
    }

    /// Stop whichever session is active
    pub fn stop(&mut self) -> Result<SessionSummary> {
        let Some(active) = self.active.take() else {
            return Err(Error::InvalidTransition(
                "no session is active".to_string(),
            ));
        };
        self.finish(active)
    }

    fn stop_mode(&mut self, mode: SessionMode) -> Result<SessionSummary> {
        match &self.active {
            Some(active) if active.mode == mode => self.stop(),
            _ => Err(Error::InvalidTransition(format!(
                "cannot stop {} while {}",
                SessionState::from(mode),
                self.state()
            ))),
        }
    }

    fn start(&mut self, mode: SessionMode) -> Result<()> {
        if self.active.is_some() {
            return Err(Error::InvalidTransition(format!(
                "cannot start {} while {}",
                SessionState::from(mode),
                self.state()
            )));
        }

        // Everything fallible happens before any state is touched
        self.config.validate()?;
        let params = FusionParams::from_config(&self.config.tracking)?;
        let period = self.config.tracking.tick_period();
        let mut persistence = match mode {
            SessionMode::Recording => Some(Persistence::open(&self.config.recording)?),
            SessionMode::Testing => None,
        };

        self.reset_transient();
        self.sensors.clear();

        let started = Instant::now();
        let pending = persistence.as_ref().map(|p| Arc::clone(&p.pending));
        let sampler = self.spawn_sampler(params, period, started, pending)?;
        if let Some(persistence) = persistence.as_mut()
            && let Err(e) = persistence.start_flusher(self.config.recording.flush_interval())
        {
            let _ = sampler.stop();
            self.reset_transient();
            return Err(e);
        }

        log::info!(
            "Session started: {} at {:.1} Hz (k={}, r={}, mount={}°)",
            SessionState::from(mode),
            self.config.tracking.sample_rate_hz,
            params.calibration_factor,
            params.radius,
            self.config.tracking.mount_angle_deg
        );

        self.active = Some(ActiveSession {
            mode,
            started,
            sampler,
            persistence,
        });
        Ok(())
    }

    fn spawn_sampler(
        &self,
        params: FusionParams,
        period: Duration,
        started: Instant,
        pending: Option<Arc<PendingRecords>>,
    ) -> Result<PeriodicTask> {
        let primary = self.sensors.primary().counters();
        let secondary = self.sensors.secondary().counters();
        let display = self.display.clone();
        let telemetry = Arc::clone(&self.telemetry);
        let mut engine = FusionEngine::new(params);

        PeriodicTask::spawn("fusion-tick", period, move || {
            let sample = engine.tick(
                primary.snapshot(),
                secondary.snapshot(),
                started.elapsed().as_secs_f64(),
            );
            display.push(sample);
            if let Some(pending) = &pending {
                pending.trajectory.push(sample);
            }
            *telemetry.lock() = Telemetry {
                pose: engine.pose(),
                elapsed: sample.timestamp,
                updates: engine.updates(),
            };
        })
    }

    fn finish(&mut self, active: ActiveSession) -> Result<SessionSummary> {
        let ActiveSession {
            mode,
            started,
            sampler,
            persistence,
        } = active;

        // Ticks must be over before storage is torn down
        let mut result = sampler.stop();
        let duration = started.elapsed();
        let updates = self.telemetry.lock().updates;

        let mut summary = SessionSummary {
            mode,
            updates,
            duration,
            evicted: 0,
            storage_failures: 0,
            unflushed: 0,
            output_dir: None,
        };

        if let Some(persistence) = persistence {
            let pending = Arc::clone(&persistence.pending);
            let stats = Arc::clone(&persistence.stats);
            summary.output_dir = Some(persistence.dir.clone());

            let closed = persistence.close();
            if result.is_ok() {
                result = closed;
            }
            summary.evicted = pending.evicted();
            summary.storage_failures = stats.failures.load(Ordering::Relaxed);
            summary.unflushed = pending.len() as u64;
        }

        self.reset_transient();
        self.sensors.clear();

        log::info!(
            "Session stopped: {} updates in {:.2}s, {} evicted, {} storage failures",
            summary.updates,
            summary.duration.as_secs_f64(),
            summary.evicted,
            summary.storage_failures
        );
        if summary.unflushed > 0 {
            log::error!(
                "{} rows could not be written before the recording closed",
                summary.unflushed
            );
        }
        if summary.evicted > 0 {
            log::warn!(
                "{} pending rows were evicted before flushing; raise buffer_capacity or flush more often",
                summary.evicted
            );
        }

        result.map(|()| summary)
    }

    fn reset_transient(&mut self) {
        self.display.clear();
        self.display.reset_evicted();
        *self.telemetry.lock() = Telemetry::default();
        self.feeding.reset();
        self.stimulus.reset();
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(active) = self.active.take()
            && let Err(e) = self.finish(active)
        {
            log::error!("Session teardown failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordInfo;
    use std::path::Path;

    /// Sink that rejects its first `failures` writes and remembers the rest
    struct FlakySink {
        failures: usize,
        timestamps: Captured<f64>,
        markers: Captured<EventMarker>,
        dir: PathBuf,
    }

    impl RecordSink for FlakySink {
        fn write_batch(&mut self, batch: &RecordBatch) -> Result<()> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(Error::Storage("disk full".to_string()));
            }
            self.timestamps
                .lock()
                .extend(batch.trajectory.iter().map(|s| s.timestamp));
            self.markers.lock().extend(batch.feeding.iter().copied());
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<RecordInfo> {
            Ok(RecordInfo {
                dir: self.dir.clone(),
                trajectory_rows: 0,
                feeding_rows: 0,
                stimulus_rows: 0,
            })
        }

        fn dir(&self) -> &Path {
            &self.dir
        }
    }

    type Captured<T> = Arc<Mutex<Vec<T>>>;

    fn flaky_sink(failures: usize) -> (SharedSink, Captured<f64>, Captured<EventMarker>) {
        let timestamps = Arc::new(Mutex::new(Vec::new()));
        let markers = Arc::new(Mutex::new(Vec::new()));
        let sink: Box<dyn RecordSink> = Box::new(FlakySink {
            failures,
            timestamps: Arc::clone(&timestamps),
            markers: Arc::clone(&markers),
            dir: PathBuf::from("flaky"),
        });
        (Arc::new(Mutex::new(Some(sink))), timestamps, markers)
    }

    fn sample(timestamp: f64) -> TrajectorySample {
        TrajectorySample {
            x: 0.0,
            y: 0.0,
            timestamp,
        }
    }

    #[test]
    fn test_failed_flush_is_retried_in_order() {
        let pending = PendingRecords::new(100);
        let stats = StorageStats::default();
        let (sink, written, _) = flaky_sink(1);

        for t in 0..3 {
            pending.trajectory.push(sample(t as f64));
        }
        assert!(flush_pending(&pending, &sink, &stats).is_err());
        assert_eq!(pending.len(), 3);

        for t in 3..5 {
            pending.trajectory.push(sample(t as f64));
        }
        flush_pending(&pending, &sink, &stats).unwrap();

        assert_eq!(*written.lock(), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(pending.len(), 0);
        assert_eq!(pending.evicted(), 0);
        assert_eq!(stats.failures.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_retry_does_not_resend_written_tables() {
        // Trajectory write fails, feeding write succeeds
        let pending = PendingRecords::new(100);
        let stats = StorageStats::default();
        let (sink, written, markers) = flaky_sink(1);

        pending.trajectory.push(sample(0.0));
        pending.push_event(EventMarker {
            kind: EventKind::Feeding,
            timestamp: 0.5,
            on: true,
            count: 1,
        });
        assert!(flush_pending(&pending, &sink, &stats).is_err());
        assert_eq!(markers.lock().len(), 1);

        flush_pending(&pending, &sink, &stats).unwrap();
        assert_eq!(*written.lock(), vec![0.0]);
        assert_eq!(markers.lock().len(), 1);
    }

    #[test]
    fn test_failed_flush_overflow_is_counted_as_eviction() {
        let pending = PendingRecords::new(4);
        let stats = StorageStats::default();
        let (sink, written, _) = flaky_sink(1);

        for t in 0..3 {
            pending.trajectory.push(sample(t as f64));
        }
        assert!(flush_pending(&pending, &sink, &stats).is_err());
        for t in 3..6 {
            pending.trajectory.push(sample(t as f64));
        }
        // 3 requeued + 3 new into capacity 4: rows 0 and 1 are evicted
        flush_pending(&pending, &sink, &stats).unwrap();

        assert_eq!(*written.lock(), vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(pending.evicted(), 2);
    }

    #[test]
    fn test_event_channel_counts_in_session() {
        let mut channel = EventChannel::default();
        assert_eq!(channel.toggle(EventKind::Feeding, true, true).unwrap(), 1);
        assert_eq!(channel.toggle(EventKind::Feeding, false, true).unwrap(), 1);
        assert_eq!(channel.toggle(EventKind::Feeding, true, true).unwrap(), 2);
        assert!(channel.is_on());
    }

    #[test]
    fn test_event_channel_idle_does_not_count() {
        let mut channel = EventChannel::default();
        channel.toggle(EventKind::Feeding, true, false).unwrap();
        channel.toggle(EventKind::Feeding, false, false).unwrap();
        assert_eq!(channel.count(), 0);
        assert!(!channel.is_on());
    }

    #[test]
    fn test_event_channel_rejects_redundant_toggle() {
        let mut channel = EventChannel::default();
        assert!(matches!(
            channel.toggle(EventKind::VisualStimulus, false, true),
            Err(Error::InvalidTransition(_))
        ));
        channel.toggle(EventKind::VisualStimulus, true, true).unwrap();
        assert!(channel.toggle(EventKind::VisualStimulus, true, true).is_err());
        assert_eq!(channel.count(), 1);
    }

    #[test]
    fn test_event_channel_reset() {
        let mut channel = EventChannel::default();
        channel.toggle(EventKind::Feeding, true, true).unwrap();
        channel.reset();
        assert_eq!(channel, EventChannel::default());
    }

    #[test]
    fn test_pending_records_route_by_kind() {
        let pending = PendingRecords::new(4);
        pending.push_event(EventMarker {
            kind: EventKind::Feeding,
            timestamp: 1.0,
            on: true,
            count: 1,
        });
        pending.push_event(EventMarker {
            kind: EventKind::VisualStimulus,
            timestamp: 2.0,
            on: true,
            count: 1,
        });

        let batch = pending.drain();
        assert_eq!(batch.feeding.len(), 1);
        assert_eq!(batch.stimulus.len(), 1);
        assert!(pending.drain().is_empty());
    }

    #[test]
    fn test_pending_eviction_counted() {
        let pending = PendingRecords::new(2);
        for i in 0..5 {
            pending.trajectory.push(TrajectorySample {
                x: 0.0,
                y: 0.0,
                timestamp: i as f64,
            });
        }
        assert_eq!(pending.evicted(), 3);
        let batch = pending.drain();
        assert_eq!(batch.trajectory[0].timestamp, 3.0);
    }
}
