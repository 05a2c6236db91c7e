//! Fixed-period worker threads
//!
//! A [`PeriodicTask`] runs a closure on its own thread once per period.
//! Deadlines advance by whole periods from the start instant; a tick that
//! overruns skips the missed deadlines instead of running back-to-back, so
//! invocations never overlap or pile up. Stopping is deterministic: `stop()`
//! wakes the sleeping thread and joins it, so once it returns the closure
//! will never run again.

use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Handle to a running periodic thread
pub struct PeriodicTask {
    name: String,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn `tick` to run every `period`, starting one period from now
    pub fn spawn<F>(name: &str, period: Duration, tick: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        if period.is_zero() {
            return Err(Error::Config(format!("{}: period must be non-zero", name)));
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_periodic(&thread_name, period, stop_rx, tick))
            .map_err(|e| Error::Other(format!("Failed to spawn {} thread: {}", name, e)))?;

        log::debug!("{} started ({}ms period)", name, period.as_millis());

        Ok(Self {
            name: name.to_string(),
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the task and wait for its thread to exit
    pub fn stop(mut self) -> Result<()> {
        self.halt()
    }

    fn halt(&mut self) -> Result<()> {
        // Dropping the sender disconnects the channel and wakes the thread
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| Error::ThreadPanic)?;
            log::debug!("{} stopped", self.name);
        }
        Ok(())
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        let _ = self.halt();
    }
}

fn run_periodic<F: FnMut()>(name: &str, period: Duration, stop_rx: Receiver<()>, mut tick: F) {
    let mut next = Instant::now() + period;
    let mut overruns: u64 = 0;

    loop {
        let now = Instant::now();
        if next > now {
            match stop_rx.recv_timeout(next - now) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        } else if !matches!(
            stop_rx.try_recv(),
            Err(crossbeam_channel::TryRecvError::Empty)
        ) {
            break;
        }

        tick();

        next += period;
        let now = Instant::now();
        if next <= now {
            // Overran: realign on the next whole period
            let behind = now.duration_since(next);
            let skipped = (behind.as_nanos() / period.as_nanos()) as u32 + 1;
            next += period * skipped;
            overruns += 1;
            if overruns == 1 || overruns % 100 == 0 {
                log::warn!("{}: tick overran its period ({} times)", name, overruns);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    #[test]
    fn test_runs_periodically() {
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let task = PeriodicTask::spawn("test-tick", Duration::from_millis(5), move || {
            c.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        task.stop().unwrap();

        let ticks = count.load(Ordering::Relaxed);
        assert!(ticks >= 5, "only {} ticks", ticks);
    }

    #[test]
    fn test_no_ticks_after_stop() {
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let task = PeriodicTask::spawn("test-stop", Duration::from_millis(2), move || {
            c.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();

        thread::sleep(Duration::from_millis(20));
        task.stop().unwrap();
        let at_stop = count.load(Ordering::Relaxed);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::Relaxed), at_stop);
    }

    #[test]
    fn test_stop_is_prompt_for_long_periods() {
        let task = PeriodicTask::spawn("test-slow", Duration::from_secs(60), || {}).unwrap();
        let started = Instant::now();
        task.stop().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_ticks_never_overlap() {
        let busy = Arc::new(AtomicBool::new(false));
        let overlapped = Arc::new(AtomicBool::new(false));
        let (b, o) = (Arc::clone(&busy), Arc::clone(&overlapped));

        let task = PeriodicTask::spawn("test-overrun", Duration::from_millis(1), move || {
            if b.swap(true, Ordering::SeqCst) {
                o.store(true, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_millis(3));
            b.store(false, Ordering::SeqCst);
        })
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        task.stop().unwrap();
        assert!(!overlapped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_zero_period_rejected() {
        assert!(PeriodicTask::spawn("test-zero", Duration::ZERO, || {}).is_err());
    }
}
