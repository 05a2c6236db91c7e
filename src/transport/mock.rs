//! Mock transport for testing

use super::ReportSource;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How long an empty mock "blocks" before reporting a timeout
const EMPTY_READ_DELAY: Duration = Duration::from_millis(1);

enum Scripted {
    Report(Vec<u8>),
    Failure(String),
}

/// Scripted report queue standing in for a physical sensor.
///
/// Clones share the same queue, so a test can keep one handle for injecting
/// reports while the polling loop owns the other.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

struct MockTransportInner {
    queue: VecDeque<Scripted>,
    reads: u64,
    label: String,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new(label: &str) -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(MockTransportInner {
                queue: VecDeque::new(),
                reads: 0,
                label: label.to_string(),
            })),
        }
    }

    /// Queue one report to be read
    pub fn inject_report(&self, report: &[u8]) {
        self.inner
            .lock()
            .queue
            .push_back(Scripted::Report(report.to_vec()));
    }

    /// Queue a transport failure
    pub fn inject_error(&self, message: &str) {
        self.inner
            .lock()
            .queue
            .push_back(Scripted::Failure(message.to_string()));
    }

    /// Number of reads served so far, including failures and timeouts
    pub fn reads(&self) -> u64 {
        self.inner.lock().reads
    }

    /// Number of scripted items not yet consumed
    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }
}

impl ReportSource for MockTransport {
    fn read_report(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let next = {
            let mut inner = self.inner.lock();
            inner.reads += 1;
            inner.queue.pop_front()
        };

        match next {
            Some(Scripted::Report(report)) => {
                let n = report.len().min(buffer.len());
                buffer[..n].copy_from_slice(&report[..n]);
                Ok(n)
            }
            Some(Scripted::Failure(message)) => Err(Error::Other(message)),
            None => {
                thread::sleep(EMPTY_READ_DELAY);
                Err(Error::Timeout)
            }
        }
    }

    fn describe(&self) -> String {
        format!("mock:{}", self.inner.lock().label)
    }
}
