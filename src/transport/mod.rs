//! Transport layer for raw sensor reports

use crate::error::{Error, Result};

mod mock;
#[cfg(feature = "usb")]
mod usb;

pub use mock::MockTransport;
#[cfg(feature = "usb")]
pub use usb::{UsbTransport, enumerate, open_pair};

/// Source of fixed-size raw reports from one physical sensor
pub trait ReportSource: Send {
    /// Block until the next report arrives and copy it into `buffer`.
    ///
    /// Returns the number of bytes read. Timeouts and dropped reads come back
    /// as errors; callers polling a live sensor are expected to retry.
    fn read_report(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Short description for logs
    fn describe(&self) -> String {
        "report source".to_string()
    }
}

impl<T: ReportSource + ?Sized> ReportSource for Box<T> {
    fn read_report(&mut self, buffer: &mut [u8]) -> Result<usize> {
        (**self).read_report(buffer)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Take the `ordinal`-th (zero-based) entry of an enumerated device list
pub fn select_ordinal<'a, T>(found: &'a [T], ordinal: usize, model: &str) -> Result<&'a T> {
    found.get(ordinal).ok_or_else(|| Error::InsufficientDevices {
        model: model.to_string(),
        requested: ordinal,
        found: found.len(),
    })
}
