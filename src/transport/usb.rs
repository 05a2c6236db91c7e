//! USB interrupt-endpoint transport (libusb via `rusb`)
//!
//! Devices of one model are enumerated into an ordered list (bus number,
//! then address) and selected by ordinal, so two identical sensors can be
//! bound deterministically.

use super::{ReportSource, select_ordinal};
use crate::devices::SensorModel;
use crate::error::{Error, Result};
use rusb::{Device, DeviceHandle, GlobalContext};
use std::time::Duration;

/// Read timeout; polling loops simply retry on expiry
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Bound sensor reading reports from its interrupt endpoint
pub struct UsbTransport {
    handle: DeviceHandle<GlobalContext>,
    model: &'static SensorModel,
    label: String,
}

/// List attached devices of `model`, ordered by bus number and address
pub fn enumerate(model: &SensorModel) -> Result<Vec<Device<GlobalContext>>> {
    let mut matches = Vec::new();

    for device in rusb::devices()?.iter() {
        let descriptor = match device.device_descriptor() {
            Ok(d) => d,
            Err(e) => {
                log::debug!(
                    "Skipping device on bus {} addr {}: {}",
                    device.bus_number(),
                    device.address(),
                    e
                );
                continue;
            }
        };

        if descriptor.vendor_id() == model.vendor_id && descriptor.product_id() == model.product_id
        {
            matches.push(device);
        }
    }

    matches.sort_by_key(|d| (d.bus_number(), d.address()));
    log::debug!("Found {} {} device(s)", matches.len(), model.name);
    Ok(matches)
}

/// Bind the two sensors of a rig from one enumeration
pub fn open_pair(
    model: &'static SensorModel,
    primary_ordinal: usize,
    secondary_ordinal: usize,
) -> Result<(UsbTransport, UsbTransport)> {
    let devices = enumerate(model)?;
    let primary = select_ordinal(&devices, primary_ordinal, model.name)?.clone();
    let secondary = select_ordinal(&devices, secondary_ordinal, model.name)?.clone();

    let primary = UsbTransport::open(model, primary, primary_ordinal)?;
    let secondary = UsbTransport::open(model, secondary, secondary_ordinal)?;
    Ok((primary, secondary))
}

impl UsbTransport {
    fn open(
        model: &'static SensorModel,
        device: Device<GlobalContext>,
        ordinal: usize,
    ) -> Result<Self> {
        let label = format!(
            "{} #{} (bus {} addr {})",
            model.name,
            ordinal,
            device.bus_number(),
            device.address()
        );

        let handle = device.open()?;

        // The OS HID driver owns mice by default
        if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
            log::debug!("{}: kernel driver auto-detach unavailable: {}", label, e);
        }
        handle.claim_interface(model.interface)?;

        log::info!(
            "Bound {} (endpoint {:#04x}, {}-byte reports)",
            label,
            model.endpoint,
            model.report_length
        );

        Ok(Self {
            handle,
            model,
            label,
        })
    }
}

impl ReportSource for UsbTransport {
    fn read_report(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self
            .handle
            .read_interrupt(self.model.endpoint, buffer, READ_TIMEOUT)
        {
            Ok(n) => Ok(n),
            Err(rusb::Error::Timeout) => Err(Error::Timeout),
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(self.model.interface) {
            log::debug!("{}: release_interface failed: {}", self.label, e);
        }
    }
}
