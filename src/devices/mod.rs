//! Sensor model registry
//!
//! Each supported optical sensor is described by a static [`SensorModel`]:
//! the USB identity used to bind it and the decoder that turns its raw
//! report into a [`SensorDelta`]. Adding a sensor means adding a decoder
//! module and one entry to [`REGISTRY`].

pub mod g102;
pub mod m500;

use crate::core::types::SensorDelta;
use crate::error::{Error, Result};

/// Decoder for one report; the slice length is checked by [`SensorModel::decode`]
type DecodeFn = fn(&[u8]) -> SensorDelta;

/// USB identity and decoder of a supported sensor model
#[derive(Debug)]
pub struct SensorModel {
    /// Registry name shown to the user
    pub name: &'static str,
    pub vendor_id: u16,
    pub product_id: u16,
    /// Interrupt IN endpoint address
    pub endpoint: u8,
    /// Interface claimed for reading
    pub interface: u8,
    /// Length of one raw report
    pub report_length: usize,
    decode: DecodeFn,
}

/// All supported sensor models
pub static REGISTRY: &[SensorModel] = &[
    SensorModel {
        name: "Logitech G102",
        vendor_id: 0x046D,
        product_id: 0xC09D,
        endpoint: 0x81,
        interface: 0,
        report_length: g102::REPORT_LENGTH,
        decode: |raw| match raw.try_into() {
            Ok(report) => g102::decode(report),
            Err(_) => SensorDelta::default(),
        },
    },
    SensorModel {
        name: "Logitech M500",
        vendor_id: 0x046D,
        product_id: 0xC069,
        endpoint: 0x81,
        interface: 0,
        report_length: m500::REPORT_LENGTH,
        decode: |raw| match raw.try_into() {
            Ok(report) => m500::decode(report),
            Err(_) => SensorDelta::default(),
        },
    },
];

impl SensorModel {
    /// Look up a model by registry name (case-insensitive)
    pub fn from_name(name: &str) -> Result<&'static SensorModel> {
        let wanted = name.trim();
        REGISTRY
            .iter()
            .find(|model| model.name.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::UnsupportedSensor(wanted.to_string()))
    }

    /// Names of all registered models
    pub fn names() -> impl Iterator<Item = &'static str> {
        REGISTRY.iter().map(|model| model.name)
    }

    /// Decode a raw report of exactly `report_length` bytes
    pub fn decode(&self, raw: &[u8]) -> Result<SensorDelta> {
        if raw.len() != self.report_length {
            return Err(Error::MalformedReport {
                model: self.name,
                expected: self.report_length,
                actual: raw.len(),
            });
        }
        Ok((self.decode)(raw))
    }
}
