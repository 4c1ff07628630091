//! The two BLE roles that share the radio.

mod central;
mod peripheral;

pub(crate) use central::CentralBinding;
pub use central::{ScanFilter, ScanOptions};
pub(crate) use peripheral::PeripheralBinding;
