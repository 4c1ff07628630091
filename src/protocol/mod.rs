//! JSON wire protocol between the engine and its transport.

mod command;
mod event;

pub(crate) use command::{Command, encode_command};
pub use event::AdapterState;
pub(crate) use event::{
    BleEvent, CharacteristicData, CharacteristicOutcome, CharacteristicRecord,
    CharacteristicScope, DescriptorData, DescriptorOutcome, DescriptorRecord, DescriptorScope,
    ErrorRecord, LinkStatus, PeripheralRoleEvent, PeripheralRoleRecord, ScanRecord,
    ServiceRecord, ServiceScope, StatusRecord, WireOutcome, decode_events,
};
