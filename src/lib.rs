//! A coordination engine for a BLE radio reached through a JSON message channel.
//!
//! The [`Engine`] plays both BLE roles at once: as a central it scans,
//! connects and talks GATT to remote peripherals; as a peripheral it
//! advertises and tracks the one remote central connected to it. Everything
//! runs on one actor task fed by a [`Transport`].

mod adapter;
mod address;
mod advertisement;
mod app;
mod bindings;
mod cli;
mod engine;
mod error;
mod model;
mod protocol;
mod telemetry;
mod terminal;
pub mod transport;
mod utils;
mod uuid;

pub use address::{Address, AddressParseError, AddressType};
pub use advertisement::{
    AdRecord, Advertisement, AdvertisementData, AdvertisementError, IBeacon, LocalName,
    LocalNameKind, MAX_ADVERTISING_PAYLOAD, ManufacturerData, ServiceData, ad_type,
};
pub use app::{RunOptions, run, run_with_clients};
pub use bindings::{ScanFilter, ScanOptions};
pub use cli::{
    Args, CharacteristicTarget, Command, ListenArgs, LogLevel, ReadArgs, ScanArgs, WriteArgs,
};
pub use engine::{
    CharacteristicHandle, DescriptorHandle, Engine, EngineConfig, EngineEvent, EventStream,
    PeripheralHandle, ServiceHandle,
};
pub use error::{BleError, DecodeError, EngineError, Operation, TransportError};
pub use model::{
    CharacteristicInfo, CharacteristicProperty, ConnectionState, DescriptorInfo, Notification,
    PeripheralSnapshot, ServiceInfo, TransportFault, WriteReport,
};
pub use protocol::AdapterState;
pub use terminal::{SystemTerminalClient, TerminalClient};
pub use transport::Transport;
pub use uuid::{GattUuid, to_canonical_uuid};
