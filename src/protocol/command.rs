use serde::Serialize;

use crate::address::{Address, AddressType};
use crate::error::DecodeError;
use crate::uuid::GattUuid;

/// A command sent from the engine to the transport.
///
/// Serialises as `{"<snake_name>": {...}}`; [`encode_command`] adds the
/// `ble` envelope.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Command {
    Initialize {},
    Scan {
        duration: u64,
        duplicate: bool,
    },
    ScanStop {},
    Connect {
        address: Address,
        address_type: AddressType,
    },
    Disconnect {
        address: Address,
    },
    DiscoverServices {
        address: Address,
        #[serde(skip_serializing_if = "Option::is_none")]
        service_uuid: Option<GattUuid>,
    },
    DiscoverCharacteristics {
        address: Address,
        service_uuid: GattUuid,
    },
    DiscoverDescriptors {
        address: Address,
        service_uuid: GattUuid,
        characteristic_uuid: GattUuid,
    },
    ReadCharacteristic {
        address: Address,
        service_uuid: GattUuid,
        characteristic_uuid: GattUuid,
    },
    WriteCharacteristic {
        address: Address,
        service_uuid: GattUuid,
        characteristic_uuid: GattUuid,
        data: Vec<u8>,
        needs_response: bool,
    },
    NotifyCharacteristic {
        address: Address,
        service_uuid: GattUuid,
        characteristic_uuid: GattUuid,
        enable: bool,
    },
    ReadDescriptor {
        address: Address,
        service_uuid: GattUuid,
        characteristic_uuid: GattUuid,
        descriptor_uuid: GattUuid,
    },
    WriteDescriptor {
        address: Address,
        service_uuid: GattUuid,
        characteristic_uuid: GattUuid,
        descriptor_uuid: GattUuid,
        data: Vec<u8>,
    },
    AdvertisementStart {
        adv_data: Vec<u8>,
        scan_resp: Vec<u8>,
    },
    AdvertisementStop {},
}

impl Command {
    /// Returns the wire name of this command, for logging.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Initialize {} => "initialize",
            Self::Scan { .. } => "scan",
            Self::ScanStop {} => "scan_stop",
            Self::Connect { .. } => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::DiscoverServices { .. } => "discover_services",
            Self::DiscoverCharacteristics { .. } => "discover_characteristics",
            Self::DiscoverDescriptors { .. } => "discover_descriptors",
            Self::ReadCharacteristic { .. } => "read_characteristic",
            Self::WriteCharacteristic { .. } => "write_characteristic",
            Self::NotifyCharacteristic { .. } => "notify_characteristic",
            Self::ReadDescriptor { .. } => "read_descriptor",
            Self::WriteDescriptor { .. } => "write_descriptor",
            Self::AdvertisementStart { .. } => "advertisement_start",
            Self::AdvertisementStop {} => "advertisement_stop",
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    ble: &'a Command,
}

/// Encodes one command as a single `{"ble": {...}}` JSON frame.
pub(crate) fn encode_command(command: &Command) -> Result<String, DecodeError> {
    Ok(serde_json::to_string(&Envelope { ble: command })?)
}
