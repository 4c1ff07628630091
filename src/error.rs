use derive_more::From;
use thiserror::Error;

use crate::address::{Address, AddressParseError, AddressType};
use crate::advertisement::AdvertisementError;
use crate::model::ConnectionState;
use crate::uuid::GattUuid;

/// The caller-visible operation an error refers to.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, derive_more::Display)]
pub enum Operation {
    #[display("initialize")]
    Initialize,
    #[display("scan")]
    Scan,
    #[display("connect")]
    Connect,
    #[display("disconnect")]
    Disconnect,
    #[display("discover services")]
    DiscoverServices,
    #[display("discover characteristics")]
    DiscoverCharacteristics,
    #[display("discover descriptors")]
    DiscoverDescriptors,
    #[display("read characteristic")]
    ReadCharacteristic,
    #[display("write characteristic")]
    WriteCharacteristic,
    #[display("subscribe")]
    Subscribe,
    #[display("unsubscribe")]
    Unsubscribe,
    #[display("read descriptor")]
    ReadDescriptor,
    #[display("write descriptor")]
    WriteDescriptor,
    #[display("advertise")]
    Advertise,
}

/// Errors returned by engine operations.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum EngineError {
    #[error("the BLE adapter has not finished initialising; call initialize() first")]
    NotInitialized,
    #[error(
        "address type for `{address}` is unknown; scan for the device or pass a type to direct_connect"
    )]
    InvalidAddressType { address: Address },
    #[error("link to `{address}` was lost")]
    LinkLost { address: Address },
    #[error("{operation} failed: {reason}")]
    OperationFailed { operation: Operation, reason: String },
    #[error("peripheral `{address}` is not connected")]
    NotConnected { address: Address },
    #[error("a {operation} is already pending on `{target}`")]
    OperationPending { operation: Operation, target: String },
    #[error("cannot {operation} `{address}` while it is {state}")]
    InvalidState {
        operation: Operation,
        address: Address,
        state: ConnectionState,
    },
    #[error("no peripheral with address `{address}` is known")]
    UnknownPeripheral { address: Address },
    #[error("the engine task has stopped")]
    EngineStopped,
}

/// Inbound traffic that contradicts the engine's state.
///
/// Anomalies are logged and dropped; they are never returned to callers.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub(crate) enum ProtocolAnomaly {
    #[error("{kind} for `{address}` {service}/{characteristic} has no pending request")]
    UnmatchedResult {
        kind: &'static str,
        address: Address,
        service: GattUuid,
        characteristic: GattUuid,
    },
    #[error("{kind} references unknown peripheral `{address}`")]
    UnknownPeripheral { kind: &'static str, address: Address },
    #[error("notification for `{address}` {service}/{characteristic} without a subscription")]
    UnsubscribedNotification {
        address: Address,
        service: GattUuid,
        characteristic: GattUuid,
    },
    #[error("unexpected result value `{value}` in {kind}")]
    UnknownResultValue { kind: &'static str, value: String },
    #[error("status `{status}` for `{address}` does not fit state {state}")]
    UnexpectedStatus {
        address: Address,
        status: &'static str,
        state: ConnectionState,
    },
    #[error("address type {requested} for `{address}` conflicts with known type {known}")]
    AddressTypeConflict {
        address: Address,
        known: AddressType,
        requested: AddressType,
    },
    #[error("client `{rejected}` accepted while `{latched}` is still connected")]
    SecondClientAccepted { latched: Address, rejected: Address },
    #[error("client `{address}` disconnected but it is not the connected client")]
    UnexpectedClientDisconnect { address: Address },
    #[error("malformed {kind} record: {reason}")]
    MalformedRecord { kind: &'static str, reason: String },
    #[error("peripheral event `{event}` is missing its `{field}` field")]
    IncompletePeripheralEvent {
        event: &'static str,
        field: &'static str,
    },
}

/// Errors surfaced by a [`Transport`](crate::Transport) implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport I/O failed")]
    Io(#[from] std::io::Error),
    #[error("transport peer has gone away")]
    Closed,
}

/// Errors returned when decoding or encoding wire frames.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid protocol JSON")]
    Json(#[from] serde_json::Error),
    #[error("frame has no `ble` envelope")]
    MissingEnvelope,
}

/// Errors returned when validating command-line options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("hex payload `{value}` is not valid hex")]
    InvalidHexPayload { value: String },
}

/// Errors returned by CLI commands after argument parsing succeeded.
#[derive(Debug, Error)]
pub(crate) enum CommandError {
    #[error("peripheral `{address}` has no service `{service}`")]
    MissingService { address: Address, service: GattUuid },
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Top-level errors wrapping module-specific error types.
#[derive(Debug, Error, From)]
pub enum BleError {
    #[error(transparent)]
    Engine(EngineError),
    #[error(transparent)]
    Address(AddressParseError),
    #[error(transparent)]
    Advertisement(AdvertisementError),
    #[error(transparent)]
    Transport(TransportError),
    #[error(transparent)]
    Decode(DecodeError),
}
