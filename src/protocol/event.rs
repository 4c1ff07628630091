use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DefaultOnNull, DisplayFromStr, PickFirst, serde_as};
use strum_macros::{Display, EnumString};
use tracing::warn;

use crate::address::{Address, AddressType};
use crate::error::{DecodeError, ProtocolAnomaly};
use crate::uuid::GattUuid;

/// Radio power state reported by the transport.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AdapterState {
    PoweredOn,
    PoweredOff,
    Resetting,
    Unauthorized,
    Unsupported,
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StateUpdate {
    pub(crate) state: AdapterState,
}

/// One `scan_results` record.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ScanRecord {
    #[serde(default)]
    pub(crate) event_type: Option<String>,
    #[serde(default)]
    pub(crate) address: Option<Address>,
    #[serde(default)]
    pub(crate) address_type: Option<AddressType>,
    #[serde(default)]
    pub(crate) ble_event_type: Option<String>,
    #[serde(default)]
    pub(crate) rssi: Option<i16>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub(crate) adv_data: Vec<u8>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub(crate) scan_resp: Vec<u8>,
}

impl ScanRecord {
    const INQUIRY_COMPLETE: &'static str = "inquiry_complete";

    fn is_inquiry_complete(&self) -> bool {
        self.event_type.as_deref() == Some(Self::INQUIRY_COMPLETE)
    }

    /// Matches `connectable_advertisement` and its misspelled wire form.
    pub(crate) fn is_connectable(&self) -> bool {
        self.ble_event_type
            .as_deref()
            .is_some_and(|kind| kind.starts_with("connectable"))
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum LinkStatus {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StatusRecord {
    pub(crate) address: Address,
    pub(crate) status: LinkStatus,
    #[serde(default)]
    pub(crate) reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ServiceRecord {
    pub(crate) address: Address,
    pub(crate) service_uuid: GattUuid,
    #[serde(default)]
    pub(crate) is_primary: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ServiceScope {
    pub(crate) address: Address,
    #[serde(default)]
    pub(crate) service_uuid: Option<GattUuid>,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CharacteristicRecord {
    pub(crate) address: Address,
    pub(crate) service_uuid: GattUuid,
    pub(crate) characteristic_uuid: GattUuid,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub(crate) properties: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CharacteristicScope {
    pub(crate) address: Address,
    pub(crate) service_uuid: GattUuid,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DescriptorRecord {
    pub(crate) address: Address,
    pub(crate) service_uuid: GattUuid,
    pub(crate) characteristic_uuid: GattUuid,
    pub(crate) descriptor_uuid: GattUuid,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DescriptorScope {
    pub(crate) address: Address,
    pub(crate) service_uuid: GattUuid,
    pub(crate) characteristic_uuid: GattUuid,
}

/// Read results and notifications share this shape.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CharacteristicData {
    pub(crate) address: Address,
    pub(crate) service_uuid: GattUuid,
    pub(crate) characteristic_uuid: GattUuid,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub(crate) data: Vec<u8>,
}

/// Write and notify-toggle acknowledgements share this shape.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CharacteristicOutcome {
    pub(crate) address: Address,
    pub(crate) service_uuid: GattUuid,
    pub(crate) characteristic_uuid: GattUuid,
    pub(crate) result: String,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DescriptorData {
    pub(crate) address: Address,
    pub(crate) service_uuid: GattUuid,
    pub(crate) characteristic_uuid: GattUuid,
    pub(crate) descriptor_uuid: GattUuid,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub(crate) data: Vec<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DescriptorOutcome {
    pub(crate) address: Address,
    pub(crate) service_uuid: GattUuid,
    pub(crate) characteristic_uuid: GattUuid,
    pub(crate) descriptor_uuid: GattUuid,
    pub(crate) result: String,
}

/// Outcome spelling used by every `*_results` record with a `result` field.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum WireOutcome {
    Success,
    Failed,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorRecord {
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(default)]
    pub(crate) error_code: Option<i64>,
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) address: Option<Address>,
    #[serde(default)]
    pub(crate) service_uuid: Option<GattUuid>,
    #[serde(default)]
    pub(crate) characteristic_uuid: Option<GattUuid>,
    #[serde(default)]
    pub(crate) descriptor_uuid: Option<GattUuid>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub(crate) enum PeripheralRoleEvent {
    Accepted,
    Disconnected,
    MtuChanged,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PeripheralRoleRecord {
    pub(crate) event: PeripheralRoleEvent,
    #[serde(default)]
    pub(crate) address: Option<Address>,
    #[serde(default)]
    pub(crate) mtu: Option<u16>,
}

/// The `ble` object of one inbound frame; every array is optional.
///
/// Records stay raw until [`InboundBatch::into_events`] so that one bad record
/// only costs itself.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct InboundBatch {
    #[serde_as(as = "DefaultOnNull")]
    state_updates: Vec<Value>,
    #[serde_as(as = "DefaultOnNull")]
    scan_results: Vec<Value>,
    #[serde_as(as = "DefaultOnNull")]
    status_updates: Vec<Value>,
    #[serde_as(as = "DefaultOnNull")]
    service_discovery_results: Vec<Value>,
    #[serde_as(as = "DefaultOnNull")]
    service_discovery_finished: Vec<Value>,
    #[serde_as(as = "DefaultOnNull")]
    characteristic_discovery_results: Vec<Value>,
    #[serde_as(as = "DefaultOnNull")]
    characteristic_discovery_finished: Vec<Value>,
    #[serde_as(as = "DefaultOnNull")]
    descriptor_discovery_results: Vec<Value>,
    #[serde_as(as = "DefaultOnNull")]
    descriptor_discovery_finished: Vec<Value>,
    #[serde_as(as = "DefaultOnNull")]
    read_characteristic_results: Vec<Value>,
    #[serde_as(as = "DefaultOnNull")]
    write_characteristic_results: Vec<Value>,
    #[serde_as(as = "DefaultOnNull")]
    notify_characteristic_results: Vec<Value>,
    #[serde_as(as = "DefaultOnNull")]
    notifications: Vec<Value>,
    #[serde_as(as = "DefaultOnNull")]
    read_descriptor_results: Vec<Value>,
    #[serde_as(as = "DefaultOnNull")]
    write_descriptor_results: Vec<Value>,
    #[serde_as(as = "DefaultOnNull")]
    errors: Vec<Value>,
    #[serde_as(as = "DefaultOnNull")]
    peripheral_events: Vec<Value>,
}

/// Decodes the records of one array, logging and skipping the malformed ones.
fn decode_each<T: DeserializeOwned>(
    kind: &'static str,
    records: Vec<Value>,
) -> impl Iterator<Item = T> {
    records
        .into_iter()
        .filter_map(move |record| match T::deserialize(record) {
            Ok(record) => Some(record),
            Err(error) => {
                warn!(
                    anomaly = %ProtocolAnomaly::MalformedRecord {
                        kind,
                        reason: error.to_string(),
                    },
                    "dropping record"
                );
                None
            }
        })
}

#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    #[serde(default)]
    ble: Option<InboundBatch>,
}

/// One decoded inbound event.
#[derive(Debug, Clone)]
pub(crate) enum BleEvent {
    AdapterState(AdapterState),
    ScanResult(ScanRecord),
    ScanFinished,
    Status(StatusRecord),
    ServiceDiscovered(ServiceRecord),
    ServiceDiscoveryFinished(ServiceScope),
    CharacteristicDiscovered(CharacteristicRecord),
    CharacteristicDiscoveryFinished(CharacteristicScope),
    DescriptorDiscovered(DescriptorRecord),
    DescriptorDiscoveryFinished(DescriptorScope),
    CharacteristicRead(CharacteristicData),
    CharacteristicWritten(CharacteristicOutcome),
    NotifyToggled(CharacteristicOutcome),
    Notification(CharacteristicData),
    DescriptorRead(DescriptorData),
    DescriptorWritten(DescriptorOutcome),
    Error(ErrorRecord),
    PeripheralRole(PeripheralRoleRecord),
}

impl BleEvent {
    /// Returns a short label for logging.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::AdapterState(_) => "state_updates",
            Self::ScanResult(_) | Self::ScanFinished => "scan_results",
            Self::Status(_) => "status_updates",
            Self::ServiceDiscovered(_) => "service_discovery_results",
            Self::ServiceDiscoveryFinished(_) => "service_discovery_finished",
            Self::CharacteristicDiscovered(_) => "characteristic_discovery_results",
            Self::CharacteristicDiscoveryFinished(_) => "characteristic_discovery_finished",
            Self::DescriptorDiscovered(_) => "descriptor_discovery_results",
            Self::DescriptorDiscoveryFinished(_) => "descriptor_discovery_finished",
            Self::CharacteristicRead(_) => "read_characteristic_results",
            Self::CharacteristicWritten(_) => "write_characteristic_results",
            Self::NotifyToggled(_) => "notify_characteristic_results",
            Self::Notification(_) => "notifications",
            Self::DescriptorRead(_) => "read_descriptor_results",
            Self::DescriptorWritten(_) => "write_descriptor_results",
            Self::Error(_) => "errors",
            Self::PeripheralRole(_) => "peripheral_events",
        }
    }
}

impl InboundBatch {
    /// Flattens the batch in fixed kind order.
    pub(crate) fn into_events(self) -> Vec<BleEvent> {
        let mut events = Vec::new();
        events.extend(
            decode_each("state_updates", self.state_updates)
                .map(|update: StateUpdate| BleEvent::AdapterState(update.state)),
        );
        events.extend(
            decode_each("scan_results", self.scan_results).map(|record: ScanRecord| {
                if record.is_inquiry_complete() {
                    BleEvent::ScanFinished
                } else {
                    BleEvent::ScanResult(record)
                }
            }),
        );
        events.extend(decode_each("status_updates", self.status_updates).map(BleEvent::Status));
        events.extend(
            decode_each("service_discovery_results", self.service_discovery_results)
                .map(BleEvent::ServiceDiscovered),
        );
        events.extend(
            decode_each("service_discovery_finished", self.service_discovery_finished)
                .map(BleEvent::ServiceDiscoveryFinished),
        );
        events.extend(
            decode_each("characteristic_discovery_results", self.characteristic_discovery_results)
                .map(BleEvent::CharacteristicDiscovered),
        );
        events.extend(
            decode_each("characteristic_discovery_finished", self.characteristic_discovery_finished)
                .map(BleEvent::CharacteristicDiscoveryFinished),
        );
        events.extend(
            decode_each("descriptor_discovery_results", self.descriptor_discovery_results)
                .map(BleEvent::DescriptorDiscovered),
        );
        events.extend(
            decode_each("descriptor_discovery_finished", self.descriptor_discovery_finished)
                .map(BleEvent::DescriptorDiscoveryFinished),
        );
        events.extend(
            decode_each("read_characteristic_results", self.read_characteristic_results)
                .map(BleEvent::CharacteristicRead),
        );
        events.extend(
            decode_each("write_characteristic_results", self.write_characteristic_results)
                .map(BleEvent::CharacteristicWritten),
        );
        events.extend(
            decode_each("notify_characteristic_results", self.notify_characteristic_results)
                .map(BleEvent::NotifyToggled),
        );
        events.extend(
            decode_each("read_descriptor_results", self.read_descriptor_results)
                .map(BleEvent::DescriptorRead),
        );
        events.extend(
            decode_each("write_descriptor_results", self.write_descriptor_results)
                .map(BleEvent::DescriptorWritten),
        );
        events.extend(decode_each("notifications", self.notifications).map(BleEvent::Notification));
        events.extend(decode_each("errors", self.errors).map(BleEvent::Error));
        events.extend(
            decode_each("peripheral_events", self.peripheral_events).map(BleEvent::PeripheralRole),
        );
        events
    }
}

/// Decodes one inbound `{"ble": {...}}` frame into ordered events.
pub(crate) fn decode_events(frame: &str) -> Result<Vec<BleEvent>, DecodeError> {
    let envelope: InboundEnvelope = serde_json::from_str(frame)?;
    let batch = envelope.ble.ok_or(DecodeError::MissingEnvelope)?;
    Ok(batch.into_events())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn decode(value: serde_json::Value) -> Vec<BleEvent> {
        decode_events(&value.to_string()).expect("frame should decode")
    }

    #[test]
    fn records_are_flattened_in_kind_order() {
        let events = decode(json!({"ble": {
            "peripheral_events": [{"event": "mtu_changed", "mtu": 185}],
            "errors": [{"error_code": 1, "message": "boom"}],
            "notifications": [{"address": "e5f678800700", "service_uuid": "ff00", "characteristic_uuid": "ff01", "data": [1]}],
            "status_updates": [{"address": "e5f678800700", "status": "connected"}],
            "state_updates": [{"state": "powered_on"}]
        }}));

        let kinds: Vec<&str> = events.iter().map(BleEvent::kind).collect();
        assert_eq!(
            vec![
                "state_updates",
                "status_updates",
                "notifications",
                "errors",
                "peripheral_events"
            ],
            kinds
        );
    }

    #[test]
    fn inquiry_complete_becomes_scan_finished() {
        let events = decode(json!({"ble": {"scan_results": [
            {"event_type": "inquiry_complete"}
        ]}}));
        assert_matches!(events.as_slice(), [BleEvent::ScanFinished]);
    }

    #[test]
    fn misspelled_connectable_type_is_connectable() {
        let events = decode(json!({"ble": {"scan_results": [{
            "event_type": "inquiry_result",
            "address": "e5f678800700",
            "address_type": "public",
            "ble_event_type": "connectable_advertisemnt",
            "rssi": -82,
            "adv_data": [2, 1, 26],
            "scan_resp": null
        }]}}));

        let [BleEvent::ScanResult(record)] = events.as_slice() else {
            panic!("expected one scan result, got {events:?}");
        };
        assert!(record.is_connectable());
        assert_eq!(Some(-82), record.rssi);
        assert_eq!(vec![2, 1, 26], record.adv_data);
        assert!(record.scan_resp.is_empty());
    }

    #[test]
    fn null_arrays_and_unknown_keys_are_ignored() {
        let events = decode(json!({"ble": {
            "scan_results": null,
            "firmware": {"version": "3.5.0"}
        }}));
        assert!(events.is_empty());
    }

    #[test]
    fn malformed_record_does_not_cost_its_siblings() {
        let events = decode(json!({"ble": {
            "status_updates": [
                {"status": "connecting"},
                {"address": null, "status": "connected"},
                {"address": "e5f678800700", "status": "disconnected"}
            ],
            "read_characteristic_results": [{
                "address": "e5f678800700",
                "service_uuid": "ff00",
                "characteristic_uuid": "ff01",
                "data": [104, 105]
            }]
        }}));

        assert_matches!(
            events.as_slice(),
            [
                BleEvent::Status(StatusRecord {
                    status: LinkStatus::Disconnected,
                    ..
                }),
                BleEvent::CharacteristicRead(CharacteristicData { data, .. })
            ] if data == &vec![104, 105]
        );
    }

    #[test]
    fn error_code_accepts_numbers_and_strings() {
        let events = decode(json!({"ble": {"errors": [
            {"error_code": 3, "message": "a", "address": null},
            {"error_code": "7", "message": "b", "address": "e5f678800700", "service_uuid": null}
        ]}}));

        let codes: Vec<Option<i64>> = events
            .iter()
            .map(|event| match event {
                BleEvent::Error(record) => record.error_code,
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(vec![Some(3), Some(7)], codes);
    }

    #[test]
    fn missing_envelope_is_rejected() {
        assert_matches!(
            decode_events(r#"{"ws": {"ready": true}}"#),
            Err(DecodeError::MissingEnvelope)
        );
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert_matches!(decode_events("{ble"), Err(DecodeError::Json(_)));
    }

    #[test]
    fn wire_outcome_parses_known_values() {
        assert_eq!(Ok(WireOutcome::Failed), "failed".parse::<WireOutcome>());
        assert!("maybe".parse::<WireOutcome>().is_err());
    }
}
