use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tracing::{debug, instrument, trace, warn};

use crate::adapter::Outbox;
use crate::address::{Address, AddressType};
use crate::advertisement::Advertisement;
use crate::engine::{EngineEvent, EventSink};
use crate::error::{EngineError, ProtocolAnomaly};
use crate::model::{PeripheralSnapshot, RemotePeripheral, Resolver, TransportFault, resolve};
use crate::protocol::{AdapterState, BleEvent, Command, LinkStatus, ScanRecord, StatusRecord};
use crate::uuid::GattUuid;

/// Selects which scanned peripherals are reported as discoveries.
///
/// A peripheral matches when it satisfies any one criterion; an empty filter
/// matches everything.
#[derive(Debug, Clone, Default, Eq, PartialEq, bon::Builder)]
pub struct ScanFilter {
    #[builder(default)]
    addresses: Vec<Address>,
    #[builder(default)]
    local_names: Vec<String>,
    #[builder(default)]
    name_prefixes: Vec<String>,
    #[builder(default)]
    service_uuids: Vec<GattUuid>,
}

impl ScanFilter {
    /// Returns whether the filter has no criteria.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
            && self.local_names.is_empty()
            && self.name_prefixes.is_empty()
            && self.service_uuids.is_empty()
    }

    /// Returns whether a peripheral with this address and advertisement matches.
    #[must_use]
    pub fn matches(&self, address: Address, advertisement: Option<&Advertisement>) -> bool {
        if self.is_empty() || self.addresses.contains(&address) {
            return true;
        }
        let Some(advertisement) = advertisement else {
            return false;
        };
        if let Some(name) = advertisement.local_name()
            && (self.local_names.iter().any(|wanted| wanted == name)
                || self
                    .name_prefixes
                    .iter()
                    .any(|prefix| name.starts_with(prefix.as_str())))
        {
            return true;
        }
        advertisement
            .service_uuids()
            .iter()
            .any(|uuid| self.service_uuids.contains(uuid))
    }
}

/// Scan parameters.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, bon::Builder)]
pub struct ScanOptions {
    /// Scan length; the engine's configured default applies when unset.
    duration: Option<Duration>,
    /// Report each address at most once per scan.
    #[builder(default)]
    suppress_duplicates: bool,
}

impl ScanOptions {
    /// Returns the requested scan length.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Returns whether repeated records per address are suppressed.
    #[must_use]
    pub fn suppress_duplicates(&self) -> bool {
        self.suppress_duplicates
    }
}

#[derive(Debug, Clone, Copy)]
struct AddressEntry {
    address_type: AddressType,
    connectable: bool,
}

/// Address type and connectability learned per address.
#[derive(Debug, Default)]
struct AddressTable {
    entries: HashMap<Address, AddressEntry>,
}

impl AddressTable {
    /// Records an address type; a conflicting type never replaces the first one.
    fn learn(&mut self, address: Address, address_type: AddressType, connectable: Option<bool>) {
        match self.entries.get_mut(&address) {
            Some(entry) => {
                if entry.address_type != address_type {
                    warn!(
                        anomaly = %ProtocolAnomaly::AddressTypeConflict {
                            address,
                            known: entry.address_type,
                            requested: address_type,
                        },
                        "keeping known address type"
                    );
                }
                if let Some(connectable) = connectable {
                    entry.connectable = connectable;
                }
            }
            None => {
                self.entries.insert(
                    address,
                    AddressEntry {
                        address_type,
                        connectable: connectable.unwrap_or(false),
                    },
                );
            }
        }
    }

    fn address_type(&self, address: Address) -> Option<AddressType> {
        self.entries.get(&address).map(|entry| entry.address_type)
    }

    fn is_connectable(&self, address: Address) -> bool {
        self.entries
            .get(&address)
            .is_some_and(|entry| entry.connectable)
    }
}

#[derive(Debug, Default)]
struct ScanState {
    scanning: bool,
    filter: ScanFilter,
    suppress_duplicates: bool,
    seen: HashSet<Address>,
}

/// The BLE central role: every tracked remote peripheral plus the scan.
#[derive(Debug, Default)]
pub(crate) struct CentralBinding {
    peripherals: HashMap<Address, RemotePeripheral>,
    order: Vec<Address>,
    addresses: AddressTable,
    scan: ScanState,
}

impl CentralBinding {
    fn peripheral_entry(&mut self, address: Address) -> &mut RemotePeripheral {
        if !self.peripherals.contains_key(&address) {
            debug!(%address, "tracking new peripheral");
            self.order.push(address);
        }
        self.peripherals
            .entry(address)
            .or_insert_with(|| RemotePeripheral::new(address))
    }

    pub(crate) fn peripheral_mut(
        &mut self,
        address: Address,
    ) -> Result<&mut RemotePeripheral, EngineError> {
        self.peripherals
            .get_mut(&address)
            .ok_or(EngineError::UnknownPeripheral { address })
    }

    pub(crate) fn peripheral(&self, address: Address) -> Result<&RemotePeripheral, EngineError> {
        self.peripherals
            .get(&address)
            .ok_or(EngineError::UnknownPeripheral { address })
    }

    pub(crate) fn contains(&self, address: Address) -> bool {
        self.peripherals.contains_key(&address)
    }

    #[cfg(test)]
    pub(crate) fn addresses(&self) -> Vec<Address> {
        self.order.clone()
    }

    #[cfg(test)]
    pub(crate) fn is_scanning(&self) -> bool {
        self.scan.scanning
    }

    pub(crate) fn snapshot(&self, address: Address) -> Result<PeripheralSnapshot, EngineError> {
        let peripheral = self.peripheral(address)?;
        Ok(peripheral.snapshot(
            self.addresses.address_type(address),
            self.addresses.is_connectable(address),
        ))
    }

    pub(crate) fn snapshots(&self) -> Vec<PeripheralSnapshot> {
        self.order
            .iter()
            .filter_map(|address| self.snapshot(*address).ok())
            .collect()
    }

    #[instrument(skip(self, outbox), level = "debug")]
    pub(crate) fn start_scan(
        &mut self,
        filter: ScanFilter,
        options: ScanOptions,
        default_duration: Duration,
        outbox: &mut Outbox,
    ) {
        let duration = options.duration().unwrap_or(default_duration);
        outbox.push(Command::Scan {
            duration: whole_seconds(duration),
            duplicate: !options.suppress_duplicates(),
        });
        self.scan = ScanState {
            scanning: true,
            filter,
            suppress_duplicates: options.suppress_duplicates(),
            seen: HashSet::new(),
        };
    }

    /// Sends `scan_stop` only while a scan is running.
    pub(crate) fn stop_scan(&mut self, outbox: &mut Outbox) {
        if self.scan.scanning {
            outbox.push(Command::ScanStop {});
            self.scan.scanning = false;
        } else {
            trace!("stop_scan without an active scan");
        }
    }

    /// Seeds the address table, creates the peripheral if needed and starts connecting.
    #[instrument(skip(self, waiter, outbox), level = "debug", fields(address = %address))]
    pub(crate) fn direct_connect(
        &mut self,
        address: Address,
        address_type: AddressType,
        waiter: Option<Resolver<()>>,
        outbox: &mut Outbox,
    ) {
        self.addresses.learn(address, address_type, None);
        let known_type = self.addresses.address_type(address);
        self.peripheral_entry(address)
            .connect(known_type, waiter, outbox);
    }

    pub(crate) fn connect(
        &mut self,
        address: Address,
        waiter: Resolver<()>,
        outbox: &mut Outbox,
    ) {
        let known_type = self.addresses.address_type(address);
        match self.peripheral_mut(address) {
            Ok(peripheral) => peripheral.connect(known_type, Some(waiter), outbox),
            Err(error) => resolve(waiter, Err(error)),
        }
    }

    pub(crate) fn on_adapter_state(&mut self, state: AdapterState) {
        if state == AdapterState::PoweredOff {
            self.scan.scanning = false;
            for peripheral in self.peripherals.values_mut() {
                peripheral.adapter_powered_off();
            }
        }
    }

    pub(crate) fn fail_in_flight(&mut self) {
        for peripheral in self.peripherals.values_mut() {
            peripheral.fail_in_flight();
        }
    }

    fn known_peripheral(
        &mut self,
        kind: &'static str,
        address: Address,
    ) -> Option<&mut RemotePeripheral> {
        let peripheral = self.peripherals.get_mut(&address);
        if peripheral.is_none() {
            warn!(
                anomaly = %ProtocolAnomaly::UnknownPeripheral { kind, address },
                "dropping event"
            );
        }
        peripheral
    }

    pub(crate) fn handle_event(
        &mut self,
        event: BleEvent,
        sink: &mut EventSink,
        outbox: &mut Outbox,
    ) {
        let kind = event.kind();
        match event {
            BleEvent::ScanResult(record) => self.on_scan_result(&record, sink),
            BleEvent::ScanFinished => {
                debug!("scan finished");
                self.scan.scanning = false;
                sink.emit(EngineEvent::ScanFinished);
            }
            BleEvent::Status(record) => self.on_status(record),
            BleEvent::ServiceDiscovered(record) => {
                if let Some(peripheral) = self.known_peripheral(kind, record.address) {
                    peripheral.on_service_discovered(record);
                }
            }
            BleEvent::ServiceDiscoveryFinished(scope) => {
                if let Some(peripheral) = self.known_peripheral(kind, scope.address) {
                    peripheral.on_service_discovery_finished(scope);
                }
            }
            BleEvent::CharacteristicDiscovered(record) => {
                if let Some(peripheral) = self.known_peripheral(kind, record.address) {
                    peripheral.on_characteristic_discovered(record);
                }
            }
            BleEvent::CharacteristicDiscoveryFinished(scope) => {
                if let Some(peripheral) = self.known_peripheral(kind, scope.address) {
                    peripheral.on_characteristic_discovery_finished(scope);
                }
            }
            BleEvent::DescriptorDiscovered(record) => {
                if let Some(peripheral) = self.known_peripheral(kind, record.address) {
                    peripheral.on_descriptor_discovered(record);
                }
            }
            BleEvent::DescriptorDiscoveryFinished(scope) => {
                if let Some(peripheral) = self.known_peripheral(kind, scope.address) {
                    peripheral.on_descriptor_discovery_finished(scope);
                }
            }
            BleEvent::CharacteristicRead(record) => {
                if let Some(peripheral) = self.known_peripheral(kind, record.address) {
                    peripheral.on_characteristic_read(record);
                }
            }
            BleEvent::CharacteristicWritten(record) => {
                if let Some(peripheral) = self.known_peripheral(kind, record.address) {
                    peripheral.on_characteristic_written(record);
                }
            }
            BleEvent::NotifyToggled(record) => {
                if let Some(peripheral) = self.known_peripheral(kind, record.address) {
                    peripheral.on_notify_toggled(record);
                }
            }
            BleEvent::Notification(record) => {
                if let Some(peripheral) = self.known_peripheral(kind, record.address) {
                    peripheral.on_notification(record);
                }
            }
            BleEvent::DescriptorRead(record) => {
                if let Some(peripheral) = self.known_peripheral(kind, record.address) {
                    peripheral.on_descriptor_read(record);
                }
            }
            BleEvent::DescriptorWritten(record) => {
                if let Some(peripheral) = self.known_peripheral(kind, record.address) {
                    peripheral.on_descriptor_written(record);
                }
            }
            BleEvent::Error(record) => {
                let fault = TransportFault::from_record(record);
                match fault
                    .address()
                    .and_then(|address| self.peripherals.get_mut(&address))
                {
                    Some(peripheral) => peripheral.on_error(&fault, outbox),
                    None => {
                        debug!(message = fault.message(), "engine-wide transport error");
                        sink.emit(EngineEvent::Error(fault));
                    }
                }
            }
            BleEvent::AdapterState(_) | BleEvent::PeripheralRole(_) => {
                trace!(kind, "event routed to the wrong binding");
            }
        }
    }

    fn on_scan_result(&mut self, record: &ScanRecord, sink: &mut EventSink) {
        let Some(address) = record.address else {
            trace!("scan record without an address");
            return;
        };
        if let Some(address_type) = record.address_type {
            let connectable = record
                .ble_event_type
                .as_deref()
                .filter(|kind| !kind.starts_with("scan_response"))
                .map(|_| record.is_connectable());
            self.addresses.learn(address, address_type, connectable);
        }

        let peripheral = self.peripheral_entry(address);
        peripheral.observe_scan(record);

        if self.scan.suppress_duplicates && self.scan.seen.contains(&address) {
            trace!(%address, "suppressing duplicate scan record");
            return;
        }
        let Ok(snapshot) = self.snapshot(address) else {
            return;
        };
        if !self.scan.filter.matches(address, snapshot.advertisement()) {
            trace!(%address, "scan record filtered out");
            return;
        }
        // Only a reported sighting counts towards suppression.
        self.scan.seen.insert(address);
        sink.emit(EngineEvent::Discovered(snapshot));
    }

    fn on_status(&mut self, record: StatusRecord) {
        let StatusRecord {
            address,
            status,
            reason,
        } = record;
        let peripheral = match status {
            LinkStatus::Connected => Some(self.peripheral_entry(address)),
            LinkStatus::Disconnected => self.known_peripheral("status_updates", address),
        };
        if let Some(peripheral) = peripheral {
            peripheral.on_status(status, reason.as_deref());
        }
    }
}

/// Wire scan durations are whole seconds; any remainder rounds up.
fn whole_seconds(duration: Duration) -> u64 {
    let seconds = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        seconds.saturating_add(1)
    } else {
        seconds
    }
}
