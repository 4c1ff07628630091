use std::collections::{HashMap, HashSet};
use std::mem;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::adapter::Outbox;
use crate::address::{Address, AddressType};
use crate::advertisement::Advertisement;
use crate::error::{EngineError, Operation, ProtocolAnomaly};
use crate::protocol::{
    CharacteristicData, CharacteristicOutcome, CharacteristicRecord, CharacteristicScope,
    Command, DescriptorData, DescriptorOutcome, DescriptorRecord, DescriptorScope, LinkStatus,
    ScanRecord, ServiceRecord, ServiceScope, WireOutcome,
};
use crate::uuid::GattUuid;

use super::connection::ConnectionState;
use super::gatt::{Characteristic, CharacteristicProperty, Descriptor, FailWith, Service, ServiceInfo};
use super::observer::{Notification, Observers, TransportFault, WriteReport};
use super::{Resolver, resolve, resolve_all};

const REMOTE_REFUSED: &str = "remote reported failure";

/// Everything the engine knows about one remote device.
#[derive(Debug)]
pub(crate) struct RemotePeripheral {
    address: Address,
    state: ConnectionState,
    rssi: Option<i16>,
    advertisement: Option<Advertisement>,
    discovered_on_remote: bool,
    services: Vec<Service>,
    services_complete: bool,
    absent_services: HashSet<GattUuid>,
    connect_waiters: Vec<Resolver<()>>,
    disconnect_waiters: Vec<Resolver<()>>,
    service_waiters: Vec<Resolver<Vec<GattUuid>>>,
    service_lookups: HashMap<GattUuid, Vec<Resolver<bool>>>,
    observers: Observers,
}

impl RemotePeripheral {
    pub(crate) fn new(address: Address) -> Self {
        Self {
            address,
            state: ConnectionState::Discovered,
            rssi: None,
            advertisement: None,
            discovered_on_remote: false,
            services: Vec::new(),
            services_complete: false,
            absent_services: HashSet::new(),
            connect_waiters: Vec::new(),
            disconnect_waiters: Vec::new(),
            service_waiters: Vec::new(),
            service_lookups: HashMap::new(),
            observers: Observers::default(),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn observers_mut(&mut self) -> &mut Observers {
        &mut self.observers
    }

    /// Merges one scan record into the advertisement snapshot.
    pub(crate) fn observe_scan(&mut self, record: &ScanRecord) {
        self.discovered_on_remote = true;
        if record.rssi.is_some() {
            self.rssi = record.rssi;
        }

        let previous = self.advertisement.take();
        let adv_data = match (&previous, record.adv_data.is_empty()) {
            (Some(previous), true) => previous.adv_data().to_vec(),
            _ => record.adv_data.clone(),
        };
        let scan_resp = match (&previous, record.scan_resp.is_empty()) {
            (Some(previous), true) => previous.scan_resp().to_vec(),
            _ => record.scan_resp.clone(),
        };
        self.advertisement = Some(Advertisement::decode(&adv_data, &scan_resp));
    }

    fn require_connected(&self) -> Result<(), EngineError> {
        if self.state == ConnectionState::Connected {
            Ok(())
        } else {
            Err(EngineError::NotConnected {
                address: self.address,
            })
        }
    }

    fn target(&self, service: &GattUuid, characteristic: &GattUuid) -> String {
        format!("{} {service}/{characteristic}", self.address)
    }

    /// Starts or joins a connection attempt.
    pub(crate) fn connect(
        &mut self,
        address_type: Option<AddressType>,
        waiter: Option<Resolver<()>>,
        outbox: &mut Outbox,
    ) {
        match self.state {
            ConnectionState::Connected => {
                if let Some(waiter) = waiter {
                    resolve(waiter, Ok(()));
                }
            }
            ConnectionState::Connecting => self.connect_waiters.extend(waiter),
            ConnectionState::Disconnecting => {
                if let Some(waiter) = waiter {
                    resolve(
                        waiter,
                        Err(EngineError::InvalidState {
                            operation: Operation::Connect,
                            address: self.address,
                            state: self.state,
                        }),
                    );
                }
            }
            ConnectionState::Discovered | ConnectionState::Disconnected => {
                let Some(address_type) = address_type else {
                    if let Some(waiter) = waiter {
                        resolve(
                            waiter,
                            Err(EngineError::InvalidAddressType {
                                address: self.address,
                            }),
                        );
                    }
                    return;
                };
                outbox.push(Command::Connect {
                    address: self.address,
                    address_type,
                });
                self.state = ConnectionState::Connecting;
                self.connect_waiters.extend(waiter);
            }
        }
    }

    /// Starts or joins a disconnect; a peripheral without a link resolves at once.
    pub(crate) fn disconnect(&mut self, waiter: Resolver<()>, outbox: &mut Outbox) {
        match self.state {
            ConnectionState::Connected | ConnectionState::Connecting => {
                outbox.push(Command::Disconnect {
                    address: self.address,
                });
                self.state = ConnectionState::Disconnecting;
                self.disconnect_waiters.push(waiter);
            }
            ConnectionState::Disconnecting => self.disconnect_waiters.push(waiter),
            ConnectionState::Discovered | ConnectionState::Disconnected => {
                resolve(waiter, Ok(()));
            }
        }
    }

    pub(crate) fn on_status(&mut self, status: LinkStatus, reason: Option<&str>) {
        match (status, self.state) {
            (LinkStatus::Connected, ConnectionState::Connecting) => {
                debug!(address = %self.address, "link established");
                self.state = ConnectionState::Connected;
                resolve_all(mem::take(&mut self.connect_waiters), &Ok(()));
                self.observers.connected();
            }
            (
                LinkStatus::Connected,
                ConnectionState::Discovered | ConnectionState::Disconnected,
            ) => {
                info!(address = %self.address, "accepting link the engine did not request");
                self.state = ConnectionState::Connected;
                self.observers.connected();
            }
            (LinkStatus::Connected, ConnectionState::Connected) => {
                trace!(address = %self.address, "duplicate connected status");
            }
            (LinkStatus::Connected, ConnectionState::Disconnecting) => {
                warn!(
                    anomaly = %ProtocolAnomaly::UnexpectedStatus {
                        address: self.address,
                        status: "connected",
                        state: self.state,
                    },
                    "dropping status update"
                );
            }
            (LinkStatus::Disconnected, state) if state.has_link() => {
                debug!(address = %self.address, ?reason, %state, "link closed");
                self.enter_disconnected(reason);
            }
            (LinkStatus::Disconnected, _) => {
                trace!(address = %self.address, "disconnected status without a link");
            }
        }
    }

    fn enter_disconnected(&mut self, reason: Option<&str>) {
        self.state = ConnectionState::Disconnected;
        let connect_failure = EngineError::OperationFailed {
            operation: Operation::Connect,
            reason: reason.unwrap_or("link closed before it was established").to_string(),
        };
        resolve_all(mem::take(&mut self.connect_waiters), &Err(connect_failure));
        resolve_all(mem::take(&mut self.disconnect_waiters), &Ok(()));
        let address = self.address;
        self.drop_link_state(&|_: Operation| EngineError::LinkLost { address });
        self.observers.disconnected(reason);
    }

    fn drop_link_state(&mut self, fail: FailWith<'_>) {
        resolve_all(
            mem::take(&mut self.service_waiters),
            &Err(fail(Operation::DiscoverServices)),
        );
        for (_, waiters) in self.service_lookups.drain() {
            resolve_all(waiters, &Err(fail(Operation::DiscoverServices)));
        }
        for service in &mut self.services {
            service.reset_link(fail);
        }
        self.services_complete = false;
        self.absent_services.clear();
    }

    /// Treats a radio power-off as an unsolicited disconnect.
    pub(crate) fn adapter_powered_off(&mut self) {
        if self.state.has_link() {
            self.enter_disconnected(Some("adapter powered off"));
        }
    }

    /// Fails every in-flight operation because the transport is gone.
    pub(crate) fn fail_in_flight(&mut self) {
        let address = self.address;
        let lost = EngineError::LinkLost { address };
        resolve_all(mem::take(&mut self.connect_waiters), &Err(lost.clone()));
        resolve_all(mem::take(&mut self.disconnect_waiters), &Err(lost));
        self.drop_link_state(&|_: Operation| EngineError::LinkLost { address });
    }

    fn find_service_mut(&mut self, uuid: &GattUuid) -> Option<&mut Service> {
        self.services
            .iter_mut()
            .find(|service| service.uuid() == uuid)
    }

    /// Returns the service, creating a placeholder on first reference.
    fn service_mut(&mut self, uuid: &GattUuid) -> &mut Service {
        let index = match self.services.iter().position(|service| service.uuid() == uuid) {
            Some(index) => index,
            None => {
                self.services.push(Service::new(uuid.clone()));
                self.services.len() - 1
            }
        };
        &mut self.services[index]
    }

    fn find_characteristic_mut(
        &mut self,
        service: &GattUuid,
        characteristic: &GattUuid,
    ) -> Option<&mut Characteristic> {
        self.find_service_mut(service)?
            .find_characteristic_mut(characteristic)
    }

    fn find_descriptor_mut(
        &mut self,
        service: &GattUuid,
        characteristic: &GattUuid,
        descriptor: &GattUuid,
    ) -> Option<&mut Descriptor> {
        self.find_characteristic_mut(service, characteristic)?
            .find_descriptor_mut(descriptor)
    }

    fn discovered_services(&self) -> Vec<GattUuid> {
        self.services
            .iter()
            .filter(|service| service.is_discovered())
            .map(|service| service.uuid().clone())
            .collect()
    }

    pub(crate) fn discover_services(
        &mut self,
        resolver: Resolver<Vec<GattUuid>>,
        outbox: &mut Outbox,
    ) {
        if self.services_complete {
            resolve(resolver, Ok(self.discovered_services()));
            return;
        }
        if let Err(error) = self.require_connected() {
            resolve(resolver, Err(error));
            return;
        }
        if self.service_waiters.is_empty() {
            outbox.push(Command::DiscoverServices {
                address: self.address,
                service_uuid: None,
            });
        }
        self.service_waiters.push(resolver);
    }

    /// Resolves to whether the remote has the service, discovering it if needed.
    pub(crate) fn lookup_service(
        &mut self,
        uuid: &GattUuid,
        resolver: Resolver<bool>,
        outbox: &mut Outbox,
    ) {
        if self
            .services
            .iter()
            .any(|service| service.uuid() == uuid && service.is_discovered())
        {
            resolve(resolver, Ok(true));
            return;
        }
        if self.services_complete || self.absent_services.contains(uuid) {
            resolve(resolver, Ok(false));
            return;
        }
        if let Err(error) = self.require_connected() {
            resolve(resolver, Err(error));
            return;
        }

        let waiters = self.service_lookups.entry(uuid.clone()).or_default();
        if waiters.is_empty() {
            outbox.push(Command::DiscoverServices {
                address: self.address,
                service_uuid: Some(uuid.clone()),
            });
        }
        waiters.push(resolver);
    }

    pub(crate) fn on_service_discovered(&mut self, record: ServiceRecord) {
        self.absent_services.remove(&record.service_uuid);
        self.service_mut(&record.service_uuid)
            .mark_discovered(record.is_primary.unwrap_or(true));
    }

    pub(crate) fn on_service_discovery_finished(&mut self, scope: ServiceScope) {
        match scope.service_uuid {
            None => {
                self.services_complete = true;
                let discovered = self.discovered_services();
                resolve_all(mem::take(&mut self.service_waiters), &Ok(discovered.clone()));
                for (uuid, waiters) in self.service_lookups.drain() {
                    resolve_all(waiters, &Ok(discovered.contains(&uuid)));
                }
            }
            Some(uuid) => {
                let present = self
                    .services
                    .iter()
                    .any(|service| service.uuid() == &uuid && service.is_discovered());
                if !present {
                    self.absent_services.insert(uuid.clone());
                }
                match self.service_lookups.remove(&uuid) {
                    Some(waiters) => resolve_all(waiters, &Ok(present)),
                    None => trace!(address = %self.address, %uuid, "unrequested scoped discovery finished"),
                }
            }
        }
    }

    pub(crate) fn discover_characteristics(
        &mut self,
        service: &GattUuid,
        resolver: Resolver<Vec<GattUuid>>,
        outbox: &mut Outbox,
    ) {
        if let Some(cached) = self.find_service_mut(service)
            && cached.characteristics_complete()
        {
            resolve(resolver, Ok(cached.discovered_characteristics()));
            return;
        }
        if let Err(error) = self.require_connected() {
            resolve(resolver, Err(error));
            return;
        }
        let address = self.address;
        if self.service_mut(service).join_characteristic_discovery(resolver) {
            outbox.push(Command::DiscoverCharacteristics {
                address,
                service_uuid: service.clone(),
            });
        }
    }

    pub(crate) fn on_characteristic_discovered(&mut self, record: CharacteristicRecord) {
        let properties = CharacteristicProperty::parse_all(&record.properties);
        self.service_mut(&record.service_uuid)
            .characteristic_mut(&record.characteristic_uuid)
            .mark_discovered(properties);
    }

    pub(crate) fn on_characteristic_discovery_finished(&mut self, scope: CharacteristicScope) {
        if !self
            .service_mut(&scope.service_uuid)
            .finish_characteristic_discovery()
        {
            trace!(address = %self.address, service = %scope.service_uuid, "unrequested characteristic discovery finished");
        }
    }

    pub(crate) fn discover_descriptors(
        &mut self,
        service: &GattUuid,
        characteristic: &GattUuid,
        resolver: Resolver<Vec<GattUuid>>,
        outbox: &mut Outbox,
    ) {
        if let Some(cached) = self.find_characteristic_mut(service, characteristic)
            && cached.descriptors_complete()
        {
            resolve(resolver, Ok(cached.discovered_descriptors()));
            return;
        }
        if let Err(error) = self.require_connected() {
            resolve(resolver, Err(error));
            return;
        }
        let address = self.address;
        if self
            .service_mut(service)
            .characteristic_mut(characteristic)
            .join_descriptor_discovery(resolver)
        {
            outbox.push(Command::DiscoverDescriptors {
                address,
                service_uuid: service.clone(),
                characteristic_uuid: characteristic.clone(),
            });
        }
    }

    pub(crate) fn on_descriptor_discovered(&mut self, record: DescriptorRecord) {
        self.service_mut(&record.service_uuid)
            .characteristic_mut(&record.characteristic_uuid)
            .descriptor_mut(&record.descriptor_uuid);
    }

    pub(crate) fn on_descriptor_discovery_finished(&mut self, scope: DescriptorScope) {
        if !self
            .service_mut(&scope.service_uuid)
            .characteristic_mut(&scope.characteristic_uuid)
            .finish_descriptor_discovery()
        {
            trace!(address = %self.address, characteristic = %scope.characteristic_uuid, "unrequested descriptor discovery finished");
        }
    }

    pub(crate) fn read_characteristic(
        &mut self,
        service: &GattUuid,
        characteristic: &GattUuid,
        resolver: Resolver<Vec<u8>>,
        outbox: &mut Outbox,
    ) {
        if let Err(error) = self.require_connected() {
            resolve(resolver, Err(error));
            return;
        }
        let target = self.target(service, characteristic);
        let slot = self.service_mut(service).characteristic_mut(characteristic);
        if let Err(resolver) = slot.begin_read(resolver) {
            resolve(
                resolver,
                Err(EngineError::OperationPending {
                    operation: Operation::ReadCharacteristic,
                    target,
                }),
            );
            return;
        }
        outbox.push(Command::ReadCharacteristic {
            address: self.address,
            service_uuid: service.clone(),
            characteristic_uuid: characteristic.clone(),
        });
    }

    pub(crate) fn write_characteristic(
        &mut self,
        service: &GattUuid,
        characteristic: &GattUuid,
        data: Vec<u8>,
        without_response: bool,
        resolver: Resolver<()>,
        outbox: &mut Outbox,
    ) {
        if let Err(error) = self.require_connected() {
            resolve(resolver, Err(error));
            return;
        }
        let target = self.target(service, characteristic);
        let slot = self.service_mut(service).characteristic_mut(characteristic);
        if let Err(resolver) = slot.begin_write(resolver) {
            resolve(
                resolver,
                Err(EngineError::OperationPending {
                    operation: Operation::WriteCharacteristic,
                    target,
                }),
            );
            return;
        }
        outbox.push(Command::WriteCharacteristic {
            address: self.address,
            service_uuid: service.clone(),
            characteristic_uuid: characteristic.clone(),
            data,
            needs_response: !without_response,
        });
    }

    pub(crate) fn toggle_notifications(
        &mut self,
        service: &GattUuid,
        characteristic: &GattUuid,
        enable: bool,
        resolver: Resolver<()>,
        outbox: &mut Outbox,
    ) {
        if let Err(error) = self.require_connected() {
            resolve(resolver, Err(error));
            return;
        }
        let target = self.target(service, characteristic);
        let slot = self.service_mut(service).characteristic_mut(characteristic);
        if let Err(resolver) = slot.begin_notify(enable, resolver) {
            let operation = if enable {
                Operation::Subscribe
            } else {
                Operation::Unsubscribe
            };
            resolve(
                resolver,
                Err(EngineError::OperationPending { operation, target }),
            );
            return;
        }
        outbox.push(Command::NotifyCharacteristic {
            address: self.address,
            service_uuid: service.clone(),
            characteristic_uuid: characteristic.clone(),
            enable,
        });
    }

    pub(crate) fn read_descriptor(
        &mut self,
        service: &GattUuid,
        characteristic: &GattUuid,
        descriptor: &GattUuid,
        resolver: Resolver<Vec<u8>>,
        outbox: &mut Outbox,
    ) {
        if let Err(error) = self.require_connected() {
            resolve(resolver, Err(error));
            return;
        }
        let target = format!("{}/{descriptor}", self.target(service, characteristic));
        let slot = self
            .service_mut(service)
            .characteristic_mut(characteristic)
            .descriptor_mut(descriptor);
        if let Err(resolver) = slot.begin_read(resolver) {
            resolve(
                resolver,
                Err(EngineError::OperationPending {
                    operation: Operation::ReadDescriptor,
                    target,
                }),
            );
            return;
        }
        outbox.push(Command::ReadDescriptor {
            address: self.address,
            service_uuid: service.clone(),
            characteristic_uuid: characteristic.clone(),
            descriptor_uuid: descriptor.clone(),
        });
    }

    pub(crate) fn write_descriptor(
        &mut self,
        service: &GattUuid,
        characteristic: &GattUuid,
        descriptor: &GattUuid,
        data: Vec<u8>,
        resolver: Resolver<()>,
        outbox: &mut Outbox,
    ) {
        if let Err(error) = self.require_connected() {
            resolve(resolver, Err(error));
            return;
        }
        let target = format!("{}/{descriptor}", self.target(service, characteristic));
        let slot = self
            .service_mut(service)
            .characteristic_mut(characteristic)
            .descriptor_mut(descriptor);
        if let Err(resolver) = slot.begin_write(resolver) {
            resolve(
                resolver,
                Err(EngineError::OperationPending {
                    operation: Operation::WriteDescriptor,
                    target,
                }),
            );
            return;
        }
        outbox.push(Command::WriteDescriptor {
            address: self.address,
            service_uuid: service.clone(),
            characteristic_uuid: characteristic.clone(),
            descriptor_uuid: descriptor.clone(),
            data,
        });
    }

    fn warn_unmatched(&self, kind: &'static str, service: GattUuid, characteristic: GattUuid) {
        warn!(
            anomaly = %ProtocolAnomaly::UnmatchedResult {
                kind,
                address: self.address,
                service,
                characteristic,
            },
            "dropping result"
        );
    }

    pub(crate) fn on_characteristic_read(&mut self, record: CharacteristicData) {
        let CharacteristicData {
            service_uuid,
            characteristic_uuid,
            data,
            ..
        } = record;
        let matched = self
            .find_characteristic_mut(&service_uuid, &characteristic_uuid)
            .is_some_and(|characteristic| characteristic.complete_read(data));
        if !matched {
            self.warn_unmatched("read_characteristic_results", service_uuid, characteristic_uuid);
        }
    }

    pub(crate) fn on_characteristic_written(&mut self, record: CharacteristicOutcome) {
        let Some(succeeded) = parse_outcome("write_characteristic_results", &record.result) else {
            return;
        };
        let outcome = if succeeded {
            Ok(())
        } else {
            Err(EngineError::OperationFailed {
                operation: Operation::WriteCharacteristic,
                reason: REMOTE_REFUSED.to_string(),
            })
        };
        let matched = self
            .find_characteristic_mut(&record.service_uuid, &record.characteristic_uuid)
            .is_some_and(|characteristic| characteristic.complete_write(outcome));

        let report = WriteReport::new(
            self.address,
            record.service_uuid,
            record.characteristic_uuid,
            succeeded,
        );
        if !matched {
            self.warn_unmatched(
                "write_characteristic_results",
                report.service().clone(),
                report.characteristic().clone(),
            );
        }
        self.observers.write_result(&report);
    }

    pub(crate) fn on_notify_toggled(&mut self, record: CharacteristicOutcome) {
        let Some(succeeded) = parse_outcome("notify_characteristic_results", &record.result)
        else {
            return;
        };
        let matched = self
            .find_characteristic_mut(&record.service_uuid, &record.characteristic_uuid)
            .is_some_and(|characteristic| characteristic.complete_notify(succeeded, REMOTE_REFUSED));
        if !matched {
            self.warn_unmatched(
                "notify_characteristic_results",
                record.service_uuid,
                record.characteristic_uuid,
            );
        }
    }

    pub(crate) fn on_notification(&mut self, record: CharacteristicData) {
        let subscribed = match self
            .find_characteristic_mut(&record.service_uuid, &record.characteristic_uuid)
        {
            Some(characteristic) if characteristic.is_subscribed() => {
                characteristic.record_notification(&record.data);
                true
            }
            _ => false,
        };
        if !subscribed {
            warn!(
                anomaly = %ProtocolAnomaly::UnsubscribedNotification {
                    address: self.address,
                    service: record.service_uuid,
                    characteristic: record.characteristic_uuid,
                },
                "dropping notification"
            );
            return;
        }

        let notification = Notification::new(
            self.address,
            record.service_uuid,
            record.characteristic_uuid,
            record.data,
        );
        self.observers.notification(&notification);
    }

    pub(crate) fn on_descriptor_read(&mut self, record: DescriptorData) {
        let DescriptorData {
            service_uuid,
            characteristic_uuid,
            descriptor_uuid,
            data,
            ..
        } = record;
        let matched = self
            .find_descriptor_mut(&service_uuid, &characteristic_uuid, &descriptor_uuid)
            .is_some_and(|descriptor| descriptor.complete_read(data));
        if !matched {
            self.warn_unmatched("read_descriptor_results", service_uuid, characteristic_uuid);
        }
    }

    pub(crate) fn on_descriptor_written(&mut self, record: DescriptorOutcome) {
        let Some(succeeded) = parse_outcome("write_descriptor_results", &record.result) else {
            return;
        };
        let outcome = if succeeded {
            Ok(())
        } else {
            Err(EngineError::OperationFailed {
                operation: Operation::WriteDescriptor,
                reason: REMOTE_REFUSED.to_string(),
            })
        };
        let matched = self
            .find_descriptor_mut(
                &record.service_uuid,
                &record.characteristic_uuid,
                &record.descriptor_uuid,
            )
            .is_some_and(|descriptor| descriptor.complete_write(outcome));
        if !matched {
            self.warn_unmatched(
                "write_descriptor_results",
                record.service_uuid,
                record.characteristic_uuid,
            );
        }
    }

    /// Routes a transport error to the most specific pending operation,
    /// then to the error observer.
    pub(crate) fn on_error(&mut self, fault: &TransportFault, outbox: &mut Outbox) {
        let reason = fault.reason();
        let fail = |operation: Operation| EngineError::OperationFailed {
            operation,
            reason: reason.clone(),
        };

        let failed = match (fault.service(), fault.characteristic(), fault.descriptor()) {
            (Some(service), Some(characteristic), Some(descriptor)) => self
                .find_descriptor_mut(service, characteristic, descriptor)
                .is_some_and(|descriptor| descriptor.fail_pending(&fail)),
            (Some(service), Some(characteristic), None) => self
                .find_characteristic_mut(service, characteristic)
                .is_some_and(|characteristic| characteristic.fail_pending(&fail)),
            (Some(service), None, _) => self
                .find_service_mut(service)
                .is_some_and(|service| service.fail_pending(&fail)),
            (None, None, None) => self.fail_address_scope(&reason, &fail, outbox),
            // A characteristic or descriptor without its service names nothing pending.
            (None, _, _) => false,
        };
        debug!(address = %self.address, failed, %reason, "transport error");

        self.observers.error(fault);
    }

    fn fail_address_scope(
        &mut self,
        reason: &str,
        fail: FailWith<'_>,
        outbox: &mut Outbox,
    ) -> bool {
        if self.state == ConnectionState::Connecting {
            // The radio may still complete the attempt; tell it to drop the link.
            outbox.push(Command::Disconnect {
                address: self.address,
            });
            self.enter_disconnected(Some(reason));
            return true;
        }

        let mut failed = false;
        let waiters = mem::take(&mut self.service_waiters);
        if !waiters.is_empty() {
            resolve_all(waiters, &Err(fail(Operation::DiscoverServices)));
            failed = true;
        }
        for (_, waiters) in self.service_lookups.drain() {
            resolve_all(waiters, &Err(fail(Operation::DiscoverServices)));
            failed = true;
        }
        failed
    }

    pub(crate) fn snapshot(
        &self,
        address_type: Option<AddressType>,
        connectable: bool,
    ) -> PeripheralSnapshot {
        PeripheralSnapshot {
            address: self.address,
            address_type,
            state: self.state,
            rssi: self.rssi,
            connectable,
            discovered_on_remote: self.discovered_on_remote,
            advertisement: self.advertisement.clone(),
            services: self.services.iter().map(Service::info).collect(),
        }
    }
}

fn parse_outcome(kind: &'static str, value: &str) -> Option<bool> {
    match value.parse::<WireOutcome>() {
        Ok(WireOutcome::Success) => Some(true),
        Ok(WireOutcome::Failed) => Some(false),
        Err(_) => {
            warn!(
                anomaly = %ProtocolAnomaly::UnknownResultValue {
                    kind,
                    value: value.to_string(),
                },
                "dropping result"
            );
            None
        }
    }
}

/// A point-in-time copy of one remote peripheral.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct PeripheralSnapshot {
    address: Address,
    address_type: Option<AddressType>,
    state: ConnectionState,
    rssi: Option<i16>,
    connectable: bool,
    discovered_on_remote: bool,
    advertisement: Option<Advertisement>,
    services: Vec<ServiceInfo>,
}

impl PeripheralSnapshot {
    /// Returns the device address.
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// Returns the address type, once learned from scanning or `direct_connect`.
    #[must_use]
    pub fn address_type(&self) -> Option<AddressType> {
        self.address_type
    }

    /// Returns the connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns the latest observed RSSI value, if present.
    #[must_use]
    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    /// Returns whether the last advertisement was connectable.
    #[must_use]
    pub fn is_connectable(&self) -> bool {
        self.connectable
    }

    /// Returns whether the device was ever seen by scanning.
    #[must_use]
    pub fn discovered_on_remote(&self) -> bool {
        self.discovered_on_remote
    }

    /// Returns the decoded advertisement, if the device was scanned.
    #[must_use]
    pub fn advertisement(&self) -> Option<&Advertisement> {
        self.advertisement.as_ref()
    }

    /// Returns the advertised local name, if present.
    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        self.advertisement
            .as_ref()
            .and_then(Advertisement::local_name)
    }

    /// Returns known services in discovery order.
    #[must_use]
    pub fn services(&self) -> &[ServiceInfo] {
        &self.services
    }
}
