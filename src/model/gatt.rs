use serde::Serialize;
use strum_macros::{Display, EnumString};
use tracing::trace;

use crate::error::{EngineError, Operation};
use crate::uuid::GattUuid;

use super::{Resolver, resolve, resolve_all};

/// GATT characteristic property flags.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, EnumString, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CharacteristicProperty {
    Read,
    Write,
    WriteWithoutResponse,
    Notify,
    Indicate,
}

impl CharacteristicProperty {
    /// Parses wire property labels, skipping ones this crate does not model.
    pub(crate) fn parse_all(labels: &[String]) -> Vec<Self> {
        labels
            .iter()
            .filter_map(|label| match label.parse::<Self>() {
                Ok(property) => Some(property),
                Err(_) => {
                    trace!(%label, "skipping unmodelled characteristic property");
                    None
                }
            })
            .collect()
    }
}

/// Builds the error a pending operation receives when it is torn down.
pub(crate) type FailWith<'a> = &'a dyn Fn(Operation) -> EngineError;

#[derive(Debug, Default)]
pub(crate) struct Descriptor {
    uuid: GattUuid,
    value: Option<Vec<u8>>,
    pending_read: Option<Resolver<Vec<u8>>>,
    pending_write: Option<Resolver<()>>,
}

impl Descriptor {
    fn new(uuid: GattUuid) -> Self {
        Self {
            uuid,
            ..Self::default()
        }
    }

    pub(crate) fn uuid(&self) -> &GattUuid {
        &self.uuid
    }

    pub(crate) fn begin_read(&mut self, resolver: Resolver<Vec<u8>>) -> Result<(), Resolver<Vec<u8>>> {
        if self.pending_read.is_some() {
            return Err(resolver);
        }
        self.pending_read = Some(resolver);
        Ok(())
    }

    pub(crate) fn begin_write(&mut self, resolver: Resolver<()>) -> Result<(), Resolver<()>> {
        if self.pending_write.is_some() {
            return Err(resolver);
        }
        self.pending_write = Some(resolver);
        Ok(())
    }

    /// Completes a pending read; returns `false` when none was pending.
    pub(crate) fn complete_read(&mut self, data: Vec<u8>) -> bool {
        let Some(resolver) = self.pending_read.take() else {
            return false;
        };
        self.value = Some(data.clone());
        resolve(resolver, Ok(data));
        true
    }

    pub(crate) fn complete_write(&mut self, outcome: Result<(), EngineError>) -> bool {
        let Some(resolver) = self.pending_write.take() else {
            return false;
        };
        resolve(resolver, outcome);
        true
    }

    pub(crate) fn fail_pending(&mut self, fail: FailWith<'_>) -> bool {
        let mut failed = false;
        if let Some(resolver) = self.pending_read.take() {
            resolve(resolver, Err(fail(Operation::ReadDescriptor)));
            failed = true;
        }
        if let Some(resolver) = self.pending_write.take() {
            resolve(resolver, Err(fail(Operation::WriteDescriptor)));
            failed = true;
        }
        failed
    }

    fn info(&self) -> DescriptorInfo {
        DescriptorInfo {
            uuid: self.uuid.clone(),
            value: self.value.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Characteristic {
    uuid: GattUuid,
    discovered: bool,
    properties: Vec<CharacteristicProperty>,
    value: Option<Vec<u8>>,
    subscribed: bool,
    pending_read: Option<Resolver<Vec<u8>>>,
    pending_write: Option<Resolver<()>>,
    pending_notify: Option<(bool, Resolver<()>)>,
    descriptors: Vec<Descriptor>,
    descriptors_complete: bool,
    descriptor_waiters: Vec<Resolver<Vec<GattUuid>>>,
}

impl Characteristic {
    fn new(uuid: GattUuid) -> Self {
        Self {
            uuid,
            ..Self::default()
        }
    }

    pub(crate) fn uuid(&self) -> &GattUuid {
        &self.uuid
    }

    pub(crate) fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub(crate) fn mark_discovered(&mut self, properties: Vec<CharacteristicProperty>) {
        self.discovered = true;
        self.properties = properties;
    }

    pub(crate) fn find_descriptor_mut(&mut self, uuid: &GattUuid) -> Option<&mut Descriptor> {
        self.descriptors
            .iter_mut()
            .find(|descriptor| descriptor.uuid() == uuid)
    }

    /// Returns the descriptor, creating a placeholder on first reference.
    pub(crate) fn descriptor_mut(&mut self, uuid: &GattUuid) -> &mut Descriptor {
        let index = match self
            .descriptors
            .iter()
            .position(|descriptor| descriptor.uuid() == uuid)
        {
            Some(index) => index,
            None => {
                self.descriptors.push(Descriptor::new(uuid.clone()));
                self.descriptors.len() - 1
            }
        };
        &mut self.descriptors[index]
    }

    pub(crate) fn begin_read(&mut self, resolver: Resolver<Vec<u8>>) -> Result<(), Resolver<Vec<u8>>> {
        if self.pending_read.is_some() {
            return Err(resolver);
        }
        self.pending_read = Some(resolver);
        Ok(())
    }

    pub(crate) fn begin_write(&mut self, resolver: Resolver<()>) -> Result<(), Resolver<()>> {
        if self.pending_write.is_some() {
            return Err(resolver);
        }
        self.pending_write = Some(resolver);
        Ok(())
    }

    pub(crate) fn begin_notify(&mut self, enable: bool, resolver: Resolver<()>) -> Result<(), Resolver<()>> {
        if self.pending_notify.is_some() {
            return Err(resolver);
        }
        self.pending_notify = Some((enable, resolver));
        Ok(())
    }

    pub(crate) fn complete_read(&mut self, data: Vec<u8>) -> bool {
        let Some(resolver) = self.pending_read.take() else {
            return false;
        };
        self.value = Some(data.clone());
        resolve(resolver, Ok(data));
        true
    }

    pub(crate) fn complete_write(&mut self, outcome: Result<(), EngineError>) -> bool {
        let Some(resolver) = self.pending_write.take() else {
            return false;
        };
        resolve(resolver, outcome);
        true
    }

    /// Completes a pending notify toggle, updating the subscription on success.
    pub(crate) fn complete_notify(&mut self, succeeded: bool, reason: &str) -> bool {
        let Some((enable, resolver)) = self.pending_notify.take() else {
            return false;
        };
        if succeeded {
            self.subscribed = enable;
            resolve(resolver, Ok(()));
        } else {
            resolve(
                resolver,
                Err(EngineError::OperationFailed {
                    operation: notify_operation(enable),
                    reason: reason.to_string(),
                }),
            );
        }
        true
    }

    pub(crate) fn record_notification(&mut self, data: &[u8]) {
        self.value = Some(data.to_vec());
    }

    pub(crate) fn descriptors_complete(&self) -> bool {
        self.descriptors_complete
    }

    pub(crate) fn discovered_descriptors(&self) -> Vec<GattUuid> {
        self.descriptors
            .iter()
            .map(|descriptor| descriptor.uuid().clone())
            .collect()
    }

    /// Queues a descriptor-discovery waiter; returns `true` if a request must be sent.
    pub(crate) fn join_descriptor_discovery(&mut self, resolver: Resolver<Vec<GattUuid>>) -> bool {
        let first = self.descriptor_waiters.is_empty();
        self.descriptor_waiters.push(resolver);
        first
    }

    pub(crate) fn finish_descriptor_discovery(&mut self) -> bool {
        self.descriptors_complete = true;
        let waiters = std::mem::take(&mut self.descriptor_waiters);
        let had_waiters = !waiters.is_empty();
        resolve_all(waiters, &Ok(self.discovered_descriptors()));
        had_waiters
    }

    /// Fails this characteristic's own pending operations.
    pub(crate) fn fail_pending(&mut self, fail: FailWith<'_>) -> bool {
        let mut failed = false;
        if let Some(resolver) = self.pending_read.take() {
            resolve(resolver, Err(fail(Operation::ReadCharacteristic)));
            failed = true;
        }
        if let Some(resolver) = self.pending_write.take() {
            resolve(resolver, Err(fail(Operation::WriteCharacteristic)));
            failed = true;
        }
        if let Some((enable, resolver)) = self.pending_notify.take() {
            resolve(resolver, Err(fail(notify_operation(enable))));
            failed = true;
        }
        let waiters = std::mem::take(&mut self.descriptor_waiters);
        if !waiters.is_empty() {
            resolve_all(waiters, &Err(fail(Operation::DiscoverDescriptors)));
            failed = true;
        }
        failed
    }

    /// Drops link-scoped state after a disconnect.
    fn reset_link(&mut self, fail: FailWith<'_>) {
        self.fail_pending(fail);
        for descriptor in &mut self.descriptors {
            descriptor.fail_pending(fail);
        }
        self.subscribed = false;
        self.descriptors_complete = false;
    }

    fn info(&self) -> CharacteristicInfo {
        CharacteristicInfo {
            uuid: self.uuid.clone(),
            discovered: self.discovered,
            properties: self.properties.clone(),
            value: self.value.clone(),
            subscribed: self.subscribed,
            descriptors: self.descriptors.iter().map(Descriptor::info).collect(),
        }
    }
}

fn notify_operation(enable: bool) -> Operation {
    if enable {
        Operation::Subscribe
    } else {
        Operation::Unsubscribe
    }
}

#[derive(Debug)]
pub(crate) struct Service {
    uuid: GattUuid,
    is_primary: bool,
    discovered: bool,
    characteristics: Vec<Characteristic>,
    characteristics_complete: bool,
    characteristic_waiters: Vec<Resolver<Vec<GattUuid>>>,
}

impl Service {
    pub(crate) fn new(uuid: GattUuid) -> Self {
        Self {
            uuid,
            is_primary: true,
            discovered: false,
            characteristics: Vec::new(),
            characteristics_complete: false,
            characteristic_waiters: Vec::new(),
        }
    }

    pub(crate) fn uuid(&self) -> &GattUuid {
        &self.uuid
    }

    /// Returns whether the remote reported this service, as opposed to a
    /// placeholder created by a caller reference.
    pub(crate) fn is_discovered(&self) -> bool {
        self.discovered
    }

    pub(crate) fn mark_discovered(&mut self, is_primary: bool) {
        self.discovered = true;
        self.is_primary = is_primary;
    }

    pub(crate) fn find_characteristic_mut(&mut self, uuid: &GattUuid) -> Option<&mut Characteristic> {
        self.characteristics
            .iter_mut()
            .find(|characteristic| characteristic.uuid() == uuid)
    }

    #[cfg(test)]
    pub(crate) fn characteristic(&self, uuid: &GattUuid) -> Option<&Characteristic> {
        self.characteristics
            .iter()
            .find(|characteristic| characteristic.uuid() == uuid)
    }

    /// Returns the characteristic, creating a placeholder on first reference.
    pub(crate) fn characteristic_mut(&mut self, uuid: &GattUuid) -> &mut Characteristic {
        let index = match self
            .characteristics
            .iter()
            .position(|characteristic| characteristic.uuid() == uuid)
        {
            Some(index) => index,
            None => {
                self.characteristics.push(Characteristic::new(uuid.clone()));
                self.characteristics.len() - 1
            }
        };
        &mut self.characteristics[index]
    }

    pub(crate) fn characteristics_complete(&self) -> bool {
        self.characteristics_complete
    }

    pub(crate) fn discovered_characteristics(&self) -> Vec<GattUuid> {
        self.characteristics
            .iter()
            .filter(|characteristic| characteristic.discovered)
            .map(|characteristic| characteristic.uuid().clone())
            .collect()
    }

    pub(crate) fn join_characteristic_discovery(
        &mut self,
        resolver: Resolver<Vec<GattUuid>>,
    ) -> bool {
        let first = self.characteristic_waiters.is_empty();
        self.characteristic_waiters.push(resolver);
        first
    }

    pub(crate) fn finish_characteristic_discovery(&mut self) -> bool {
        self.characteristics_complete = true;
        let waiters = std::mem::take(&mut self.characteristic_waiters);
        let had_waiters = !waiters.is_empty();
        resolve_all(waiters, &Ok(self.discovered_characteristics()));
        had_waiters
    }

    pub(crate) fn fail_pending(&mut self, fail: FailWith<'_>) -> bool {
        let waiters = std::mem::take(&mut self.characteristic_waiters);
        if waiters.is_empty() {
            return false;
        }
        resolve_all(waiters, &Err(fail(Operation::DiscoverCharacteristics)));
        true
    }

    pub(crate) fn reset_link(&mut self, fail: FailWith<'_>) {
        self.fail_pending(fail);
        for characteristic in &mut self.characteristics {
            characteristic.reset_link(fail);
        }
        self.characteristics_complete = false;
    }

    pub(crate) fn info(&self) -> ServiceInfo {
        ServiceInfo {
            uuid: self.uuid.clone(),
            primary: self.is_primary,
            discovered: self.discovered,
            characteristics: self
                .characteristics
                .iter()
                .map(Characteristic::info)
                .collect(),
        }
    }
}

/// A descriptor as last seen by the engine.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct DescriptorInfo {
    uuid: GattUuid,
    value: Option<Vec<u8>>,
}

impl DescriptorInfo {
    /// Returns the descriptor UUID.
    #[must_use]
    pub fn uuid(&self) -> &GattUuid {
        &self.uuid
    }

    /// Returns the last value read, if any.
    #[must_use]
    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }
}

/// A characteristic description discovered on a connected peripheral.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct CharacteristicInfo {
    uuid: GattUuid,
    discovered: bool,
    properties: Vec<CharacteristicProperty>,
    value: Option<Vec<u8>>,
    subscribed: bool,
    descriptors: Vec<DescriptorInfo>,
}

impl CharacteristicInfo {
    /// Returns the characteristic UUID.
    #[must_use]
    pub fn uuid(&self) -> &GattUuid {
        &self.uuid
    }

    /// Returns whether the remote reported this characteristic.
    #[must_use]
    pub fn is_discovered(&self) -> bool {
        self.discovered
    }

    /// Returns property flags for this characteristic.
    #[must_use]
    pub fn properties(&self) -> &[CharacteristicProperty] {
        &self.properties
    }

    /// Returns whether the characteristic advertises a property.
    #[must_use]
    pub fn has_property(&self, property: CharacteristicProperty) -> bool {
        self.properties.contains(&property)
    }

    /// Returns the last value read or notified.
    #[must_use]
    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// Returns whether notifications are enabled.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Returns known descriptors.
    #[must_use]
    pub fn descriptors(&self) -> &[DescriptorInfo] {
        &self.descriptors
    }
}

/// A GATT service with its known characteristics.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ServiceInfo {
    uuid: GattUuid,
    primary: bool,
    discovered: bool,
    characteristics: Vec<CharacteristicInfo>,
}

impl ServiceInfo {
    /// Returns the service UUID.
    #[must_use]
    pub fn uuid(&self) -> &GattUuid {
        &self.uuid
    }

    /// Returns whether this is a primary service.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    /// Returns whether the remote reported this service.
    #[must_use]
    pub fn is_discovered(&self) -> bool {
        self.discovered
    }

    /// Returns all known characteristics in discovery order.
    #[must_use]
    pub fn characteristics(&self) -> &[CharacteristicInfo] {
        &self.characteristics
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use tokio::sync::oneshot;

    use super::*;

    #[test]
    fn parse_all_skips_unknown_labels() {
        let labels = vec![
            "read".to_string(),
            "write_without_response".to_string(),
            "extended_properties".to_string(),
            "notify".to_string(),
        ];
        assert_eq!(
            vec![
                CharacteristicProperty::Read,
                CharacteristicProperty::WriteWithoutResponse,
                CharacteristicProperty::Notify,
            ],
            CharacteristicProperty::parse_all(&labels)
        );
    }

    #[test]
    fn second_read_is_refused_while_first_is_pending() {
        let mut characteristic = Characteristic::new(GattUuid::new("ff01"));
        let (first, _first_rx) = oneshot::channel();
        let (second, _second_rx) = oneshot::channel();

        assert!(characteristic.begin_read(first).is_ok());
        assert!(characteristic.begin_read(second).is_err());
    }

    #[test]
    fn read_without_pending_request_leaves_value_untouched() {
        let mut characteristic = Characteristic::new(GattUuid::new("ff01"));
        assert!(!characteristic.complete_read(vec![1, 2, 3]));
        assert_eq!(None, characteristic.info().value());
    }

    #[test]
    fn failed_notify_keeps_subscription_flag() {
        let mut characteristic = Characteristic::new(GattUuid::new("ff01"));
        let (resolver, mut receiver) = oneshot::channel();
        assert!(characteristic.begin_notify(true, resolver).is_ok());

        assert!(characteristic.complete_notify(false, "remote refused"));

        assert!(!characteristic.is_subscribed());
        assert_matches!(
            receiver.try_recv(),
            Ok(Err(EngineError::OperationFailed {
                operation: Operation::Subscribe,
                ..
            }))
        );
    }

    #[test]
    fn lookups_match_uuid_spelling_variants() {
        let mut service = Service::new(GattUuid::new("FF00"));
        service.characteristic_mut(&GattUuid::new("FF01"));
        service.characteristic_mut(&GattUuid::new("ff01"));

        assert_eq!(1, service.info().characteristics().len());
        assert!(service.characteristic(&GattUuid::new("ff01")).is_some());
    }

    #[test]
    fn reset_link_clears_subscription_and_completion() {
        let mut service = Service::new(GattUuid::new("ff00"));
        let characteristic = service.characteristic_mut(&GattUuid::new("ff01"));
        let (resolver, _receiver) = oneshot::channel();
        assert!(characteristic.begin_notify(true, resolver).is_ok());
        characteristic.complete_notify(true, "");
        service.finish_characteristic_discovery();

        service.reset_link(&|_: Operation| EngineError::EngineStopped);

        assert!(!service.characteristics_complete());
        assert!(!service.info().characteristics()[0].is_subscribed());
    }
}
